use crate::playback::state::StreamRequestMode;
use crate::playback::surface::SurfaceKind;
use std::path::PathBuf;
use tracing::{info, warn};

/// Session configuration
/// In debug builds: loads a .env file first, then reads environment variables
/// In release builds: reads environment variables only
#[derive(Clone, Debug)]
pub struct Config {
    /// Render target type used for the whole process
    pub surface_kind: SurfaceKind,
    /// Initial download behaviour while paused
    pub stream_request_mode: StreamRequestMode,
    /// Whether bitrate switches are smooth (true) or designated (false)
    pub smooth_bitrate_switch: bool,
    /// Where resume positions are persisted (None: ~/.playsession/progress.json)
    pub progress_store_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            surface_kind: SurfaceKind::SurfaceView,
            stream_request_mode: StreamRequestMode::KeepDownloading,
            smooth_bitrate_switch: true,
            progress_store_path: None,
        }
    }
}

impl Config {
    /// Load configuration based on build mode
    pub fn load() -> Self {
        #[cfg(debug_assertions)]
        {
            if dotenvy::dotenv().is_ok() {
                info!("Config: Dev mode activated - loaded .env file");
            } else {
                info!("Config: No .env file found, using environment only");
            }
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from a key lookup (environment in production)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let surface_kind = match lookup("PLAYSESSION_SURFACE_KIND") {
            Some(value) => match value.to_lowercase().as_str() {
                "surface" => SurfaceKind::SurfaceView,
                "texture" => SurfaceKind::TextureView,
                other => {
                    warn!("Config: Unknown surface kind '{}', using surface", other);
                    SurfaceKind::SurfaceView
                }
            },
            None => defaults.surface_kind,
        };

        let stream_request_mode = if lookup("PLAYSESSION_STOP_DOWNLOAD_ON_PAUSE")
            .map(|v| parse_flag(&v))
            .unwrap_or(false)
        {
            StreamRequestMode::StopOnPause
        } else {
            StreamRequestMode::KeepDownloading
        };

        let smooth_bitrate_switch = lookup("PLAYSESSION_SMOOTH_BITRATE_SWITCH")
            .map(|v| parse_flag(&v))
            .unwrap_or(defaults.smooth_bitrate_switch);

        let progress_store_path = lookup("PLAYSESSION_PROGRESS_PATH").map(PathBuf::from);

        info!(
            "Config: surface={:?} stream_mode={:?} smooth_bitrate={}",
            surface_kind, stream_request_mode, smooth_bitrate_switch
        );

        Self {
            surface_kind,
            stream_request_mode,
            smooth_bitrate_switch,
            progress_store_path,
        }
    }

    /// Get the resume-position store path
    pub fn get_progress_store_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.progress_store_path {
            return Some(path.clone());
        }

        dirs::home_dir().map(|home| home.join(".playsession").join("progress.json"))
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = Config::from_lookup(|_| None);

        assert_eq!(config.surface_kind, SurfaceKind::SurfaceView);
        assert_eq!(config.stream_request_mode, StreamRequestMode::KeepDownloading);
        assert!(config.smooth_bitrate_switch);
        assert!(config.progress_store_path.is_none());
    }

    #[test]
    fn reads_all_keys() {
        let config = Config::from_lookup(lookup_from(&[
            ("PLAYSESSION_SURFACE_KIND", "Texture"),
            ("PLAYSESSION_STOP_DOWNLOAD_ON_PAUSE", "1"),
            ("PLAYSESSION_SMOOTH_BITRATE_SWITCH", "false"),
            ("PLAYSESSION_PROGRESS_PATH", "/tmp/progress.json"),
        ]));

        assert_eq!(config.surface_kind, SurfaceKind::TextureView);
        assert_eq!(config.stream_request_mode, StreamRequestMode::StopOnPause);
        assert!(!config.smooth_bitrate_switch);
        assert_eq!(
            config.get_progress_store_path(),
            Some(PathBuf::from("/tmp/progress.json"))
        );
    }

    #[test]
    fn unknown_surface_kind_falls_back() {
        let config = Config::from_lookup(lookup_from(&[("PLAYSESSION_SURFACE_KIND", "canvas")]));
        assert_eq!(config.surface_kind, SurfaceKind::SurfaceView);
    }
}

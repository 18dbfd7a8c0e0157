use directories::ProjectDirs;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const DEFAULT_LOCAL_PORT: u16 = 14617;
const DEFAULT_SAMPLE_RATE: u32 = 48_000;
const DEFAULT_CHANNELS: u16 = 1;
const DEFAULT_BITRATE: u32 = 128_000;
const DEFAULT_SEGMENT_LENGTH_MS: u64 = 30_000;

/// Engine-wide configuration, mirroring `start(options)` from §6.1 plus the
/// ambient knobs (local command-surface port, base recordings directory)
/// that don't belong in a single `start()` call.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EngineConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,
    #[serde(default)]
    pub keep_duration_ms: Option<u64>,
    #[serde(default = "default_segment_length_ms")]
    pub segment_length_ms: u64,
    #[serde(default = "default_true")]
    pub continuous: bool,
    #[serde(default = "default_true")]
    pub pre_merge: bool,
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
    #[serde(default = "default_local_port")]
    pub local_port: u16,
    #[serde(default)]
    pub input_device_name: Option<String>,
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}
fn default_channels() -> u16 {
    DEFAULT_CHANNELS
}
fn default_bitrate() -> u32 {
    DEFAULT_BITRATE
}
fn default_segment_length_ms() -> u64 {
    DEFAULT_SEGMENT_LENGTH_MS
}
fn default_local_port() -> u16 {
    DEFAULT_LOCAL_PORT
}
fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            bitrate: DEFAULT_BITRATE,
            keep_duration_ms: None,
            segment_length_ms: DEFAULT_SEGMENT_LENGTH_MS,
            continuous: true,
            pre_merge: true,
            base_dir: None,
            local_port: DEFAULT_LOCAL_PORT,
            input_device_name: None,
        }
    }
}

impl EngineConfig {
    /// Directory holding `AudioSegments/` and the continuous/final files,
    /// defaulting to the process's app-data directory when unset.
    pub fn resolved_base_dir(&self) -> PathBuf {
        self.base_dir
            .clone()
            .unwrap_or_else(Self::default_app_data_dir)
    }

    pub fn segments_dir(&self) -> PathBuf {
        self.resolved_base_dir().join("AudioSegments")
    }

    fn default_app_data_dir() -> PathBuf {
        if let Some(proj_dirs) = ProjectDirs::from("com", "Valtora", "RollingCaptureEngine") {
            return proj_dirs.data_dir().to_path_buf();
        }
        PathBuf::from(".")
    }

    fn config_path() -> PathBuf {
        let name = "config.json";

        // Dev override: current working directory.
        let cwd_path = PathBuf::from(name);
        if cwd_path.exists() {
            info!("Found config in current directory (dev override)");
            return cwd_path;
        }

        Self::default_app_data_dir().join(name)
    }

    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &PathBuf) -> Self {
        info!("Loading engine config from: {:?}", path);

        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str::<EngineConfig>(&content) {
                    Ok(cfg) => cfg,
                    Err(e) => {
                        log::warn!("Failed to parse config.json ({e}), using defaults");
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read config.json ({e}), using defaults");
                    Self::default()
                }
            }
        } else {
            let default_config = Self::default();
            if let Some(parent) = path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            if let Err(e) = default_config.save_to(path) {
                log::warn!("Failed to write default config.json: {e}");
            }
            default_config
        }
    }

    fn save_to(&self, path: &PathBuf) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }

    pub fn save(&self) -> std::io::Result<()> {
        self.save_to(&Self::config_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_start_option_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.sample_rate, 48_000);
        assert_eq!(cfg.channels, 1);
        assert_eq!(cfg.bitrate, 128_000);
        assert_eq!(cfg.segment_length_ms, 30_000);
        assert!(cfg.continuous);
        assert!(cfg.pre_merge);
        assert_eq!(cfg.keep_duration_ms, None);
    }

    #[test]
    fn round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut cfg = EngineConfig::default();
        cfg.keep_duration_ms = Some(60_000);
        cfg.base_dir = Some(dir.path().to_path_buf());
        cfg.save_to(&path).unwrap();

        let loaded = EngineConfig::load_from(&path);
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn missing_file_falls_back_to_defaults_and_writes_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        assert!(!path.exists());

        let loaded = EngineConfig::load_from(&path);
        assert_eq!(loaded, EngineConfig::default());
        assert!(path.exists());
    }
}

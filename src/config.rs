//! Server configuration: layered defaults → YAML file → environment,
//! following the teacher's `ConfigManager` (figment-based) pattern.

use std::path::Path;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};

/// One of the six framing regimes a connection can be pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FramingMode {
    Auto,
    Raw,
    LengthField,
    JsonObject,
    Line,
    ModbusRtu,
}

impl Default for FramingMode {
    fn default() -> Self {
        FramingMode::Auto
    }
}

/// Top-level `tcp.*` configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    /// Listener port; 0 means an ephemeral port.
    #[serde(default)]
    pub port: u16,

    #[serde(default)]
    pub framing: FramingMode,

    /// Bounds every single frame and the JSON streaming accumulator.
    #[serde(default = "default_max_frame_length")]
    pub max_frame_length: usize,

    /// 0 disables the idle timeout.
    #[serde(default = "default_reader_idle_seconds")]
    pub reader_idle_seconds: u64,

    #[serde(default = "default_respond_enabled")]
    pub respond_enabled: bool,

    /// Byte budget `AutoDetector` consumes before defaulting to Modbus RTU.
    #[serde(default = "default_detect_window")]
    pub detect_window: usize,
}

fn default_max_frame_length() -> usize {
    1024 * 1024
}

fn default_reader_idle_seconds() -> u64 {
    60
}

fn default_respond_enabled() -> bool {
    true
}

fn default_detect_window() -> usize {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            framing: FramingMode::default(),
            max_frame_length: default_max_frame_length(),
            reader_idle_seconds: default_reader_idle_seconds(),
            respond_enabled: default_respond_enabled(),
            detect_window: default_detect_window(),
        }
    }
}

impl ServerConfig {
    /// Build configuration from defaults, an optional YAML file, and
    /// `FRAMESRV_TCP_*` environment variables, in that priority order.
    ///
    /// The YAML file and environment keys mirror the `tcp.*` names from
    /// spec.md §6 (`port`, `framing`, `max-frame-length`, ...) at the top
    /// level of the file; the `tcp.` prefix is the configuration
    /// *namespace*, not a literal nesting requirement.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(ServerConfig::default()));

        if let Some(path) = config_path {
            if path.exists() {
                figment = figment.merge(Yaml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed("FRAMESRV_TCP_").map(|key| {
            key.as_str().to_lowercase().replace('_', "-").into()
        }));

        figment
            .extract()
            .map_err(|e| FrameError::ConfigError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.framing, FramingMode::Auto);
        assert_eq!(cfg.max_frame_length, 1024 * 1024);
        assert_eq!(cfg.reader_idle_seconds, 60);
        assert!(cfg.respond_enabled);
        assert_eq!(cfg.detect_window, 64);
    }

    #[test]
    fn load_with_no_file_uses_defaults() {
        let cfg = ServerConfig::load(None).unwrap();
        assert_eq!(cfg.port, 0);
        assert!(cfg.respond_enabled);
    }

    #[test]
    fn load_from_yaml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("framesrv.yaml");
        std::fs::write(
            &path,
            "port: 7000\nframing: modbus-rtu\nmax-frame-length: 2048\n",
        )
        .unwrap();

        let cfg = ServerConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.framing, FramingMode::ModbusRtu);
        assert_eq!(cfg.max_frame_length, 2048);
    }
}

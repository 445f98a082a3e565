//! TOML configuration for the `glowline` visualizer.
//!
//! ```toml
//! version = 1
//! after_glow = 0.1
//!
//! [window]
//! width = 1280
//! height = 720
//!
//! [timing]
//! step = "16ms"
//!
//! [[layers]]
//! name = "scene"
//! line_width = 2.0
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use glowpipe::{FrameParams, LayerParams, MAX_LAYERS};
use serde::de::{self, Deserializer};
use serde::Deserialize;

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AppConfig {
    pub version: u32,
    #[serde(default = "default_after_glow")]
    pub after_glow: f32,
    #[serde(default)]
    pub window: WindowSettings,
    #[serde(default)]
    pub timing: Timing,
    #[serde(default = "default_layers")]
    pub layers: Vec<LayerSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "glowline".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Timing {
    /// Simulation step of the fixed-step loop.
    #[serde(default = "default_step", deserialize_with = "deserialize_duration")]
    pub step: Duration,
    /// Updates allowed per drawn frame before the loop gives up catching up.
    #[serde(default = "default_max_updates")]
    pub max_updates_per_frame: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            step: default_step(),
            max_updates_per_frame: default_max_updates(),
        }
    }
}

/// One `[[layers]]` entry: the layer name plus its draw parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LayerSettings {
    pub name: String,
    #[serde(flatten)]
    pub params: LayerParams,
}

impl LayerSettings {
    pub fn new(name: impl Into<String>, params: LayerParams) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

fn default_after_glow() -> f32 {
    FrameParams::default().after_glow
}

fn default_step() -> Duration {
    Duration::from_secs_f64(1.0 / 60.0)
}

fn default_max_updates() -> u32 {
    240
}

fn default_layers() -> Vec<LayerSettings> {
    let params = LayerParams {
        line_width: 2.0,
        ..LayerParams::default()
    };
    ["hud", "scene", "backdrop"]
        .into_iter()
        .map(|name| LayerSettings::new(name, params))
        .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            after_glow: default_after_glow(),
            window: WindowSettings::default(),
            timing: Timing::default(),
            layers: default_layers(),
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected {CONFIG_VERSION}",
                self.version
            )));
        }

        if !self.after_glow.is_finite() || self.after_glow < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "after_glow must be a non-negative number, got {}",
                self.after_glow
            )));
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size must be positive, got {}x{}",
                self.window.width, self.window.height
            )));
        }

        if self.timing.step.is_zero() {
            return Err(ConfigError::Invalid("timing.step must be greater than zero".into()));
        }
        if self.timing.max_updates_per_frame == 0 {
            return Err(ConfigError::Invalid(
                "timing.max_updates_per_frame must be at least 1".into(),
            ));
        }

        if self.layers.is_empty() {
            return Err(ConfigError::Invalid("at least one layer is required".into()));
        }
        if self.layers.len() > MAX_LAYERS {
            return Err(ConfigError::Invalid(format!(
                "{} layers configured, at most {MAX_LAYERS} are supported",
                self.layers.len()
            )));
        }
        let mut names = BTreeSet::new();
        for layer in &self.layers {
            if layer.name.trim().is_empty() {
                return Err(ConfigError::Invalid("layer names must not be empty".into()));
            }
            if !names.insert(layer.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate layer '{}'",
                    layer.name
                )));
            }
            let params = &layer.params;
            if !(params.line_width.is_finite() && params.line_width >= 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "layer '{}': line_width must be a non-negative number",
                    layer.name
                )));
            }
            if !(params.zoom.is_finite() && params.zoom > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "layer '{}': zoom must be positive",
                    layer.name
                )));
            }
        }

        Ok(())
    }

    pub fn layer_names(&self) -> Vec<String> {
        self.layers.iter().map(|layer| layer.name.clone()).collect()
    }

    pub fn layer_params(&self) -> Vec<LayerParams> {
        self.layers.iter().map(|layer| layer.params).collect()
    }

    pub fn frame_params(&self) -> FrameParams {
        FrameParams {
            after_glow: self.after_glow,
            ..FrameParams::default()
        }
    }

    pub fn layer_mut(&mut self, name: &str) -> Option<&mut LayerSettings> {
        self.layers.iter_mut().find(|layer| layer.name == name)
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v.is_sign_negative() {
                return Err(E::custom("duration must be a finite non-negative number"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
version = 1
after_glow = 0.25

[window]
width = 800
height = 600
title = "demo"

[timing]
step = "10ms"

[[layers]]
name = "backdrop"
zoom = 0.5
jitter = 1.5

[[layers]]
name = "scene"
line_width = 3.0
bloom_strength = 2.0
"#;

    #[test]
    fn parse_sample() {
        let config = AppConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.after_glow, 0.25);
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.title, "demo");
        assert_eq!(config.timing.step, Duration::from_millis(10));
        assert_eq!(config.timing.max_updates_per_frame, 240);
        assert_eq!(config.layer_names(), vec!["backdrop", "scene"]);

        let params = config.layer_params();
        assert_eq!(params[0].zoom, 0.5);
        assert_eq!(params[0].jitter, 1.5);
        assert_eq!(params[0].line_width, LayerParams::default().line_width);
        assert_eq!(params[1].line_width, 3.0);
        assert_eq!(params[1].bloom_strength, 2.0);
        assert_eq!(params[1].bloom_radius, 0.5);
        assert_eq!(config.frame_params().after_glow, 0.25);
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = AppConfig::from_toml_str("version = 1").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.layer_names(), vec!["hud", "scene", "backdrop"]);
        assert!(config.layer_params().iter().all(|p| p.line_width == 2.0));
        assert!((config.timing.step.as_secs_f64() - 1.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn step_accepts_seconds() {
        let config = AppConfig::from_toml_str("version = 1\n[timing]\nstep = 0.5\n").unwrap();
        assert_eq!(config.timing.step, Duration::from_millis(500));
        let config = AppConfig::from_toml_str("version = 1\n[timing]\nstep = 2\n").unwrap();
        assert_eq!(config.timing.step, Duration::from_secs(2));
    }

    #[test]
    fn rejects_bad_durations() {
        let err = AppConfig::from_toml_str("version = 1\n[timing]\nstep = -1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        let err = AppConfig::from_toml_str("version = 1\n[timing]\nstep = \"soon\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        let err = AppConfig::from_toml_str("version = 1\n[timing]\nstep = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_version() {
        let err = AppConfig::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_bad_layer_sets() {
        let dup = "version = 1\n[[layers]]\nname = \"a\"\n[[layers]]\nname = \"a\"\n";
        assert!(matches!(
            AppConfig::from_toml_str(dup).unwrap_err(),
            ConfigError::Invalid(_)
        ));

        let blank = "version = 1\n[[layers]]\nname = \"\"\n";
        assert!(matches!(
            AppConfig::from_toml_str(blank).unwrap_err(),
            ConfigError::Invalid(_)
        ));

        let mut many = String::from("version = 1\n");
        for i in 0..=MAX_LAYERS {
            many.push_str(&format!("[[layers]]\nname = \"l{i}\"\n"));
        }
        assert!(matches!(
            AppConfig::from_toml_str(&many).unwrap_err(),
            ConfigError::Invalid(_)
        ));

        let negative = "version = 1\n[[layers]]\nname = \"a\"\nline_width = -1.0\n";
        assert!(matches!(
            AppConfig::from_toml_str(negative).unwrap_err(),
            ConfigError::Invalid(_)
        ));
    }

    #[test]
    fn rejects_bad_window_and_after_glow() {
        let err = AppConfig::from_toml_str("version = 1\n[window]\nwidth = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = AppConfig::from_toml_str("version = 1\nafter_glow = -0.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.layers.len(), 2);
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn layer_mut_edits_in_place() {
        let mut config = AppConfig::default();
        config.layer_mut("scene").unwrap().params.jitter = 4.0;
        assert_eq!(config.layer_params()[1].jitter, 4.0);
        assert!(config.layer_mut("missing").is_none());
    }
}

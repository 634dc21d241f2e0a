use facealbum_core::detector::DEFAULT_CONFIDENCE;
use facealbum_core::DEFAULT_MATCH_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Session configuration: optional TOML file, then `FACEALBUM_*` overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// SCRFD model file name inside `model_dir`.
    pub detector_model: String,
    /// ArcFace model file name inside `model_dir`.
    pub recognizer_model: String,
    /// Directory where preview thumbnails are written.
    pub preview_dir: PathBuf,
    /// Longest side of generated preview thumbnails, in pixels.
    pub thumbnail_size: u32,
    /// Euclidean distance below which two faces match.
    pub match_threshold: f32,
    /// Minimum SCRFD detection score.
    pub detect_confidence: f32,
    /// Wait for the model runtime instead of skipping photos added before it is ready.
    pub defer_until_ready: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: xdg_dir("XDG_DATA_HOME", ".local/share").join("facealbum/models"),
            detector_model: "det_10g.onnx".to_string(),
            recognizer_model: "w600k_r50.onnx".to_string(),
            preview_dir: xdg_dir("XDG_CACHE_HOME", ".cache").join("facealbum/previews"),
            thumbnail_size: 256,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            detect_confidence: DEFAULT_CONFIDENCE,
            defer_until_ready: false,
        }
    }
}

impl Config {
    /// Load from `FACEALBUM_CONFIG` (if set) and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("FACEALBUM_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `FACEALBUM_*` overrides from `lookup`. Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FACEALBUM_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEALBUM_PREVIEW_DIR") {
            self.preview_dir = PathBuf::from(v);
        }
        parse_into(&lookup, "FACEALBUM_THUMBNAIL_SIZE", &mut self.thumbnail_size);
        parse_into(&lookup, "FACEALBUM_MATCH_THRESHOLD", &mut self.match_threshold);
        parse_into(&lookup, "FACEALBUM_DETECT_CONFIDENCE", &mut self.detect_confidence);
        if let Some(v) = lookup("FACEALBUM_DEFER_UNTIL_READY") {
            self.defer_until_ready = v != "0";
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.detector_model)
    }

    /// Path to the ArcFace recognition model.
    pub fn recognizer_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.recognizer_model)
    }
}

fn xdg_dir(var: &str, fallback: &str) -> PathBuf {
    std::env::var(var).map(PathBuf::from).unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home).join(fallback)
    })
}

fn parse_into<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    match lookup(key).map(|v| v.parse::<T>()) {
        Some(Ok(value)) => *slot = value,
        Some(Err(_)) => tracing::warn!(key, "ignoring unparseable config override"),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.match_threshold, 0.5);
        assert_eq!(config.detect_confidence, 0.5);
        assert!(!config.defer_until_ready);
        assert!(config.detector_model_path().ends_with("facealbum/models/det_10g.onnx"));
        assert!(config.recognizer_model_path().ends_with("w600k_r50.onnx"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            model_dir = "/opt/models"
            match_threshold = 0.45
            "#,
        )
        .unwrap();
        assert_eq!(config.model_dir, PathBuf::from("/opt/models"));
        assert_eq!(config.match_threshold, 0.45);
        assert_eq!(config.thumbnail_size, 256);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            Config::from_toml_str("match_threshold = \"high\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("FACEALBUM_MATCH_THRESHOLD", "0.6"),
            ("FACEALBUM_THUMBNAIL_SIZE", "not-a-number"),
            ("FACEALBUM_DEFER_UNTIL_READY", "1"),
            ("FACEALBUM_PREVIEW_DIR", "/tmp/previews"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.match_threshold, 0.6);
        assert_eq!(config.thumbnail_size, 256);
        assert!(config.defer_until_ready);
        assert_eq!(config.preview_dir, PathBuf::from("/tmp/previews"));
    }
}

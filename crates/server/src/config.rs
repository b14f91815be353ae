use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use recognition_core::detection::domain::detector_kind::DetectorKind;
use recognition_core::detection::domain::object_detector::DetectOptions;
use recognition_core::detection::infrastructure::detector_registry::ModelSettings;
use recognition_core::shared::constants::{DEFAULT_MAX_FRAME_BYTES, DEFAULT_PORT};

/// Relays webcam frames to face/palm detectors over a WebSocket.
#[derive(Parser, Debug, Default)]
#[command(name = "recognition-relay")]
pub struct Cli {
    /// JSON settings file; command-line flags override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Interface to bind.
    #[arg(long)]
    pub host: Option<String>,

    /// HTTP/WebSocket port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory of static client assets.
    #[arg(long)]
    pub public_dir: Option<PathBuf>,

    /// Directory searched for model files before the user cache.
    #[arg(long)]
    pub models_dir: Option<PathBuf>,

    /// Face model file name.
    #[arg(long)]
    pub face_model: Option<String>,

    /// Palm model file name.
    #[arg(long)]
    pub palm_model: Option<String>,

    /// Download URL for the face model when it is not found locally.
    #[arg(long)]
    pub face_model_url: Option<String>,

    /// Download URL for the palm model when it is not found locally.
    #[arg(long)]
    pub palm_model_url: Option<String>,

    /// Detection confidence threshold (0.0-1.0).
    #[arg(long)]
    pub confidence: Option<f64>,

    /// Overlap above which duplicate boxes are dropped (0.0-1.0).
    #[arg(long)]
    pub iou_threshold: Option<f64>,

    /// Drop boxes smaller than this many pixels in either dimension.
    #[arg(long)]
    pub min_size: Option<u32>,

    /// Keep at most this many boxes per frame.
    #[arg(long)]
    pub max_results: Option<usize>,

    /// Largest accepted image blob in bytes.
    #[arg(long)]
    pub max_frame_bytes: Option<usize>,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub public_dir: PathBuf,
    pub max_frame_bytes: usize,
    pub detection: DetectOptions,
    pub models: ModelSettings,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            public_dir: PathBuf::from("public"),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            detection: DetectOptions::default(),
            models: ModelSettings::default(),
        }
    }
}

impl ServerSettings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults, then the settings file (if any), then flags.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let mut settings = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        settings.apply_overrides(cli);
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(dir) = &cli.public_dir {
            self.public_dir = dir.clone();
        }
        if let Some(dir) = &cli.models_dir {
            self.models.models_dir = Some(dir.clone());
        }
        if let Some(bytes) = cli.max_frame_bytes {
            self.max_frame_bytes = bytes;
        }
        if let Some(c) = cli.confidence {
            self.detection.confidence = c;
        }
        if let Some(iou) = cli.iou_threshold {
            self.detection.iou_threshold = iou;
        }
        if let Some(min) = cli.min_size {
            self.detection.min_size = min;
        }
        if cli.max_results.is_some() {
            self.detection.max_results = cli.max_results;
        }

        let per_kind = [
            (DetectorKind::Face, &cli.face_model, &cli.face_model_url),
            (DetectorKind::Palm, &cli.palm_model, &cli.palm_model_url),
        ];
        for (kind, file, url) in per_kind {
            let source = self.models.source_mut(kind);
            if file.is_some() {
                source.file = file.clone();
            }
            if url.is_some() {
                source.url = url.clone();
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detection.validate().map_err(ConfigError::Invalid)?;
        if self.max_frame_bytes == 0 {
            return Err(ConfigError::Invalid(
                "Max frame bytes must be greater than 0".into(),
            ));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("Host must not be empty".into()));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_settings(dir: &TempDir, json: &str) -> PathBuf {
        let path = dir.path().join("relay.json");
        fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let settings = ServerSettings::from_cli(&Cli::default()).unwrap();
        assert_eq!(settings.port, 3000);
        assert_eq!(settings.bind_addr(), "0.0.0.0:3000");
        assert_eq!(settings.public_dir, PathBuf::from("public"));
        assert_eq!(settings.max_frame_bytes, DEFAULT_MAX_FRAME_BYTES);
    }

    #[test]
    fn test_file_values_are_loaded() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(
            &dir,
            r#"{"port": 8080, "detection": {"min_size": 32}, "models": {"palm": {"file": "hand.onnx"}}}"#,
        );
        let cli = Cli {
            config: Some(path),
            ..Default::default()
        };
        let settings = ServerSettings::from_cli(&cli).unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.detection.min_size, 32);
        assert_eq!(settings.detection.confidence, 0.5);
        assert_eq!(settings.models.file_name(DetectorKind::Palm), "hand.onnx");
        assert_eq!(
            settings.models.file_name(DetectorKind::Face),
            "face_detection_short_range.onnx"
        );
    }

    #[test]
    fn test_flags_override_file() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(&dir, r#"{"port": 8080, "detection": {"confidence": 0.9}}"#);
        let cli = Cli {
            config: Some(path),
            port: Some(9000),
            confidence: Some(0.25),
            face_model_url: Some("https://models.invalid/face.onnx".into()),
            ..Default::default()
        };
        let settings = ServerSettings::from_cli(&cli).unwrap();
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.detection.confidence, 0.25);
        assert_eq!(
            settings.models.face.url.as_deref(),
            Some("https://models.invalid/face.onnx")
        );
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let cli = Cli {
            config: Some(PathBuf::from("/nonexistent/relay.json")),
            ..Default::default()
        };
        assert!(matches!(
            ServerSettings::from_cli(&cli),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(&dir, "{ port: nope");
        let cli = Cli {
            config: Some(path),
            ..Default::default()
        };
        assert!(matches!(
            ServerSettings::from_cli(&cli),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_out_of_range_confidence_rejected() {
        let cli = Cli {
            confidence: Some(1.5),
            ..Default::default()
        };
        let err = ServerSettings::from_cli(&cli).unwrap_err();
        assert!(err.to_string().contains("Confidence"));
    }

    #[test]
    fn test_zero_frame_limit_rejected() {
        let cli = Cli {
            max_frame_bytes: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            ServerSettings::from_cli(&cli),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::parse_from([
            "recognition-relay",
            "--port",
            "4000",
            "--max-results",
            "5",
            "--models-dir",
            "/opt/models",
        ]);
        assert_eq!(cli.port, Some(4000));
        assert_eq!(cli.max_results, Some(5));
        assert_eq!(cli.models_dir, Some(PathBuf::from("/opt/models")));
    }
}

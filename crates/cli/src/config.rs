use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use recognition_core::detection::domain::detector_kind::DetectorKind;
use recognition_core::shared::constants::{DEFAULT_REPAINT_DELAY_MS, MEDIA_RETRY_DELAY_MS};

use crate::recogniser::RecogniserOptions;

/// Headless client for the recognition relay: streams images from a
/// directory and renders the returned boxes.
#[derive(Parser, Debug)]
#[command(name = "recognition-client")]
pub struct Cli {
    /// Relay WebSocket endpoint.
    #[arg(long, default_value = "ws://127.0.0.1:3000/ws")]
    pub url: String,

    /// Directory of images to use as the camera feed.
    #[arg(long)]
    pub input_dir: PathBuf,

    /// Image file rewritten with each annotated frame. Logs boxes when omitted.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Initial detector: face or palm.
    #[arg(long, default_value = "face")]
    pub kind: DetectorKind,

    /// Repaint on a timer instead of only when a reply arrives.
    #[arg(long)]
    pub no_synchronise: bool,

    /// Repaint interval in milliseconds when not synchronised.
    #[arg(long, default_value_t = DEFAULT_REPAINT_DELAY_MS)]
    pub repaint_delay_ms: u64,

    /// Delay before retrying media acquisition, in milliseconds.
    #[arg(long, default_value_t = MEDIA_RETRY_DELAY_MS)]
    pub retry_delay_ms: u64,
}

impl Cli {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(format!("URL must start with ws:// or wss://, got '{}'", self.url));
        }
        if self.repaint_delay_ms == 0 {
            return Err("Repaint delay must be greater than 0".into());
        }
        Ok(())
    }

    pub fn recogniser_options(&self) -> RecogniserOptions {
        RecogniserOptions {
            synchronise: !self.no_synchronise,
            repaint_delay: Duration::from_millis(self.repaint_delay_ms),
            kind: self.kind,
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

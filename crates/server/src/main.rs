use std::process;
use std::sync::Arc;

use clap::Parser;

use recognition_core::detection::infrastructure::detector_registry::DetectorRegistry;
use recognition_core::imaging::image_blob_codec::ImageBlobDecoder;
use recognition_core::pipeline::recognise_frame_use_case::RecogniseFrameUseCase;
use recognition_server::config::{Cli, ServerSettings};
use recognition_server::session::SessionLimits;
use recognition_server::web::{self, AppState};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = ServerSettings::from_cli(&cli)?;

    // Model downloads use a blocking client, so load before the runtime starts.
    let registry = DetectorRegistry::load(&settings.models, &settings.detection);
    let available = registry.available_kinds();
    if available.is_empty() {
        log::warn!("No detectors available; every submission will be answered with an error");
    } else {
        let names: Vec<String> = available.iter().map(|k| k.to_string()).collect();
        log::info!("Detectors ready: {}", names.join(", "));
    }

    let use_case = RecogniseFrameUseCase::new(
        Box::new(ImageBlobDecoder::new()),
        registry,
        settings.detection,
    );
    let limits = SessionLimits {
        max_frame_bytes: settings.max_frame_bytes,
    };
    let state = Arc::new(AppState::new(use_case, limits));
    let app = web::router(state, Some(&settings.public_dir));

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(settings.bind_addr())
            .await
            .map_err(|e| format!("failed to bind {}: {e}", settings.bind_addr()))?;
        web::serve(listener, app).await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

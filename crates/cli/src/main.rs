mod capture;
mod config;
mod connection;
mod recogniser;
mod surface;

use std::process;

use clap::Parser;

use capture::DirectoryFrameSource;
use config::Cli;
use recogniser::ObjectsRecogniser;
use surface::{AnnotatedFileSurface, LogSurface};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    cli.validate()?;

    let source = DirectoryFrameSource::new(&cli.input_dir);
    let options = cli.recogniser_options();
    let runtime = tokio::runtime::Runtime::new()?;

    match &cli.output {
        Some(path) => {
            let recogniser = ObjectsRecogniser::new(source, AnnotatedFileSurface::new(path), options);
            runtime.block_on(connection::run(&cli.url, recogniser, cli.retry_delay()))
        }
        None => {
            let recogniser = ObjectsRecogniser::new(source, LogSurface::default(), options);
            runtime.block_on(connection::run(&cli.url, recogniser, cli.retry_delay()))
        }
    }
}

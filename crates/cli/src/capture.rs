use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use recognition_core::shared::constants::IMAGE_EXTENSIONS;
use recognition_core::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("input directory {0} does not exist")]
    MissingDirectory(PathBuf),
    #[error("failed to list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no images found in {0}")]
    NoImages(PathBuf),
    #[error("failed to read image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("media has not been acquired")]
    NotAcquired,
}

/// Where frames come from. Stands in for a webcam.
pub trait FrameSource: Send {
    /// Opens the source and returns its frame size.
    fn acquire(&mut self) -> Result<(u32, u32), CaptureError>;

    /// Grabs the current frame.
    fn next_frame(&mut self) -> Result<Frame, CaptureError>;
}

/// Cycles through the images of a directory in file-name order.
pub struct DirectoryFrameSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    sequence: u64,
}

impl DirectoryFrameSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
            cursor: 0,
            sequence: 0,
        }
    }
}

impl FrameSource for DirectoryFrameSource {
    fn acquire(&mut self) -> Result<(u32, u32), CaptureError> {
        if !self.dir.is_dir() {
            return Err(CaptureError::MissingDirectory(self.dir.clone()));
        }
        let files = list_images(&self.dir)?;
        let first = files
            .first()
            .ok_or_else(|| CaptureError::NoImages(self.dir.clone()))?;
        let probe = load_frame(first, 0)?;

        self.files = files;
        self.cursor = 0;
        log::info!(
            "Acquired {} image(s) from {} at {}x{}",
            self.files.len(),
            self.dir.display(),
            probe.width(),
            probe.height()
        );
        Ok((probe.width(), probe.height()))
    }

    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        if self.files.is_empty() {
            return Err(CaptureError::NotAcquired);
        }
        let path = &self.files[self.cursor];
        self.cursor = (self.cursor + 1) % self.files.len();
        let frame = load_frame(path, self.sequence)?;
        self.sequence += 1;
        Ok(frame)
    }
}

/// Keeps trying to acquire `source`, sleeping `delay` between attempts.
pub async fn acquire_with_retry<S: FrameSource + ?Sized>(source: &mut S, delay: Duration) -> (u32, u32) {
    loop {
        match source.acquire() {
            Ok(size) => return size,
            Err(e) => {
                log::error!("Failed to acquire media: {e}; retrying in {}ms", delay.as_millis());
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, CaptureError> {
    let entries = std::fs::read_dir(dir).map_err(|source| CaptureError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_image(path))
        .collect();
    files.sort();
    Ok(files)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn load_frame(path: &Path, sequence: u64) -> Result<Frame, CaptureError> {
    let rgb = image::open(path)
        .map_err(|source| CaptureError::Decode {
            path: path.to_path_buf(),
            source,
        })?
        .into_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(Frame::new(rgb.into_raw(), width, height, 3, sequence))
}

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

const CACHE_APP_DIR: &str = "RecognitionRelay";

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("could not determine cache directory")]
    NoCacheDir,
    #[error("failed to create cache directory {path}: {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("model {name} not found locally and no download URL configured")]
    NotFound { name: String },
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Called as bytes arrive: `(downloaded, total)`, `total` is 0 when the
/// server sends no Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Finds model files on disk, downloading into the cache when allowed.
///
/// Lookup order is the configured models directory, then the cache, then
/// the download URL. Downloads land in a `.part` file that is renamed into
/// place only once complete.
#[derive(Debug, Clone)]
pub struct ModelResolver {
    cache_dir: PathBuf,
    models_dir: Option<PathBuf>,
}

impl ModelResolver {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            models_dir: None,
        }
    }

    /// Resolver backed by the per-user cache directory.
    ///
    /// - macOS: `~/Library/Application Support/RecognitionRelay/models/`
    /// - Linux: `$XDG_CACHE_HOME/RecognitionRelay/models/`
    /// - Windows: `%LOCALAPPDATA%/RecognitionRelay/models/`
    pub fn user_cache() -> Result<Self, ModelResolveError> {
        Ok(Self::new(model_cache_dir()?))
    }

    pub fn with_models_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.models_dir = dir;
        self
    }

    pub fn resolve(
        &self,
        name: &str,
        url: Option<&str>,
        progress: Option<ProgressFn>,
    ) -> Result<PathBuf, ModelResolveError> {
        let candidates = self
            .models_dir
            .iter()
            .map(|dir| dir.join(name))
            .chain(std::iter::once(self.cache_dir.join(name)));
        for candidate in candidates {
            if candidate.is_file() {
                log::debug!("Using model {}", candidate.display());
                return Ok(candidate);
            }
        }

        let Some(url) = url else {
            return Err(ModelResolveError::NotFound {
                name: name.to_string(),
            });
        };
        fs::create_dir_all(&self.cache_dir).map_err(|source| ModelResolveError::CacheDir {
            path: self.cache_dir.clone(),
            source,
        })?;

        let dest = self.cache_dir.join(name);
        log::info!("Downloading {name} from {url}");
        download(url, &dest, progress)?;
        Ok(dest)
    }
}

pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    let base = dirs::data_dir();
    #[cfg(not(target_os = "macos"))]
    let base = dirs::cache_dir();

    base.map(|d| d.join(CACHE_APP_DIR).join("models"))
        .ok_or(ModelResolveError::NoCacheDir)
}

fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let part = dest.with_extension("part");
    let result = fetch_to(url, &part, progress)
        .and_then(|()| fs::rename(&part, dest).map_err(write_error(dest)));
    if result.is_err() {
        let _ = fs::remove_file(&part);
    }
    result
}

fn fetch_to(url: &str, part: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|source| ModelResolveError::Download {
            url: url.to_string(),
            source,
        })?;

    let file = fs::File::create(part).map_err(write_error(part))?;
    let mut writer = ProgressWriter {
        inner: io::BufWriter::new(file),
        written: 0,
        total: response.content_length().unwrap_or(0),
        progress,
    };
    io::copy(&mut response, &mut writer).map_err(write_error(part))?;
    writer.flush().map_err(write_error(part))?;
    Ok(())
}

fn write_error(path: &Path) -> impl FnOnce(io::Error) -> ModelResolveError {
    let path = path.to_path_buf();
    move |source| ModelResolveError::Write { path, source }
}

/// Counts bytes on their way to disk and reports them.
struct ProgressWriter<W> {
    inner: W,
    written: u64,
    total: u64,
    progress: Option<ProgressFn>,
}

impl<W: Write> Write for ProgressWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        if let Some(report) = &self.progress {
            report(self.written, self.total);
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

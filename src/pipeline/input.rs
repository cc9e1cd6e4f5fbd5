//! Source resolution: a path or an http(s) URL → a local PDF file.
//!
//! pdfium opens documents from the file system, so remote sources are
//! fetched into a [`TempDir`] that lives as long as the [`PdfSource`]. Both
//! paths check the `%PDF` signature up front.

use crate::error::Pdf2XlsxError;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A PDF available on the local file system.
#[derive(Debug)]
pub enum PdfSource {
    Local(PathBuf),
    /// Downloaded copy; deleted when this value is dropped.
    Fetched { path: PathBuf, _dir: TempDir },
}

impl PdfSource {
    pub fn path(&self) -> &Path {
        match self {
            PdfSource::Local(path) | PdfSource::Fetched { path, .. } => path,
        }
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve `input` to a local, signature-checked PDF.
pub async fn resolve_source(input: &str, download_timeout_secs: u64) -> Result<PdfSource, Pdf2XlsxError> {
    if is_url(input) {
        fetch(input, download_timeout_secs).await
    } else {
        open_local(Path::new(input))
    }
}

fn open_local(path: &Path) -> Result<PdfSource, Pdf2XlsxError> {
    let mut file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2XlsxError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => {
            return Err(Pdf2XlsxError::FileNotFound {
                path: path.to_path_buf(),
            })
        }
    };
    if path.is_dir() {
        return Err(Pdf2XlsxError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut head = Vec::with_capacity(4);
    file.by_ref()
        .take(4)
        .read_to_end(&mut head)
        .map_err(|e| Pdf2XlsxError::CorruptPdf {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
    check_magic(path, &head)?;

    debug!("Using local PDF {}", path.display());
    Ok(PdfSource::Local(path.to_path_buf()))
}

/// Reject anything that does not start with `%PDF`.
fn check_magic(path: &Path, head: &[u8]) -> Result<(), Pdf2XlsxError> {
    if head.starts_with(PDF_MAGIC) {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = head.len().min(4);
    magic[..n].copy_from_slice(&head[..n]);
    Err(Pdf2XlsxError::NotAPdf {
        path: path.to_path_buf(),
        magic,
    })
}

async fn fetch(url: &str, timeout_secs: u64) -> Result<PdfSource, Pdf2XlsxError> {
    info!("Fetching {}", url);
    let failed = |reason: String| Pdf2XlsxError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Pdf2XlsxError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(failed(format!("HTTP {status}")));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;

    let dir = TempDir::new().map_err(|e| Pdf2XlsxError::Internal(format!("tempdir: {e}")))?;
    let path = dir.path().join(file_name_from_url(url));
    check_magic(&path, &bytes)?;

    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| Pdf2XlsxError::Internal(format!("temp file write: {e}")))?;

    info!("Fetched {} bytes → {}", bytes.len(), path.display());
    Ok(PdfSource::Fetched { path, _dir: dir })
}

/// Last path segment of `url` when it looks like a file name.
fn file_name_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|last| last.contains('.'))
        .unwrap_or_else(|| "document.pdf".to_string())
}

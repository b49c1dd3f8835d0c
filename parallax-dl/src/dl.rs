//! HTTP fetch with atomic writes and a skip-if-present cache.

use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Download errors.
#[derive(Debug, Error)]
pub enum DlError {
    /// URL has no usable file name component
    #[error("cannot derive a file name from url: {0}")]
    BadUrl(String),

    /// HTTP request failed
    #[error(transparent)]
    Http(#[from] Box<ureq::Error>),

    /// Filesystem error while writing the fetched file
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Default download directory: the platform download dir under a
/// `parallax` subdirectory, falling back to the temp dir.
pub fn default_dir() -> PathBuf {
    dirs::download_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("parallax")
}

/// File name component of a URL, with any query string stripped.
///
/// The URL must carry a path after its authority; a bare host has no file
/// name to derive.
pub fn file_name_from_url(url: &str) -> Result<&str, DlError> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let rest = path.split_once("://").map_or(path, |(_, rest)| rest);

    let name = match rest.split_once('/') {
        Some((_, tail)) => tail.rsplit('/').next().unwrap_or(""),
        None => return Err(DlError::BadUrl(url.to_string())),
    };

    if name.is_empty() || name.contains(':') {
        return Err(DlError::BadUrl(url.to_string()));
    }
    Ok(name)
}

/// Fetch a URL into `dir`, returning the local path.
///
/// A file that already exists is returned untouched, so callers can fetch
/// unconditionally and stay offline once the cache is warm. The body is
/// written to a temp file and renamed into place.
pub fn fetch(url: &str, dir: &Path) -> Result<PathBuf, DlError> {
    let name = file_name_from_url(url)?;
    let target = dir.join(name);

    if target.exists() {
        tracing::debug!(name, "already present, skipping download");
        return Ok(target);
    }

    std::fs::create_dir_all(dir)?;

    tracing::info!(url, "downloading");
    let response = ureq::get(url).call().map_err(Box::new)?;

    let mut body = Vec::new();
    response.into_reader().read_to_end(&mut body)?;

    let tmp = target.with_extension("part");
    std::fs::write(&tmp, &body)?;
    std::fs::rename(&tmp, &target)?;

    tracing::info!(path = %target.display(), bytes = body.len(), "download complete");
    Ok(target)
}

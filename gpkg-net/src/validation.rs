// gpkg-net/src/validation.rs
use std::path::Path;

use gpkg_common::error::{GpkgError, Result};
use url::Url;

/// Validates a URL, ensuring it uses the HTTP or HTTPS scheme.
pub fn validate_url(url_str: &str) -> Result<Url> {
    let url = Url::parse(url_str)
        .map_err(|e| GpkgError::InvalidArgs(format!("Failed to parse URL '{url_str}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(GpkgError::InvalidArgs(format!(
            "Invalid URL scheme for '{url_str}': must be http or https, but got '{scheme}'"
        ))),
    }
}

/// True if `source` names a remote location rather than a local path.
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Checks that a saved download is gzip data before it is handed on.
pub fn verify_gzip(path: &Path) -> Result<()> {
    match infer::get_from_path(path)? {
        Some(kind) if kind.extension() == "gz" => {
            tracing::debug!("Content type verified: {} is gzip", path.display());
            Ok(())
        }
        Some(kind) => Err(GpkgError::InvalidArgs(format!(
            "{} is not a gzip archive (detected '{}')",
            path.display(),
            kind.extension()
        ))),
        None => Err(GpkgError::InvalidArgs(format!(
            "Could not determine content type for {}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_http_schemes_are_accepted() {
        assert!(validate_url("https://resources.itrsgroup.com/download/latest/").is_ok());
        assert!(validate_url("http://localhost:8080/x").is_ok());
        assert!(validate_url("ftp://example.com/x").is_err());
        assert!(validate_url("not a url").is_err());
    }

    #[test]
    fn gzip_magic_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let gz = dir.path().join("a.tar.gz");
        std::fs::write(&gz, [0x1f, 0x8b, 0x08, 0x00, 0, 0, 0, 0, 0, 3]).unwrap();
        assert!(verify_gzip(&gz).is_ok());

        let text = dir.path().join("b.tar.gz");
        std::fs::write(&text, b"<html>login</html>").unwrap();
        assert!(verify_gzip(&text).is_err());
    }
}

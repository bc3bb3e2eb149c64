//! Content sniffing for downloaded archives.
//!
//! The portal serves finished jobs without a file name or a trustworthy
//! `Content-Type`, so the type is taken from the leading bytes of the file and the
//! extension is the last path segment of the detected MIME type
//! (`application/gzip` -> `gzip`).

use std::path::Path;
use tokio::io::AsyncReadExt;

use super::error::TileError;

/// Bytes inspected at the start of a file; covers the tar magic at offset 257
const SNIFF_LEN: usize = 512;

const TAR_MAGIC_OFFSET: usize = 257;

const SIGNATURES: &[(&[u8], &str)] = &[
    (b"PK\x03\x04", "application/zip"),
    (b"PK\x05\x06", "application/zip"),
    (b"PK\x07\x08", "application/zip"),
    (b"\x1f\x8b", "application/gzip"),
    (b"BZh", "application/x-bzip2"),
    (b"7z\xbc\xaf\x27\x1c", "application/x-7z-compressed"),
    (b"\xfd7zXZ\x00", "application/x-xz"),
    (b"%PDF-", "application/pdf"),
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"II*\x00", "image/tiff"),
    (b"MM\x00*", "image/tiff"),
    (b"<?xml", "text/xml"),
];

/// Detected type of a staged download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub mime: String,
    pub extension: String,
}

/// MIME type of a file given its first bytes
pub fn detect_mime(header: &[u8]) -> &'static str {
    if header.is_empty() {
        return "application/x-empty";
    }

    if let Some(&(_, mime)) = SIGNATURES.iter().find(|(magic, _)| header.starts_with(magic)) {
        return mime;
    }

    if header.len() >= TAR_MAGIC_OFFSET + 5
        && &header[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + 5] == b"ustar"
    {
        return "application/x-tar";
    }

    match std::str::from_utf8(header) {
        Ok(text) => {
            let trimmed = text.trim_start();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                "application/json"
            } else if trimmed.starts_with('<') {
                "text/html"
            } else {
                "text/plain"
            }
        }
        Err(_) => "application/octet-stream",
    }
}

/// File extension for a MIME type: the segment after the last `/`
pub fn extension_for(mime: &str) -> Result<String, TileError> {
    let unusable = || TileError::Classification {
        mime: mime.to_string(),
    };

    let parsed: mime::Mime = mime.trim().parse().map_err(|_| unusable())?;
    match parsed.essence_str().rsplit_once('/') {
        Some((_, segment)) if !segment.is_empty() => Ok(segment.to_string()),
        _ => Err(unusable()),
    }
}

/// Classify a staged file by its content
pub async fn classify(path: &Path) -> Result<Classification, TileError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| TileError::storage(path, e))?;

    let mut header = Vec::with_capacity(SNIFF_LEN);
    (&mut file)
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut header)
        .await
        .map_err(|e| TileError::storage(path, e))?;

    let mime = detect_mime(&header);
    let extension = extension_for(mime)?;
    tracing::debug!(path = %path.display(), mime, extension = %extension, "Classified download");

    Ok(Classification {
        mime: mime.to_string(),
        extension,
    })
}

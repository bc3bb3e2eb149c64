//! Staging, renaming and unpacking of downloaded archives.
//!
//! Layout under the staging root, per job:
//!
//! ```text
//! {root}/{job}          raw download, before classification
//! {root}/{job}.{ext}    classified archive
//! {root}/{job}/         extracted tree (optional)
//! ```

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use flate2::read::GzDecoder;
use tracing::{debug, info};

use super::error::TileError;

/// Unpack strategy, chosen from the classified extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Gzip,
    Tar,
}

impl ArchiveFormat {
    pub fn from_extension(extension: &str) -> Result<Self, TileError> {
        match extension.to_ascii_lowercase().as_str() {
            "zip" | "x-zip-compressed" => Ok(ArchiveFormat::Zip),
            "gzip" | "x-gzip" | "gz" => Ok(ArchiveFormat::Gzip),
            "tar" | "x-tar" => Ok(ArchiveFormat::Tar),
            other => Err(TileError::UnsupportedFormat {
                extension: other.to_string(),
            }),
        }
    }
}

/// Files produced for one tile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedResult {
    pub archive_path: PathBuf,
    pub extracted_dir: Option<PathBuf>,
    /// Text of the product's payload file, when requested and present
    pub payload: Option<String>,
}

/// File-system safe form of a portal job id
pub fn file_stem(job_id: &str) -> String {
    let stem: String = job_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    match stem.trim_matches('.') {
        "" => "job".to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// Persist a download as `{root}/{job}` with no extension
pub async fn write_raw(root: &Path, job_id: &str, bytes: &[u8]) -> Result<PathBuf, TileError> {
    tokio::fs::create_dir_all(root)
        .await
        .map_err(|e| TileError::storage(root, e))?;

    let path = root.join(file_stem(job_id));
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| TileError::storage(&path, e))?;

    debug!(path = %path.display(), size = bytes.len(), "Download staged");
    Ok(path)
}

/// Rename the staged download to `{job}.{extension}` and optionally unpack it into `{job}/`.
///
/// Running this again for the same job and archive leaves the same files behind:
/// an existing extraction directory is replaced, not merged. If the returned future is
/// dropped mid-extraction (the tile was cancelled), unpacking stops at the next archive
/// entry and the partial directory is removed.
pub async fn materialize(
    staged: &Path,
    job_id: &str,
    extension: &str,
    extract: bool,
    payload_name: Option<&str>,
) -> Result<MaterializedResult, TileError> {
    let root = staged.parent().unwrap_or_else(|| Path::new("."));
    let stem = file_stem(job_id);
    let archive_path = root.join(format!("{}.{}", stem, extension));

    if staged != archive_path {
        tokio::fs::rename(staged, &archive_path)
            .await
            .map_err(|e| TileError::storage(staged, e))?;
    }

    if !extract {
        info!(archive = %archive_path.display(), "Archive stored");
        return Ok(MaterializedResult {
            archive_path,
            extracted_dir: None,
            payload: None,
        });
    }

    let format = ArchiveFormat::from_extension(extension)?;
    let target = root.join(&stem);
    let archive = archive_path.clone();
    let payload_name = payload_name.map(str::to_owned);
    let fallback_name = payload_name.as_deref().map(file_stem).unwrap_or(stem);

    let guard = CancelOnDrop::default();
    let cancelled = guard.flag();

    let (extracted_dir, payload) = tokio::task::spawn_blocking(move || {
        unpack(format, &archive, &target, &fallback_name, &cancelled)?;
        let payload = payload_name.and_then(|name| read_payload(&target, &name));
        Ok::<_, TileError>((target, payload))
    })
    .await
    .map_err(|e| TileError::Internal(format!("extraction task failed: {}", e)))??;
    drop(guard);

    info!(
        archive = %archive_path.display(),
        extracted = %extracted_dir.display(),
        "Archive extracted"
    );

    Ok(MaterializedResult {
        archive_path,
        extracted_dir: Some(extracted_dir),
        payload,
    })
}

/// Raises its flag when dropped, which is how an aborted tile reaches the blocking unpack
#[derive(Default)]
struct CancelOnDrop(Arc<AtomicBool>);

impl CancelOnDrop {
    fn flag(&self) -> Arc<AtomicBool> {
        self.0.clone()
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

fn invalid_archive(error: impl std::error::Error + Send + Sync + 'static) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, error)
}

fn check_cancelled(cancelled: &AtomicBool) -> io::Result<()> {
    if cancelled.load(Ordering::Relaxed) {
        return Err(io::Error::new(io::ErrorKind::Interrupted, "extraction cancelled"));
    }
    Ok(())
}

fn unpack(
    format: ArchiveFormat,
    archive: &Path,
    target: &Path,
    fallback_name: &str,
    cancelled: &AtomicBool,
) -> Result<(), TileError> {
    if target.exists() {
        std::fs::remove_dir_all(target).map_err(|e| TileError::storage(target, e))?;
    }
    std::fs::create_dir_all(target).map_err(|e| TileError::storage(target, e))?;

    let file = File::open(archive).map_err(|e| TileError::storage(archive, e))?;

    let result = match format {
        ArchiveFormat::Zip => unpack_zip(file, target, cancelled),
        ArchiveFormat::Tar => unpack_tar(file, target, cancelled),
        ArchiveFormat::Gzip => unpack_gzip(file, target, fallback_name, cancelled),
    };

    match result {
        Ok(()) => Ok(()),
        Err(_) if cancelled.load(Ordering::Relaxed) => {
            if let Err(e) = std::fs::remove_dir_all(target) {
                debug!(path = %target.display(), error = %e, "Partial extraction not removed");
            }
            Err(TileError::Cancelled)
        }
        Err(e) => Err(TileError::storage(archive, e)),
    }
}

fn unpack_zip(file: File, target: &Path, cancelled: &AtomicBool) -> io::Result<()> {
    let mut zip = zip::ZipArchive::new(file).map_err(invalid_archive)?;

    for index in 0..zip.len() {
        check_cancelled(cancelled)?;
        let mut entry = zip.by_index(index).map_err(invalid_archive)?;
        let Some(relative) = entry.enclosed_name() else {
            debug!(name = entry.name(), "Skipping zip entry outside the target");
            continue;
        };

        let path = target.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&path)?;
            continue;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        io::copy(&mut entry, &mut File::create(&path)?)?;
    }

    Ok(())
}

fn unpack_tar<R: Read>(reader: R, target: &Path, cancelled: &AtomicBool) -> io::Result<()> {
    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries()? {
        check_cancelled(cancelled)?;
        entry?.unpack_in(target)?;
    }
    Ok(())
}

/// A gzip stream is either a tarball or a single compressed file. The single file keeps
/// the name stored in the gzip header, else `fallback_name`.
fn unpack_gzip(file: File, target: &Path, fallback_name: &str, cancelled: &AtomicBool) -> io::Result<()> {
    let mut decoder = GzDecoder::new(file);
    let mut contents = Vec::new();
    decoder.read_to_end(&mut contents)?;
    check_cancelled(cancelled)?;

    if contents.len() > 262 && &contents[257..262] == b"ustar" {
        return unpack_tar(contents.as_slice(), target, cancelled);
    }

    let name = decoder
        .header()
        .and_then(|header| header.filename())
        .and_then(|raw| std::str::from_utf8(raw).ok())
        .and_then(|raw| Path::new(raw).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| fallback_name.to_string());

    std::fs::write(target.join(name), contents)
}

/// Find `name` anywhere below `dir` and read it as text. Absence is not an error.
fn read_payload(dir: &Path, name: &str) -> Option<String> {
    let path = find_file(dir, name)?;
    match std::fs::read(&path) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Payload not readable");
            None
        }
    }
}

fn find_file(dir: &Path, name: &str) -> Option<PathBuf> {
    let mut subdirs = Vec::new();

    for entry in std::fs::read_dir(dir).ok()?.flatten() {
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if entry.file_name() == name {
            return Some(path);
        }
    }

    subdirs.into_iter().find_map(|sub| find_file(&sub, name))
}

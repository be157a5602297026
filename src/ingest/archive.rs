//! CAP bundle unpacking.
//!
//! The archived feed delivers its payload as a tar.gz (occasionally a bare
//! tar) of CAP-XML files. Bundles are unpacked into a `TempDir` scratch
//! directory that is removed when the handle drops, so no archive contents
//! survive a sync on any path, success or failure.

use std::fs;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::model::FeedError;

/// Gzip magic bytes.
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// POSIX tar puts "ustar" at offset 257 of the first header block.
pub fn is_tar(bytes: &[u8]) -> bool {
    bytes.len() > 262 && bytes[257..262] == *b"ustar"
}

/// Unpacks a gzip'd or bare tar payload into a fresh scratch directory.
///
/// The returned `TempDir` owns the directory; hold it for as long as the
/// extracted files are needed.
pub fn unpack_to_scratch(bytes: &[u8]) -> Result<TempDir, FeedError> {
    let scratch =
        TempDir::new().map_err(|e| FeedError::Archive(format!("scratch dir: {}", e)))?;
    if is_gzip(bytes) {
        let mut archive = Archive::new(GzDecoder::new(bytes));
        archive
            .unpack(scratch.path())
            .map_err(|e| FeedError::Archive(format!("tar.gz unpack: {}", e)))?;
    } else if is_tar(bytes) {
        let mut archive = Archive::new(bytes);
        archive
            .unpack(scratch.path())
            .map_err(|e| FeedError::Archive(format!("tar unpack: {}", e)))?;
    } else {
        return Err(FeedError::Archive(
            "payload is neither gzip nor tar".to_string(),
        ));
    }
    Ok(scratch)
}

/// Collects the CAP files under `root`, in sorted path order so bulletin
/// order (and with it same-level tie-breaking) is deterministic per archive.
pub fn collect_cap_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some(ext) if ext.eq_ignore_ascii_case("xml") || ext.eq_ignore_ascii_case("cap")
            )
        })
        .collect();
    files.sort();
    files
}

/// Decodes bytes as UTF-8, falling back to Latin-1 (older AEMET bundles
/// ship ISO-8859-1). Latin-1 maps every byte to the same code point, so the
/// fallback never fails.
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Reads a CAP file as text with the charset fallback. Returns `None` when
/// the file cannot be read at all.
pub fn read_cap_file(path: &Path) -> Option<String> {
    let bytes = fs::read(path).ok()?;
    Some(decode_text(&bytes))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

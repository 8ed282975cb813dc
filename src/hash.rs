use std::fs;
use std::path::Path;

use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

use crate::error::{EngineError, EngineResult};

/// Digests a path on disk.
///
/// A regular file digests its bytes. A directory digests the concatenation
/// of its sorted immediate entry names, one per line — deliberately shallow:
/// subdirectory contents are not recursed into and no metadata (size, mtime,
/// mode) is read. This lets a rule depend on "the set of files in X" without
/// pulling in their contents, which is a design choice, not an omission.
///
/// Symlinks are followed. `Ok(None)` means the path does not exist (or is a
/// broken symlink) — callers turn that into `MissingSource` or treat it as
/// "never built" depending on context.
pub fn digest_path(path: &Path) -> EngineResult<Option<String>> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(_) => match fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(path, e)),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(path, e)),
    };

    if metadata.is_dir() {
        digest_dir(path).map(Some)
    } else {
        digest_file(path).map(Some)
    }
}

fn digest_file(path: &Path) -> EngineResult<String> {
    let bytes = fs::read(path).map_err(|e| io_err(path, e))?;
    Ok(hex_sha256(&bytes))
}

fn digest_dir(path: &Path) -> EngineResult<String> {
    let mut names: Vec<String> = fs::read_dir(path)
        .map_err(|e| io_err(path, e))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    let listing = names.join("\n");
    Ok(hex_sha256(listing.as_bytes()))
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Stable digest of a JSON-shaped value.
///
/// `serde_json::Value` keeps object keys in a `BTreeMap` (this crate does
/// not enable the `preserve_order` feature), so serializing to a string
/// already yields canonical key ordering with no insignificant whitespace —
/// semantically equal JSON always serializes identically, so it always
/// digests identically.
pub fn digest_json(value: &JsonValue) -> String {
    // `to_string` on a `Value` cannot fail.
    let canonical = serde_json::to_string(value).expect("Value serialization is infallible");
    hex_sha256(canonical.as_bytes())
}

fn io_err(path: &Path, source: std::io::Error) -> EngineError {
    EngineError::Io {
        path: path.to_path_buf(),
        source,
    }
}

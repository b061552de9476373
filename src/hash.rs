//! SHA-256 digests for change detection and manifest integrity.

use crate::error::SyncError;
use sha2::{Digest, Sha256};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Computes the SHA-256 of a byte slice as lowercase hex.
pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Computes the SHA-256 of a local file.
///
/// The file is read in chunks on a blocking thread so large files do not stall
/// the runtime. Returns `Ok(None)` when the file does not exist.
pub async fn digest_file(path: &Path) -> Result<Option<String>, SyncError> {
    let path: PathBuf = path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let file = match std::fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SyncError::IoError(e)),
        };
        let mut reader = io::BufReader::with_capacity(64 * 1024, file);
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 64 * 1024];

        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(Some(format!("{:x}", hasher.finalize())))
    })
    .await
    .map_err(|e| SyncError::IoError(io::Error::other(format!("Task join error: {}", e))))?
}

//! Link-or-copy placement of a single file.

use crate::error::SyncError;
use crate::hash::digest_bytes;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// One way of making `source` visible at `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStrategy {
    Symlink,
    HardLink,
    Copy,
}

impl LinkStrategy {
    /// Preferred order; copying always works and is a permanent fallback.
    pub const DEFAULT_ORDER: [LinkStrategy; 3] = [
        LinkStrategy::Symlink,
        LinkStrategy::HardLink,
        LinkStrategy::Copy,
    ];

    fn apply(self, source: &Path, target: &Path) -> io::Result<()> {
        match self {
            LinkStrategy::Symlink => symlink_file(source, target),
            LinkStrategy::HardLink => fs::hard_link(source, target),
            LinkStrategy::Copy => fs::copy(source, target).map(|_| ()),
        }
    }
}

#[cfg(unix)]
fn symlink_file(source: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(source, target)
}

#[cfg(windows)]
fn symlink_file(source: &Path, target: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(source, target)
}

#[cfg(not(any(unix, windows)))]
fn symlink_file(_source: &Path, _target: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symlinks are not supported on this platform",
    ))
}

/// Whether `target` already exposes the current content of `source`.
pub fn is_current(source: &Path, target: &Path) -> bool {
    let Ok(meta) = fs::symlink_metadata(target) else {
        return false;
    };
    if meta.file_type().is_symlink() {
        return fs::read_link(target).is_ok_and(|dest| dest == source);
    }
    match (fs::read(source), fs::read(target)) {
        (Ok(a), Ok(b)) => digest_bytes(&a) == digest_bytes(&b),
        _ => false,
    }
}

/// Places `source` at `target` with the first strategy that succeeds.
///
/// Any existing file or symlink at `target` is replaced.
pub fn link_or_copy(
    source: &Path,
    target: &Path,
    strategies: &[LinkStrategy],
) -> Result<LinkStrategy, SyncError> {
    place_with(source, target, strategies, LinkStrategy::apply)
}

fn place_with<F>(
    source: &Path,
    target: &Path,
    strategies: &[LinkStrategy],
    mut apply: F,
) -> Result<LinkStrategy, SyncError>
where
    F: FnMut(LinkStrategy, &Path, &Path) -> io::Result<()>,
{
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut last_error = io::Error::new(io::ErrorKind::InvalidInput, "no link strategy given");
    for &strategy in strategies {
        if fs::symlink_metadata(target).is_ok() {
            fs::remove_file(target)?;
        }
        match apply(strategy, source, target) {
            Ok(()) => return Ok(strategy),
            Err(e) => {
                debug!("{:?} of {:?} -> {:?} failed: {}", strategy, source, target, e);
                last_error = e;
            }
        }
    }
    Err(SyncError::IoError(last_error))
}

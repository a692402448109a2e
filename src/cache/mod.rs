//! Caches: parsed documents, resolver output, transform outputs and the
//! committed dependency snapshot.
//!
//! Filesystem-backed stores share two contracts: writes are write-temp plus
//! rename so readers never observe a torn file, and a corrupt or
//! version-mismatched entry is treated as a miss, never as an error.

pub mod dependency;
pub mod document;
pub mod token;
pub mod transform;

use std::{fmt, io, path::Path};

use serde::{Deserialize, Serialize};

/// How the transformation executor satisfied one (snapshot, transform)
/// pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// Output came from the transform cache.
    Hit,
    /// Output was computed and stored.
    Miss,
    /// The transform's selector did not match the snapshot.
    Skip,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::Skip => "skip",
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Atomically replace `path` with `bytes`: write to a temp file in the same
/// directory, then rename over the target.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::other(format!("`{}` has no parent", path.display())))?;
    std::fs::create_dir_all(parent)?;
    let mut file = tempfile::NamedTempFile::new_in(parent)?;
    io::Write::write_all(&mut file, bytes)?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

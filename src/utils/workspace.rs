//! Worker scratch directories
//!
//! Each chunk writes only below its own directory, named after the chunk
//! index, so no two workers ever share a path. Directories are removed only
//! after a successful merge; failed or cancelled chunks keep theirs for
//! inspection.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct ChunkScratch {
    root: PathBuf,
}

pub fn chunk_dir(scratch_root: &Path, chunk: usize) -> PathBuf {
    scratch_root.join(format!("chunk_{:04}", chunk))
}

impl ChunkScratch {
    /// Create a clean scratch directory for a chunk, discarding stale
    /// contents left by an earlier run
    pub fn create(scratch_root: &Path, chunk: usize) -> io::Result<Self> {
        let root = chunk_dir(scratch_root, chunk);
        if root.is_dir() {
            fs::remove_dir_all(&root)?;
        }
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Path of a partial file for one partition directory
    pub fn partial_path(&self, partition: &str, file_name: &str) -> PathBuf {
        self.root.join(partition).join(file_name)
    }
}

/// Remove a directory if nothing is left in it
pub fn remove_if_empty(dir: &Path) -> io::Result<bool> {
    if dir.is_dir() && fs::read_dir(dir)?.next().is_none() {
        fs::remove_dir(dir)?;
        return Ok(true);
    }
    Ok(false)
}

//! Merge of worker partials into the final partition tree
//!
//! Partials are concatenated in chunk order, so the final files list records
//! in identifier order no matter how many workers produced them. The
//! directories of each merge are recorded in a manifest under the output
//! root; the next merge removes those it does not write again.

use crate::core::layout::{hits_file_name, sequences_file_name, PartitionLayout, MANIFEST_FILE};
use crate::core::worker::WorkerResult;
use crate::utils::workspace::{chunk_dir, remove_if_empty};
use crate::{MashtError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSummary {
    pub dir: String,
    /// Term label; `None` for the unassigned partition
    pub label: Option<String>,
    pub files: Vec<String>,
    pub bytes: u64,
}

pub struct Aggregator<'a> {
    layout: &'a PartitionLayout,
    source_names: &'a [String],
    scratch_root: &'a Path,
    output_root: &'a Path,
}

impl<'a> Aggregator<'a> {
    pub fn new(
        layout: &'a PartitionLayout,
        source_names: &'a [String],
        scratch_root: &'a Path,
        output_root: &'a Path,
    ) -> Self {
        Self {
            layout,
            source_names,
            scratch_root,
            output_root,
        }
    }

    /// Merge the partials of every completed chunk.
    ///
    /// Failed or cancelled chunks are ignored here; their scratch directories
    /// stay on disk. Scratch of merged chunks is removed once every partition
    /// has been written.
    pub fn merge(&self, results: &[WorkerResult]) -> Result<Vec<PartitionSummary>> {
        let mut chunks: Vec<usize> = results
            .iter()
            .filter(|r| r.is_success())
            .map(|r| r.chunk.index)
            .collect();
        chunks.sort_unstable();

        let dirs: BTreeSet<&str> = results
            .iter()
            .filter(|r| r.is_success())
            .flat_map(|r| r.partitions.iter().map(String::as_str))
            .collect();

        fs::create_dir_all(self.output_root).map_err(|e| MashtError::Aggregation {
            partition: self.output_root.display().to_string(),
            reason: e.to_string(),
        })?;

        self.prune_previous(&dirs)?;

        let summaries = dirs
            .par_iter()
            .map(|&dir| {
                self.merge_partition(dir, &chunks)
                    .map_err(|e| MashtError::Aggregation {
                        partition: dir.to_string(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        self.write_manifest(&dirs)
            .map_err(|e| MashtError::Aggregation {
                partition: MANIFEST_FILE.to_string(),
                reason: e.to_string(),
            })?;
        info!(
            "Merged {} chunks into {} partitions under {:?}",
            chunks.len(),
            summaries.len(),
            self.output_root
        );

        self.cleanup(&chunks);
        Ok(summaries)
    }

    /// Remove partition directories of the previous merge that this one does not write
    fn prune_previous(&self, dirs: &BTreeSet<&str>) -> Result<()> {
        let manifest = self.output_root.join(MANIFEST_FILE);
        let previous: Vec<String> = match fs::read_to_string(&manifest) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(previous) => previous,
                Err(e) => {
                    warn!("Ignoring unreadable partition manifest {:?}: {}", manifest, e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(MashtError::Aggregation {
                    partition: MANIFEST_FILE.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        for dir in previous {
            if dirs.contains(dir.as_str()) || Path::new(&dir).components().count() != 1 {
                continue;
            }
            let stale = self.output_root.join(&dir);
            if stale.is_dir() {
                debug!("Removing partition {:?} from the previous run", stale);
                fs::remove_dir_all(&stale).map_err(|e| MashtError::Aggregation {
                    partition: dir.clone(),
                    reason: e.to_string(),
                })?;
            }
        }
        Ok(())
    }

    fn write_manifest(&self, dirs: &BTreeSet<&str>) -> io::Result<()> {
        let manifest = self.output_root.join(MANIFEST_FILE);
        if dirs.is_empty() {
            if manifest.exists() {
                fs::remove_file(&manifest)?;
            }
            return Ok(());
        }
        let contents = serde_json::to_string_pretty(dirs).map_err(io::Error::other)?;
        fs::write(&manifest, contents)
    }

    fn merge_partition(&self, dir: &str, chunks: &[usize]) -> io::Result<PartitionSummary> {
        let target = self.output_root.join(dir);
        if target.exists() {
            debug!("Replacing existing partition {:?}", target);
            fs::remove_dir_all(&target)?;
        }
        fs::create_dir_all(&target)?;

        let mut files = Vec::new();
        let mut bytes = 0;
        for source in self.source_names {
            for name in [hits_file_name(source), sequences_file_name(source)] {
                let partials: Vec<PathBuf> = chunks
                    .iter()
                    .map(|&c| chunk_dir(self.scratch_root, c).join(dir).join(&name))
                    .filter(|p| p.is_file())
                    .collect();
                if partials.is_empty() {
                    continue;
                }

                let mut writer = BufWriter::new(File::create(target.join(&name))?);
                for partial in &partials {
                    bytes += io::copy(&mut File::open(partial)?, &mut writer)?;
                }
                writer.flush()?;
                files.push(name);
            }
        }

        Ok(PartitionSummary {
            dir: dir.to_string(),
            label: self.layout.label_for(dir).map(str::to_string),
            files,
            bytes,
        })
    }

    fn cleanup(&self, chunks: &[usize]) {
        for &chunk in chunks {
            let dir = chunk_dir(self.scratch_root, chunk);
            if let Err(e) = fs::remove_dir_all(&dir) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove scratch {:?}: {}", dir, e);
                }
            }
        }
        match remove_if_empty(self.scratch_root) {
            Ok(true) => debug!("Removed scratch root {:?}", self.scratch_root),
            Ok(false) => {}
            Err(e) => warn!("Failed to remove scratch root {:?}: {}", self.scratch_root, e),
        }
    }
}

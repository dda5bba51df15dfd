//! Run orchestration
//!
//! Sequences one partitioning run: load annotations, index sources, plan
//! chunks, dispatch them to a dedicated worker pool, collect results over a
//! channel and merge the successes into the final partition tree.

use crate::annotation::{AnnotationLoader, AnnotationMapping};
use crate::core::aggregator::{Aggregator, PartitionSummary};
use crate::core::config::Config;
use crate::core::index::{HitSource, SourceSet};
use crate::core::layout::{PartitionLayout, SUMMARY_FILE};
use crate::core::planner::plan_chunks;
use crate::core::worker::{run_chunk, ChunkStatus, WorkerContext, WorkerFailure, WorkerResult};
use crate::utils::parallel::build_worker_pool;
use crate::utils::progress::create_progress_bar;
use crate::{MashtError, Result};
use chrono::{DateTime, Utc};
use crossbeam::channel;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Input files of one run
#[derive(Debug, Clone, Default)]
pub struct PartitionRequest {
    pub hit_files: Vec<PathBuf>,
    pub sequence_files: Vec<PathBuf>,
    pub annotation_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    Complete,
    Degraded { failed: Vec<WorkerFailure> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub hits_processed: usize,
    pub hits_unassigned: usize,
    pub hits_filtered: usize,
    pub sequences_processed: usize,
    pub sequences_unassigned: usize,
    pub missing_sequences: usize,
    pub parse_errors: usize,
}

impl RunTotals {
    fn from_results(results: &[WorkerResult]) -> Self {
        results.iter().fold(Self::default(), |mut totals, r| {
            totals.hits_processed += r.hits_processed;
            totals.hits_unassigned += r.hits_unassigned;
            totals.hits_filtered += r.hits_filtered;
            totals.sequences_processed += r.sequences_processed;
            totals.sequences_unassigned += r.sequences_unassigned;
            totals.missing_sequences += r.missing_sequences;
            totals.parse_errors += r.parse_errors.len();
            totals
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub output_root: PathBuf,
    pub workers: usize,
    pub sources: Vec<String>,
    pub units: usize,
    pub chunks: usize,
    pub totals: RunTotals,
    pub partitions: Vec<PartitionSummary>,
    /// Per-chunk results, ordered by chunk index
    pub results: Vec<WorkerResult>,
}

impl RunReport {
    pub fn is_degraded(&self) -> bool {
        matches!(self.status, RunStatus::Degraded { .. })
    }

    pub fn write_summary(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

pub struct Orchestrator {
    config: Config,
    cancel: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Share an externally owned cancellation flag, e.g. one set by a signal handler
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load the annotation sources, pair inputs and run
    pub fn run(&self, request: &PartitionRequest) -> Result<RunReport> {
        let mapping =
            AnnotationLoader::new(self.config.annotation.clone()).load(&request.annotation_files)?;
        let sources = HitSource::pair_by_stem(&request.hit_files, &request.sequence_files)?;
        self.run_with_mapping(&mapping, sources)
    }

    /// Run over an already built mapping
    pub fn run_with_mapping(
        &self,
        mapping: &AnnotationMapping,
        sources: Vec<HitSource>,
    ) -> Result<RunReport> {
        let started_at = Utc::now();
        let started = Instant::now();
        let partition = &self.config.partition;
        let output_root = &self.config.output.output_root;
        let scratch_root = self.config.output.scratch_root();
        let workers = partition.effective_jobs();

        let pool = build_worker_pool(workers)
            .map_err(|e| MashtError::Config(format!("Failed to build worker pool: {}", e)))?;

        let source_set = pool.install(|| SourceSet::index(sources))?;
        let layout = PartitionLayout::from_labels(mapping.labels());
        let chunks = plan_chunks(source_set.len(), workers, partition.chunk_size);
        info!(
            "Partitioning {} identifiers from {} sources into {} labels with {} chunks on {} workers",
            source_set.len(),
            source_set.sources.len(),
            layout.len() - 1,
            chunks.len(),
            workers
        );

        let ctx = WorkerContext {
            mapping,
            layout: &layout,
            sources: &source_set,
            config: partition,
            scratch_root: &scratch_root,
            cancel: &self.cancel,
        };
        let progress =
            create_progress_bar(chunks.len() as u64, "Partitioning", self.config.output.progress);

        let (tx, rx) = channel::unbounded::<WorkerResult>();
        let mut results = Vec::with_capacity(chunks.len());
        pool.in_place_scope(|scope| {
            let ctx = &ctx;
            for chunk in &chunks {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let result = run_chunk(ctx, chunk);
                    // The receiver lives until every sender is gone.
                    let _ = tx.send(result);
                });
            }
            drop(tx);

            for result in rx.iter() {
                progress.inc(1);
                results.push(result);
            }
        });
        progress.finish_and_clear();
        results.sort_by_key(|r| r.chunk.index);

        let cancelled = results
            .iter()
            .filter(|r| r.status == ChunkStatus::Cancelled)
            .count();
        if cancelled > 0 {
            warn!(
                "Run cancelled; {} chunks stopped early, scratch left in {:?}",
                cancelled, scratch_root
            );
            return Err(MashtError::Cancelled);
        }

        for result in &results {
            if self.config.output.verbose {
                info!(
                    "Chunk {} [{}..{}): {} hits, {} sequences, {} ms",
                    result.chunk.index,
                    result.chunk.start,
                    result.chunk.end,
                    result.hits_processed,
                    result.sequences_processed,
                    result.elapsed_ms
                );
            }
            for error in &result.parse_errors {
                debug!("Skipped malformed record: {}", error);
            }
        }
        let failed: Vec<WorkerFailure> = results.iter().filter_map(WorkerResult::failure).collect();
        for failure in &failed {
            warn!(
                "Chunk {} [{}..{}) failed: {}",
                failure.chunk, failure.start, failure.end, failure.cause
            );
        }

        let source_names = source_set.source_names();
        let partitions = pool.install(|| {
            Aggregator::new(&layout, &source_names, &scratch_root, output_root).merge(&results)
        })?;

        let totals = RunTotals::from_results(&results);
        if totals.parse_errors > 0 {
            warn!("Skipped {} malformed records", totals.parse_errors);
        }
        let status = if failed.is_empty() {
            RunStatus::Complete
        } else {
            RunStatus::Degraded { failed }
        };

        let report = RunReport {
            status,
            started_at,
            elapsed_ms: started.elapsed().as_millis() as u64,
            output_root: output_root.clone(),
            workers,
            sources: source_names,
            units: source_set.len(),
            chunks: chunks.len(),
            totals,
            partitions,
            results,
        };

        if self.config.output.write_summary {
            let path = output_root.join(SUMMARY_FILE);
            report.write_summary(&path)?;
            debug!("Wrote run summary to {:?}", path);
        }

        info!(
            "Partitioned {} hits and {} sequences into {} partitions in {} ms",
            report.totals.hits_processed,
            report.totals.sequences_processed,
            report.partitions.len(),
            report.elapsed_ms
        );
        Ok(report)
    }
}

/// Remove a scratch root left behind by an earlier run
pub fn clear_scratch(scratch_root: &Path) -> Result<()> {
    if scratch_root.exists() {
        fs::remove_dir_all(scratch_root)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::OutputConfig;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    fn config(output_root: &Path, jobs: usize) -> Config {
        let mut config = Config::default();
        config.partition.n_jobs = jobs;
        config.output = OutputConfig {
            output_root: output_root.to_path_buf(),
            ..Default::default()
        };
        config
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = Config::default();
        config.partition.chunk_size = Some(0);
        assert!(matches!(Orchestrator::new(config), Err(MashtError::Config(_))));
    }

    #[test]
    fn test_empty_input_completes() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let orchestrator = Orchestrator::new(config(&out, 2)).unwrap();

        let report = orchestrator
            .run_with_mapping(&AnnotationMapping::new(), Vec::new())
            .unwrap();
        assert_eq!(report.status, RunStatus::Complete);
        assert_eq!(report.chunks, 0);
        assert!(report.partitions.is_empty());
        assert!(out.join(SUMMARY_FILE).exists());
    }

    #[test]
    fn test_cancelled_run_keeps_scratch() {
        let dir = TempDir::new().unwrap();
        let seqs = dir.path().join("s1.fasta");
        fs::write(&seqs, ">q1\nACGT\n>q2\nTTTT\n").unwrap();
        let out = dir.path().join("out");
        let orchestrator = Orchestrator::new(config(&out, 2)).unwrap();
        orchestrator.cancel_flag().store(true, Ordering::Relaxed);

        let sources = HitSource::pair_by_stem(&[], &[seqs]).unwrap();
        let err = orchestrator
            .run_with_mapping(&AnnotationMapping::new(), sources)
            .unwrap_err();
        assert!(matches!(err, MashtError::Cancelled));
        assert!(out.join(".masht_partials/chunk_0000").is_dir());
        assert!(!out.join("unassigned").exists());
        assert!(!out.join(SUMMARY_FILE).exists());
    }

    #[test]
    fn test_clear_scratch() {
        let dir = TempDir::new().unwrap();
        let scratch = dir.path().join(".masht_partials/chunk_0000");
        fs::create_dir_all(&scratch).unwrap();
        clear_scratch(&dir.path().join(".masht_partials")).unwrap();
        assert!(!dir.path().join(".masht_partials").exists());
    }
}

//! Chunk worker
//!
//! A worker routes every unit of its chunk into per-partition partial files
//! below its own scratch directory. It never returns an error: row problems
//! are recorded in the result, and anything that stops the chunk becomes a
//! `Failed` status.

use crate::annotation::AnnotationMapping;
use crate::bio::fasta::{self, parse_record};
use crate::bio::hits::{read_run, HitRecord, RecordError};
use crate::core::config::{HitSelection, MultiLabel, PartitionConfig, RoutingKey};
use crate::core::index::SourceSet;
use crate::core::layout::{hits_file_name, sequences_file_name, PartitionLayout};
use crate::core::planner::WorkChunk;
use crate::utils::workspace::ChunkScratch;
use anyhow::{Context, Result};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, warn};

/// Read-only state shared by every worker of a run
pub struct WorkerContext<'a> {
    pub mapping: &'a AnnotationMapping,
    pub layout: &'a PartitionLayout,
    pub sources: &'a SourceSet,
    pub config: &'a PartitionConfig,
    pub scratch_root: &'a Path,
    pub cancel: &'a AtomicBool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "cause", rename_all = "snake_case")]
pub enum ChunkStatus {
    Completed,
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub chunk: WorkChunk,
    pub status: ChunkStatus,
    pub hits_processed: usize,
    pub hits_unassigned: usize,
    pub hits_filtered: usize,
    pub sequences_processed: usize,
    pub sequences_unassigned: usize,
    pub missing_sequences: usize,
    pub parse_errors: Vec<RecordError>,
    /// Partition directories this chunk wrote partial files for
    pub partitions: BTreeSet<String>,
    pub elapsed_ms: u64,
}

impl WorkerResult {
    pub(crate) fn new(chunk: WorkChunk) -> Self {
        Self {
            chunk,
            status: ChunkStatus::Completed,
            hits_processed: 0,
            hits_unassigned: 0,
            hits_filtered: 0,
            sequences_processed: 0,
            sequences_unassigned: 0,
            missing_sequences: 0,
            parse_errors: Vec::new(),
            partitions: BTreeSet::new(),
            elapsed_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ChunkStatus::Completed
    }

    pub fn failure(&self) -> Option<WorkerFailure> {
        match &self.status {
            ChunkStatus::Failed(cause) => Some(WorkerFailure {
                chunk: self.chunk.index,
                start: self.chunk.start,
                end: self.chunk.end,
                cause: cause.clone(),
            }),
            _ => None,
        }
    }
}

/// A chunk that did not complete, as listed in a degraded run's status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFailure {
    pub chunk: usize,
    pub start: usize,
    pub end: usize,
    pub cause: String,
}

enum Outcome {
    Completed,
    Cancelled,
}

/// Buffered partial files of one chunk, appended to disk past a threshold
struct PartialSink<'s> {
    scratch: &'s ChunkScratch,
    threshold: usize,
    buffers: BTreeMap<(String, String), Vec<u8>>,
    created: HashSet<String>,
}

impl<'s> PartialSink<'s> {
    fn new(scratch: &'s ChunkScratch, threshold: usize) -> Self {
        Self {
            scratch,
            threshold,
            buffers: BTreeMap::new(),
            created: HashSet::new(),
        }
    }

    fn append(&mut self, partition: &str, file_name: &str, bytes: &[u8]) -> Result<()> {
        let key = (partition.to_string(), file_name.to_string());
        let buffer = self.buffers.entry(key.clone()).or_default();
        buffer.extend_from_slice(bytes);
        if buffer.len() >= self.threshold {
            self.flush(&key)?;
        }
        Ok(())
    }

    fn flush(&mut self, key: &(String, String)) -> Result<()> {
        let Some(buffer) = self.buffers.get_mut(key) else {
            return Ok(());
        };
        if buffer.is_empty() {
            return Ok(());
        }

        let (partition, file_name) = key;
        if self.created.insert(partition.clone()) {
            let dir = self.scratch.path().join(partition);
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create partial directory {:?}", dir))?;
        }
        let path = self.scratch.partial_path(partition, file_name);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open partial file {:?}", path))?;
        file.write_all(buffer)
            .with_context(|| format!("Failed to write partial file {:?}", path))?;
        buffer.clear();
        Ok(())
    }

    /// Flush everything and report the partitions written
    fn finish(mut self) -> Result<BTreeSet<String>> {
        let keys: Vec<_> = self.buffers.keys().cloned().collect();
        for key in &keys {
            self.flush(key)?;
        }
        Ok(self.created.into_iter().collect())
    }
}

/// Lazily opened read handles for the sources a chunk touches
#[derive(Default)]
struct Handles {
    files: HashMap<PathBuf, File>,
}

impl Handles {
    fn get(&mut self, path: &Path) -> Result<&mut File> {
        match self.files.entry(path.to_path_buf()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let file =
                    File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
                Ok(entry.insert(file))
            }
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Partition directories for one identifier under the configured label policy
fn route<'c>(ctx: &'c WorkerContext<'_>, id: &str) -> Vec<&'c str> {
    let Some(terms) = ctx.mapping.terms(id) else {
        return Vec::new();
    };
    let take = match ctx.config.multi_label {
        MultiLabel::Duplicate => terms.len(),
        MultiLabel::Primary => 1,
    };
    let dirs: IndexSet<&str> = terms
        .iter()
        .filter_map(|term| ctx.layout.term_dir(&term.label))
        .collect();
    dirs.into_iter().take(take).collect()
}

fn process(
    ctx: &WorkerContext<'_>,
    chunk: &WorkChunk,
    result: &mut WorkerResult,
) -> Result<Outcome> {
    let scratch = ChunkScratch::create(ctx.scratch_root, chunk.index)
        .with_context(|| format!("Failed to prepare scratch for chunk {}", chunk.index))?;
    let mut sink = PartialSink::new(&scratch, ctx.config.flush_threshold);
    let mut handles = Handles::default();
    let unassigned = ctx.layout.unassigned_dir();

    for unit in &ctx.sources.units[chunk.range()] {
        if ctx.cancel.load(Ordering::Relaxed) {
            return Ok(Outcome::Cancelled);
        }

        let source_name = &ctx.sources.sources[unit.source].source.name;
        let (id, runs, span) = ctx.sources.resolve(unit);

        let mut hits: Vec<(HitRecord, String)> = Vec::new();
        if let (Some(path), false) = (ctx.sources.hits_path(unit.source), runs.is_empty()) {
            let file = handles.get(path)?;
            for run in runs {
                let lines = read_run(file, run)
                    .with_context(|| format!("Failed to read {:?} at byte {}", path, run.offset))?;
                for (line_number, raw) in lines {
                    match HitRecord::parse_line(&raw, line_number) {
                        Ok(hit) => hits.push((hit, raw)),
                        Err(reason) => result.parse_errors.push(RecordError::new(
                            display_name(path),
                            Some(line_number),
                            reason,
                        )),
                    }
                }
            }
        }

        if ctx.config.hit_selection == HitSelection::BestIdentity && !hits.is_empty() {
            let best = hits
                .iter()
                .map(|(hit, _)| hit.identity)
                .fold(f32::NEG_INFINITY, f32::max);
            let before = hits.len();
            hits.retain(|(hit, _)| hit.identity == best);
            result.hits_filtered += before - hits.len();
        }

        let mut sequence_routes: BTreeSet<&str> = BTreeSet::new();
        for (hit, raw) in &hits {
            let key = match ctx.config.routing {
                RoutingKey::Subject => hit.subject_id.as_str(),
                RoutingKey::Query => hit.query_id.as_str(),
            };
            let mut dirs = route(ctx, key);
            if dirs.is_empty() {
                dirs.push(unassigned);
                result.hits_unassigned += 1;
            }
            for dir in dirs {
                let mut line = Vec::with_capacity(raw.len() + 1);
                line.extend_from_slice(raw.as_bytes());
                line.push(b'\n');
                sink.append(dir, &hits_file_name(source_name), &line)?;
                if dir != unassigned {
                    sequence_routes.insert(dir);
                }
            }
            result.hits_processed += 1;
        }

        let (Some(span), Some(path)) = (span, ctx.sources.sequences_path(unit.source)) else {
            if !runs.is_empty() {
                result.missing_sequences += 1;
            }
            continue;
        };

        let file = handles.get(path)?;
        let bytes = fasta::read_record(file, span)
            .with_context(|| format!("Failed to read {:?} at byte {}", path, span.offset))?;
        let record = match parse_record(&bytes, unit.source) {
            Ok(record) => record,
            Err(reason) => {
                result.parse_errors.push(RecordError::new(
                    display_name(path),
                    None,
                    format!("record '{}': {}", id, reason),
                ));
                continue;
            }
        };

        if sequence_routes.is_empty() {
            sequence_routes.insert(unassigned);
            result.sequences_unassigned += 1;
        }
        let mut encoded = Vec::with_capacity(record.len() + record.id.len() + 8);
        fasta::write_record(&mut encoded, &record)?;
        for dir in sequence_routes {
            sink.append(dir, &sequences_file_name(source_name), &encoded)?;
        }
        result.sequences_processed += 1;
    }

    result.partitions = sink.finish()?;
    Ok(Outcome::Completed)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Process one chunk. Always returns a result, whatever happens inside.
pub fn run_chunk(ctx: &WorkerContext<'_>, chunk: &WorkChunk) -> WorkerResult {
    let started = Instant::now();
    let mut result = WorkerResult::new(*chunk);

    let outcome = catch_unwind(AssertUnwindSafe(|| process(ctx, chunk, &mut result)));
    result.status = match outcome {
        Ok(Ok(Outcome::Completed)) => ChunkStatus::Completed,
        Ok(Ok(Outcome::Cancelled)) => ChunkStatus::Cancelled,
        Ok(Err(e)) => {
            warn!("Chunk {} failed: {:#}", chunk.index, e);
            ChunkStatus::Failed(format!("{:#}", e))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!("Chunk {} panicked: {}", chunk.index, message);
            ChunkStatus::Failed(format!("worker panicked: {}", message))
        }
    };
    result.elapsed_ms = started.elapsed().as_millis() as u64;

    debug!(
        "Chunk {} [{}..{}) {:?}: {} hits, {} sequences, {} parse errors in {} ms",
        chunk.index,
        chunk.start,
        chunk.end,
        result.status,
        result.hits_processed,
        result.sequences_processed,
        result.parse_errors.len(),
        result.elapsed_ms
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::GoTerm;
    use crate::core::index::HitSource;
    use crate::utils::workspace::chunk_dir;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const HIT: &str = "\t90\t10\t1\t0\t1\t10\t1\t10\t1e-5\t50";

    fn hit(query: &str, subject: &str, identity: &str) -> String {
        format!("{}\t{}{}\n", query, subject, HIT.replacen("90", identity, 1))
    }

    struct Fixture {
        dir: TempDir,
        sources: SourceSet,
    }

    fn fixture(hits: &str, fasta: &str) -> Fixture {
        let dir = TempDir::new().unwrap();
        let hit_path = dir.path().join("s1.blast");
        let seq_path = dir.path().join("s1.fasta");
        fs::write(&hit_path, hits).unwrap();
        fs::write(&seq_path, fasta).unwrap();
        let sources = SourceSet::index(HitSource::pair_by_stem(&[hit_path], &[seq_path]).unwrap())
            .unwrap();
        Fixture { dir, sources }
    }

    fn run(fx: &Fixture, mapping: &AnnotationMapping, config: &PartitionConfig) -> WorkerResult {
        let layout = PartitionLayout::from_labels(mapping.labels());
        let cancel = AtomicBool::new(false);
        let scratch = fx.dir.path().join("scratch");
        let ctx = WorkerContext {
            mapping,
            layout: &layout,
            sources: &fx.sources,
            config,
            scratch_root: &scratch,
            cancel: &cancel,
        };
        let chunk = WorkChunk {
            index: 0,
            start: 0,
            end: fx.sources.len(),
        };
        run_chunk(&ctx, &chunk)
    }

    fn partial(fx: &Fixture, partition: &str, file: &str) -> String {
        fs::read_to_string(chunk_dir(&fx.dir.path().join("scratch"), 0).join(partition).join(file))
            .unwrap_or_default()
    }

    #[test]
    fn test_routes_hits_and_sequences() {
        let fx = fixture(
            &[hit("q1", "A", "90"), hit("q2", "B", "90"), hit("q3", "C", "90")].concat(),
            ">q1\nAAAA\n>q2\nCCCC\n>q3\nGGGG\n>q4\nTTTT\n",
        );
        let mapping = AnnotationMapping::from_entries(
            "slim",
            vec![("A", vec!["GO:1"]), ("B", vec!["GO:1", "GO:2"]), ("C", vec![])],
        );

        let result = run(&fx, &mapping, &PartitionConfig::default());
        assert_eq!(result.status, ChunkStatus::Completed);
        assert_eq!(result.hits_processed, 3);
        assert_eq!(result.hits_unassigned, 1);
        assert_eq!(result.sequences_processed, 4);
        assert_eq!(result.sequences_unassigned, 2);
        assert_eq!(
            result.partitions.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["GO_1", "GO_2", "unassigned"]
        );

        assert_eq!(partial(&fx, "GO_1", "s1.fasta"), ">q1\nAAAA\n>q2\nCCCC\n");
        assert_eq!(partial(&fx, "GO_2", "s1.fasta"), ">q2\nCCCC\n");
        assert_eq!(partial(&fx, "unassigned", "s1.fasta"), ">q3\nGGGG\n>q4\nTTTT\n");
        assert!(partial(&fx, "unassigned", "s1.hits.tsv").starts_with("q3\tC\t"));
    }

    #[test]
    fn test_sequence_written_once_per_partition() {
        let fx = fixture(
            &[hit("q1", "A", "90"), hit("q1", "B", "80")].concat(),
            ">q1\nAAAA\n",
        );
        let mapping =
            AnnotationMapping::from_entries("slim", vec![("A", vec!["GO:1"]), ("B", vec!["GO:1"])]);

        let result = run(&fx, &mapping, &PartitionConfig::default());
        assert_eq!(partial(&fx, "GO_1", "s1.fasta"), ">q1\nAAAA\n");
        assert_eq!(partial(&fx, "GO_1", "s1.hits.tsv").lines().count(), 2);
        assert_eq!(result.sequences_processed, 1);
    }

    #[test]
    fn test_malformed_lines_are_counted_not_fatal() {
        let fx = fixture(
            &[hit("q1", "A", "90"), "q1\tA\tbroken\n".to_string(), hit("q1", "A", "high")].concat(),
            ">q1\nAAAA\n",
        );
        let mapping = AnnotationMapping::from_entries("slim", vec![("A", vec!["GO:1"])]);

        let result = run(&fx, &mapping, &PartitionConfig::default());
        assert!(result.is_success());
        assert_eq!(result.hits_processed, 1);
        assert_eq!(result.parse_errors.len(), 2);
        assert_eq!(result.parse_errors[0].line, Some(2));
        assert_eq!(result.parse_errors[0].file, "s1.blast");
    }

    #[test]
    fn test_best_identity_selection() {
        let fx = fixture(
            &[hit("q1", "A", "99.5"), hit("q1", "B", "80"), hit("q1", "C", "99.5")].concat(),
            ">q1\nAAAA\n",
        );
        let mapping = AnnotationMapping::from_entries(
            "slim",
            vec![("A", vec!["GO:1"]), ("B", vec!["GO:2"]), ("C", vec!["GO:3"])],
        );
        let config = PartitionConfig {
            hit_selection: HitSelection::BestIdentity,
            ..Default::default()
        };

        let result = run(&fx, &mapping, &config);
        assert_eq!(result.hits_filtered, 1);
        assert_eq!(
            result.partitions.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["GO_1", "GO_3"]
        );
    }

    #[test]
    fn test_primary_label_policy() {
        let fx = fixture(&hit("q1", "B", "90"), ">q1\nAAAA\n");
        let mapping = AnnotationMapping::from_entries("slim", vec![("B", vec!["GO:2", "GO:1"])]);
        let config = PartitionConfig {
            multi_label: MultiLabel::Primary,
            ..Default::default()
        };

        let result = run(&fx, &mapping, &config);
        assert_eq!(
            result.partitions.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["GO_2"]
        );
    }

    #[test]
    fn test_hit_written_once_when_label_repeats() {
        let fx = fixture(&hit("q1", "A", "90"), ">q1\nAAAA\n");
        let mut mapping = AnnotationMapping::new();
        mapping.insert("A", GoTerm::new("GO:1", "slim_one"));
        mapping.insert("A", GoTerm::new("GO:1", "slim_two"));

        let result = run(&fx, &mapping, &PartitionConfig::default());
        assert_eq!(result.hits_processed, 1);
        assert_eq!(partial(&fx, "GO_1", "s1.hits.tsv").lines().count(), 1);
    }

    #[test]
    fn test_query_routing_and_missing_sequence() {
        let fx = fixture(&[hit("q1", "A", "90"), hit("q9", "A", "90")].concat(), ">q1\nAAAA\n");
        let mapping = AnnotationMapping::from_entries("slim", vec![("q1", vec!["GO:7"])]);
        let config = PartitionConfig {
            routing: RoutingKey::Query,
            ..Default::default()
        };

        let result = run(&fx, &mapping, &config);
        assert_eq!(result.missing_sequences, 1);
        assert_eq!(result.hits_unassigned, 1);
        assert_eq!(partial(&fx, "GO_7", "s1.fasta"), ">q1\nAAAA\n");
    }

    #[test]
    fn test_unwritable_scratch_fails_chunk() {
        let fx = fixture(&hit("q1", "A", "90"), ">q1\nAAAA\n");
        let scratch = fx.dir.path().join("scratch");
        fs::create_dir_all(&scratch).unwrap();
        fs::write(chunk_dir(&scratch, 0), "blocked").unwrap();

        let mapping = AnnotationMapping::new();
        let result = run(&fx, &mapping, &PartitionConfig::default());
        assert!(matches!(result.status, ChunkStatus::Failed(ref cause) if cause.contains("scratch")));
    }

    #[test]
    fn test_cancelled_before_first_unit() {
        let fx = fixture(&hit("q1", "A", "90"), ">q1\nAAAA\n");
        let mapping = AnnotationMapping::new();
        let layout = PartitionLayout::from_labels(mapping.labels());
        let cancel = AtomicBool::new(true);
        let scratch = fx.dir.path().join("scratch");
        let config = PartitionConfig::default();
        let ctx = WorkerContext {
            mapping: &mapping,
            layout: &layout,
            sources: &fx.sources,
            config: &config,
            scratch_root: &scratch,
            cancel: &cancel,
        };

        let result = run_chunk(&ctx, &WorkChunk { index: 0, start: 0, end: 1 });
        assert_eq!(result.status, ChunkStatus::Cancelled);
        assert_eq!(result.hits_processed, 0);
    }
}

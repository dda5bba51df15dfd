//! Input sources and the ordered identifier space
//!
//! A source is one hit file and its paired FASTA file. Indexing records byte
//! locations only; the ordered list of [`WorkUnit`]s produced here is the
//! identifier space the planner slices into chunks.

use crate::bio::fasta::{index_fasta, FastaIndex, RecordSpan};
use crate::bio::hits::{index_hits, HitIndex, LineRun};
use crate::utils::files::file_stem;
use crate::{MashtError, Result};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitSource {
    /// Output file prefix, the stem shared by the hit and sequence files
    pub name: String,
    pub hits: Option<PathBuf>,
    pub sequences: Option<PathBuf>,
}

impl HitSource {
    /// Pair hit files with sequence files sharing their stem.
    ///
    /// Hit files keep their given order; sequence files without a hit file
    /// follow as sequence-only sources so their records are still routed.
    pub fn pair_by_stem(hit_files: &[PathBuf], sequence_files: &[PathBuf]) -> Result<Vec<Self>> {
        let mut sources = Vec::new();
        let mut names = HashSet::new();
        let mut paired = HashSet::new();

        for hits in hit_files {
            let name = file_stem(hits);
            if !names.insert(name.clone()) {
                return Err(MashtError::Config(format!(
                    "Two hit files share the name '{}'",
                    name
                )));
            }
            let sequences = sequence_files
                .iter()
                .find(|s| file_stem(s) == name)
                .cloned();
            match &sequences {
                Some(path) => {
                    paired.insert(path.clone());
                }
                None => warn!("No sequence file pairs with {:?}; only hits will be routed", hits),
            }
            sources.push(HitSource {
                name,
                hits: Some(hits.clone()),
                sequences,
            });
        }

        for sequences in sequence_files {
            if paired.contains(sequences) {
                continue;
            }
            let name = file_stem(sequences);
            if !names.insert(name.clone()) {
                return Err(MashtError::Config(format!(
                    "Two sequence files share the name '{}'",
                    name
                )));
            }
            sources.push(HitSource {
                name,
                hits: None,
                sequences: Some(sequences.clone()),
            });
        }

        Ok(sources)
    }
}

/// A source with its hit and sequence indexes
#[derive(Debug)]
pub struct IndexedSource {
    pub source: HitSource,
    pub hits: Option<HitIndex>,
    pub sequences: Option<FastaIndex>,
}

/// One (source, identifier) group, referenced by position in the source's indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// A query of the hit index, with or without a sequence
    Query(usize),
    /// A FASTA record no hit refers to
    SequenceOnly(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkUnit {
    pub source: usize,
    pub kind: UnitKind,
}

const NO_RUNS: &[LineRun] = &[];

#[derive(Debug, Default)]
pub struct SourceSet {
    pub sources: Vec<IndexedSource>,
    pub units: Vec<WorkUnit>,
}

fn index_source(source: HitSource) -> Result<IndexedSource> {
    let hits = source.hits.as_deref().map(index_hits).transpose()?;
    let sequences = source.sequences.as_deref().map(index_fasta).transpose()?;
    debug!(
        "Indexed source '{}': {} queries, {} sequences",
        source.name,
        hits.as_ref().map_or(0, |h| h.queries.len()),
        sequences.as_ref().map_or(0, FastaIndex::len)
    );
    Ok(IndexedSource {
        source,
        hits,
        sequences,
    })
}

impl SourceSet {
    /// Index every source (in parallel when called inside a pool) and lay
    /// out the units: per source, queries in first-seen order, then
    /// sequences without hits in file order.
    pub fn index(sources: Vec<HitSource>) -> Result<Self> {
        let sources: Vec<IndexedSource> = sources
            .into_par_iter()
            .map(index_source)
            .collect::<Result<_>>()?;

        let mut units = Vec::new();
        for (s, indexed) in sources.iter().enumerate() {
            if let Some(hits) = &indexed.hits {
                units.extend((0..hits.queries.len()).map(|q| WorkUnit {
                    source: s,
                    kind: UnitKind::Query(q),
                }));
            }
            if let Some(fasta) = &indexed.sequences {
                for (i, id) in fasta.records.keys().enumerate() {
                    let has_hits = indexed
                        .hits
                        .as_ref()
                        .is_some_and(|h| h.queries.contains_key(id));
                    if !has_hits {
                        units.push(WorkUnit {
                            source: s,
                            kind: UnitKind::SequenceOnly(i),
                        });
                    }
                }
            }
        }

        info!("Indexed {} sources into {} identifiers", sources.len(), units.len());
        Ok(Self { sources, units })
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.source.name.clone()).collect()
    }

    /// Identifier, hit runs and sequence span of a unit
    pub fn resolve(&self, unit: &WorkUnit) -> (&str, &[LineRun], Option<RecordSpan>) {
        let indexed = &self.sources[unit.source];
        let (id, runs) = match unit.kind {
            UnitKind::Query(q) => match indexed.hits.as_ref().and_then(|h| h.queries.get_index(q)) {
                Some((id, runs)) => (id.as_str(), runs.as_slice()),
                None => ("", NO_RUNS),
            },
            UnitKind::SequenceOnly(i) => {
                match indexed.sequences.as_ref().and_then(|f| f.records.get_index(i)) {
                    Some((id, _)) => (id.as_str(), NO_RUNS),
                    None => ("", NO_RUNS),
                }
            }
        };
        let span = indexed.sequences.as_ref().and_then(|f| f.get(id));
        (id, runs, span)
    }

    pub fn hits_path(&self, source: usize) -> Option<&Path> {
        self.sources[source].source.hits.as_deref()
    }

    pub fn sequences_path(&self, source: usize) -> Option<&Path> {
        self.sources[source].source.sequences.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_pair_by_stem() {
        let hits = vec![PathBuf::from("blast/s1.blast"), PathBuf::from("blast/s2.blast")];
        let seqs = vec![PathBuf::from("seqs/s2.fasta"), PathBuf::from("seqs/s3.fa")];

        let sources = HitSource::pair_by_stem(&hits, &seqs).unwrap();
        assert_eq!(sources.len(), 3);
        assert_eq!(sources[0].sequences, None);
        assert_eq!(sources[1].sequences, Some(PathBuf::from("seqs/s2.fasta")));
        assert_eq!(sources[2].name, "s3");
        assert_eq!(sources[2].hits, None);
    }

    #[test]
    fn test_pair_rejects_duplicate_names() {
        let hits = vec![PathBuf::from("a/s1.blast"), PathBuf::from("b/s1.tsv")];
        assert!(HitSource::pair_by_stem(&hits, &[]).is_err());
    }

    #[test]
    fn test_units_cover_queries_then_orphan_sequences() {
        let dir = TempDir::new().unwrap();
        let hits = dir.path().join("s1.blast");
        let seqs = dir.path().join("s1.fasta");
        fs::write(
            &hits,
            "q2\tA\t90\t10\t1\t0\t1\t10\t1\t10\t1e-5\t50\n\
             q1\tB\t90\t10\t1\t0\t1\t10\t1\t10\t1e-5\t50\n",
        )
        .unwrap();
        fs::write(&seqs, ">q1\nAC\n>q3\nGT\n>q2\nTT\n").unwrap();

        let sources = HitSource::pair_by_stem(&[hits], &[seqs]).unwrap();
        let set = SourceSet::index(sources).unwrap();
        let ids: Vec<&str> = set.units.iter().map(|u| set.resolve(u).0).collect();
        assert_eq!(ids, vec!["q2", "q1", "q3"]);

        let (_, runs, span) = set.resolve(&set.units[2]);
        assert!(runs.is_empty());
        assert!(span.is_some());
    }
}

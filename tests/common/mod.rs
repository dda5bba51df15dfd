//! Shared fixtures for the integration tests
//!
//! Builds annotation tables, tabular hit files and FASTA files inside a
//! temporary directory and reads partition trees back for comparison.
#![allow(dead_code)]

use masht::core::config::{Config, OutputConfig};
use masht::core::orchestrator::PartitionRequest;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct TestEnvironment {
    _temp_dir: TempDir,
    pub root: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().to_path_buf();
        TestEnvironment {
            _temp_dir: temp_dir,
            root,
        }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create fixture dir");
        }
        fs::write(&path, contents).expect("Failed to write fixture");
        path
    }

    /// Annotation CSV with one row per (identifier, label); identifiers
    /// without labels get a row with an empty term
    pub fn annotations(&self, relative: &str, entries: &[(&str, &[&str])]) -> PathBuf {
        let mut contents = String::from("id,term\n");
        for (id, labels) in entries {
            if labels.is_empty() {
                contents.push_str(&format!("{},\n", id));
            }
            for label in *labels {
                contents.push_str(&format!("{},{}\n", id, label));
            }
        }
        self.write(relative, &contents)
    }

    /// Configuration writing below `<root>/<output>`
    pub fn config(&self, output: &str, jobs: usize) -> Config {
        let mut config = Config::default();
        config.partition.n_jobs = jobs;
        config.output = OutputConfig {
            output_root: self.path(output),
            ..Default::default()
        };
        config
    }
}

pub fn hit_line(query: &str, subject: &str, identity: f32) -> String {
    format!(
        "{}\t{}\t{:.2}\t100\t2\t0\t1\t100\t1\t100\t1e-30\t180\n",
        query, subject, identity
    )
}

pub fn fasta_record(id: &str, sequence: &str) -> String {
    format!(">{} sample record\n{}\n", id, sequence)
}

/// A generated data set: sources of queries hitting subjects `S0..S9`
/// annotated with overlapping terms, plus sequence-only records
pub struct Dataset {
    pub request: PartitionRequest,
    /// Query identifiers in identifier-space order
    pub unit_ids: Vec<String>,
}

pub const SUBJECT_TERMS: &[(&str, &[&str])] = &[
    ("S0", &["GO:0005634"]),
    ("S1", &["GO:0005634", "GO:0016020"]),
    ("S2", &["GO:0016020"]),
    ("S3", &["GO:0003677"]),
    ("S4", &["GO:0003677", "GO:0005634"]),
    ("S5", &[]),
    ("S6", &["GO:0005737"]),
    ("S7", &["GO:0005737"]),
];

pub fn dataset(env: &TestEnvironment, sources: usize, queries: usize) -> Dataset {
    let annotations = env.annotations("go/terms.csv", SUBJECT_TERMS);
    let mut request = PartitionRequest {
        annotation_files: vec![annotations],
        ..Default::default()
    };
    let mut unit_ids = Vec::new();

    for s in 0..sources {
        let mut hits = String::new();
        let mut fasta = String::new();
        for q in 0..queries {
            let id = format!("src{}_q{:03}", s, q);
            // S8 and S9 are not annotated at all
            hits.push_str(&hit_line(&id, &format!("S{}", q % 10), 90.0 + (q % 4) as f32));
            if q % 3 == 0 {
                hits.push_str(&hit_line(&id, &format!("S{}", (q + 3) % 10), 85.0));
            }
            if q % 7 != 6 {
                fasta.push_str(&fasta_record(&id, &"ACGT".repeat(5 + q % 30)));
            }
            unit_ids.push(id);
        }
        for o in 0..3 {
            let id = format!("src{}_orphan{}", s, o);
            fasta.push_str(&fasta_record(&id, "GGGGCCCCAAAATTTT"));
            unit_ids.push(id);
        }

        request
            .hit_files
            .push(env.write(&format!("blast/sample{}.blast", s), &hits));
        request
            .sequence_files
            .push(env.write(&format!("seqs/sample{}.fasta", s), &fasta));
    }

    Dataset { request, unit_ids }
}

/// Every file below `root` keyed by relative path, excluding the run summary
pub fn read_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, files: &mut BTreeMap<String, Vec<u8>>) {
        for entry in fs::read_dir(dir).expect("Failed to list output") {
            let path = entry.expect("Failed to read entry").path();
            if path.is_dir() {
                walk(root, &path, files);
            } else {
                let relative = path
                    .strip_prefix(root)
                    .expect("Path outside root")
                    .to_string_lossy()
                    .into_owned();
                if relative != "run_summary.json" {
                    files.insert(relative, fs::read(&path).expect("Failed to read output"));
                }
            }
        }
    }

    let mut files = BTreeMap::new();
    if root.exists() {
        walk(root, root, &mut files);
    }
    files
}

/// Record identifiers of a FASTA file, in file order
pub fn fasta_ids(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter_map(|l| l.strip_prefix('>'))
        .map(|h| h.split_whitespace().next().unwrap_or_default().to_string())
        .collect()
}

/// Query identifiers of a hit file, one per line
pub fn hit_queries(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|l| l.split('\t').next().unwrap_or_default().to_string())
        .collect()
}

//! Partition naming on disk
//!
//! Labels such as `GO:0008150` are not safe directory names everywhere, and
//! two labels may sanitize to the same name. The layout assigns every label a
//! unique directory once per run, in sorted label order, so names are stable
//! across runs with the same annotations.

use crate::core::config::SCRATCH_DIR_NAME;
use std::collections::{BTreeMap, HashMap, HashSet};

pub const UNASSIGNED_DIR: &str = "unassigned";
pub const SUMMARY_FILE: &str = "run_summary.json";
/// Partition directories written by the last merge into an output root
pub const MANIFEST_FILE: &str = ".masht_partitions.json";

/// Replace characters outside `[A-Za-z0-9._-]` with `_`
pub fn sanitize_label(label: &str) -> String {
    let name: String = label
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if name.is_empty() || name.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        name
    }
}

pub fn hits_file_name(source: &str) -> String {
    format!("{}.hits.tsv", source)
}

pub fn sequences_file_name(source: &str) -> String {
    format!("{}.fasta", source)
}

#[derive(Debug, Clone)]
pub struct PartitionLayout {
    by_label: HashMap<String, String>,
    by_dir: BTreeMap<String, Option<String>>,
}

impl PartitionLayout {
    pub fn from_labels<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut sorted: Vec<&str> = labels.into_iter().collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut used: HashSet<String> = [UNASSIGNED_DIR, SCRATCH_DIR_NAME, SUMMARY_FILE, MANIFEST_FILE]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut by_label = HashMap::new();
        let mut by_dir = BTreeMap::new();
        by_dir.insert(UNASSIGNED_DIR.to_string(), None);

        for label in sorted {
            let base = sanitize_label(label);
            let mut candidate = base.clone();
            let mut n = 2;
            while used.contains(&candidate) {
                candidate = format!("{}-{}", base, n);
                n += 1;
            }
            used.insert(candidate.clone());
            by_dir.insert(candidate.clone(), Some(label.to_string()));
            by_label.insert(label.to_string(), candidate);
        }

        Self { by_label, by_dir }
    }

    pub fn term_dir(&self, label: &str) -> Option<&str> {
        self.by_label.get(label).map(String::as_str)
    }

    pub fn unassigned_dir(&self) -> &str {
        UNASSIGNED_DIR
    }

    /// Label behind a directory name; `None` for the unassigned partition or unknown names
    pub fn label_for(&self, dir: &str) -> Option<&str> {
        self.by_dir.get(dir).and_then(|l| l.as_deref())
    }

    pub fn len(&self) -> usize {
        self.by_dir.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_dir.is_empty()
    }
}

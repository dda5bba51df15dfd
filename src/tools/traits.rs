//! Interfaces of the external collaborators
//!
//! The partitioning engine only consumes their output files; these traits
//! let the CLI drive the search and distance steps and let tests swap in
//! stand-ins.

use anyhow::Result;
use std::path::{Path, PathBuf};

/// A sequence-similarity search producing tabular (outfmt 6) hit files
pub trait SearchTool: Send + Sync {
    fn name(&self) -> &str;

    /// Build a searchable database from a FASTA file, returning the directory it lives in
    fn create_index(&self, fasta: &Path, name: &str) -> Result<PathBuf>;

    /// Search one query file, returning the hit file written to `out_dir`
    fn run(&self, query: &Path, db: &str, db_dir: &Path, out_dir: &Path) -> Result<PathBuf>;

    /// Search each query file in turn
    fn run_all(
        &self,
        queries: &[PathBuf],
        db: &str,
        db_dir: &Path,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        queries
            .iter()
            .map(|query| self.run(query, db, db_dir, out_dir))
            .collect()
    }

    /// Verify the tool can be invoked
    fn verify_installation(&self) -> Result<()>;
}

/// A sketch-based distance estimator
pub trait DistanceTool: Send + Sync {
    /// Sketch the inputs into `<out_dir>/<name>.msh`
    fn sketch(&self, inputs: &[PathBuf], out_dir: &Path, name: &str) -> Result<PathBuf>;

    /// Pairwise distances of the inputs, written to `<out_dir>/distances.tsv`
    fn dist(&self, inputs: &[PathBuf], out_dir: &Path) -> Result<PathBuf>;

    /// Distance matrix of each sketch, one report per sketch
    fn triangle(&self, sketches: &[PathBuf], out_dir: &Path) -> Result<Vec<PathBuf>>;

    /// Error bounds of each sketch, one report per sketch
    fn bounds(&self, sketches: &[PathBuf], out_dir: &Path) -> Result<Vec<PathBuf>>;

    fn info(&self, sketch: &Path) -> Result<String>;

    /// Merge sketches into one file, returning its path
    fn paste(&self, inputs: &[PathBuf], out_path: &Path) -> Result<PathBuf>;

    /// Containment of the query files within a sketch
    fn screen(&self, sketch: &Path, queries: &[PathBuf]) -> Result<String>;
}

pub mod commands;

use crate::MashtError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Parser)]
#[command(
    name = "masht",
    version,
    about = "Partition sequence-search results by Gene Ontology terms",
    long_about = "masht routes BLAST hits and their query sequences into one directory per \
                  GO term of an annotation mapping, and wraps the BLAST and mash tools used \
                  around that step."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Number of threads to use (0 = all available)
    #[arg(short = 'j', long, default_value = "0", global = true)]
    pub threads: usize,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Partition hits and sequences into per-term directories
    Split(commands::split::SplitArgs),

    /// Split a GO mart export into one list per term
    GoSlim(commands::go_slim::GoSlimArgs),

    /// Build BLAST databases and run searches
    Blast(commands::blast::BlastArgs),

    /// Sketch-based distances with mash
    Mash(commands::mash::MashArgs),
}

/// A run that finished with some chunks failed
#[derive(Error, Debug)]
#[error("{failed} of {chunks} chunks failed; partial results are in {output:?}")]
pub struct DegradedRun {
    pub failed: usize,
    pub chunks: usize,
    pub output: PathBuf,
}

/// Process exit code for an error returned by a command
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<DegradedRun>().is_some() {
        return 6;
    }
    match err.downcast_ref::<MashtError>() {
        Some(MashtError::Config(_)) => 2,
        Some(MashtError::Io(_)) => 3,
        Some(MashtError::MalformedAnnotation { .. }) | Some(MashtError::Parse(_)) => 4,
        Some(MashtError::Aggregation { .. }) => 5,
        Some(MashtError::Cancelled) => 130,
        Some(MashtError::Tool(_)) => 1,
        None if err.downcast_ref::<std::io::Error>().is_some() => 3,
        None => 1,
    }
}

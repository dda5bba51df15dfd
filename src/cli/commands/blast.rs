use crate::tools::{BlastProgram, BlastSearch, SearchTool};
use crate::utils::files::resolve_inputs;
use crate::utils::progress::create_spinner;
use anyhow::Result;
use clap::{Args, Subcommand};
use colored::*;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct BlastArgs {
    #[command(subcommand)]
    pub command: BlastCommand,

    /// Directory holding the BLAST+ binaries (default: PATH)
    #[arg(long, value_name = "DIR", global = true)]
    pub bin_dir: Option<PathBuf>,

    /// BLAST program to run
    #[arg(long, default_value = "blastn", global = true)]
    pub program: BlastProgram,

    /// Number of threads (passed from global)
    #[arg(skip)]
    pub threads: usize,
}

#[derive(Subcommand, Debug)]
pub enum BlastCommand {
    /// Build a BLAST database from a FASTA file
    Index {
        /// Reference FASTA file
        #[arg(value_name = "FASTA")]
        fasta: PathBuf,

        /// Database name
        #[arg(short, long)]
        name: String,

        /// Pass -parse_seqids to makeblastdb
        #[arg(long)]
        parse_seqids: bool,
    },

    /// Search query files against a database, one hit file per query file
    Search {
        /// Query FASTA files: a file, a directory or a `.txt` list of paths
        #[arg(value_name = "QUERY")]
        query: PathBuf,

        /// Database name
        #[arg(long)]
        db: String,

        /// Directory holding the database
        #[arg(long, value_name = "DIR", default_value = ".")]
        db_dir: PathBuf,

        /// Output directory for the hit files
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        output: PathBuf,

        /// E-value threshold
        #[arg(long, default_value = "1e-49")]
        evalue: f64,
    },
}

pub fn run(args: BlastArgs) -> Result<()> {
    let mut blast = BlastSearch {
        bin_dir: args.bin_dir.clone(),
        program: args.program,
        threads: crate::utils::parallel::resolve_threads(args.threads),
        ..Default::default()
    };

    match args.command {
        BlastCommand::Index {
            fasta,
            name,
            parse_seqids,
        } => {
            blast.parse_seqids = parse_seqids;
            let spinner = create_spinner(&format!("Creating BLAST database '{}'", name));
            let result = blast.create_index(&fasta, &name);
            spinner.finish_and_clear();
            let db_dir = result?;
            println!("{} Database '{}' created in {:?}", "✓".green().bold(), name, db_dir);
        }
        BlastCommand::Search {
            query,
            db,
            db_dir,
            output,
            evalue,
        } => {
            blast.evalue = evalue;
            blast.verify_installation()?;
            let queries = resolve_inputs(&query)?;
            let spinner = create_spinner(&format!("Searching {} query files", queries.len()));
            let result = blast.run_all(&queries, &db, &db_dir, &output);
            spinner.finish_and_clear();
            let hits = result?;
            println!(
                "{} Wrote {} hit files to {:?}",
                "✓".green().bold(),
                hits.len(),
                output
            );
        }
    }
    Ok(())
}

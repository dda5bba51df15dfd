use crate::tools::{DistanceTool, MashTool};
use crate::utils::files::resolve_inputs;
use anyhow::Result;
use clap::{Args, Subcommand};
use colored::*;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct MashArgs {
    #[command(subcommand)]
    pub command: MashCommand,

    /// Path to the mash binary
    #[arg(long, value_name = "FILE", default_value = "mash", global = true)]
    pub mash: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum MashCommand {
    /// Sketch sequence files into <OUTPUT>/<NAME>.msh
    Sketch {
        /// A file, a directory or a `.txt` list of paths
        input: PathBuf,
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        #[arg(long, default_value = "sketches")]
        name: String,
    },

    /// Pairwise distances into <OUTPUT>/distances.tsv
    Dist {
        input: PathBuf,
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Distance matrix of every sketch
    Triangle {
        input: PathBuf,
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Error bounds of every sketch
    Bounds {
        input: PathBuf,
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Show information on sketch files
    Info { input: PathBuf },

    /// Merge sketch files into one
    Paste {
        input: PathBuf,
        /// Merged sketch file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Screen query files against each sketch
    Screen {
        input: PathBuf,
        /// Query files: a file, a directory or a `.txt` list of paths
        #[arg(short, long)]
        query: PathBuf,
    },
}

fn print_reports(kind: &str, reports: &[PathBuf]) {
    println!("{} Wrote {} {} reports", "✓".green().bold(), reports.len(), kind);
    for report in reports {
        println!("  {}", report.display());
    }
}

pub fn run(args: MashArgs) -> Result<()> {
    let mash = MashTool::new(args.mash);

    match args.command {
        MashCommand::Sketch {
            input,
            output,
            name,
        } => {
            let sketch = mash.sketch(&resolve_inputs(&input)?, &output, &name)?;
            println!("{} Sketches written to {:?}", "✓".green().bold(), sketch);
        }
        MashCommand::Dist { input, output } => {
            let path = mash.dist(&resolve_inputs(&input)?, &output)?;
            println!("{} Distances written to {:?}", "✓".green().bold(), path);
        }
        MashCommand::Triangle { input, output } => {
            print_reports("triangle", &mash.triangle(&resolve_inputs(&input)?, &output)?);
        }
        MashCommand::Bounds { input, output } => {
            print_reports("bounds", &mash.bounds(&resolve_inputs(&input)?, &output)?);
        }
        MashCommand::Info { input } => {
            for sketch in resolve_inputs(&input)? {
                println!("============= {} =============", sketch.display());
                print!("{}", mash.info(&sketch)?);
            }
        }
        MashCommand::Paste { input, output } => {
            let merged = mash.paste(&resolve_inputs(&input)?, &output)?;
            println!("{} Merged sketch written to {:?}", "✓".green().bold(), merged);
        }
        MashCommand::Screen { input, query } => {
            let queries = resolve_inputs(&query)?;
            for sketch in resolve_inputs(&input)? {
                println!("============= {} =============", sketch.display());
                print!("{}", mash.screen(&sketch, &queries)?);
            }
        }
    }
    Ok(())
}

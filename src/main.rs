use clap::Parser;
use colored::*;
use masht::cli::commands;
use masht::cli::{exit_code, Cli, Commands};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    // MASHT_LOG takes precedence over -v
    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let log_level = std::env::var("MASHT_LOG").unwrap_or_else(|_| default_level.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cancel = Arc::new(AtomicBool::new(false));
    install_interrupt_handler(Arc::clone(&cancel));

    if let Err(e) = run(cli, cancel) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(exit_code(&e));
    }
}

/// Set the cancellation flag on Ctrl-C; running workers stop at their next record
fn install_interrupt_handler(cancel: Arc<AtomicBool>) {
    let spawned = thread::Builder::new()
        .name("masht-signal".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::warn!("Ctrl-C handling unavailable: {}", e);
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!(
                        "\n{} Interrupt received, stopping workers...",
                        "⚠".yellow().bold()
                    );
                    cancel.store(true, Ordering::SeqCst);
                }
            });
        });
    if let Err(e) = spawned {
        tracing::warn!("Ctrl-C handling unavailable: {}", e);
    }
}

fn run(cli: Cli, cancel: Arc<AtomicBool>) -> anyhow::Result<()> {
    let threads = masht::utils::parallel::resolve_threads(cli.threads);
    if cli.verbose > 0 {
        eprintln!("Using {} threads", threads);
    }

    match cli.command {
        Commands::Split(mut args) => {
            args.threads = cli.threads;
            args.verbose = cli.verbose > 0;
            commands::split::run(args, cancel)
        }
        Commands::GoSlim(mut args) => {
            args.threads = cli.threads;
            commands::go_slim::run(args)
        }
        Commands::Blast(mut args) => {
            args.threads = cli.threads;
            commands::blast::run(args)
        }
        Commands::Mash(args) => commands::mash::run(args),
    }
}

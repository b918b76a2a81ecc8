use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "sfap-cli")]
#[command(about = "Social export ingest and follower attribution")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Ingest every export under SFAP_INPUT_DIR and write a report run.
    Ingest,
    /// Print a markdown index of recent report runs.
    Report {
        #[arg(long, default_value_t = 5)]
        runs: usize,
        #[arg(long)]
        reports_dir: Option<PathBuf>,
    },
}

fn init_tracing() -> Result<()> {
    let env_filter = EnvFilter::try_from_env("SFAP_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_new("info"))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Ingest) {
        Commands::Ingest => {
            let summary = sfap_sync::run_ingest_once_from_env().await?;
            println!(
                "ingest complete: run_id={} posts={} dropped={} follows={} reports={}",
                summary.run_id,
                summary.unified_posts,
                summary.duplicates_dropped,
                summary.attribution.follows_attributed,
                summary.reports_dir
            );
        }
        Commands::Report { runs, reports_dir } => {
            let reports_dir =
                reports_dir.unwrap_or_else(|| sfap_sync::SyncConfig::from_env().reports_dir);
            println!("{}", sfap_sync::report_runs_markdown(runs, &reports_dir)?);
        }
    }

    Ok(())
}

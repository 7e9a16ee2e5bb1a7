mod config;
mod extract_cmd;
mod filter_cmd;
mod output;
mod replay;
mod validate_cmd;

use clap::{Parser, Subcommand};
use output::OutputFormat;
use std::path::PathBuf;
use tracepanel_timeline::ObjectiveFilter;

#[derive(Parser)]
#[command(name = "tracepanel", about = "Reconstruct agent work timelines from trace logs")]
struct Cli {
    /// Config file (defaults to ~/.config/tracepanel/tracepanel.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a trace log and print the resulting panel
    Replay {
        /// Path to the JSONL trace log
        log: PathBuf,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Objective filter (all, active, thought, tool, todo, error)
        #[arg(long)]
        filter: Option<ObjectiveFilter>,

        /// Only follow this session; lines from other sessions are dropped
        #[arg(long)]
        session: Option<String>,

        /// Print one line per recomputation instead of the final panel
        #[arg(long)]
        frames: bool,
    },

    /// Split thinking markup out of a text (reads stdin without a file)
    Extract { file: Option<PathBuf> },

    /// List JSON objects embedded in free text
    ScanJson {
        file: Option<PathBuf>,

        /// Split out a customer-ready answer instead
        #[arg(long)]
        customer_ready: bool,
    },

    /// Check a trace log for structural problems
    Validate { log: PathBuf },

    /// Show or set the stored objective filter
    Filter {
        #[command(subcommand)]
        action: FilterAction,
    },
}

#[derive(Subcommand)]
enum FilterAction {
    /// Print the stored filter
    Get {
        #[arg(long)]
        session: Option<String>,
    },
    /// Store a filter
    Set {
        filter: ObjectiveFilter,
        #[arg(long)]
        session: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let panel_config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Replay {
            log,
            format,
            filter,
            session,
            frames,
        } => replay::run_replay(
            &log,
            panel_config,
            replay::ReplayOptions {
                format,
                filter,
                session: session.as_deref(),
                frames,
            },
        ),
        Commands::Extract { file } => extract_cmd::run_extract(file.as_deref(), &panel_config),
        Commands::ScanJson {
            file,
            customer_ready,
        } => extract_cmd::run_scan_json(file.as_deref(), customer_ready, &panel_config),
        Commands::Validate { log } => validate_cmd::run_validate(&log),
        Commands::Filter { action } => match action {
            FilterAction::Get { session } => filter_cmd::run_get(session.as_deref(), &panel_config),
            FilterAction::Set { filter, session } => {
                filter_cmd::run_set(session.as_deref(), filter, &panel_config)
            }
        },
    }
}

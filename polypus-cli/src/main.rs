use clap::{Parser, Subcommand};
use frontend::playback::Speed;
use polypus_cli::{check, tail};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "polypus")]
#[command(about = "Live ordering, replay and export of distributed message traces")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to every node proxy and reconcile its events live
    Tail {
        /// Topology file (.toml or .json)
        #[arg(long, short)]
        config: PathBuf,

        /// Write the ledger as CSV here on shutdown
        #[arg(long, short)]
        export: Option<PathBuf>,

        #[arg(long, default_value = "1000")]
        reconnect_ms: u64,

        /// Initial replay speed, snapped to the nearest slider step
        #[arg(long, default_value = "1")]
        speed: f64,
    },
    /// Validate a topology file and print its address table
    Check {
        #[arg(long, short)]
        config: PathBuf,

        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Tail {
            config,
            export,
            reconnect_ms,
            speed,
        } => {
            let options = tail::TailOptions {
                config,
                export,
                reconnect_delay: Duration::from_millis(reconnect_ms),
                speed: Speed::nearest(speed),
            };
            tail::run_tail(options).await
        }
        Commands::Check { config, json } => check::run_check(&config, json),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(2);
    }
}

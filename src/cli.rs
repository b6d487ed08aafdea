use clap::{Parser, Subcommand};

use crate::commands;

#[derive(Parser)]
#[command(name = "pricefeed")]
#[command(about = "Equity market-data ingestion daemon", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one ingest pass over the given symbols
    Ingest {
        /// Symbols to ingest (falls back to PRICEFEED_SYMBOLS)
        symbols: Vec<String>,
        /// Bypass the pricing gate (audit-logged escape hatch)
        #[arg(long)]
        force: bool,
    },
    /// Fetch and store split-adjusted previous closes
    Bootstrap {
        /// Symbols to bootstrap (falls back to PRICEFEED_SYMBOLS)
        symbols: Vec<String>,
        /// Trading day to bootstrap for (YYYY-MM-DD, default today)
        #[arg(short, long)]
        date: Option<String>,
        /// Also record the official regular close for that day
        #[arg(long)]
        close: bool,
    },
    /// Run the fixed-interval polling worker
    Serve,
    /// Show pricing state and stored rows for today
    Status {
        /// Symbols to inspect (falls back to PRICEFEED_SYMBOLS)
        symbols: Vec<String>,
    },
}

pub fn run() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest { symbols, force } => {
            commands::ingest::run(symbols, force);
        }
        Commands::Bootstrap {
            symbols,
            date,
            close,
        } => {
            commands::bootstrap::run(symbols, date, close);
        }
        Commands::Serve => {
            commands::serve::run();
        }
        Commands::Status { symbols } => {
            commands::status::run(symbols);
        }
    }
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod formatters;
pub mod progress;

#[derive(Parser)]
#[command(name = "gainsledger")]
#[command(
    version,
    about = "Crypto transaction ledger with transfer reconciliation and capital gains"
)]
#[command(
    long_about = "Import transactions from CSV files into a local ledger, link transfers between your own accounts, fill in USD prices and compute realized gains per tax lot (FIFO, LIFO, TaxMin or Estimate)."
)]
pub struct Cli {
    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Output results in JSON format
    #[arg(long = "json", global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the ledger database (overrides the config file)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the ledger database
    Init,

    /// Import transactions from a CSV file
    Import {
        /// Path to the CSV file
        file: PathBuf,

        /// Preview only, don't save to database
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Link transfers between your own accounts
    Reconcile,

    /// Price data management
    Prices {
        #[command(subcommand)]
        action: PriceCommands,
    },

    /// Realized gains
    Gains {
        #[command(subcommand)]
        action: GainsCommands,
    },

    /// Import configured sources, reconcile, backfill prices, calculate and summarize gains
    Run,
}

#[derive(Subcommand)]
pub enum PriceCommands {
    /// Import a daily price CSV (date,price) for a currency
    Import {
        /// Currency code (e.g., BTC)
        currency: String,

        /// Path to the CSV file
        file: PathBuf,
    },

    /// Fill missing USD prices from trades and daily prices
    Backfill,
}

#[derive(Subcommand)]
pub enum GainsCommands {
    /// Recalculate all disposals
    Calculate,

    /// Show realized gains by year, currency and term
    Summary {
        /// Only show this year
        #[arg(short, long)]
        year: Option<i32>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["gainsledger", "gains", "summary", "--year", "2018", "--json"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Some(Commands::Gains {
                action: GainsCommands::Summary { year },
            }) => assert_eq!(year, Some(2018)),
            _ => panic!("expected gains summary"),
        }
    }
}

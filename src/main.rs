mod cli;
mod dispatcher;
mod log;

use clap::{CommandFactory, Parser};
use cli::Cli;
use colored::Colorize;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    log::init_logging(cli.verbose);

    if cli.no_color {
        colored::control::set_override(false);
    }

    if cli.command.is_none() {
        if let Err(e) = Cli::command().print_help() {
            tracing::error!("Failed to print help: {}", e);
        }
        return;
    }

    if let Err(e) = dispatcher::dispatch(cli).await {
        tracing::error!("{:#}", e);
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

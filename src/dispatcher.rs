//! Command dispatcher that routes parsed CLI commands to the library.

use anyhow::{Context, Result};
use colored::Colorize;
use rusqlite::Connection;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use gainsledger::config::AppConfig;
use gainsledger::importers::{self, ImportSummary};
use gainsledger::prices::{self, BackfillReport};
use gainsledger::reconcile::{self, ReconcileReport};
use gainsledger::reports::{self, GainsSummary};
use gainsledger::tax::{self, DisposalPolicySelector, GainsReport};
use gainsledger::db;

use crate::cli::formatters::{
    format_backfill_report, format_empty_summary, format_gains_report, format_gains_summary_table,
    format_import_preview, format_import_summary, format_json, format_reconcile_report,
};
use crate::cli::progress::ProgressPrinter;
use crate::cli::{Cli, Commands, GainsCommands, PriceCommands};

/// Shared state for one command invocation
struct Session {
    config: AppConfig,
    db_path: Option<PathBuf>,
    json: bool,
}

impl Session {
    fn open(&self) -> Result<Connection> {
        db::init_database(self.db_path.clone())?;
        db::open_db(self.db_path.clone())
    }

    fn selector(&self) -> DisposalPolicySelector {
        DisposalPolicySelector::new(self.config.disposal.clone())
    }

    fn printer(&self) -> ProgressPrinter {
        ProgressPrinter::new(self.json)
    }
}

/// Route a parsed command to its handler
pub async fn dispatch(cli: Cli) -> Result<()> {
    let Some(command) = cli.command else {
        return Ok(());
    };

    let config = AppConfig::load(cli.config.as_deref())?;
    // --db wins over the config file
    let db_path = cli.db.clone().or_else(|| config.database.clone());
    let ctx = Session {
        config,
        db_path,
        json: cli.json,
    };

    match command {
        Commands::Init => dispatch_init(&ctx),
        Commands::Import { file, dry_run } => dispatch_import(&ctx, &file, dry_run),
        Commands::Reconcile => dispatch_reconcile(&ctx),
        Commands::Prices { action } => match action {
            PriceCommands::Import { currency, file } => dispatch_price_import(&ctx, &currency, &file),
            PriceCommands::Backfill => dispatch_backfill(&ctx),
        },
        Commands::Gains { action } => match action {
            GainsCommands::Calculate => dispatch_gains_calculate(&ctx),
            GainsCommands::Summary { year } => dispatch_gains_summary(&ctx, year),
        },
        Commands::Run => dispatch_run(&ctx),
    }
}

fn dispatch_init(ctx: &Session) -> Result<()> {
    let path = match &ctx.db_path {
        Some(p) => p.clone(),
        None => db::get_default_db_path()?,
    };
    db::init_database(Some(path.clone()))?;

    if ctx.json {
        println!("{}", format_json(&serde_json::json!({ "database": path })));
    } else {
        println!("{} Ledger ready at {}", "✓".green().bold(), path.display());
    }
    Ok(())
}

fn dispatch_import(ctx: &Session, file: &Path, dry_run: bool) -> Result<()> {
    info!("Importing transactions from: {:?}", file);

    if dry_run {
        let rows = importers::parse_file_csv(file)?;
        let preview = importers::preview_rows(&rows);
        if ctx.json {
            println!("{}", format_json(&preview));
        } else {
            print!("{}", format_import_preview(&rows, &preview));
        }
        return Ok(());
    }

    let mut conn = ctx.open()?;
    let summary = import_with_printer(ctx, &mut conn, file)?;
    if ctx.json {
        println!("{}", format_json(&summary));
    } else {
        print!("{}", format_import_summary(&summary));
    }
    Ok(())
}

fn import_with_printer(ctx: &Session, conn: &mut Connection, file: &Path) -> Result<ImportSummary> {
    let mut printer = ctx.printer();
    let summary = importers::import_file_with_progress(conn, file, |ev| printer.on_event(ev))
        .with_context(|| format!("Failed to import {}", file.display()))?;
    printer.finish();
    Ok(summary)
}

fn reconcile_with_printer(ctx: &Session, conn: &mut Connection) -> Result<ReconcileReport> {
    let mut printer = ctx.printer();
    let report = reconcile::reconcile_transfers_with_progress(conn, |ev| printer.on_event(ev))?;
    printer.finish();
    Ok(report)
}

fn backfill_with_printer(ctx: &Session, conn: &mut Connection) -> Result<BackfillReport> {
    let mut printer = ctx.printer();
    let report = prices::backfill_prices_with_progress(conn, |ev| printer.on_event(ev))?;
    printer.finish();
    Ok(report)
}

fn gains_with_printer(
    ctx: &Session,
    conn: &mut Connection,
    selector: &mut DisposalPolicySelector,
) -> Result<GainsReport> {
    let mut printer = ctx.printer();
    let report = tax::calculate_gains_with_progress(conn, selector, |ev| printer.on_event(ev))?;
    printer.finish();
    Ok(report)
}

fn dispatch_reconcile(ctx: &Session) -> Result<()> {
    let mut conn = ctx.open()?;
    let report = reconcile_with_printer(ctx, &mut conn)?;
    if ctx.json {
        println!("{}", format_json(&report));
    } else {
        print!("{}", format_reconcile_report(&report));
    }
    Ok(())
}

fn dispatch_price_import(ctx: &Session, currency: &str, file: &Path) -> Result<()> {
    let mut conn = ctx.open()?;
    let imported = prices::import_daily_prices(&mut conn, currency, file)?;
    if ctx.json {
        println!(
            "{}",
            format_json(&serde_json::json!({ "currency": currency.to_uppercase(), "imported": imported }))
        );
    } else {
        println!(
            "{} Imported {} daily prices for {}",
            "✓".green().bold(),
            imported,
            currency.to_uppercase()
        );
    }
    Ok(())
}

fn dispatch_backfill(ctx: &Session) -> Result<()> {
    let mut conn = ctx.open()?;
    let report = backfill_with_printer(ctx, &mut conn)?;
    if ctx.json {
        println!("{}", format_json(&report));
    } else {
        print!("{}", format_backfill_report(&report));
    }
    Ok(())
}

fn dispatch_gains_calculate(ctx: &Session) -> Result<()> {
    let mut conn = ctx.open()?;
    let mut selector = ctx.selector();
    let report = gains_with_printer(ctx, &mut conn, &mut selector)?;
    if ctx.json {
        println!("{}", format_json(&report));
    } else {
        print!("{}", format_gains_report(&report));
    }
    Ok(())
}

fn print_summary(ctx: &Session, summary: &GainsSummary) {
    if ctx.json {
        println!("{}", format_json(summary));
    } else if summary.is_empty() {
        print!("{}", format_empty_summary());
    } else {
        print!("{}", format_gains_summary_table(summary));
    }
}

fn dispatch_gains_summary(ctx: &Session, year: Option<i32>) -> Result<()> {
    let conn = ctx.open()?;
    let mut selector = ctx.selector();
    let summary = reports::gains_summary(&conn, &mut selector, year)?;
    print_summary(ctx, &summary);
    Ok(())
}

#[derive(Serialize)]
struct RunReport {
    imports: Vec<ImportSummary>,
    daily_prices: usize,
    reconcile: ReconcileReport,
    backfill: BackfillReport,
    gains: GainsReport,
    summary: GainsSummary,
}

/// The full pipeline over the configured sources
fn dispatch_run(ctx: &Session) -> Result<()> {
    let mut conn = ctx.open()?;

    let mut imports = Vec::new();
    for path in ctx.config.file_sources() {
        let summary = import_with_printer(ctx, &mut conn, &path)?;
        if !ctx.json {
            println!(
                "{} {}: {} transactions",
                "✓".green().bold(),
                path.display(),
                summary.transactions
            );
        }
        imports.push(summary);
    }

    let mut daily_prices = 0;
    for price in &ctx.config.prices {
        daily_prices += prices::import_daily_prices(&mut conn, &price.currency, &price.path)?;
    }

    let reconcile = reconcile_with_printer(ctx, &mut conn)?;
    let backfill = backfill_with_printer(ctx, &mut conn)?;
    let mut selector = ctx.selector();
    let gains = gains_with_printer(ctx, &mut conn, &mut selector)?;
    let summary = reports::gains_summary(&conn, &mut selector, None)?;

    if ctx.json {
        let report = RunReport {
            imports,
            daily_prices,
            reconcile,
            backfill,
            gains,
            summary,
        };
        println!("{}", format_json(&report));
    } else {
        print!("{}", format_reconcile_report(&reconcile));
        print!("{}", format_backfill_report(&backfill));
        print!("{}", format_gains_report(&gains));
        print_summary(ctx, &summary);
    }
    Ok(())
}

//! Output formatting module for CLI display
//!
//! This module handles all terminal output formatting, separating
//! the concerns of data calculation from presentation.

use colored::Colorize;
use rust_decimal::Decimal;
use serde::Serialize;
use tabled::{
    settings::{object::Columns, Alignment, Style},
    Table, Tabled,
};

use gainsledger::importers::{FileRow, ImportPreview, ImportSummary};
use gainsledger::prices::BackfillReport;
use gainsledger::reconcile::ReconcileReport;
use gainsledger::reports::GainsSummary;
use gainsledger::tax::GainsReport;
use gainsledger::utils::format_usd;

/// Serialize any report for `--json` output
pub fn format_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}

fn colored_usd(value: Decimal) -> String {
    if value >= Decimal::ZERO {
        format_usd(value).green().to_string()
    } else {
        format_usd(value).red().to_string()
    }
}

/// Format the gains summary as a table, one block per year
pub fn format_gains_summary_table(summary: &GainsSummary) -> String {
    #[derive(Tabled)]
    struct SummaryLine {
        #[tabled(rename = "Year")]
        year: String,
        #[tabled(rename = "Currency")]
        currency: String,
        #[tabled(rename = "Method")]
        method: String,
        #[tabled(rename = "Short")]
        short: String,
        #[tabled(rename = "Long")]
        long: String,
        #[tabled(rename = "Total")]
        total: String,
    }

    let rows: Vec<SummaryLine> = summary
        .rows
        .iter()
        .map(|r| {
            let currency = if r.is_total() {
                r.currency.bold().to_string()
            } else {
                r.currency.clone()
            };
            SummaryLine {
                year: r.year.to_string(),
                currency,
                method: r.method.clone(),
                short: colored_usd(r.short),
                long: colored_usd(r.long),
                total: colored_usd(r.total),
            }
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::modern());
    // Right-align the money columns
    table.modify(Columns::new(3..), Alignment::right());

    format!("\n{} Realized gains\n\n{}\n", "📊".cyan().bold(), table)
}

pub fn format_empty_summary() -> String {
    format!(
        "{} No disposals found\nCalculate gains first using: {} gains calculate\n",
        "ℹ".blue().bold(),
        "gainsledger".bold()
    )
}

/// Preview of parsed file rows (up to 10) for dry runs
pub fn format_import_preview(rows: &[FileRow], preview: &ImportPreview) -> String {
    #[derive(Tabled)]
    struct RowPreview<'a> {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Source")]
        source: &'a str,
        #[tabled(rename = "Currency")]
        currency: &'a str,
        #[tabled(rename = "Type")]
        tx_type: &'a str,
        #[tabled(rename = "Amount")]
        amount: String,
        #[tabled(rename = "USD Value")]
        usd_value: String,
    }

    let lines: Vec<RowPreview> = rows
        .iter()
        .take(10)
        .map(|r| RowPreview {
            date: r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            source: r.source.as_str(),
            currency: r.currency.as_str(),
            tx_type: r.tx_type.as_str(),
            amount: r.amount.to_string(),
            usd_value: r.usd_value.map(format_usd).unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    let mut output = format!("\n{} Found {} rows\n\n", "✓".green().bold(), preview.rows);

    if !lines.is_empty() {
        let mut table = Table::new(lines);
        table.with(Style::rounded());
        table.modify(Columns::new(4..), Alignment::right());
        output.push_str(&table.to_string());
        output.push('\n');
    }

    if rows.len() > 10 {
        output.push_str(&format!("\n... and {} more rows\n", rows.len() - 10));
    }

    for (account, count) in &preview.by_account {
        output.push_str(&format!("  {:<30} {}\n", account, count));
    }

    output.push_str(&format!("\n{} Dry run - no changes saved\n", "ℹ".blue().bold()));
    output
}

pub fn format_import_summary(summary: &ImportSummary) -> String {
    let mut output = format!("\n{} Import complete!\n", "✓".green().bold());
    output.push_str(&format!("  Transactions: {}\n", summary.transactions.to_string().green()));
    if summary.fees > 0 {
        output.push_str(&format!("  Fee rows: {}\n", summary.fees));
    }
    if summary.deleted > 0 {
        output.push_str(&format!(
            "  Replaced: {}\n",
            summary.deleted.to_string().yellow()
        ));
    }
    output.push_str(&format!("  Accounts: {}\n", summary.accounts));
    output
}

pub fn format_reconcile_report(report: &ReconcileReport) -> String {
    format!(
        "\n{} Transfers reconciled\n  Exact: {}\n  Fuzzy: {}\n  Autodetected: {}\n  Fee rows created: {}\n",
        "✓".green().bold(),
        report.exact,
        report.fuzzy,
        report.autodetected,
        report.fees_created
    )
}

pub fn format_backfill_report(report: &BackfillReport) -> String {
    let mut output = format!(
        "\n{} Prices backfilled\n  From trades: {}\n  From daily prices: {}\n",
        "✓".green().bold(),
        report.from_trades,
        report.from_daily_prices
    );
    if report.still_missing > 0 {
        output.push_str(&format!(
            "  Still missing: {}\n",
            report.still_missing.to_string().yellow()
        ));
    }
    output
}

pub fn format_gains_report(report: &GainsReport) -> String {
    let mut output = format!(
        "\n{} Calculated {} disposals\n",
        "✓".green().bold(),
        report.total_disposals()
    );
    for c in &report.completed {
        output.push_str(&format!(
            "  {:<6} {} disposals, {} still open\n",
            c.currency, c.disposals, c.still_open
        ));
    }
    for s in &report.skipped {
        output.push_str(&format!(
            "  {} {} skipped: {}\n",
            "⚠".yellow().bold(),
            s.currency,
            s.reason
        ));
    }
    output
}

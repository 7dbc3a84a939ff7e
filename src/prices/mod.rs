//! Offline price backfill
//!
//! Fills missing USD prices from two places: the other leg of the same trade,
//! and a table of daily prices imported from CSV files. Rows neither can price
//! stay as gaps and are reported by the gains calculator.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use csv::ReaderBuilder;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

use crate::db::{self, DailyPrice, TransactionType};
use crate::error::LedgerError;
use crate::progress::ProgressEvent;
use crate::utils::round_money;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackfillReport {
    pub from_trades: usize,
    pub from_daily_prices: usize,
    pub still_missing: usize,
}

/// Copy the USD value of the quote leg of a trade onto the base leg.
///
/// Both legs share an exchange reference and must mirror each other's amount
/// and exchange value; a mismatch means the trade was imported wrongly and is
/// fatal. Only the value is copied, the per-unit price is derived again for
/// the base currency.
pub fn backfill_trade_values_with_progress<F>(conn: &mut Connection, on_event: &mut F) -> Result<usize>
where
    F: FnMut(ProgressEvent),
{
    let candidates: Vec<_> = db::list_transactions_missing_price(conn)?
        .into_iter()
        .filter(|t| {
            t.tx_type != TransactionType::Transfer
                && t.exchange_reference.is_some()
                && t.exchange_currency.is_some()
        })
        .collect();

    let store = conn.transaction()?;
    let total = candidates.len();
    let mut updated = 0;

    for (i, mut base) in candidates.into_iter().enumerate() {
        on_event(ProgressEvent::step("Backfilling trade prices", i + 1, total));

        let (Some(reference), Some(quote_currency)) =
            (base.exchange_reference.clone(), base.exchange_currency.clone())
        else {
            continue;
        };

        let Some(quote) = db::find_exchange_counterpart(&store, &quote_currency, &reference)? else {
            warn!(
                "No {} leg for trade {} of transaction {:?}",
                quote_currency, reference, base.id
            );
            continue;
        };

        if Some(quote.amount) != base.exchange_value || quote.exchange_value != Some(base.amount) {
            return Err(LedgerError::InvalidTransaction(format!(
                "trade {} legs disagree: {} {} for {:?} {} but the {} leg is {} {} for {:?}",
                reference,
                base.amount,
                base.currency,
                base.exchange_value,
                quote_currency,
                quote.currency,
                quote.amount,
                quote.currency,
                quote.exchange_value
            ))
            .into());
        }

        if let Some(value) = quote.usd_value {
            base.usd_value = Some(value);
            db::save_transaction(&store, &mut base)?;
            updated += 1;
        }
    }

    store.commit()?;
    info!("Backfilled {} prices from trade counterparts", updated);
    Ok(updated)
}

/// Import a daily price CSV for a currency.
///
/// The file needs a date column and a price column; other columns are
/// ignored. Dates may carry a time part, only the day is kept.
pub fn import_daily_prices(conn: &mut Connection, currency: &str, path: &Path) -> Result<usize> {
    let mut reader = ReaderBuilder::new()
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open price file: {}", path.display()))?;

    let headers = reader
        .headers()
        .context("Failed to read CSV headers")?
        .clone();

    let mut date_idx = None;
    let mut price_idx = None;
    for (idx, header) in headers.iter().enumerate() {
        match header.to_lowercase().as_str() {
            "date" | "time" | "timestamp" => date_idx = Some(idx),
            "price" | "usd" | "close" | "usd_price" => price_idx = Some(idx),
            _ => {}
        }
    }
    let date_idx = date_idx.ok_or_else(|| anyhow!("Date column not found in {}", path.display()))?;
    let price_idx = price_idx.ok_or_else(|| anyhow!("Price column not found in {}", path.display()))?;

    let currency = currency.to_uppercase();
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());

    let store = conn.transaction()?;
    let mut imported = 0;

    for (idx, result) in reader.records().enumerate() {
        let record = result.context("Failed to read CSV record")?;
        let row_num = idx + 2;

        let date_text = record.get(date_idx).unwrap_or("");
        let price_text = record.get(price_idx).unwrap_or("");
        if date_text.is_empty() || price_text.is_empty() {
            warn!("Skipping incomplete price row {}", row_num);
            continue;
        }

        let day = date_text
            .split(['T', ' '])
            .next()
            .unwrap_or(date_text);
        let price_date = NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|_| {
            LedgerError::Parse(format!("row {}: could not parse date '{}'", row_num, date_text))
        })?;
        let usd_price = Decimal::from_str(price_text).map_err(|_| {
            LedgerError::Parse(format!("row {}: '{}' is not a price", row_num, price_text))
        })?;

        db::upsert_daily_price(
            &store,
            &DailyPrice {
                currency: currency.clone(),
                price_date,
                usd_price,
                source: source.clone(),
            },
        )?;
        imported += 1;
    }

    store.commit()?;
    info!("Imported {} daily {} prices from {:?}", imported, currency, path);
    Ok(imported)
}

/// Price rows still missing a USD price from the daily price table
pub fn backfill_daily_prices_with_progress<F>(conn: &mut Connection, on_event: &mut F) -> Result<usize>
where
    F: FnMut(ProgressEvent),
{
    let missing = db::list_transactions_missing_price(conn)?;
    let store = conn.transaction()?;
    let total = missing.len();
    let mut updated = 0;

    for (i, mut tx) in missing.into_iter().enumerate() {
        on_event(ProgressEvent::step("Backfilling daily prices", i + 1, total));

        if tx.amount.is_zero() {
            continue;
        }
        let Some(price) = db::get_daily_price(&store, &tx.currency, tx.timestamp.date_naive())? else {
            continue;
        };

        tx.usd_value = Some(round_money(price * tx.amount.abs()));
        db::save_transaction(&store, &mut tx)?;
        updated += 1;
    }

    store.commit()?;
    info!("Backfilled {} prices from daily prices", updated);
    Ok(updated)
}

/// Run both backfills, trade legs first
pub fn backfill_prices_with_progress<F>(conn: &mut Connection, mut on_event: F) -> Result<BackfillReport>
where
    F: FnMut(ProgressEvent),
{
    let from_trades = backfill_trade_values_with_progress(conn, &mut on_event)?;
    let from_daily_prices = backfill_daily_prices_with_progress(conn, &mut on_event)?;
    let still_missing = db::list_transactions_missing_price(conn)?
        .iter()
        .filter(|t| t.tx_type != TransactionType::Transfer)
        .count();

    if still_missing > 0 {
        warn!("{} transactions still have no USD price", still_missing);
    }

    on_event(ProgressEvent::persist(format!(
        "Backfilled {} prices from trades and {} from daily prices ({} still missing)",
        from_trades, from_daily_prices, still_missing
    )));

    Ok(BackfillReport {
        from_trades,
        from_daily_prices,
        still_missing,
    })
}

pub fn backfill_prices(conn: &mut Connection) -> Result<BackfillReport> {
    backfill_prices_with_progress(conn, |_| {})
}

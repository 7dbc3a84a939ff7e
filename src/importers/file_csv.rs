use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::ReaderBuilder;
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::{AccountCache, ImportSummary};
use crate::db::{self, Transaction, TransactionType};
use crate::error::LedgerError;
use crate::progress::ProgressEvent;
use crate::utils::{fee_from_rate, round_money};

/// One parsed row of a transactions file
#[derive(Debug, Clone, PartialEq)]
pub struct FileRow {
    pub line: usize,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub currency: String,
    pub tx_type: TransactionType,
    pub type_text: String,
    pub amount: Decimal,
    pub fee: Option<Decimal>,
    pub fee_rate: Option<Decimal>,
    pub usd_value: Option<Decimal>,
    pub exchange_currency: Option<String>,
    pub exchange_value: Option<Decimal>,
    pub exchange_reference: Option<String>,
    pub reference: Option<String>,
    pub description: Option<String>,
}

impl FileRow {
    /// Account source string for rows of this file source
    pub fn account_source(&self) -> String {
        format!("file:{}", self.source)
    }
}

#[derive(Debug)]
struct FileColumnMapping {
    date: usize,
    source: usize,
    currency: usize,
    tx_type: usize,
    amount: usize,
    fee: Option<usize>,
    fee_rate: Option<usize>,
    usd_value: Option<usize>,
    exchange_currency: Option<usize>,
    exchange_value: Option<usize>,
    exchange_reference: Option<usize>,
    reference: Option<usize>,
    description: Option<usize>,
}

fn find_columns(headers: &csv::StringRecord) -> Result<FileColumnMapping> {
    let mut date_idx = None;
    let mut source_idx = None;
    let mut currency_idx = None;
    let mut type_idx = None;
    let mut amount_idx = None;
    let mut fee_idx = None;
    let mut fee_rate_idx = None;
    let mut usd_value_idx = None;
    let mut exchange_currency_idx = None;
    let mut exchange_value_idx = None;
    let mut exchange_reference_idx = None;
    let mut reference_idx = None;
    let mut description_idx = None;

    for (idx, header) in headers.iter().enumerate() {
        // usd_value, usdValue and USD Value all normalize to "usdvalue"
        let text: String = header
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();

        match text.as_str() {
            "date" | "timestamp" => date_idx = Some(idx),
            "source" => source_idx = Some(idx),
            "currency" => currency_idx = Some(idx),
            "type" => type_idx = Some(idx),
            "amount" => amount_idx = Some(idx),
            "fee" => fee_idx = Some(idx),
            "feerate" => fee_rate_idx = Some(idx),
            "usdvalue" => usd_value_idx = Some(idx),
            "exchangecurrency" => exchange_currency_idx = Some(idx),
            "exchangevalue" => exchange_value_idx = Some(idx),
            "exchangereference" | "tradeid" => exchange_reference_idx = Some(idx),
            "reference" => reference_idx = Some(idx),
            "description" => description_idx = Some(idx),
            _ => debug!("Ignoring column '{}'", header),
        }
    }

    Ok(FileColumnMapping {
        date: date_idx.ok_or_else(|| anyhow!("Date column not found"))?,
        source: source_idx.ok_or_else(|| anyhow!("Source column not found"))?,
        currency: currency_idx.ok_or_else(|| anyhow!("Currency column not found"))?,
        tx_type: type_idx.ok_or_else(|| anyhow!("Type column not found"))?,
        amount: amount_idx.ok_or_else(|| anyhow!("Amount column not found"))?,
        fee: fee_idx,
        fee_rate: fee_rate_idx,
        usd_value: usd_value_idx,
        exchange_currency: exchange_currency_idx,
        exchange_value: exchange_value_idx,
        exchange_reference: exchange_reference_idx,
        reference: reference_idx,
        description: description_idx,
    })
}

/// Parse a transactions CSV file.
///
/// Lines starting with `#` and empty lines are ignored, as are rows with no
/// source. Any malformed row fails the whole parse.
pub fn parse_file_csv<P: AsRef<Path>>(file_path: P) -> Result<Vec<FileRow>> {
    let path = file_path.as_ref();
    info!("Parsing transactions file: {:?}", path);

    let mut reader = ReaderBuilder::new()
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;

    let headers = reader
        .headers()
        .context("Failed to read CSV headers")?
        .clone();

    let column_mapping = find_columns(&headers)?;
    debug!("Column mapping: {:?}", column_mapping);

    let mut rows = Vec::new();

    for result in reader.records() {
        let record = result.context("Failed to read CSV record")?;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(rows.len() + 2);

        if let Some(row) = parse_file_row(&record, &column_mapping, line)
            .with_context(|| format!("Invalid row at line {} of {}", line, path.display()))?
        {
            rows.push(row);
        }
    }

    info!("Parsed {} rows from {:?}", rows.len(), path);
    Ok(rows)
}

fn optional_field<'r>(record: &'r csv::StringRecord, idx: Option<usize>) -> Option<&'r str> {
    idx.and_then(|i| record.get(i)).filter(|s| !s.is_empty())
}

fn optional_decimal(record: &csv::StringRecord, idx: Option<usize>, name: &str) -> Result<Option<Decimal>> {
    optional_field(record, idx)
        .map(|s| parse_decimal(s).with_context(|| format!("Invalid {}", name)))
        .transpose()
}

fn parse_file_row(
    record: &csv::StringRecord,
    mapping: &FileColumnMapping,
    line: usize,
) -> Result<Option<FileRow>> {
    let source = record.get(mapping.source).unwrap_or("").to_string();
    if source.is_empty() {
        return Ok(None);
    }

    let date_str = record
        .get(mapping.date)
        .ok_or_else(|| anyhow!("Missing date"))?;
    let timestamp = parse_timestamp(date_str)?;

    let currency = record
        .get(mapping.currency)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("Missing currency"))?
        .to_uppercase();

    let type_text = record
        .get(mapping.tx_type)
        .ok_or_else(|| anyhow!("Missing type"))?
        .to_string();
    let tx_type = TransactionType::from_str(&type_text)
        .map_err(|_| LedgerError::Parse(format!("unknown transaction type '{}'", type_text)))?;

    let amount_str = record
        .get(mapping.amount)
        .ok_or_else(|| anyhow!("Missing amount"))?;
    let amount = parse_decimal(amount_str).context("Invalid amount")?;

    // sends must be negative and receives positive
    match tx_type {
        TransactionType::Send if amount >= Decimal::ZERO => {
            return Err(LedgerError::InvalidTransaction(format!(
                "send of {} {} must be negative",
                amount, currency
            ))
            .into())
        }
        TransactionType::Receive if amount <= Decimal::ZERO => {
            return Err(LedgerError::InvalidTransaction(format!(
                "receive of {} {} must be positive",
                amount, currency
            ))
            .into())
        }
        _ => {}
    }

    Ok(Some(FileRow {
        line,
        timestamp,
        source,
        currency,
        tx_type,
        type_text,
        amount,
        fee: optional_decimal(record, mapping.fee, "fee")?,
        fee_rate: optional_decimal(record, mapping.fee_rate, "fee rate")?,
        usd_value: optional_decimal(record, mapping.usd_value, "usd value")?,
        exchange_currency: optional_field(record, mapping.exchange_currency).map(|s| s.to_uppercase()),
        exchange_value: optional_decimal(record, mapping.exchange_value, "exchange value")?,
        exchange_reference: optional_field(record, mapping.exchange_reference).map(|s| s.to_string()),
        reference: optional_field(record, mapping.reference).map(|s| s.to_string()),
        description: optional_field(record, mapping.description).map(|s| s.to_string()),
    }))
}

/// Parse a timestamp as UTC. Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`,
/// `YYYY-MM-DDTHH:MM:SS` and bare dates (midnight).
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }

    Err(LedgerError::Parse(format!("could not parse date '{}'", text)).into())
}

fn parse_decimal(text: &str) -> Result<Decimal> {
    let cleaned = text.trim().replace([',', '$', ' '], "");
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map_err(|_| LedgerError::Parse(format!("'{}' is not a number", text)).into())
}

/// Import parsed rows.
///
/// Every existing transaction of the sources named in `rows` is deleted first
/// (after unlinking its transfer counterpart) so re-importing a file never
/// duplicates rows. The import runs in one store transaction.
pub fn import_rows_with_progress<F>(
    conn: &mut Connection,
    rows: &[FileRow],
    cache: &mut AccountCache,
    mut on_event: F,
) -> Result<ImportSummary>
where
    F: FnMut(ProgressEvent),
{
    let sources: Vec<String> = rows
        .iter()
        .map(|r| r.account_source())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let store = conn.transaction()?;
    let mut summary = ImportSummary {
        rows: rows.len(),
        ..ImportSummary::default()
    };

    summary.deleted = db::delete_transactions_for_sources(&store, &sources)?;
    if summary.deleted > 0 {
        warn!(
            "Deleted {} existing transactions from {}",
            summary.deleted,
            sources.join(", ")
        );
    }

    let total = rows.len();
    for (i, row) in rows.iter().enumerate() {
        on_event(ProgressEvent::step("Importing transactions", i + 1, total));

        let account = cache.get_or_create(&store, &row.source, &row.currency)?;
        let account_id = account.id.ok_or_else(|| anyhow!("Account has no id"))?;

        let mut tx = Transaction::new(account_id, row.timestamp, row.amount, row.currency.clone(), row.tx_type);
        tx.source = account.source.clone();
        tx.reference = row.reference.clone();
        tx.source_type = Some(row.type_text.clone());
        tx.source_description = row.description.clone();
        tx.usd_value = row.usd_value;
        tx.exchange_currency = row.exchange_currency.clone();
        tx.exchange_value = row.exchange_value;
        tx.exchange_reference = row.exchange_reference.clone();

        // exchange fee charged on the received side of a trade
        if let Some(rate) = row.fee_rate {
            if row.amount > Decimal::ZERO && !rate.is_zero() {
                tx.amount -= fee_from_rate(row.amount, rate);
            }
        }

        db::save_transaction(&store, &mut tx)
            .with_context(|| format!("Failed to save row at line {}", row.line))?;
        summary.transactions += 1;

        // network fees are only paid on the sending side
        if let Some(fee) = row.fee {
            if row.amount < Decimal::ZERO && !fee.is_zero() {
                let fee_amount = -fee.abs();
                let mut fee_tx = Transaction::new(
                    account_id,
                    row.timestamp,
                    fee_amount,
                    row.currency.clone(),
                    TransactionType::Fee,
                );
                fee_tx.source = account.source.clone();
                if let Some(price) = tx.usd_price {
                    fee_tx.usd_value = Some(round_money(price * fee_amount));
                }
                db::save_transaction(&store, &mut fee_tx)?;
                summary.fees += 1;
            }
        }
    }

    store.commit()?;
    summary.accounts = cache.len();

    on_event(ProgressEvent::persist(format!(
        "Imported {} transactions and {} fee rows from {} sources",
        summary.transactions,
        summary.fees,
        sources.len()
    )));

    Ok(summary)
}

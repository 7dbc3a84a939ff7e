//! Realized gains calculation
//!
//! Each currency is walked independently, oldest transaction first. Positive
//! rows open lots and non-positive rows are disposed against the open lots
//! chosen by the disposal method of the row's year. The disposals table is
//! rebuilt from scratch on every run.

use anyhow::{Context, Result};
use chrono::Datelike;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::db::{self, Disposal, Transaction};
use crate::error::LedgerError;
use crate::progress::ProgressEvent;
use crate::tax::lots::{Lot, LotLedger};
use crate::tax::policy::DisposalPolicySelector;

/// Disposals and lot totals of one currency walk
#[derive(Debug, Clone)]
pub struct CurrencyWalk {
    pub currency: String,
    pub disposals: Vec<Disposal>,
    pub lots: LotLedger,
}

/// Outcome of a completed currency
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CurrencyGains {
    pub currency: String,
    pub disposals: usize,
    pub opened: Decimal,
    pub disposed: Decimal,
    pub still_open: Decimal,
}

/// A currency whose calculation was abandoned
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SkippedCurrency {
    pub currency: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GainsReport {
    pub completed: Vec<CurrencyGains>,
    pub skipped: Vec<SkippedCurrency>,
}

impl GainsReport {
    pub fn total_disposals(&self) -> usize {
        self.completed.iter().map(|c| c.disposals).sum()
    }
}

fn require_price(tx: &Transaction) -> Result<Decimal, LedgerError> {
    tx.usd_price.ok_or_else(|| LedgerError::MissingPrice {
        currency: tx.currency.clone(),
        transaction_id: tx.id.unwrap_or_default(),
        timestamp: tx.timestamp.to_rfc3339(),
    })
}

/// Walk one currency's transactions and match every disposal against lots.
///
/// `transactions` must be non-transfer rows of `currency` ordered by
/// timestamp then id. Nothing is persisted here.
pub fn walk_currency(
    currency: &str,
    transactions: &[Transaction],
    selector: &mut DisposalPolicySelector,
) -> Result<CurrencyWalk, LedgerError> {
    let mut lots = LotLedger::new();
    let mut disposals = Vec::new();

    for tx in transactions {
        let tx_id = tx.require_id()?;
        // zero rows neither open a lot nor dispose, and carry no price
        if tx.amount.is_zero() {
            continue;
        }
        let usd_price = require_price(tx)?;

        if tx.amount > Decimal::ZERO {
            lots.open(Lot {
                transaction_id: tx_id,
                remaining: tx.amount,
                usd_price,
                acquired_at: tx.timestamp,
            });
            continue;
        }

        let method = selector.method_for_year(tx.timestamp.year())?;
        let mut remaining = tx.amount.abs();

        while remaining > Decimal::ZERO {
            let index = method
                .select_lot(&lots, remaining, usd_price, tx.timestamp)
                .ok_or_else(|| LedgerError::NoOpenLots {
                    currency: currency.to_string(),
                    transaction_id: tx_id,
                    remaining,
                })?;

            let consumed = lots
                .consume(index, remaining)
                .ok_or_else(|| LedgerError::NoOpenLots {
                    currency: currency.to_string(),
                    transaction_id: tx_id,
                    remaining,
                })?;

            remaining -= consumed.amount;

            let cost_basis = consumed.amount * consumed.lot.usd_price;
            let sale_price = consumed.amount * usd_price;

            disposals.push(Disposal {
                id: None,
                currency: currency.to_string(),
                buy_transaction_id: consumed.lot.transaction_id,
                sell_transaction_id: tx_id,
                acquired_at: consumed.lot.acquired_at,
                disposed_at: tx.timestamp,
                amount: consumed.amount,
                cost_basis,
                sale_price,
                gain: sale_price - cost_basis,
            });
        }
    }

    Ok(CurrencyWalk {
        currency: currency.to_string(),
        disposals,
        lots,
    })
}

/// Recompute all disposals.
///
/// A missing price abandons only the affected currency; every other failure
/// aborts the run. The disposals of a currency are written in one store
/// transaction after its walk succeeds.
pub fn calculate_gains_with_progress<F>(
    conn: &mut Connection,
    selector: &mut DisposalPolicySelector,
    mut on_event: F,
) -> Result<GainsReport>
where
    F: FnMut(ProgressEvent),
{
    let removed = db::truncate_disposals(conn).context("Failed to truncate disposals")?;
    info!("Truncated {} disposals", removed);

    let currencies = db::distinct_account_currencies(conn)?;
    let total = currencies.len();
    let mut report = GainsReport::default();

    for (i, currency) in currencies.iter().enumerate() {
        on_event(ProgressEvent::step(
            format!("Calculating gains ({})", currency),
            i + 1,
            total,
        ));

        let transactions = db::list_gain_transactions(conn, currency)?;

        let walk = match walk_currency(currency, &transactions, selector) {
            Ok(walk) => walk,
            Err(e) if e.is_recoverable() => {
                warn!("Skipping {}: {}", currency, e);
                on_event(ProgressEvent::persist(format!("Skipped {}: {}", currency, e)));
                report.skipped.push(SkippedCurrency {
                    currency: currency.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
            Err(e) => {
                return Err(e).context(format!("Failed to calculate gains for {}", currency))
            }
        };

        let tx = conn.transaction()?;
        for disposal in &walk.disposals {
            db::insert_disposal(&tx, disposal)?;
        }
        tx.commit()?;

        info!(
            "{}: {} disposals, {} still open",
            currency,
            walk.disposals.len(),
            walk.lots.open_amount()
        );

        report.completed.push(CurrencyGains {
            currency: currency.clone(),
            disposals: walk.disposals.len(),
            opened: walk.lots.opened(),
            disposed: walk.lots.disposed(),
            still_open: walk.lots.open_amount(),
        });
    }

    on_event(ProgressEvent::persist(format!(
        "Calculated {} disposals across {} currencies",
        report.total_disposals(),
        report.completed.len()
    )));

    Ok(report)
}

/// Recompute all disposals without progress output
pub fn calculate_gains(
    conn: &mut Connection,
    selector: &mut DisposalPolicySelector,
) -> Result<GainsReport> {
    calculate_gains_with_progress(conn, selector, |_| {})
}

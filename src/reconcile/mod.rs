//! Transfer reconciliation
//!
//! Finds the outgoing and incoming rows that describe the same movement of
//! funds between the user's own accounts and links them. Passes run in a fixed
//! order and each only sees rows left unlinked by the earlier ones:
//!
//! 1. exact amount, positive transfer rows
//! 2. exact amount, negative transfer rows
//! 3. amount within 1%, positive transfer rows
//! 4. amount within 1%, negative transfer rows
//! 5. identical timestamp and opposite amount, any type
//!
//! A final validation refuses to finish while any link is one-sided or any
//! transfer row is still unlinked.

pub mod associate;

use anyhow::{Context, Result};
use chrono::Duration;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use crate::db::{self, Transaction, TransactionType};
use crate::error::LedgerError;
use crate::progress::ProgressEvent;
use crate::utils::round_money;
pub use associate::{associate, TransferFee};

/// Maximum distance between the two timestamps of a transfer
pub const MATCH_WINDOW_HOURS: i64 = 1;

/// Relative amount tolerance of the fuzzy passes
pub const FUZZY_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AmountMatch {
    Exact,
    Fuzzy,
}

/// Counts of what a reconciliation run linked
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub exact: usize,
    pub fuzzy: usize,
    pub autodetected: usize,
    pub fees_created: usize,
}

impl ReconcileReport {
    pub fn linked(&self) -> usize {
        self.exact + self.fuzzy + self.autodetected
    }
}

fn amount_matches(candidate: Decimal, primary: Decimal, matching: AmountMatch) -> bool {
    let target = -primary;
    match matching {
        AmountMatch::Exact => candidate == target,
        AmountMatch::Fuzzy => {
            let a = target * (Decimal::ONE - FUZZY_TOLERANCE);
            let b = target * (Decimal::ONE + FUZZY_TOLERANCE);
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            candidate >= low && candidate <= high
        }
    }
}

/// Best unlinked counterpart of `set[primary]`.
///
/// `transfer` rows are preferred; send/receive rows are only considered when
/// no transfer row matches. Within a tier the closest timestamp wins, then
/// the lowest id.
fn find_counterpart(set: &[Transaction], primary: usize, matching: AmountMatch) -> Option<usize> {
    let p = &set[primary];
    let window = Duration::hours(MATCH_WINDOW_HOURS);

    let tiers: [fn(TransactionType) -> bool; 2] = [
        |t| t == TransactionType::Transfer,
        |t| matches!(t, TransactionType::Send | TransactionType::Receive),
    ];

    for tier in tiers {
        let best = set
            .iter()
            .enumerate()
            .filter(|(j, c)| {
                *j != primary
                    && !c.is_linked()
                    && tier(c.tx_type)
                    && c.currency == p.currency
                    && (c.timestamp - p.timestamp).abs() <= window
                    && amount_matches(c.amount, p.amount, matching)
            })
            .min_by_key(|(_, c)| ((c.timestamp - p.timestamp).abs(), c.id));

        if let Some((j, _)) = best {
            return Some(j);
        }
    }

    None
}

/// Row with the same timestamp, currency and exactly opposite amount
fn find_autodetect_counterpart(set: &[Transaction], primary: usize) -> Option<usize> {
    let p = &set[primary];
    set.iter()
        .enumerate()
        .filter(|(j, c)| {
            *j != primary
                && !c.is_linked()
                && c.timestamp == p.timestamp
                && c.currency == p.currency
                && c.amount == -p.amount
        })
        .min_by_key(|(_, c)| c.id)
        .map(|(j, _)| j)
}

/// Link `set[i]` and `set[j]` and persist both rows plus any fee row in one
/// store transaction. Returns whether a new fee row was created.
fn link_pair(conn: &mut Connection, set: &mut Vec<Transaction>, i: usize, j: usize) -> Result<bool> {
    let mut a = set[i].clone();
    let mut b = set[j].clone();
    let fee = associate(&mut a, &mut b)?;

    let store = conn.transaction()?;
    db::save_transaction(&store, &mut a)?;
    db::save_transaction(&store, &mut b)?;

    let mut fee_row = None;
    let mut created = false;
    if let Some(fee) = fee {
        let mut row =
            match db::find_fee_transaction(&store, fee.account_id, fee.amount, fee.timestamp)? {
                Some(existing) => existing,
                None => {
                    created = true;
                    Transaction::new(
                        fee.account_id,
                        fee.timestamp,
                        fee.amount,
                        fee.currency.clone(),
                        TransactionType::Fee,
                    )
                }
            };
        row.amount = fee.amount;
        row.source_amount = Some(fee.amount);
        row.currency = fee.currency.clone();
        row.source = fee.source.clone();
        if let Some(price) = fee.usd_price {
            row.usd_value = Some(round_money(price * fee.amount));
        }
        db::save_transaction(&store, &mut row)?;
        debug!("Fee {} {} on account {}", fee.amount, fee.currency, fee.account_id);
        fee_row = Some(row);
    }

    store.commit()?;

    set[i] = a;
    set[j] = b;
    if let Some(row) = fee_row {
        match set.iter().position(|t| t.id == row.id) {
            Some(k) => set[k] = row,
            None => set.push(row),
        }
    }

    Ok(created)
}

fn run_pass<F>(
    conn: &mut Connection,
    set: &mut Vec<Transaction>,
    direction: Direction,
    matching: AmountMatch,
    report: &mut ReconcileReport,
    on_event: &mut F,
) -> Result<()>
where
    F: FnMut(ProgressEvent),
{
    let primaries: Vec<usize> = set
        .iter()
        .enumerate()
        .filter(|(_, t)| {
            t.tx_type == TransactionType::Transfer
                && !t.is_linked()
                && match direction {
                    Direction::Incoming => t.amount > Decimal::ZERO,
                    Direction::Outgoing => t.amount < Decimal::ZERO,
                }
        })
        .map(|(i, _)| i)
        .collect();

    let label = format!(
        "{} transfers ({})",
        match matching {
            AmountMatch::Exact => "Exact",
            AmountMatch::Fuzzy => "Fuzzy",
        },
        match direction {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        }
    );

    let total = primaries.len();
    for (n, &i) in primaries.iter().enumerate() {
        on_event(ProgressEvent::step(label.clone(), n + 1, total));

        if set[i].is_linked() {
            continue;
        }
        let Some(j) = find_counterpart(set, i, matching) else {
            continue;
        };

        if link_pair(conn, set, i, j)? {
            report.fees_created += 1;
        }
        match matching {
            AmountMatch::Exact => report.exact += 1,
            AmountMatch::Fuzzy => report.fuzzy += 1,
        }
    }

    Ok(())
}

fn run_autodetect<F>(
    conn: &mut Connection,
    set: &mut Vec<Transaction>,
    report: &mut ReconcileReport,
    on_event: &mut F,
) -> Result<()>
where
    F: FnMut(ProgressEvent),
{
    let primaries: Vec<usize> = set
        .iter()
        .enumerate()
        .filter(|(_, t)| t.amount < Decimal::ZERO && !t.is_linked())
        .map(|(i, _)| i)
        .collect();

    let total = primaries.len();
    for (n, &i) in primaries.iter().enumerate() {
        on_event(ProgressEvent::step("Autodetecting transfers", n + 1, total));

        if set[i].is_linked() {
            continue;
        }
        let Some(j) = find_autodetect_counterpart(set, i) else {
            continue;
        };

        if link_pair(conn, set, i, j)? {
            report.fees_created += 1;
        }
        report.autodetected += 1;
    }

    Ok(())
}

fn describe_rows(rows: &[Transaction]) -> String {
    rows.iter()
        .map(|t| {
            format!(
                "  #{} {} {} {} {}",
                t.id.unwrap_or_default(),
                t.timestamp.format("%Y-%m-%d %H:%M:%S"),
                t.source,
                t.currency,
                t.amount
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fail when any link is one-sided or any transfer row is unlinked
pub fn validate_transfers(conn: &Connection) -> Result<()> {
    let mismatched = db::find_mismatched_transfers(conn)?;
    if !mismatched.is_empty() {
        return Err(LedgerError::Reconciliation(format!(
            "found {} mismatched transfers:\n{}",
            mismatched.len(),
            describe_rows(&mismatched)
        ))
        .into());
    }

    let unreconciled = db::find_unreconciled_transfers(conn)?;
    if !unreconciled.is_empty() {
        return Err(LedgerError::Reconciliation(format!(
            "found {} unreconciled transfers:\n{}",
            unreconciled.len(),
            describe_rows(&unreconciled)
        ))
        .into());
    }

    Ok(())
}

/// Run every reconciliation pass, then validate the result.
///
/// Each linked pair is committed on its own, so links made before a failure
/// stay in the store.
pub fn reconcile_transfers_with_progress<F>(conn: &mut Connection, mut on_event: F) -> Result<ReconcileReport>
where
    F: FnMut(ProgressEvent),
{
    let mut set = db::list_transactions(conn).context("Failed to load transactions")?;
    let mut report = ReconcileReport::default();

    info!("Reconciling transfers across {} transactions", set.len());

    for (direction, matching) in [
        (Direction::Incoming, AmountMatch::Exact),
        (Direction::Outgoing, AmountMatch::Exact),
        (Direction::Incoming, AmountMatch::Fuzzy),
        (Direction::Outgoing, AmountMatch::Fuzzy),
    ] {
        run_pass(conn, &mut set, direction, matching, &mut report, &mut on_event)?;
    }
    run_autodetect(conn, &mut set, &mut report, &mut on_event)?;

    on_event(ProgressEvent::persist(format!(
        "Linked {} transfers ({} exact, {} fuzzy, {} autodetected), {} fee rows created",
        report.linked(),
        report.exact,
        report.fuzzy,
        report.autodetected,
        report.fees_created
    )));

    validate_transfers(conn)?;

    info!("Reconciliation complete: {:?}", report);
    Ok(report)
}

/// Run reconciliation without progress output
pub fn reconcile_transfers(conn: &mut Connection) -> Result<ReconcileReport> {
    reconcile_transfers_with_progress(conn, |_| {})
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fuzzy_bounds_are_inclusive_for_both_signs() {
        assert!(amount_matches(dec!(0.99), dec!(-1), AmountMatch::Fuzzy));
        assert!(amount_matches(dec!(1.01), dec!(-1), AmountMatch::Fuzzy));
        assert!(!amount_matches(dec!(0.9899), dec!(-1), AmountMatch::Fuzzy));

        assert!(amount_matches(dec!(-0.99), dec!(1), AmountMatch::Fuzzy));
        assert!(amount_matches(dec!(-1.01), dec!(1), AmountMatch::Fuzzy));
        assert!(!amount_matches(dec!(-1.0101), dec!(1), AmountMatch::Fuzzy));
    }

    #[test]
    fn test_exact_match_requires_negation() {
        assert!(amount_matches(dec!(1.0), dec!(-1), AmountMatch::Exact));
        assert!(!amount_matches(dec!(0.999), dec!(-1), AmountMatch::Exact));
        assert!(!amount_matches(dec!(-1), dec!(-1), AmountMatch::Exact));
    }
}

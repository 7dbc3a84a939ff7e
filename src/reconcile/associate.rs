use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::db::{Transaction, TransactionType};
use crate::error::LedgerError;

/// Fee implied by a linked pair whose amounts are not exact negatives
#[derive(Debug, Clone, PartialEq)]
pub struct TransferFee {
    pub account_id: i64,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
    pub currency: String,
    pub source: String,
    pub usd_price: Option<Decimal>,
}

/// Link two rows as one transfer.
///
/// Both rows become `transfer` and point at each other. A known USD value on
/// one side fills a missing one on the other. When less arrived than was sent
/// the difference is returned as a fee and the outgoing amount is reduced so
/// the pair nets to zero. Receiving more than was sent is an error.
pub fn associate(a: &mut Transaction, b: &mut Transaction) -> Result<Option<TransferFee>, LedgerError> {
    if a.currency != b.currency {
        return Err(LedgerError::Reconciliation(format!(
            "cannot link {} transaction {:?} with {} transaction {:?}",
            a.currency, a.id, b.currency, b.id
        )));
    }

    let a_id = a.require_id()?;
    let b_id = b.require_id()?;

    a.tx_type = TransactionType::Transfer;
    a.transfer_transaction_id = Some(b_id);
    b.tx_type = TransactionType::Transfer;
    b.transfer_transaction_id = Some(a_id);

    match (a.usd_value, b.usd_value) {
        (None, Some(value)) => a.usd_value = Some(value),
        (Some(value), None) => b.usd_value = Some(value),
        _ => {}
    }

    if -a.amount == b.amount {
        return Ok(None);
    }

    let fee = a.amount + b.amount;
    if fee >= Decimal::ZERO {
        return Err(LedgerError::TransferFee(format!(
            "transaction {} ({} {}) and transaction {} ({} {})",
            a_id, a.amount, a.currency, b_id, b.amount, b.currency
        )));
    }

    let outgoing = if a.amount < Decimal::ZERO { a } else { b };
    outgoing.amount -= fee;

    Ok(Some(TransferFee {
        account_id: outgoing.account_id,
        amount: fee,
        timestamp: outgoing.timestamp,
        currency: outgoing.currency.clone(),
        source: outgoing.source.clone(),
        usd_price: outgoing.usd_price,
    }))
}

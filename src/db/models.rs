use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::LedgerError;
use crate::utils::round_money;

/// Account imported from a source (exchange wallet, CSV file, ...)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Option<i64>,
    pub source: String,
    pub reference: String,
    pub name: String,
    pub currency: String,
}

/// Transaction type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TransactionType {
    Buy,
    Sell,
    Send,
    Receive,
    Transfer,
    Fee,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Buy => "buy",
            TransactionType::Sell => "sell",
            TransactionType::Send => "send",
            TransactionType::Receive => "receive",
            TransactionType::Transfer => "transfer",
            TransactionType::Fee => "fee",
        }
    }

    /// Whether an amount of this sign is allowed for the type.
    /// Transfers and fees may carry either sign; zero is always allowed.
    pub fn accepts_amount(&self, amount: Decimal) -> bool {
        match self {
            TransactionType::Buy | TransactionType::Receive => amount >= Decimal::ZERO,
            TransactionType::Sell | TransactionType::Send => amount <= Decimal::ZERO,
            TransactionType::Transfer | TransactionType::Fee => true,
        }
    }
}

impl FromStr for TransactionType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(TransactionType::Buy),
            "sell" => Ok(TransactionType::Sell),
            "send" | "withdrawal" => Ok(TransactionType::Send),
            "receive" | "deposit" => Ok(TransactionType::Receive),
            "transfer" => Ok(TransactionType::Transfer),
            "fee" => Ok(TransactionType::Fee),
            _ => Err(()),
        }
    }
}

/// A single movement of one currency in one account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: Option<i64>,
    pub account_id: i64,
    pub reference: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub amount: Decimal,
    pub currency: String,
    pub tx_type: TransactionType,
    pub exchange_reference: Option<String>,
    pub exchange_value: Option<Decimal>,
    pub exchange_currency: Option<String>,
    pub usd_value: Option<Decimal>,
    pub usd_price: Option<Decimal>,
    pub transfer_transaction_id: Option<i64>,
    pub source: String,
    pub source_amount: Option<Decimal>, // amount as reported, before fee adjustments
    pub source_type: Option<String>,
    pub source_description: Option<String>,
}

impl Transaction {
    /// New unsaved transaction with every optional field empty
    pub fn new(
        account_id: i64,
        timestamp: DateTime<Utc>,
        amount: Decimal,
        currency: impl Into<String>,
        tx_type: TransactionType,
    ) -> Self {
        Self {
            id: None,
            account_id,
            reference: None,
            timestamp,
            amount,
            currency: currency.into(),
            tx_type,
            exchange_reference: None,
            exchange_value: None,
            exchange_currency: None,
            usd_value: None,
            usd_price: None,
            transfer_transaction_id: None,
            source: String::new(),
            source_amount: Some(amount),
            source_type: None,
            source_description: None,
        }
    }

    /// Row id of a persisted transaction
    pub fn require_id(&self) -> Result<i64, LedgerError> {
        self.id.ok_or_else(|| {
            LedgerError::InvalidTransaction(format!(
                "{} {} {} at {} has not been saved",
                self.tx_type.as_str(),
                self.amount,
                self.currency,
                self.timestamp
            ))
        })
    }

    /// Recompute usd_value/usd_price from the stored fields.
    /// Must run before every write so the derived price never goes stale.
    pub fn apply_derived_fields(&mut self) {
        let (usd_value, usd_price) = derive_usd_pricing(
            self.amount,
            self.usd_value,
            self.exchange_currency.as_deref(),
            self.exchange_value,
        );
        self.usd_value = usd_value;
        self.usd_price = usd_price;
    }

    /// Check the sign/type invariant before persisting
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.currency.trim().is_empty() {
            return Err(LedgerError::InvalidTransaction(format!(
                "transaction at {} has no currency",
                self.timestamp
            )));
        }
        if !self.tx_type.accepts_amount(self.amount) {
            return Err(LedgerError::InvalidTransaction(format!(
                "{} of {} {} at {} has the wrong sign",
                self.tx_type.as_str(),
                self.amount,
                self.currency,
                self.timestamp
            )));
        }
        Ok(())
    }

    pub fn is_linked(&self) -> bool {
        self.transfer_transaction_id.is_some()
    }
}

/// Derive (usd_value, usd_price) for a transaction.
///
/// A USD exchange value is the exact trade value, so it replaces any other
/// usd_value. The per-unit price is |usd_value / amount|; it is unknown when
/// the value is unknown or the amount is zero.
pub fn derive_usd_pricing(
    amount: Decimal,
    usd_value: Option<Decimal>,
    exchange_currency: Option<&str>,
    exchange_value: Option<Decimal>,
) -> (Option<Decimal>, Option<Decimal>) {
    let usd_value = match (exchange_currency, exchange_value) {
        (Some(currency), Some(value)) if currency.eq_ignore_ascii_case("USD") => {
            Some(round_money(value))
        }
        _ => usd_value,
    };

    let usd_price = match usd_value {
        Some(value) if !amount.is_zero() => Some(round_money((value / amount).abs())),
        _ => None,
    };

    (usd_value, usd_price)
}

/// Holding period classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    Short,
    Long,
}

impl Term {
    pub fn as_str(&self) -> &'static str {
        match self {
            Term::Short => "short",
            Term::Long => "long",
        }
    }

    /// Long-term when acquired strictly before the instant one calendar year
    /// before disposal (same time of day); otherwise short-term.
    pub fn for_holding(acquired_at: DateTime<Utc>, disposed_at: DateTime<Utc>) -> Term {
        let cutoff = one_year_before(disposed_at.date_naive())
            .and_time(disposed_at.time())
            .and_utc();
        if acquired_at < cutoff {
            Term::Long
        } else {
            Term::Short
        }
    }
}

impl FromStr for Term {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" => Ok(Term::Short),
            "long" => Ok(Term::Long),
            _ => Err(()),
        }
    }
}

/// Same calendar date one year earlier. Feb 29 has no counterpart in the
/// previous year and rolls forward to Mar 1.
pub fn one_year_before(date: NaiveDate) -> NaiveDate {
    date.with_year(date.year() - 1)
        .unwrap_or_else(|| date - Days::new(365))
}

/// Realized gain/loss of one amount matched against one lot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Disposal {
    pub id: Option<i64>,
    pub currency: String,
    pub buy_transaction_id: i64,
    pub sell_transaction_id: i64,
    pub acquired_at: DateTime<Utc>,
    pub disposed_at: DateTime<Utc>,
    pub amount: Decimal,
    pub cost_basis: Decimal,
    pub sale_price: Decimal,
    pub gain: Decimal,
}

impl Disposal {
    pub fn term(&self) -> Term {
        Term::for_holding(self.acquired_at, self.disposed_at)
    }

    /// Copy with money fields rounded to cents, each from its own full
    /// precision value. The amount is kept as-is.
    pub fn rounded(&self) -> Disposal {
        Disposal {
            cost_basis: round_money(self.cost_basis),
            sale_price: round_money(self.sale_price),
            gain: round_money(self.gain),
            ..self.clone()
        }
    }
}

/// Daily USD price for a currency
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyPrice {
    pub currency: String,
    pub price_date: NaiveDate,
    pub usd_price: Decimal,
    pub source: String,
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// An open acquisition of a currency with its remaining amount
#[derive(Debug, Clone, PartialEq)]
pub struct Lot {
    pub transaction_id: i64,
    pub remaining: Decimal,
    pub usd_price: Decimal,
    pub acquired_at: DateTime<Utc>,
}

/// Result of consuming part or all of a lot
#[derive(Debug, Clone, PartialEq)]
pub struct Consumed {
    pub lot: Lot,
    pub amount: Decimal,
    pub exhausted: bool,
}

/// Open lots of one currency in acquisition order.
///
/// Owned by a single gains pass. Tracks how much was opened and disposed so
/// the pass can check conservation at the end.
#[derive(Debug, Clone)]
pub struct LotLedger {
    lots: VecDeque<Lot>,
    opened: Decimal,
    disposed: Decimal,
}

impl LotLedger {
    pub fn new() -> Self {
        Self {
            lots: VecDeque::new(),
            opened: Decimal::ZERO,
            disposed: Decimal::ZERO,
        }
    }

    /// Append a newly acquired lot. Non-positive amounts are ignored.
    pub fn open(&mut self, lot: Lot) {
        if lot.remaining <= Decimal::ZERO {
            return;
        }
        self.opened += lot.remaining;
        self.lots.push_back(lot);
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lots.len()
    }

    pub fn get(&self, index: usize) -> Option<&Lot> {
        self.lots.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Lot> {
        self.lots.iter()
    }

    /// Take up to `wanted` from the lot at `index`.
    ///
    /// When the lot holds more than wanted it shrinks and stays open;
    /// otherwise the whole lot is consumed and removed.
    pub fn consume(&mut self, index: usize, wanted: Decimal) -> Option<Consumed> {
        let lot = self.lots.get_mut(index)?;

        let consumed = if lot.remaining > wanted {
            lot.remaining -= wanted;
            Consumed {
                lot: lot.clone(),
                amount: wanted,
                exhausted: false,
            }
        } else {
            let lot = self.lots.remove(index)?;
            let amount = lot.remaining;
            Consumed {
                lot,
                amount,
                exhausted: true,
            }
        };

        self.disposed += consumed.amount;
        Some(consumed)
    }

    /// Total amount ever opened
    pub fn opened(&self) -> Decimal {
        self.opened
    }

    /// Total amount consumed so far
    pub fn disposed(&self) -> Decimal {
        self.disposed
    }

    /// Amount still held across open lots
    pub fn open_amount(&self) -> Decimal {
        self.lots.iter().map(|l| l.remaining).sum()
    }
}

impl Default for LotLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn lot(id: i64, amount: Decimal) -> Lot {
        Lot {
            transaction_id: id,
            remaining: amount,
            usd_price: dec!(100),
            acquired_at: Utc.with_ymd_and_hms(2017, 1, id as u32, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_partial_consumption_keeps_lot_open() {
        let mut ledger = LotLedger::new();
        ledger.open(lot(1, dec!(2)));

        let c = ledger.consume(0, dec!(0.5)).unwrap();
        assert_eq!(c.amount, dec!(0.5));
        assert!(!c.exhausted);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get(0).unwrap().remaining, dec!(1.5));
    }

    #[test]
    fn test_exact_consumption_removes_lot() {
        let mut ledger = LotLedger::new();
        ledger.open(lot(1, dec!(1)));
        ledger.open(lot(2, dec!(1)));

        let c = ledger.consume(0, dec!(1)).unwrap();
        assert!(c.exhausted);
        assert_eq!(c.lot.transaction_id, 1);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get(0).unwrap().transaction_id, 2);
    }

    #[test]
    fn test_over_consumption_returns_what_was_held() {
        let mut ledger = LotLedger::new();
        ledger.open(lot(1, dec!(0.3)));

        let c = ledger.consume(0, dec!(1)).unwrap();
        assert_eq!(c.amount, dec!(0.3));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_conservation_totals() {
        let mut ledger = LotLedger::new();
        ledger.open(lot(1, dec!(1.25)));
        ledger.open(lot(2, dec!(0.75)));
        ledger.open(lot(3, dec!(0)));
        ledger.consume(1, dec!(0.5));
        ledger.consume(0, dec!(2));

        assert_eq!(ledger.opened(), dec!(2));
        assert_eq!(ledger.disposed(), dec!(1.75));
        assert_eq!(ledger.open_amount(), dec!(0.25));
        assert_eq!(ledger.opened(), ledger.disposed() + ledger.open_amount());
    }

    #[test]
    fn test_consume_out_of_range() {
        let mut ledger = LotLedger::new();
        assert!(ledger.consume(0, dec!(1)).is_none());
    }
}

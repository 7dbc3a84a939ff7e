//! Disposal policies and the per-year policy selector

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;

use crate::config::DisposalMethodConfig;
use crate::db::Term;
use crate::error::LedgerError;
use crate::tax::lots::{Lot, LotLedger};

/// Estimated short-term rate when none is configured
pub const DEFAULT_SHORT_TERM_TAX_RATE: Decimal = Decimal::from_parts(35, 0, 0, false, 2);
/// Estimated long-term rate when none is configured
pub const DEFAULT_LONG_TERM_TAX_RATE: Decimal = Decimal::from_parts(15, 0, 0, false, 2);

/// Lot selection strategy for one tax year
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposalMethod {
    Fifo,
    Lifo,
    TaxMin,
    Estimate {
        short_term_rate: Decimal,
        long_term_rate: Decimal,
    },
}

impl DisposalMethod {
    /// Estimate with the default rates
    pub fn estimate() -> Self {
        DisposalMethod::Estimate {
            short_term_rate: DEFAULT_SHORT_TERM_TAX_RATE,
            long_term_rate: DEFAULT_LONG_TERM_TAX_RATE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DisposalMethod::Fifo => "FIFO",
            DisposalMethod::Lifo => "LIFO",
            DisposalMethod::TaxMin => "TaxMin",
            DisposalMethod::Estimate { .. } => "Estimate",
        }
    }

    /// Build and validate a method from its configuration entry
    pub fn from_config(year: i32, config: &DisposalMethodConfig) -> Result<Self, LedgerError> {
        let err = |reason: String| LedgerError::DisposalConfig { year, reason };

        let normalized = config.method.trim().to_ascii_lowercase().replace(['-', '_'], "");
        let method = match normalized.as_str() {
            "fifo" => DisposalMethod::Fifo,
            "lifo" => DisposalMethod::Lifo,
            "taxmin" => DisposalMethod::TaxMin,
            "estimate" | "minimize" => {
                let short_term_rate = config
                    .short_term_tax_rate
                    .unwrap_or(DEFAULT_SHORT_TERM_TAX_RATE);
                let long_term_rate = config
                    .long_term_tax_rate
                    .unwrap_or(DEFAULT_LONG_TERM_TAX_RATE);

                for (label, rate) in [("short_term_tax_rate", short_term_rate), ("long_term_tax_rate", long_term_rate)] {
                    if rate <= Decimal::ZERO || rate >= Decimal::ONE {
                        return Err(err(format!(
                            "{} must be between 0 and 1 (exclusive), got {}",
                            label, rate
                        )));
                    }
                }

                DisposalMethod::Estimate {
                    short_term_rate,
                    long_term_rate,
                }
            }
            "" => return Err(err("no disposal method given".to_string())),
            _ => {
                return Err(err(format!(
                    "unknown disposal method '{}' (expected FIFO, LIFO, TaxMin or Estimate)",
                    config.method
                )))
            }
        };

        if !matches!(method, DisposalMethod::Estimate { .. })
            && (config.short_term_tax_rate.is_some() || config.long_term_tax_rate.is_some())
        {
            return Err(err(format!(
                "tax rates only apply to the Estimate method, not {}",
                method.name()
            )));
        }

        Ok(method)
    }

    /// Pick the open lot to dispose from next.
    ///
    /// `needed` is the amount of the disposal still unmatched and
    /// `disposal_price` its per-unit USD price. Returns None when no lot is open.
    pub fn select_lot(
        &self,
        lots: &LotLedger,
        needed: Decimal,
        disposal_price: Decimal,
        disposed_at: DateTime<Utc>,
    ) -> Option<usize> {
        if lots.is_empty() {
            return None;
        }

        match self {
            DisposalMethod::Fifo => Some(0),
            DisposalMethod::Lifo => Some(lots.len() - 1),
            DisposalMethod::TaxMin => select_tax_min(lots, disposal_price, disposed_at),
            DisposalMethod::Estimate {
                short_term_rate,
                long_term_rate,
            } => select_estimate(
                lots,
                needed,
                disposal_price,
                disposed_at,
                *short_term_rate,
                *long_term_rate,
            ),
        }
    }
}

impl fmt::Display for DisposalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Preference rank for TaxMin; lower is disposed first
fn tax_min_rank(lot: &Lot, disposal_price: Decimal, disposed_at: DateTime<Utc>) -> u8 {
    let is_loss = disposal_price < lot.usd_price;
    match (Term::for_holding(lot.acquired_at, disposed_at), is_loss) {
        (Term::Short, true) => 0,
        (Term::Long, true) => 1,
        (Term::Long, false) => 2,
        (Term::Short, false) => 3,
    }
}

fn select_tax_min(
    lots: &LotLedger,
    disposal_price: Decimal,
    disposed_at: DateTime<Utc>,
) -> Option<usize> {
    let mut best: Option<(usize, u8, Decimal)> = None;

    for (index, lot) in lots.iter().enumerate() {
        let rank = tax_min_rank(lot, disposal_price, disposed_at);
        let better = match best {
            None => true,
            Some((_, best_rank, best_price)) => {
                rank < best_rank || (rank == best_rank && lot.usd_price > best_price)
            }
        };
        if better {
            best = Some((index, rank, lot.usd_price));
        }
    }

    best.map(|(index, _, _)| index)
}

fn select_estimate(
    lots: &LotLedger,
    needed: Decimal,
    disposal_price: Decimal,
    disposed_at: DateTime<Utc>,
    short_term_rate: Decimal,
    long_term_rate: Decimal,
) -> Option<usize> {
    let mut best: Option<(usize, Decimal)> = None;

    for (index, lot) in lots.iter().enumerate() {
        let amount = lot.remaining.min(needed);
        if amount <= Decimal::ZERO {
            continue;
        }

        let gain = amount * disposal_price - amount * lot.usd_price;
        let rate = match Term::for_holding(lot.acquired_at, disposed_at) {
            Term::Short => short_term_rate,
            Term::Long => long_term_rate,
        };
        let normalized_tax = gain * rate / amount;

        // strict comparison keeps the first lot on ties
        if best.map_or(true, |(_, lowest)| normalized_tax < lowest) {
            best = Some((index, normalized_tax));
        }
    }

    best.map(|(index, _)| index)
}

/// Resolves the disposal method of each tax year.
///
/// Entries are validated on the first lookup of their year and cached for the
/// rest of the run.
#[derive(Debug, Clone, Default)]
pub struct DisposalPolicySelector {
    configured: BTreeMap<String, DisposalMethodConfig>,
    fixed: Option<DisposalMethod>,
    cache: HashMap<i32, DisposalMethod>,
}

impl DisposalPolicySelector {
    /// Selector over a year map. The `default` key covers unlisted years.
    pub fn new(configured: BTreeMap<String, DisposalMethodConfig>) -> Self {
        Self {
            configured,
            fixed: None,
            cache: HashMap::new(),
        }
    }

    /// Selector that applies one method to every year
    pub fn uniform(method: DisposalMethod) -> Self {
        Self {
            configured: BTreeMap::new(),
            fixed: Some(method),
            cache: HashMap::new(),
        }
    }

    pub fn method_for_year(&mut self, year: i32) -> Result<DisposalMethod, LedgerError> {
        if let Some(method) = self.fixed {
            return Ok(method);
        }
        if let Some(method) = self.cache.get(&year) {
            return Ok(*method);
        }

        let entry = self
            .configured
            .get(&year.to_string())
            .or_else(|| self.configured.get("default"))
            .ok_or_else(|| LedgerError::DisposalConfig {
                year,
                reason: "no disposal method configured for this year and no default".to_string(),
            })?;

        let method = DisposalMethod::from_config(year, entry)?;
        debug!("Disposal method for {}: {}", year, method);
        self.cache.insert(year, method);
        Ok(method)
    }

    /// Method name for display, or "?" when the year has no valid entry
    pub fn describe_year(&mut self, year: i32) -> String {
        self.method_for_year(year)
            .map(|m| m.name().to_string())
            .unwrap_or_else(|_| "?".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn lot(id: i64, amount: Decimal, price: Decimal, acquired_at: DateTime<Utc>) -> Lot {
        Lot {
            transaction_id: id,
            remaining: amount,
            usd_price: price,
            acquired_at,
        }
    }

    fn config(method: &str) -> DisposalMethodConfig {
        DisposalMethodConfig {
            method: method.to_string(),
            short_term_tax_rate: None,
            long_term_tax_rate: None,
        }
    }

    #[test]
    fn test_fifo_and_lifo_pick_ends() {
        let mut lots = LotLedger::new();
        lots.open(lot(1, dec!(1), dec!(10), day(2017, 1, 1)));
        lots.open(lot(2, dec!(1), dec!(20), day(2017, 2, 1)));
        lots.open(lot(3, dec!(1), dec!(30), day(2017, 3, 1)));

        let at = day(2017, 6, 1);
        assert_eq!(DisposalMethod::Fifo.select_lot(&lots, dec!(1), dec!(25), at), Some(0));
        assert_eq!(DisposalMethod::Lifo.select_lot(&lots, dec!(1), dec!(25), at), Some(2));
    }

    #[test]
    fn test_every_method_returns_none_without_lots() {
        let lots = LotLedger::new();
        let at = day(2017, 6, 1);
        for method in [
            DisposalMethod::Fifo,
            DisposalMethod::Lifo,
            DisposalMethod::TaxMin,
            DisposalMethod::estimate(),
        ] {
            assert_eq!(method.select_lot(&lots, dec!(1), dec!(1), at), None);
        }
    }

    #[test]
    fn test_tax_min_prefers_short_term_loss_over_long_term_gain() {
        let disposed = day(2018, 6, 1);
        let mut lots = LotLedger::new();
        // long-term gain
        lots.open(lot(1, dec!(1), dec!(100), day(2016, 1, 1)));
        // short-term loss
        lots.open(lot(2, dec!(1), dec!(900), day(2018, 1, 1)));

        let chosen = DisposalMethod::TaxMin.select_lot(&lots, dec!(1), dec!(500), disposed);
        assert_eq!(chosen, Some(1));
    }

    #[test]
    fn test_tax_min_category_order() {
        let disposed = day(2018, 6, 1);
        let price = dec!(500);

        let short_loss = lot(1, dec!(1), dec!(600), day(2018, 1, 1));
        let long_loss = lot(2, dec!(1), dec!(700), day(2016, 1, 1));
        let long_gain = lot(3, dec!(1), dec!(100), day(2016, 2, 1));
        let short_gain = lot(4, dec!(1), dec!(400), day(2018, 2, 1));

        let mut lots = LotLedger::new();
        for l in [short_gain.clone(), long_gain.clone(), long_loss.clone(), short_loss] {
            lots.open(l);
        }
        assert_eq!(DisposalMethod::TaxMin.select_lot(&lots, dec!(1), price, disposed), Some(3));

        let mut lots = LotLedger::new();
        for l in [short_gain.clone(), long_gain.clone(), long_loss] {
            lots.open(l);
        }
        assert_eq!(DisposalMethod::TaxMin.select_lot(&lots, dec!(1), price, disposed), Some(2));

        let mut lots = LotLedger::new();
        for l in [short_gain, long_gain] {
            lots.open(l);
        }
        assert_eq!(DisposalMethod::TaxMin.select_lot(&lots, dec!(1), price, disposed), Some(1));
    }

    #[test]
    fn test_tax_min_picks_highest_basis_within_category() {
        let disposed = day(2018, 6, 1);
        let mut lots = LotLedger::new();
        lots.open(lot(1, dec!(1), dec!(200), day(2018, 1, 1)));
        lots.open(lot(2, dec!(1), dec!(300), day(2018, 2, 1)));
        lots.open(lot(3, dec!(1), dec!(250), day(2018, 3, 1)));

        let chosen = DisposalMethod::TaxMin.select_lot(&lots, dec!(1), dec!(500), disposed);
        assert_eq!(chosen, Some(1));
    }

    #[test]
    fn test_tax_min_zero_gain_counts_as_gain() {
        let disposed = day(2018, 6, 1);
        let mut lots = LotLedger::new();
        // short-term at exactly the sale price
        lots.open(lot(1, dec!(1), dec!(500), day(2018, 1, 1)));
        // long-term gain
        lots.open(lot(2, dec!(1), dec!(100), day(2016, 1, 1)));

        let chosen = DisposalMethod::TaxMin.select_lot(&lots, dec!(1), dec!(500), disposed);
        assert_eq!(chosen, Some(1));
    }

    #[test]
    fn test_estimate_picks_lowest_normalized_tax() {
        let disposed = day(2018, 6, 1);
        let mut lots = LotLedger::new();
        // short-term gain of 100/unit taxed at 0.35 = 35/unit
        lots.open(lot(1, dec!(5), dec!(400), day(2018, 1, 1)));
        // long-term gain of 200/unit taxed at 0.15 = 30/unit
        lots.open(lot(2, dec!(0.1), dec!(300), day(2016, 1, 1)));

        let chosen = DisposalMethod::estimate().select_lot(&lots, dec!(2), dec!(500), disposed);
        assert_eq!(chosen, Some(1));
    }

    #[test]
    fn test_estimate_tie_keeps_first_lot() {
        let disposed = day(2018, 6, 1);
        let mut lots = LotLedger::new();
        lots.open(lot(1, dec!(1), dec!(400), day(2018, 1, 1)));
        lots.open(lot(2, dec!(3), dec!(400), day(2018, 2, 1)));

        let chosen = DisposalMethod::estimate().select_lot(&lots, dec!(2), dec!(500), disposed);
        assert_eq!(chosen, Some(0));
    }

    #[test]
    fn test_from_config_accepts_names_and_alias() {
        assert_eq!(DisposalMethod::from_config(2017, &config("fifo")).unwrap(), DisposalMethod::Fifo);
        assert_eq!(DisposalMethod::from_config(2017, &config("LIFO")).unwrap(), DisposalMethod::Lifo);
        assert_eq!(DisposalMethod::from_config(2017, &config("tax-min")).unwrap(), DisposalMethod::TaxMin);
        assert_eq!(
            DisposalMethod::from_config(2017, &config("Minimize")).unwrap(),
            DisposalMethod::estimate()
        );
    }

    #[test]
    fn test_from_config_rejects_unknown_and_bad_rates() {
        let err = DisposalMethod::from_config(2018, &config("HIFO")).unwrap_err();
        assert!(matches!(err, LedgerError::DisposalConfig { year: 2018, .. }));

        let mut bad = config("Estimate");
        bad.short_term_tax_rate = Some(dec!(1.2));
        assert!(DisposalMethod::from_config(2018, &bad).is_err());

        let mut zero = config("Estimate");
        zero.long_term_tax_rate = Some(dec!(0));
        assert!(DisposalMethod::from_config(2018, &zero).is_err());

        let mut misplaced = config("FIFO");
        misplaced.long_term_tax_rate = Some(dec!(0.2));
        assert!(DisposalMethod::from_config(2018, &misplaced).is_err());
    }

    #[test]
    fn test_selector_uses_year_then_default() {
        let mut map = BTreeMap::new();
        map.insert("default".to_string(), config("FIFO"));
        map.insert("2018".to_string(), config("LIFO"));
        let mut selector = DisposalPolicySelector::new(map);

        assert_eq!(selector.method_for_year(2018).unwrap(), DisposalMethod::Lifo);
        assert_eq!(selector.method_for_year(2017).unwrap(), DisposalMethod::Fifo);
        assert_eq!(selector.describe_year(2019), "FIFO");
    }

    #[test]
    fn test_selector_without_default_fails_for_missing_year() {
        let mut map = BTreeMap::new();
        map.insert("2018".to_string(), config("LIFO"));
        let mut selector = DisposalPolicySelector::new(map);

        let err = selector.method_for_year(2017).unwrap_err();
        assert!(matches!(err, LedgerError::DisposalConfig { year: 2017, .. }));
        assert_eq!(selector.describe_year(2017), "?");
    }
}

use anyhow::Result;
use chrono::Datelike;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::db::{self, Disposal, Term};
use crate::tax::DisposalPolicySelector;

/// Label of the per-year total row
pub const TOTAL_LABEL: &str = "TOTAL";

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct TermTotals {
    short: Decimal,
    long: Decimal,
}

impl TermTotals {
    fn add(&mut self, term: Term, gain: Decimal) {
        match term {
            Term::Short => self.short += gain,
            Term::Long => self.long += gain,
        }
    }

    fn total(&self) -> Decimal {
        self.short + self.long
    }
}

/// One line of the gains summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub year: i32,
    pub currency: String,
    pub method: String,
    pub short: Decimal,
    pub long: Decimal,
    pub total: Decimal,
}

impl SummaryRow {
    pub fn is_total(&self) -> bool {
        self.currency == TOTAL_LABEL
    }
}

/// Realized gains by year, currency and term
#[derive(Debug, Clone, Default, Serialize)]
pub struct GainsSummary {
    pub rows: Vec<SummaryRow>,
}

impl GainsSummary {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.rows.iter().map(|r| r.year).collect();
        years.dedup();
        years
    }
}

/// Aggregate disposals by year of disposal, currency and term.
///
/// Each year lists the currencies with a non-zero total followed by a total
/// row over all of them. Every row carries the year's disposal method.
pub fn summarize_disposals(
    disposals: &[Disposal],
    selector: &mut DisposalPolicySelector,
    year_filter: Option<i32>,
) -> GainsSummary {
    let mut by_year: BTreeMap<i32, BTreeMap<String, TermTotals>> = BTreeMap::new();

    for disposal in disposals {
        let year = disposal.disposed_at.year();
        if year_filter.is_some_and(|y| y != year) {
            continue;
        }
        by_year
            .entry(year)
            .or_default()
            .entry(disposal.currency.clone())
            .or_default()
            .add(disposal.term(), disposal.gain);
    }

    let mut rows = Vec::new();
    for (year, currencies) in by_year {
        let method = selector.describe_year(year);
        let mut year_total = TermTotals::default();

        for (currency, totals) in currencies {
            year_total.short += totals.short;
            year_total.long += totals.long;

            if totals.total().is_zero() {
                continue;
            }
            rows.push(SummaryRow {
                year,
                currency,
                method: method.clone(),
                short: totals.short,
                long: totals.long,
                total: totals.total(),
            });
        }

        rows.push(SummaryRow {
            year,
            currency: TOTAL_LABEL.to_string(),
            method,
            short: year_total.short,
            long: year_total.long,
            total: year_total.total(),
        });
    }

    GainsSummary { rows }
}

/// Summarize the persisted disposals
pub fn gains_summary(
    conn: &Connection,
    selector: &mut DisposalPolicySelector,
    year_filter: Option<i32>,
) -> Result<GainsSummary> {
    let disposals = db::list_disposals(conn)?;
    Ok(summarize_disposals(&disposals, selector, year_filter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tax::DisposalMethod;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn disposal(currency: &str, acquired: DateTime<Utc>, disposed: DateTime<Utc>, gain: Decimal) -> Disposal {
        Disposal {
            id: None,
            currency: currency.to_string(),
            buy_transaction_id: 1,
            sell_transaction_id: 2,
            acquired_at: acquired,
            disposed_at: disposed,
            amount: dec!(1),
            cost_basis: dec!(0),
            sale_price: gain,
            gain,
        }
    }

    #[test]
    fn test_summary_groups_by_year_currency_and_term() {
        let disposals = vec![
            disposal("BTC", day(2017, 1, 1), day(2017, 6, 1), dec!(100)),
            disposal("BTC", day(2015, 1, 1), day(2017, 6, 1), dec!(50.25)),
            disposal("ETH", day(2017, 2, 1), day(2017, 7, 1), dec!(-20)),
            disposal("BTC", day(2017, 1, 1), day(2018, 6, 1), dec!(10)),
        ];
        let mut selector = DisposalPolicySelector::uniform(DisposalMethod::Fifo);
        let summary = summarize_disposals(&disposals, &mut selector, None);

        assert_eq!(summary.years(), vec![2017, 2018]);
        assert_eq!(summary.rows.len(), 5);

        let btc = &summary.rows[0];
        assert_eq!((btc.year, btc.currency.as_str()), (2017, "BTC"));
        assert_eq!(btc.short, dec!(100));
        assert_eq!(btc.long, dec!(50.25));
        assert_eq!(btc.total, dec!(150.25));
        assert_eq!(btc.method, "FIFO");

        let total = &summary.rows[2];
        assert!(total.is_total());
        assert_eq!(total.short, dec!(80));
        assert_eq!(total.total, dec!(130.25));

        // 2017-01-01 to 2018-06-01 is held over a year
        assert_eq!(summary.rows[3].long, dec!(10));
    }

    #[test]
    fn test_zero_total_currency_is_hidden_but_counted() {
        let disposals = vec![
            disposal("BTC", day(2017, 1, 1), day(2017, 6, 1), dec!(10)),
            disposal("BTC", day(2017, 1, 1), day(2017, 6, 2), dec!(-10)),
            disposal("ETH", day(2017, 1, 1), day(2017, 6, 2), dec!(5)),
        ];
        let mut selector = DisposalPolicySelector::uniform(DisposalMethod::Lifo);
        let summary = summarize_disposals(&disposals, &mut selector, None);

        let currencies: Vec<&str> = summary.rows.iter().map(|r| r.currency.as_str()).collect();
        assert_eq!(currencies, vec!["ETH", TOTAL_LABEL]);
        assert_eq!(summary.rows[1].total, dec!(5));
    }

    #[test]
    fn test_year_filter() {
        let disposals = vec![
            disposal("BTC", day(2017, 1, 1), day(2017, 6, 1), dec!(10)),
            disposal("BTC", day(2017, 1, 1), day(2018, 6, 1), dec!(20)),
        ];
        let mut selector = DisposalPolicySelector::uniform(DisposalMethod::Fifo);
        let summary = summarize_disposals(&disposals, &mut selector, Some(2018));

        assert_eq!(summary.years(), vec![2018]);
        assert_eq!(summary.rows.last().map(|r| r.total), Some(dec!(20)));
    }
}

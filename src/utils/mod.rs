//! Utility functions for rounding and formatting
//!
//! The ledger keeps two precisions on purpose: persisted money is rounded to
//! cents, while exchange fee rates are truncated to 8 decimal places the way
//! the exchanges compute them.

use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places kept for persisted USD amounts
pub const MONEY_DP: u32 = 2;

/// Decimal places kept for fee-rate fees
pub const FEE_DP: u32 = 8;

/// Round a USD amount to cents for persistence.
///
/// # Examples
/// ```
/// use gainsledger::utils::round_money;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(round_money(dec!(10.005)), dec!(10.01));
/// assert_eq!(round_money(dec!(-10.005)), dec!(-10.01));
/// ```
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Fee charged as a rate of an amount, truncated to 8 decimal places.
///
/// # Examples
/// ```
/// use gainsledger::utils::fee_from_rate;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(fee_from_rate(dec!(1.23456789), dec!(0.0025)), dec!(0.00308641));
/// ```
pub fn fee_from_rate(amount: Decimal, rate: Decimal) -> Decimal {
    (amount * rate).round_dp_with_strategy(FEE_DP, RoundingStrategy::ToZero)
}

/// Core formatting function with full control over output.
///
/// Formats a Decimal value as US dollars:
/// - Thousands separator: `,`
/// - Decimal separator: `.`
///
/// # Arguments
/// * `value` - The decimal value to format
/// * `width` - Minimum width for padding (0 for no padding, right-aligned)
/// * `symbol` - Whether to include the `$` prefix
///
/// # Examples
/// ```
/// use gainsledger::utils::format_usd_with_width;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_usd_with_width(dec!(1234.56), 0, true), "$1,234.56");
/// assert_eq!(format_usd_with_width(dec!(1234), 12, false), "    1,234.00");
/// ```
pub fn format_usd_with_width(value: Decimal, width: usize, symbol: bool) -> String {
    let is_negative = value < Decimal::ZERO;
    let formatted = format!("{:.2}", round_money(value.abs()));
    let (integer_part, decimal_part) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));

    let with_separators: String = integer_part
        .chars()
        .rev()
        .enumerate()
        .flat_map(|(i, c)| {
            if i > 0 && i % 3 == 0 {
                vec![',', c]
            } else {
                vec![c]
            }
        })
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    let sign = if is_negative { "-" } else { "" };
    let prefix = if symbol { "$" } else { "" };

    let result = format!("{}{}{}.{}", sign, prefix, with_separators, decimal_part);

    if width > 0 && result.len() < width {
        format!("{:>width$}", result, width = width)
    } else {
        result
    }
}

/// Format as US dollars with symbol: "$1,234.56"
///
/// # Examples
/// ```
/// use gainsledger::utils::format_usd;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_usd(dec!(1234.56)), "$1,234.56");
/// assert_eq!(format_usd(dec!(-500)), "-$500.00");
/// ```
pub fn format_usd(value: Decimal) -> String {
    format_usd_with_width(value, 0, true)
}

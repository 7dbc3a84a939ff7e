// Tax module - tax-lot accounting and realized gains

pub mod gains;
pub mod lots;
pub mod policy;

pub use gains::{
    calculate_gains, calculate_gains_with_progress, walk_currency, CurrencyGains, GainsReport,
    SkippedCurrency,
};
pub use lots::{Lot, LotLedger};
pub use policy::{DisposalMethod, DisposalPolicySelector};

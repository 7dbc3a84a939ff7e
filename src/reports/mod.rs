// Reports module - realized gains summaries

pub mod summary;

pub use summary::{gains_summary, summarize_disposals, GainsSummary, SummaryRow, TOTAL_LABEL};

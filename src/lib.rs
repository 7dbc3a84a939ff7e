//! Gainsledger - crypto transaction ledger
//!
//! Imports transactions from several sources into one SQLite ledger, links
//! transfers between the owner's own accounts, fills in missing USD prices
//! and computes realized capital gains per tax lot.

pub mod config;
pub mod db;
pub mod error;
pub mod importers;
pub mod prices;
pub mod progress;
pub mod reconcile;
pub mod reports;
pub mod tax;
pub mod utils;

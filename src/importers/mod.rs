// Import module - transaction files into the ledger

pub mod file_csv;

use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::info;

use crate::db::{self, Account};
use crate::progress::ProgressEvent;
pub use file_csv::{parse_file_csv, FileRow};

/// Accounts resolved during one import run, keyed by account reference
#[derive(Debug, Default)]
pub struct AccountCache {
    accounts: HashMap<String, Account>,
}

impl AccountCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for a file source and currency, created on first use
    pub fn get_or_create(&mut self, conn: &Connection, source: &str, currency: &str) -> Result<&Account> {
        let reference = format!("file:{}:{}", source, currency);

        if !self.accounts.contains_key(&reference) {
            let account = db::find_or_create_account(
                conn,
                &format!("file:{}", source),
                &reference,
                &format!("File ({} - {})", source, currency),
                currency,
            )?;
            self.accounts.insert(reference.clone(), account);
        }

        self.accounts
            .get(&reference)
            .ok_or_else(|| anyhow::anyhow!("Account {} missing from cache", reference))
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// What an import wrote
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportSummary {
    pub rows: usize,
    pub transactions: usize,
    pub fees: usize,
    pub deleted: usize,
    pub accounts: usize,
}

/// Row counts per (source, currency) for a dry run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportPreview {
    pub rows: usize,
    pub by_account: BTreeMap<String, usize>,
}

pub fn preview_rows(rows: &[FileRow]) -> ImportPreview {
    let mut by_account = BTreeMap::new();
    for row in rows {
        *by_account
            .entry(format!("{} {}", row.source, row.currency))
            .or_insert(0) += 1;
    }
    ImportPreview {
        rows: rows.len(),
        by_account,
    }
}

/// Parse a transactions file and import it
pub fn import_file_with_progress<F>(conn: &mut Connection, path: &Path, mut on_event: F) -> Result<ImportSummary>
where
    F: FnMut(ProgressEvent),
{
    on_event(ProgressEvent::transient(format!("Reading {}", path.display())));
    let rows = parse_file_csv(path)?;
    let mut cache = AccountCache::new();
    let summary = file_csv::import_rows_with_progress(conn, &rows, &mut cache, on_event)?;
    info!("Imported {:?}: {:?}", path, summary);
    Ok(summary)
}

pub fn import_file(conn: &mut Connection, path: &Path) -> Result<ImportSummary> {
    import_file_with_progress(conn, path, |_| {})
}

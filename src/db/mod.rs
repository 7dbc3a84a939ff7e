// Database module - SQLite ledger store and models

pub mod models;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::LedgerError;
pub use models::{Account, DailyPrice, Disposal, Term, Transaction, TransactionType};

const TRANSACTION_COLUMNS: [&str; 17] = [
    "id",
    "account_id",
    "reference",
    "timestamp",
    "amount",
    "currency",
    "tx_type",
    "exchange_reference",
    "exchange_value",
    "exchange_currency",
    "usd_value",
    "usd_price",
    "transfer_transaction_id",
    "source",
    "source_amount",
    "source_type",
    "source_description",
];

/// Column list for SELECTs, optionally qualified with a table alias
fn transaction_columns(alias: Option<&str>) -> String {
    TRANSACTION_COLUMNS
        .iter()
        .map(|c| match alias {
            Some(a) => format!("{}.{}", a, c),
            None => c.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Get the default database path (~/.gainsledger/ledger.db)
pub fn get_default_db_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let data_dir = PathBuf::from(home).join(".gainsledger");

    std::fs::create_dir_all(&data_dir).context("Failed to create .gainsledger directory")?;

    Ok(data_dir.join("ledger.db"))
}

/// Open database connection
pub fn open_db(db_path: Option<PathBuf>) -> Result<Connection> {
    let path = match db_path {
        Some(p) => p,
        None => get_default_db_path()?,
    };
    let conn = Connection::open(&path).context(format!("Failed to open database at {:?}", path))?;

    conn.execute("PRAGMA foreign_keys = ON", [])
        .context("Failed to enable foreign keys")?;

    Ok(conn)
}

/// Create tables and indexes on an open connection
pub fn apply_schema(conn: &Connection) -> Result<()> {
    let schema_sql = include_str!("schema.sql");
    conn.execute_batch(schema_sql)
        .context("Failed to execute schema")?;
    Ok(())
}

/// Initialize the database with schema
///
/// Creates the database file when missing and runs the schema SQL. Safe to
/// call on an existing database.
pub fn init_database(db_path: Option<PathBuf>) -> Result<()> {
    let path = match db_path {
        Some(p) => p,
        None => get_default_db_path()?,
    };

    info!("Initializing database at: {:?}", path);

    let conn = open_db(Some(path))?;
    apply_schema(&conn)?;

    info!("Database initialized successfully");
    Ok(())
}

// ============ Accounts ============

/// Find an account by (source, reference), creating it when missing.
/// Name and currency are refreshed on every call.
pub fn find_or_create_account(
    conn: &Connection,
    source: &str,
    reference: &str,
    name: &str,
    currency: &str,
) -> Result<Account> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM accounts WHERE source = ?1 AND reference = ?2",
            params![source, reference],
            |row| row.get(0),
        )
        .optional()?;

    let id = match existing {
        Some(id) => {
            conn.execute(
                "UPDATE accounts SET name = ?1, currency = ?2, updated_at = datetime('now')
                 WHERE id = ?3",
                params![name, currency, id],
            )?;
            id
        }
        None => {
            conn.execute(
                "INSERT INTO accounts (source, reference, name, currency) VALUES (?1, ?2, ?3, ?4)",
                params![source, reference, name, currency],
            )?;
            let id = conn.last_insert_rowid();
            debug!("Created account {} ({})", id, name);
            id
        }
    };

    Ok(Account {
        id: Some(id),
        source: source.to_string(),
        reference: reference.to_string(),
        name: name.to_string(),
        currency: currency.to_string(),
    })
}

/// Get all accounts
pub fn get_all_accounts(conn: &Connection) -> Result<Vec<Account>> {
    let mut stmt =
        conn.prepare("SELECT id, source, reference, name, currency FROM accounts ORDER BY id")?;

    let accounts = stmt
        .query_map([], |row| {
            Ok(Account {
                id: Some(row.get(0)?),
                source: row.get(1)?,
                reference: row.get(2)?,
                name: row.get(3)?,
                currency: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(accounts)
}

/// Distinct currencies across all accounts, sorted
pub fn distinct_account_currencies(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT DISTINCT currency FROM accounts ORDER BY currency")?;
    let currencies = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(currencies)
}

// ============ Transactions ============

/// Insert or update a transaction.
///
/// Derived fields are recomputed and the sign invariant is checked before the
/// row is written, so every write path yields a consistent row. Returns the
/// row id and stores it back into `tx`.
pub fn save_transaction(conn: &Connection, tx: &mut Transaction) -> Result<i64> {
    tx.apply_derived_fields();
    tx.validate()?;

    match tx.id {
        Some(id) => {
            conn.execute(
                "UPDATE transactions SET
                    account_id = ?1, reference = ?2, timestamp = ?3, amount = ?4,
                    currency = ?5, tx_type = ?6, exchange_reference = ?7,
                    exchange_value = ?8, exchange_currency = ?9, usd_value = ?10,
                    usd_price = ?11, transfer_transaction_id = ?12, source = ?13,
                    source_amount = ?14, source_type = ?15, source_description = ?16,
                    updated_at = datetime('now')
                 WHERE id = ?17",
                params![
                    tx.account_id,
                    tx.reference,
                    tx.timestamp,
                    tx.amount.to_string(),
                    tx.currency,
                    tx.tx_type.as_str(),
                    tx.exchange_reference,
                    tx.exchange_value.map(|d| d.to_string()),
                    tx.exchange_currency,
                    tx.usd_value.map(|d| d.to_string()),
                    tx.usd_price.map(|d| d.to_string()),
                    tx.transfer_transaction_id,
                    tx.source,
                    tx.source_amount.map(|d| d.to_string()),
                    tx.source_type,
                    tx.source_description,
                    id,
                ],
            )?;
            Ok(id)
        }
        None => {
            conn.execute(
                "INSERT INTO transactions (
                    account_id, reference, timestamp, amount, currency, tx_type,
                    exchange_reference, exchange_value, exchange_currency, usd_value,
                    usd_price, transfer_transaction_id, source, source_amount,
                    source_type, source_description
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    tx.account_id,
                    tx.reference,
                    tx.timestamp,
                    tx.amount.to_string(),
                    tx.currency,
                    tx.tx_type.as_str(),
                    tx.exchange_reference,
                    tx.exchange_value.map(|d| d.to_string()),
                    tx.exchange_currency,
                    tx.usd_value.map(|d| d.to_string()),
                    tx.usd_price.map(|d| d.to_string()),
                    tx.transfer_transaction_id,
                    tx.source,
                    tx.source_amount.map(|d| d.to_string()),
                    tx.source_type,
                    tx.source_description,
                ],
            )?;
            let id = conn.last_insert_rowid();
            tx.id = Some(id);
            Ok(id)
        }
    }
}

fn row_to_transaction(row: &rusqlite::Row) -> Result<Transaction, rusqlite::Error> {
    let tx_type_text: String = row.get(6)?;
    let tx_type = TransactionType::from_str(&tx_type_text).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            Box::new(LedgerError::Parse(format!(
                "unknown transaction type '{}'",
                tx_type_text
            ))),
        )
    })?;

    Ok(Transaction {
        id: Some(row.get(0)?),
        account_id: row.get(1)?,
        reference: row.get(2)?,
        timestamp: row.get(3)?,
        amount: get_decimal_value(row, 4)?,
        currency: row.get(5)?,
        tx_type,
        exchange_reference: row.get(7)?,
        exchange_value: get_optional_decimal_value(row, 8)?,
        exchange_currency: row.get(9)?,
        usd_value: get_optional_decimal_value(row, 10)?,
        usd_price: get_optional_decimal_value(row, 11)?,
        transfer_transaction_id: row.get(12)?,
        source: row.get(13)?,
        source_amount: get_optional_decimal_value(row, 14)?,
        source_type: row.get(15)?,
        source_description: row.get(16)?,
    })
}

fn query_transactions(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(sql)?;
    let transactions = stmt
        .query_map(params, row_to_transaction)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(transactions)
}

/// Get a transaction by id
pub fn get_transaction(conn: &Connection, id: i64) -> Result<Option<Transaction>> {
    let sql = format!(
        "SELECT {} FROM transactions WHERE id = ?1",
        transaction_columns(None)
    );
    let tx = conn.query_row(&sql, [id], row_to_transaction).optional()?;
    Ok(tx)
}

/// All transactions, oldest first
pub fn list_transactions(conn: &Connection) -> Result<Vec<Transaction>> {
    let sql = format!(
        "SELECT {} FROM transactions ORDER BY timestamp ASC, id ASC",
        transaction_columns(None)
    );
    query_transactions(conn, &sql, [])
}

/// Non-transfer transactions of one currency, oldest first (ties by id)
pub fn list_gain_transactions(conn: &Connection, currency: &str) -> Result<Vec<Transaction>> {
    let sql = format!(
        "SELECT {} FROM transactions
         WHERE currency = ?1 AND tx_type != 'transfer'
         ORDER BY timestamp ASC, id ASC",
        transaction_columns(None)
    );
    query_transactions(conn, &sql, [currency])
}

/// Transactions still missing a USD price, oldest first
pub fn list_transactions_missing_price(conn: &Connection) -> Result<Vec<Transaction>> {
    let sql = format!(
        "SELECT {} FROM transactions WHERE usd_price IS NULL ORDER BY timestamp ASC, id ASC",
        transaction_columns(None)
    );
    query_transactions(conn, &sql, [])
}

/// Find the other leg of a trade: same exchange reference, given currency
pub fn find_exchange_counterpart(
    conn: &Connection,
    currency: &str,
    exchange_reference: &str,
) -> Result<Option<Transaction>> {
    let sql = format!(
        "SELECT {} FROM transactions
         WHERE currency = ?1 AND exchange_reference = ?2
         ORDER BY id ASC LIMIT 1",
        transaction_columns(None)
    );
    let tx = conn
        .query_row(&sql, params![currency, exchange_reference], row_to_transaction)
        .optional()?;
    Ok(tx)
}

/// Find the fee row previously generated for a transfer.
///
/// Keyed on account, reported fee amount and timestamp. Amounts are compared
/// as decimals so differing text scales still match.
pub fn find_fee_transaction(
    conn: &Connection,
    account_id: i64,
    fee_amount: Decimal,
    timestamp: DateTime<Utc>,
) -> Result<Option<Transaction>> {
    let sql = format!(
        "SELECT {} FROM transactions
         WHERE account_id = ?1 AND tx_type = 'fee'
         ORDER BY id ASC",
        transaction_columns(None)
    );
    let fees = query_transactions(conn, &sql, [account_id])?;
    Ok(fees
        .into_iter()
        .find(|f| f.timestamp == timestamp && f.source_amount == Some(fee_amount)))
}

/// Transactions whose transfer link is dangling or not returned by the other side
pub fn find_mismatched_transfers(conn: &Connection) -> Result<Vec<Transaction>> {
    let sql = format!(
        "SELECT {} FROM transactions t1
         LEFT JOIN transactions t2 ON t1.transfer_transaction_id = t2.id
         WHERE t1.transfer_transaction_id IS NOT NULL
           AND (t2.id IS NULL
                OR t2.transfer_transaction_id IS NULL
                OR t2.transfer_transaction_id != t1.id)
         ORDER BY t1.timestamp ASC, t1.id ASC",
        transaction_columns(Some("t1"))
    );
    query_transactions(conn, &sql, [])
}

/// Transfer rows that never found a counterpart
pub fn find_unreconciled_transfers(conn: &Connection) -> Result<Vec<Transaction>> {
    let sql = format!(
        "SELECT {} FROM transactions
         WHERE tx_type = 'transfer' AND transfer_transaction_id IS NULL
         ORDER BY timestamp ASC, id ASC",
        transaction_columns(None)
    );
    query_transactions(conn, &sql, [])
}

/// Delete every transaction imported from the given sources.
///
/// Counterparts linked to the deleted rows are unlinked first so no dangling
/// reference survives. Returns the number of deleted rows.
pub fn delete_transactions_for_sources(conn: &Connection, sources: &[String]) -> Result<usize> {
    if sources.is_empty() {
        return Ok(0);
    }

    let placeholders = vec!["?"; sources.len()].join(", ");

    conn.execute(
        &format!(
            "UPDATE transactions SET transfer_transaction_id = NULL
             WHERE transfer_transaction_id IN (
                SELECT id FROM transactions WHERE source IN ({})
             )",
            placeholders
        ),
        params_from_iter(sources.iter()),
    )?;

    let deleted = conn.execute(
        &format!("DELETE FROM transactions WHERE source IN ({})", placeholders),
        params_from_iter(sources.iter()),
    )?;

    Ok(deleted)
}

// ============ Disposals ============

/// Remove every disposal row
pub fn truncate_disposals(conn: &Connection) -> Result<usize> {
    let deleted = conn.execute("DELETE FROM disposals", [])?;
    Ok(deleted)
}

/// Insert a disposal, rounding money fields and deriving the term
pub fn insert_disposal(conn: &Connection, disposal: &Disposal) -> Result<i64> {
    let row = disposal.rounded();
    conn.execute(
        "INSERT INTO disposals (
            currency, buy_transaction_id, sell_transaction_id, acquired_at, disposed_at,
            amount, cost_basis, sale_price, gain, term
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            row.currency,
            row.buy_transaction_id,
            row.sell_transaction_id,
            row.acquired_at,
            row.disposed_at,
            row.amount.to_string(),
            row.cost_basis.to_string(),
            row.sale_price.to_string(),
            row.gain.to_string(),
            row.term().as_str(),
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// All disposals in insertion order
pub fn list_disposals(conn: &Connection) -> Result<Vec<Disposal>> {
    let mut stmt = conn.prepare(
        "SELECT id, currency, buy_transaction_id, sell_transaction_id, acquired_at,
                disposed_at, amount, cost_basis, sale_price, gain
         FROM disposals
         ORDER BY id ASC",
    )?;

    let disposals = stmt
        .query_map([], |row| {
            Ok(Disposal {
                id: Some(row.get(0)?),
                currency: row.get(1)?,
                buy_transaction_id: row.get(2)?,
                sell_transaction_id: row.get(3)?,
                acquired_at: row.get(4)?,
                disposed_at: row.get(5)?,
                amount: get_decimal_value(row, 6)?,
                cost_basis: get_decimal_value(row, 7)?,
                sale_price: get_decimal_value(row, 8)?,
                gain: get_decimal_value(row, 9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(disposals)
}

// ============ Daily prices ============

/// Insert or replace a daily price
pub fn upsert_daily_price(conn: &Connection, price: &DailyPrice) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO daily_prices (currency, price_date, usd_price, source)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            price.currency,
            price.price_date,
            price.usd_price.to_string(),
            price.source,
        ],
    )?;
    Ok(())
}

/// Get the daily price of a currency on a date
pub fn get_daily_price(
    conn: &Connection,
    currency: &str,
    date: NaiveDate,
) -> Result<Option<Decimal>> {
    let price = conn
        .query_row(
            "SELECT usd_price FROM daily_prices WHERE currency = ?1 AND price_date = ?2",
            params![currency, date],
            |row| get_decimal_value(row, 0),
        )
        .optional()?;
    Ok(price)
}

/// Helper to read Decimal from SQLite (handles INTEGER, REAL and TEXT)
pub fn get_decimal_value(row: &rusqlite::Row, idx: usize) -> Result<Decimal, rusqlite::Error> {
    use rusqlite::types::ValueRef;

    match row.get_ref(idx)? {
        ValueRef::Text(bytes) => {
            let s = std::str::from_utf8(bytes)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            Decimal::from_str(s).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
        }
        ValueRef::Integer(i) => Ok(Decimal::from(i)),
        ValueRef::Real(f) => {
            Decimal::try_from(f).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
        }
        _ => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "decimal".to_string(),
            rusqlite::types::Type::Null,
        )),
    }
}

/// Helper to read optional Decimal from SQLite
fn get_optional_decimal_value(
    row: &rusqlite::Row,
    idx: usize,
) -> Result<Option<Decimal>, rusqlite::Error> {
    use rusqlite::types::ValueRef;

    match row.get_ref(idx)? {
        ValueRef::Null => Ok(None),
        _ => get_decimal_value(row, idx).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        conn
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 5, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_init_database() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        init_database(Some(db_path.clone())).unwrap();
        // second run is a no-op
        init_database(Some(db_path.clone())).unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let table_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table'",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert!(table_count >= 4);
    }

    #[test]
    fn test_find_or_create_account_is_idempotent() {
        let conn = memory_db();
        let a = find_or_create_account(&conn, "file:ledger", "file:ledger:BTC", "Old", "BTC").unwrap();
        let b = find_or_create_account(&conn, "file:ledger", "file:ledger:BTC", "New", "BTC").unwrap();
        assert_eq!(a.id, b.id);

        let accounts = get_all_accounts(&conn).unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].name, "New");
    }

    #[test]
    fn test_save_transaction_round_trip_keeps_precision() {
        let conn = memory_db();
        let account = find_or_create_account(&conn, "s", "r", "n", "BTC").unwrap();
        let mut tx = Transaction::new(
            account.id.unwrap(),
            at(10, 0),
            dec!(0.123456789012),
            "BTC",
            TransactionType::Buy,
        );
        tx.usd_value = Some(dec!(123.45));
        let id = save_transaction(&conn, &mut tx).unwrap();

        let loaded = get_transaction(&conn, id).unwrap().unwrap();
        assert_eq!(loaded.amount, dec!(0.123456789012));
        assert_eq!(loaded.timestamp, at(10, 0));
        assert_eq!(loaded.usd_price, tx.usd_price);
        assert!(loaded.usd_price.is_some());
    }

    #[test]
    fn test_save_transaction_rejects_wrong_sign() {
        let conn = memory_db();
        let account = find_or_create_account(&conn, "s", "r", "n", "BTC").unwrap();
        let mut tx = Transaction::new(account.id.unwrap(), at(10, 0), dec!(-1), "BTC", TransactionType::Receive);
        assert!(save_transaction(&conn, &mut tx).is_err());
        assert!(list_transactions(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_mismatched_and_unreconciled_queries() {
        let conn = memory_db();
        let account_id = find_or_create_account(&conn, "s", "r", "n", "BTC").unwrap().id.unwrap();

        let mut a = Transaction::new(account_id, at(10, 0), dec!(-1), "BTC", TransactionType::Transfer);
        let mut b = Transaction::new(account_id, at(10, 5), dec!(1), "BTC", TransactionType::Transfer);
        save_transaction(&conn, &mut a).unwrap();
        save_transaction(&conn, &mut b).unwrap();

        assert_eq!(find_unreconciled_transfers(&conn).unwrap().len(), 2);

        // one-sided link
        a.transfer_transaction_id = b.id;
        save_transaction(&conn, &mut a).unwrap();
        let mismatched = find_mismatched_transfers(&conn).unwrap();
        assert_eq!(mismatched.len(), 1);
        assert_eq!(mismatched[0].id, a.id);

        b.transfer_transaction_id = a.id;
        save_transaction(&conn, &mut b).unwrap();
        assert!(find_mismatched_transfers(&conn).unwrap().is_empty());
        assert!(find_unreconciled_transfers(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_delete_sources_unlinks_counterparts() {
        let conn = memory_db();
        let account_id = find_or_create_account(&conn, "s", "r", "n", "BTC").unwrap().id.unwrap();

        let mut a = Transaction::new(account_id, at(10, 0), dec!(-1), "BTC", TransactionType::Transfer);
        a.source = "file:old".to_string();
        let mut b = Transaction::new(account_id, at(10, 5), dec!(1), "BTC", TransactionType::Transfer);
        b.source = "file:keep".to_string();
        save_transaction(&conn, &mut a).unwrap();
        save_transaction(&conn, &mut b).unwrap();
        a.transfer_transaction_id = b.id;
        b.transfer_transaction_id = a.id;
        save_transaction(&conn, &mut a).unwrap();
        save_transaction(&conn, &mut b).unwrap();

        let deleted = delete_transactions_for_sources(&conn, &["file:old".to_string()]).unwrap();
        assert_eq!(deleted, 1);

        let remaining = get_transaction(&conn, b.id.unwrap()).unwrap().unwrap();
        assert_eq!(remaining.transfer_transaction_id, None);
    }

    #[test]
    fn test_find_fee_transaction_matches_decimal_value() {
        let conn = memory_db();
        let account_id = find_or_create_account(&conn, "s", "r", "n", "BTC").unwrap().id.unwrap();
        let mut fee = Transaction::new(account_id, at(10, 0), dec!(-0.0010), "BTC", TransactionType::Fee);
        save_transaction(&conn, &mut fee).unwrap();

        let found = find_fee_transaction(&conn, account_id, dec!(-0.001), at(10, 0)).unwrap();
        assert_eq!(found.and_then(|f| f.id), fee.id);
        assert!(find_fee_transaction(&conn, account_id, dec!(-0.001), at(10, 1))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_disposals_truncate_and_round() {
        let conn = memory_db();
        let disposal = Disposal {
            id: None,
            currency: "BTC".to_string(),
            buy_transaction_id: 1,
            sell_transaction_id: 2,
            acquired_at: at(1, 0),
            disposed_at: at(2, 0),
            amount: dec!(0.5),
            cost_basis: dec!(10.004),
            sale_price: dec!(20.006),
            gain: dec!(10.002),
        };
        insert_disposal(&conn, &disposal).unwrap();

        let rows = list_disposals(&conn).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cost_basis, dec!(10.00));
        assert_eq!(rows[0].sale_price, dec!(20.01));

        let term: String = conn
            .query_row("SELECT term FROM disposals", [], |row| row.get(0))
            .unwrap();
        assert_eq!(term, "short");

        assert_eq!(truncate_disposals(&conn).unwrap(), 1);
        assert!(list_disposals(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_daily_price_upsert() {
        let conn = memory_db();
        let date = NaiveDate::from_ymd_opt(2017, 5, 1).unwrap();
        let mut price = DailyPrice {
            currency: "BTC".to_string(),
            price_date: date,
            usd_price: dec!(1400),
            source: "test".to_string(),
        };
        upsert_daily_price(&conn, &price).unwrap();
        price.usd_price = dec!(1450.5);
        upsert_daily_price(&conn, &price).unwrap();

        assert_eq!(get_daily_price(&conn, "BTC", date).unwrap(), Some(dec!(1450.5)));
        assert_eq!(get_daily_price(&conn, "ETH", date).unwrap(), None);
    }
}


use assert_cmd::prelude::*;
use cli_helpers::{base_cmd, run_json, write_config, write_file, LEDGER_CSV};
use predicates::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;
use tempfile::TempDir;

fn decimal_field(row: &serde_json::Value, key: &str) -> Decimal {
    let text = row[key].as_str().expect("decimal serialized as string");
    Decimal::from_str(text).expect("valid decimal")
}

#[test]
fn no_command_prints_help() {
    let home = TempDir::new().expect("failed to create temp home");

    base_cmd(&home)
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn gains_summary_empty_db_no_color_when_piped() {
    let home = TempDir::new().expect("failed to create temp home");

    base_cmd(&home)
        .arg("gains")
        .arg("summary")
        .assert()
        .success()
        .stdout(predicate::str::contains("No disposals found"))
        .stdout(predicate::str::contains("\u{001b}[").not());

    assert!(home.path().join(".gainsledger").join("ledger.db").exists());
}

#[test]
fn import_dry_run_does_not_create_db() {
    let home = TempDir::new().expect("failed to create temp home");
    let csv = write_file(home.path(), "ledger.csv", LEDGER_CSV);
    let db_path = home.path().join("dry.db");

    base_cmd(&home)
        .arg("--db")
        .arg(&db_path)
        .arg("import")
        .arg(&csv)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Found 3 rows"))
        .stdout(predicate::str::contains("Dry run"))
        .stdout(predicate::str::contains("\u{001b}[").not());

    assert!(!db_path.exists(), "dry-run should not create db");
}

#[test]
fn import_then_summary_shows_gains() {
    let home = TempDir::new().expect("failed to create temp home");
    let csv = write_file(home.path(), "ledger.csv", LEDGER_CSV);
    let db_path = home.path().join("ledger.db");

    base_cmd(&home)
        .arg("--db")
        .arg(&db_path)
        .arg("import")
        .arg(&csv)
        .assert()
        .success()
        .stdout(predicate::str::contains("Import complete"));

    base_cmd(&home)
        .arg("--db")
        .arg(&db_path)
        .args(["gains", "calculate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Calculated 2 disposals"));

    base_cmd(&home)
        .arg("--db")
        .arg(&db_path)
        .args(["gains", "summary", "--year", "2017"])
        .assert()
        .success()
        .stdout(predicate::str::contains("BTC"))
        .stdout(predicate::str::contains("$1,600.00"))
        .stdout(predicate::str::contains("$2,100.00"));
}

#[test]
fn run_pipeline_from_config_as_json() {
    let home = TempDir::new().expect("failed to create temp home");
    write_file(home.path(), "ledger.csv", LEDGER_CSV);
    let config = write_config(home.path(), "[disposal.2017]\nmethod = \"LIFO\"\n");
    let config_arg = config.to_string_lossy().to_string();

    let report = run_json(&home, &["--config", &config_arg, "run"]).expect("run failed");

    assert_eq!(report["imports"][0]["transactions"], 3);
    assert_eq!(report["gains"]["completed"][0]["disposals"], 2);

    let rows = report["summary"]["rows"].as_array().expect("summary rows");
    let btc = &rows[0];
    assert_eq!(btc["currency"], "BTC");
    assert_eq!(btc["method"], "LIFO");
    assert_eq!(decimal_field(btc, "short"), dec!(1000));
    assert_eq!(decimal_field(btc, "long"), dec!(800));

    assert!(home.path().join("ledger.db").exists());
}

#[test]
fn unreconciled_transfer_fails_with_message() {
    let home = TempDir::new().expect("failed to create temp home");
    let csv = write_file(
        home.path(),
        "ledger.csv",
        "date,source,currency,type,amount\n2017-02-01T10:00:00Z,ledger,BTC,transfer,-1\n",
    );
    let db_path = home.path().join("ledger.db");

    base_cmd(&home)
        .arg("--db")
        .arg(&db_path)
        .arg("import")
        .arg(&csv)
        .assert()
        .success();

    base_cmd(&home)
        .arg("--db")
        .arg(&db_path)
        .arg("reconcile")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unreconciled"));
}

#[test]
fn invalid_config_is_reported() {
    let home = TempDir::new().expect("failed to create temp home");
    let config = write_file(home.path(), "config.toml", "[disposal.someday]\nmethod = \"FIFO\"\n");

    base_cmd(&home)
        .arg("--config")
        .arg(&config)
        .args(["gains", "summary"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("someday"));
}

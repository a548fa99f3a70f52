//! End-to-end CLI behavior that does not require a live database:
//! argument parsing and the `--all`/`--table` usage-error path.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn rejects_all_and_table_together() {
    Command::cargo_bin("pg-reorg")
        .unwrap()
        .args(["--all", "--table", "public.t", "mydb"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("mutually exclusive"));
}

#[test]
fn missing_dbname_is_a_usage_error() {
    Command::cargo_bin("pg-reorg")
        .unwrap()
        .assert()
        .failure();
}

#[test]
fn reports_version() {
    Command::cargo_bin("pg-reorg")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pg-reorg"));
}

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

/// Store commands resolve the database URL from the env var named in config
/// and fail by NAME (never echoing a value) when it is missing.
#[test]
fn db_status_fails_without_database_url() -> anyhow::Result<()> {
    Command::cargo_bin("stk")?
        .current_dir(env!("CARGO_MANIFEST_DIR"))
        .env_remove("STK_DATABASE_URL")
        .args(["db", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("SECRETS_MISSING"))
        .stderr(predicate::str::contains("STK_DATABASE_URL"));
    Ok(())
}

#[test]
fn order_status_fails_before_touching_the_store_without_url() -> anyhow::Result<()> {
    Command::cargo_bin("stk")?
        .current_dir(env!("CARGO_MANIFEST_DIR"))
        .env_remove("STK_DATABASE_URL")
        .args(["order", "status", "--id", "1", "--status", "pending"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("SECRETS_MISSING"));
    Ok(())
}

#[test]
fn unknown_subcommand_is_a_usage_error() -> anyhow::Result<()> {
    Command::cargo_bin("stk")?
        .args(["order", "ship", "--id", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
    Ok(())
}

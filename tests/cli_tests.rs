//! Tests for the `firmdesk` binary.

mod common;

use common::{database_url, firmdesk_command};
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

#[test]
fn test_help_lists_commands() {
    firmdesk_command()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("migrate"));
}

#[test]
fn test_missing_database_url_fails() {
    firmdesk_command()
        .arg("migrate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_ERROR"))
        .stderr(predicate::str::contains("DATABASE_URL"));
}

#[test]
fn test_serve_without_database_url_fails_before_binding() {
    firmdesk_command()
        .args(["serve", "--bind", "127.0.0.1:0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_ERROR"));
}

#[test]
fn test_migrate_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let url = database_url(temp.path());

    for _ in 0..2 {
        firmdesk_command()
            .env("DATABASE_URL", &url)
            .arg("migrate")
            .assert()
            .success()
            .stdout(predicate::str::contains("\"migrated\": true"));
    }
}

#[test]
fn test_org_and_user_lifecycle() {
    let temp = TempDir::new().unwrap();
    let url = database_url(temp.path());

    let output = firmdesk_command()
        .args(["--database-url", &url, "org", "create", "--name", "Ledger & Co"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let org_id = stdout_json(&output)["id"].as_i64().unwrap();
    let org = org_id.to_string();

    let output = firmdesk_command()
        .env("DATABASE_URL", &url)
        .args([
            "user", "create", "--org", &org, "--name", "Ada", "--email", "Ada@Firm.test", "--role",
            "admin",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let user = stdout_json(&output);
    assert_eq!(user["email"], "ada@firm.test");
    assert_eq!(user["role"], "admin");

    // Duplicate email inside the org
    firmdesk_command()
        .env("DATABASE_URL", &url)
        .args([
            "user", "create", "--org", &org, "--name", "Ada 2", "--email", "ada@firm.test",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFLICT"));

    let output = firmdesk_command()
        .env("DATABASE_URL", &url)
        .args(["user", "list", "--org", &org])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output).as_array().unwrap().len(), 1);
}

#[test]
fn test_invalid_role_is_rejected() {
    let temp = TempDir::new().unwrap();
    firmdesk_command()
        .env("DATABASE_URL", database_url(temp.path()))
        .args([
            "user", "create", "--org", "1", "--name", "Ada", "--email", "a@firm.test", "--role",
            "partner",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("VALIDATION_ERROR"));
}

#[test]
fn test_audit_recent_on_empty_org() {
    let temp = TempDir::new().unwrap();
    let url = database_url(temp.path());

    firmdesk_command()
        .env("DATABASE_URL", &url)
        .args(["audit", "recent", "--org", "1", "--limit", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn test_user_list_for_unknown_org_fails() {
    let temp = TempDir::new().unwrap();
    firmdesk_command()
        .env("DATABASE_URL", database_url(temp.path()))
        .args(["user", "list", "--org", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ORG_NOT_FOUND"));
}

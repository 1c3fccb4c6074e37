//! Log configuration overrides and rotated-file cleanup.

mod common;

use firmdesk::logging::{cleanup_old_logs, ApplicationMode, LoggingConfig};
use serial_test::serial;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tracing::Level;

/// Create a log file whose mtime is `age_days` in the past
fn create_old_log_file(dir: &Path, name: &str, age_days: u64) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, "Test log content\n").unwrap();

    let mtime = SystemTime::now() - Duration::from_secs(age_days * 24 * 60 * 60);
    filetime::set_file_mtime(&path, filetime::FileTime::from_system_time(mtime)).unwrap();
    path
}

fn clear_log_env() {
    std::env::remove_var("FIRMDESK_LOG_LEVEL");
    std::env::remove_var("FIRMDESK_LOG_JSON");
    std::env::remove_var("FIRMDESK_LOG_DIR");
}

#[test]
#[serial]
fn test_env_overrides_apply_on_top_of_mode() {
    clear_log_env();
    let temp = TempDir::new().unwrap();
    std::env::set_var("FIRMDESK_LOG_LEVEL", "debug");
    std::env::set_var("FIRMDESK_LOG_JSON", "true");
    std::env::set_var("FIRMDESK_LOG_DIR", temp.path());

    let config = LoggingConfig::for_mode(ApplicationMode::Server).with_env_overrides();
    clear_log_env();

    assert_eq!(config.level, Level::DEBUG);
    assert!(config.json_format);
    assert!(!config.color);
    assert_eq!(config.log_dir.as_deref(), Some(temp.path()));
}

#[test]
#[serial]
fn test_unparseable_env_level_is_ignored() {
    clear_log_env();
    std::env::set_var("FIRMDESK_LOG_LEVEL", "chatty");

    let config = LoggingConfig::for_mode(ApplicationMode::Cli).with_env_overrides();
    clear_log_env();

    assert_eq!(config.level, Level::WARN);
    assert!(config.log_dir.is_none());
}

#[test]
fn test_cleanup_removes_only_expired_rotated_files() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();

    let expired = create_old_log_file(dir, "server.log.2026-09-01", 30);
    let recent = create_old_log_file(dir, "server.log.2026-10-17", 2);
    let live = create_old_log_file(dir, "server.log", 30);

    let removed = cleanup_old_logs(dir, 7).unwrap();

    assert_eq!(removed, 1);
    assert!(!expired.exists());
    assert!(recent.exists());
    assert!(live.exists(), "the active file has no date suffix and is kept");
}

#[test]
fn test_cli_writes_no_log_files_by_default() {
    let temp = TempDir::new().unwrap();
    common::firmdesk_command()
        .env("DATABASE_URL", common::database_url(temp.path()))
        .arg("migrate")
        .assert()
        .success();

    let logs: Vec<_> = fs::read_dir(temp.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".log"))
        .collect();
    assert!(logs.is_empty());
}

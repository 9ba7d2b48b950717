//! Integration tests for configuration loading

use std::path::PathBuf;

use clipstash::config::{Config, ConfigError};
use tempfile::TempDir;

#[test]
fn test_load_config_from_explicit_path() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
max_items = 25
auto_monitor_enabled = true
polling_interval = 2.0
database_path = "~/clipstash-test/history.db"
"#,
    )
    .unwrap();

    let config = Config::load_config(Some(&path)).unwrap();
    assert_eq!(config.max_items, 25);
    assert!(config.auto_monitor_enabled);
    assert!(!config.pin_on_save);
    assert_eq!(config.polling_duration().as_secs(), 2);

    let home = dirs::home_dir().unwrap();
    assert_eq!(config.database_path, home.join("clipstash-test/history.db"));
}

#[test]
fn test_missing_file_is_io_error() {
    let result = Config::load_config(Some(&PathBuf::from("/nonexistent/clipstash.toml")));
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[test]
fn test_invalid_values_rejected_on_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "max_items = 0\n").unwrap();

    let err = Config::load_from_path(&path).unwrap_err();
    assert!(err.to_string().contains("max_items"));
}

#[test]
fn test_example_round_trips_through_save() {
    let temp_dir = TempDir::new().unwrap();
    let example_path = temp_dir.path().join("example.toml");
    Config::write_example(&example_path, false).unwrap();

    let mut config = Config::load_from_path(&example_path).unwrap();
    config.max_items = 99;
    config.launch_at_login = true;

    let saved_path = temp_dir.path().join("saved.toml");
    config.save_to_path(&saved_path).unwrap();
    assert_eq!(Config::load_from_path(&saved_path).unwrap(), config);
}

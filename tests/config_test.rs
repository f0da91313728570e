//! Tests for config loading from the bundled config.toml

use std::path::Path;

use feedrelay::config::Config;
use feedrelay::models::Platform;

fn load() -> Config {
    Config::from_file(Path::new("config.toml")).expect("Should be able to parse config.toml")
}

#[test]
fn test_config_file_exists() {
    assert!(
        Path::new("config.toml").exists(),
        "config.toml should exist in project root"
    );
}

#[test]
fn test_config_toml_sections() {
    let config = load();

    assert_eq!(config.instagram.username.as_deref(), Some("relay_account"));
    assert_eq!(config.vlive.poll_interval_secs, 30);
    assert_eq!(config.cleanup.interval_secs, 3600);
    assert_eq!(config.subscriptions.len(), 2);

    let instagram = &config.subscriptions[0];
    assert_eq!(instagram.platform, Platform::Instagram);
    assert!(instagram.options.stories);
    assert_eq!(config.subscriptions[1].mention_role_id, None);
}

#[test]
fn test_bundled_config_needs_password() {
    let mut config = load();
    assert!(config.validate().is_err(), "password is not stored in the file");

    config.instagram.password = Some("from-env".to_string());
    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_file_is_an_error() {
    assert!(Config::from_file(Path::new("does-not-exist.toml")).is_err());
}

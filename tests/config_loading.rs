//! Configuration layering: file, then environment.

use adl_bridge::config::BridgeConfig;
use adl_bridge::BridgeError;
use serial_test::serial;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

struct EnvGuard(&'static str);

impl EnvGuard {
    fn set(key: &'static str, value: &str) -> Self {
        std::env::set_var(key, value);
        Self(key)
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        std::env::remove_var(self.0);
    }
}

#[test]
#[serial]
fn test_toml_file_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("adl_bridge.toml");
    fs::write(
        &path,
        r#"
            [storage]
            data_dir = "/srv/adl/data"

            [logging]
            level = "debug"
            format = "json"
        "#,
    )
    .unwrap();

    let config = BridgeConfig::load_from(&path).unwrap();
    assert_eq!(config.storage.data_dir, PathBuf::from("/srv/adl/data"));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, "json");
    assert_eq!(config.queue.key, 6604);
    assert_eq!(config.site.location, "Toilet");
}

#[test]
#[serial]
fn test_environment_wins_over_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("adl_bridge.toml");
    fs::write(&path, "[queue]\nkey = 1111\n").unwrap();
    let _key = EnvGuard::set("ADL_BRIDGE_QUEUE__KEY", "2222");
    let _owner = EnvGuard::set("ADL_BRIDGE_SITE__HOME_OWNER", "ABC");

    let config = BridgeConfig::load_from(&path).unwrap();
    assert_eq!(config.queue.key, 2222);
    assert_eq!(config.site.home_owner, "ABC");
}

#[test]
#[serial]
fn test_invalid_environment_value_is_rejected() {
    let _location = EnvGuard::set("ADL_BRIDGE_SITE__LOCATION", "Hall,way");

    let err = BridgeConfig::load_from("missing.toml").unwrap_err();
    assert!(matches!(err, BridgeError::Configuration(_)));
}

#[test]
#[serial]
fn test_malformed_file_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[queue\nkey = ").unwrap();

    let err = BridgeConfig::load_from(&path).unwrap_err();
    assert!(matches!(err, BridgeError::Config(_)));
}

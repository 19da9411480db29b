use std::fs;

use serial_test::serial;
use tempfile::tempdir;
use tx_manager::load_config::load_config;

const CONFIG_YAML: &str = concat!(
    "api_url: https://api.door43.org\n",
    "cdn_bucket: cdn.door43.org\n",
    "door43_bucket: door43.org\n",
    "gogs_url: https://git.door43.org\n",
    "prefix: \"\"\n",
);

#[test]
#[serial]
fn test_load_config_reads_yaml() {
    std::env::remove_var("TX_PREFIX");
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(&path, CONFIG_YAML).unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.api_url, "https://api.door43.org");
    assert_eq!(config.cdn_bucket, "cdn.door43.org");
    assert_eq!(config.prefix, "");
}

#[test]
#[serial]
fn test_env_prefix_overrides_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(&path, CONFIG_YAML).unwrap();

    std::env::set_var("TX_PREFIX", "dev-");
    let config = load_config(&path).unwrap();
    std::env::remove_var("TX_PREFIX");

    assert_eq!(config.prefix, "dev-");
}

#[test]
#[serial]
fn test_load_config_missing_file_errors() {
    let dir = tempdir().unwrap();
    assert!(load_config(dir.path().join("nope.yaml")).is_err());
}

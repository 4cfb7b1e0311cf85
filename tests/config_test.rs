//! Configuration loading tests

use std::io::Write;

use klvm::error::ConfigError;
use klvm::types::KlvmConfig;

#[test]
fn test_load_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "system_name = \"test\"").unwrap();
    writeln!(file, "time_slice = 256").unwrap();
    writeln!(file, "worker_threads = 3").unwrap();

    let config = KlvmConfig::from_file(file.path()).unwrap();
    assert_eq!(config.system_name, "test");
    assert_eq!(config.time_slice, 256);
    assert_eq!(config.worker_threads, 3);
    assert_eq!(config.configure_step_limit, KlvmConfig::default().configure_step_limit);
}

#[test]
fn test_invalid_toml() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "time_slice = [").unwrap();
    assert!(matches!(KlvmConfig::from_file(file.path()), Err(ConfigError::Parse(_))));
}

#[test]
fn test_zero_time_slice_rejected() {
    assert!(matches!(
        KlvmConfig::from_toml_str("time_slice = 0\n"),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    assert!(matches!(KlvmConfig::from_file(&path), Err(ConfigError::Io(_))));
}

#[test]
fn test_toml_round_trip_through_file() {
    let config = KlvmConfig::default().with_time_slice(99).with_worker_threads(2);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("klvm.toml");
    std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

    let loaded = KlvmConfig::from_file(&path).unwrap();
    assert_eq!(loaded.time_slice, 99);
    assert_eq!(loaded.worker_threads, 2);
}

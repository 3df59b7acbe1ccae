use std::fs;

use tempfile::tempdir;

use dagvault_consolidate::config::{ensure_config_exists, Config, ConsolidationConfig, SplitConfig};

#[test]
fn defaults_leave_everything_disabled() {
    let config = Config::default();

    // Consolidation requires an explicit threshold to arm
    assert_eq!(config.consolidation.max_unspent_outputs, 0);
    assert!(!config.consolidation.is_enabled());
    assert_eq!(config.consolidation.interval_secs, 3600);
    assert_eq!(config.consolidation.startup_delay_secs, 300);
    assert_eq!(config.consolidation.max_passes_per_tick, 100);
    assert!(config.consolidation.asset.is_none());

    assert!(!config.split.enabled);
    assert_eq!(config.split.chunk_count, 10);
    assert_eq!(config.split.period_secs, 600);

    config.validate().expect("defaults must validate");
}

#[test]
fn enablement_requires_both_threshold_and_interval() {
    let mut consolidation = ConsolidationConfig::default();
    assert!(!consolidation.is_enabled());

    consolidation.max_unspent_outputs = 50;
    assert!(consolidation.is_enabled());

    consolidation.interval_secs = 0;
    assert!(!consolidation.is_enabled());

    consolidation.interval_secs = 3600;
    consolidation.max_unspent_outputs = 0;
    assert!(!consolidation.is_enabled());
}

#[test]
fn save_and_load_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let path_str = path.to_str().unwrap();

    let config = Config {
        consolidation: ConsolidationConfig {
            max_unspent_outputs: 50,
            interval_secs: 1800,
            startup_delay_secs: 60,
            max_passes_per_tick: 10,
            asset: Some("blackbytes".to_string()),
        },
        split: SplitConfig {
            enabled: true,
            chunk_count: 4,
            period_secs: 120,
        },
    };
    config.save(path_str).unwrap();

    let loaded = Config::load(path_str).unwrap();
    assert_eq!(loaded.consolidation.max_unspent_outputs, 50);
    assert_eq!(loaded.consolidation.interval_secs, 1800);
    assert_eq!(loaded.consolidation.asset.as_deref(), Some("blackbytes"));
    assert!(loaded.split.enabled);
    assert_eq!(loaded.split.chunk_count, 4);
    assert_eq!(loaded.split.period_secs, 120);
}

#[test]
fn partial_file_falls_back_to_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("partial.toml");
    fs::write(
        &path,
        r#"
[consolidation]
max_unspent_outputs = 25
"#,
    )
    .unwrap();

    let loaded = Config::load(path.to_str().unwrap()).unwrap();
    assert_eq!(loaded.consolidation.max_unspent_outputs, 25);
    assert_eq!(loaded.consolidation.interval_secs, 3600);
    assert!(loaded.consolidation.is_enabled());
    assert!(!loaded.split.enabled);
}

#[test]
fn malformed_file_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "this is not toml = [").unwrap();

    assert!(Config::load(path.to_str().unwrap()).is_err());
    assert!(Config::load("/nonexistent/config.toml").is_err());
}

#[test]
fn validation_rejects_nonsense_values() {
    let mut config = Config::default();
    config.consolidation.max_passes_per_tick = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.split.chunk_count = 1;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.split.enabled = true;
    config.split.period_secs = 0;
    assert!(config.validate().is_err());
}

#[test]
fn ensure_config_exists_writes_defaults_once() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    ensure_config_exists(&path).unwrap();
    assert!(path.exists());

    let loaded = Config::load(path.to_str().unwrap()).unwrap();
    assert!(!loaded.consolidation.is_enabled());

    // A second call leaves an existing file untouched
    fs::write(&path, "[consolidation]\nmax_unspent_outputs = 7\n").unwrap();
    ensure_config_exists(&path).unwrap();
    let loaded = Config::load(path.to_str().unwrap()).unwrap();
    assert_eq!(loaded.consolidation.max_unspent_outputs, 7);
}

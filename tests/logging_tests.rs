use dagvault_consolidate::logging::{self, log_params, LogConfig, LogLevel};

#[test]
fn init_is_idempotent() {
    let config = LogConfig {
        level: LogLevel::Error,
        log_file: None,
        include_timestamps: false,
        console_logging: false,
    };

    assert!(logging::init(&config).is_ok());
    // A second init is a no-op, not an error
    assert!(logging::init(&config).is_ok());

    logging::set_log_level(LogLevel::Warn);
    logging::set_log_level(LogLevel::Error);
}

#[test]
fn structured_params_serialize_as_an_object() {
    let params = log_params(vec![
        ("scope", "wallet-main".to_string()),
        ("outputs", "42".to_string()),
    ]);
    assert_eq!(params["scope"], "wallet-main");
    assert_eq!(params["outputs"], "42");

    // Helpers must not panic with or without params
    logging::log_engine(LogLevel::Error, "selection finished", Some(params));
    logging::log_scheduler(LogLevel::Error, "tick", None);
    logging::log_ledger(LogLevel::Error, "query", None);
}

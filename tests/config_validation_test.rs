//! Integration tests for loading and validating the dashboard configuration.

use daq_dashboard::config::DashboardConfig;
use std::io::Write;
use tempfile::NamedTempFile;

/// Write `contents` to a temporary TOML file.
fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_partial_file_keeps_remaining_defaults() {
    let file = config_file(
        r#"
        [dashboard]
        default_output_folder = "/sf/data/"
        default_n_images = 500
        "#,
    );

    let config = DashboardConfig::load_from(file.path()).unwrap();
    assert_eq!(config.dashboard.default_output_folder, "/sf/data/");
    assert_eq!(config.dashboard.default_n_images, 500);
    assert_eq!(config.dashboard.acquisition_log_entries, 5);
    assert_eq!(config.backend.base_url, "http://127.0.0.1:5000");
    assert!(config.validate().is_ok());
}

#[test]
fn test_invalid_log_format_rejected() {
    let file = config_file(
        r#"
        [logging]
        format = "xml"
        "#,
    );

    let config = DashboardConfig::load_from(file.path()).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.contains("Invalid log format 'xml'"));
}

#[test]
fn test_wrong_type_is_a_load_error() {
    let file = config_file(
        r#"
        [dashboard]
        acquisition_log_entries = "many"
        "#,
    );

    assert!(DashboardConfig::load_from(file.path()).is_err());
}

#[test]
fn test_non_http_base_url_rejected() {
    let file = config_file(
        r#"
        [backend]
        base_url = "ftp://daq-host"
        "#,
    );

    let config = DashboardConfig::load_from(file.path()).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.contains("http://"));
}

#[test]
fn test_round_trips_through_toml() {
    let config = DashboardConfig::default();
    let rendered = toml::to_string_pretty(&config).unwrap();
    let file = config_file(&rendered);

    let reloaded = DashboardConfig::load_from(file.path()).unwrap();
    assert_eq!(reloaded.backend.base_url, config.backend.base_url);
    assert_eq!(reloaded.logging.level, config.logging.level);
}

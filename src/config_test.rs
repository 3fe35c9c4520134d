use std::collections::HashMap;

use super::*;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
    move |key| map.get(key).cloned()
}

// =============================================================
// SyncConfig
// =============================================================

#[test]
fn sync_defaults_when_unset() {
    let config = SyncConfig::from_lookup(lookup(&[])).unwrap();
    assert_eq!(config, SyncConfig::default());
    assert_eq!(config.write_timeout_ms, 10_000);
    assert_eq!(config.fetch_timeout_ms, 10_000);
    assert_eq!(config.event_capacity, 1024);
}

#[test]
fn sync_reads_overrides() {
    let config = SyncConfig::from_lookup(lookup(&[
        ("SYNC_WRITE_TIMEOUT_MS", "250"),
        ("SYNC_FETCH_TIMEOUT_MS", " 500 "),
        ("SYNC_EVENT_CAPACITY", "16"),
    ]))
    .unwrap();
    assert_eq!(config.write_timeout(), Duration::from_millis(250));
    assert_eq!(config.fetch_timeout(), Duration::from_millis(500));
    assert_eq!(config.event_capacity, 16);
}

#[test]
fn sync_rejects_garbage() {
    let err = SyncConfig::from_lookup(lookup(&[("SYNC_WRITE_TIMEOUT_MS", "soon")])).unwrap_err();
    assert_eq!(err, ConfigError::Invalid { var: "SYNC_WRITE_TIMEOUT_MS", value: "soon".into() });
}

// =============================================================
// RemoteConfig
// =============================================================

#[test]
fn remote_requires_base_url() {
    let err = RemoteConfig::from_lookup(lookup(&[])).unwrap_err();
    assert_eq!(err, ConfigError::Missing { var: "REMOTE_BASE_URL" });
    let err = RemoteConfig::from_lookup(lookup(&[("REMOTE_BASE_URL", "  ")])).unwrap_err();
    assert_eq!(err, ConfigError::Missing { var: "REMOTE_BASE_URL" });
}

#[test]
fn remote_rejects_non_http_url() {
    let err = RemoteConfig::from_lookup(lookup(&[("REMOTE_BASE_URL", "ftp://x")])).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { var: "REMOTE_BASE_URL", .. }));
}

#[test]
fn remote_defaults_and_trims_slash() {
    let config = RemoteConfig::from_lookup(lookup(&[("REMOTE_BASE_URL", "https://api.example.com/v1/")])).unwrap();
    assert_eq!(config.base_url, "https://api.example.com/v1");
    assert!(config.api_token.is_none());
    assert_eq!(config.request_timeout_secs, 30);
    assert_eq!(config.connect_timeout_secs, 10);
}

#[test]
fn remote_reads_token_and_timeouts() {
    let config = RemoteConfig::from_lookup(lookup(&[
        ("REMOTE_BASE_URL", "http://localhost:3000"),
        ("REMOTE_API_TOKEN", "secret"),
        ("REMOTE_REQUEST_TIMEOUT_SECS", "5"),
        ("REMOTE_CONNECT_TIMEOUT_SECS", "2"),
    ]))
    .unwrap();
    assert_eq!(config.api_token.as_deref(), Some("secret"));
    assert_eq!(config.request_timeout_secs, 5);
    assert_eq!(config.connect_timeout_secs, 2);
}

#[test]
fn error_codes() {
    use crate::error::ErrorCode;
    assert_eq!(ConfigError::Missing { var: "X" }.error_code(), "E_CONFIG_MISSING");
    assert_eq!(ConfigError::Invalid { var: "X", value: String::new() }.error_code(), "E_CONFIG_INVALID");
}

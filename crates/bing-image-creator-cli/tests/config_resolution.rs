//! Config file resolution and command-line override tests.

use std::io::Write;

use bing_image_creator::CreatorConfig;
use bing_image_creator_cli::commands::normalize_prompt;
use bing_image_creator_cli::config::{load_config, load_config_at, resolve_config_path, ConfigOverrides};

// ─────────────────────── helpers ───────────────────────

fn write_config(dir: &tempfile::TempDir, body: &str) -> String {
    let path = dir.path().join("config.json");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(body.as_bytes()).unwrap();
    path.to_str().unwrap().to_string()
}

// ═══════════════════════════════════════════════════════
// RESOLUTION
// ═══════════════════════════════════════════════════════

#[test]
fn test_explicit_path_wins() {
    let resolved = resolve_config_path(Some("/tmp/custom.json")).unwrap();
    assert_eq!(resolved.to_str().unwrap(), "/tmp/custom.json");
}

#[test]
fn test_load_config_reads_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"{ "user_token": "abc", "forwarded_for": "10.0.0.0/24", "enable_suffix": false }"#,
    );

    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.user_token.as_deref(), Some("abc"));
    assert_eq!(config.forwarded_for.as_deref(), Some("10.0.0.0/24"));
    assert!(!config.enable_suffix);
    assert!(config.enable_telemetry);
}

#[test]
fn test_resolved_path_loads_the_same_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, r#"{ "host": "https://cn.bing.com" }"#);

    let resolved = resolve_config_path(Some(&path)).unwrap();
    let config = load_config_at(Some(&resolved)).unwrap();
    assert_eq!(config.host.as_deref(), Some("https://cn.bing.com"));
}

#[test]
fn test_no_config_file_gives_defaults() {
    let config = load_config_at(None).unwrap();
    assert_eq!(config.request_timeout_secs, 30);
    assert!(config.enable_telemetry);
}

#[test]
fn test_load_config_reports_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.json");
    let err = load_config(Some(missing.to_str().unwrap())).unwrap_err();
    assert!(format!("{err:#}").contains("nope.json"));
}

#[test]
fn test_load_config_rejects_malformed_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "{ not json");
    assert!(load_config(Some(&path)).is_err());
}

// ═══════════════════════════════════════════════════════
// OVERRIDES
// ═══════════════════════════════════════════════════════

#[test]
fn test_overrides_replace_only_given_fields() {
    let base = CreatorConfig {
        user_token: Some("from-file".into()),
        proxy: Some("http://file-proxy:8080".into()),
        ..Default::default()
    };
    let overrides = ConfigOverrides {
        user_token: Some("from-flag".into()),
        debug: true,
        ..Default::default()
    };

    let config = overrides.apply(base);
    assert_eq!(config.user_token.as_deref(), Some("from-flag"));
    assert_eq!(config.proxy.as_deref(), Some("http://file-proxy:8080"));
    assert!(config.debug);
}

#[test]
fn test_debug_flag_does_not_clear_file_setting() {
    let base = CreatorConfig {
        debug: true,
        ..Default::default()
    };
    let config = ConfigOverrides::default().apply(base);
    assert!(config.debug);
}

#[test]
fn test_inline_marker_prompt() {
    assert_eq!(
        normalize_prompt("![a castle at dusk](#generative_image)"),
        "a castle at dusk"
    );
    assert_eq!(normalize_prompt("plain words"), "plain words");
}

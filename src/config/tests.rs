//! Configuration tests

use std::io::Write;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::NamedTempFile;

use super::*;

#[test]
fn defaults_match_platform_session_parameters() {
    let config = Config::default();
    assert_eq!(config.mqtt.keepalive, Duration::from_secs(25));
    assert_eq!(config.mqtt.connect_timeout, Duration::from_secs(60));
    assert_eq!(config.mqtt.event_channel_capacity, 64);
    assert_eq!(config.topics.namespace, "connio");
    assert_eq!(config.log.level, "info");
    config.validate().unwrap();
}

#[test]
fn loads_toml_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[log]
level = "debug"

[mqtt]
keepalive = "30s"
connect_timeout = "2m"

[topics]
namespace = "acme"
"#
    )
    .unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.log.level, "debug");
    assert_eq!(config.mqtt.keepalive, Duration::from_secs(30));
    assert_eq!(config.mqtt.connect_timeout, Duration::from_secs(120));
    assert_eq!(config.topics.namespace, "acme");
}

#[test]
fn parses_inline_toml() {
    let config = Config::parse(
        r#"
[mqtt]
keepalive = "30s"
connect_timeout = "45s"
"#,
    )
    .unwrap();
    assert_eq!(config.mqtt.keepalive, Duration::from_secs(30));
    assert_eq!(config.mqtt.connect_timeout, Duration::from_secs(45));
}

#[test]
fn parse_rejects_malformed_toml() {
    let result = Config::parse("keepalive = ");
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn missing_sections_use_defaults() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[log]\nlevel = \"warn\"").unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.log.level, "warn");
    assert_eq!(config.mqtt.keepalive, Duration::from_secs(25));
}

#[test]
fn env_var_substitution() {
    std::env::set_var("EDGEMUX_TEST_NAMESPACE", "factory");
    let substituted = substitute_env_vars("namespace = \"${EDGEMUX_TEST_NAMESPACE}\"");
    assert_eq!(substituted, "namespace = \"factory\"");
    std::env::remove_var("EDGEMUX_TEST_NAMESPACE");
}

#[test]
fn env_var_substitution_default() {
    let substituted = substitute_env_vars("level = \"${EDGEMUX_UNSET_VAR:-trace}\"");
    assert_eq!(substituted, "level = \"trace\"");
}

#[test]
fn rejects_invalid_log_level() {
    let mut config = Config::default();
    config.log.level = "verbose".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn rejects_zero_keepalive() {
    let mut config = Config::default();
    config.mqtt.keepalive = Duration::ZERO;
    assert!(config.validate().is_err());
}

#[test]
fn rejects_timeout_shorter_than_keepalive() {
    let mut config = Config::default();
    config.mqtt.connect_timeout = Duration::from_secs(5);
    assert!(config.validate().is_err());
}

#[test]
fn rejects_namespace_with_separator() {
    let mut config = Config::default();
    config.topics.namespace = "a/b".to_string();
    assert!(config.validate().is_err());
}

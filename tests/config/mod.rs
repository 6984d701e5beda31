/// Integration-level checks for configuration loading: YAML file plus
/// environment-variable overrides, exercised through the public
/// `SandboxConfig::load` entry point rather than internal helpers.
use sandboxd::config::{SandboxConfig, TransportMode};
use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
#[serial]
fn env_override_wins_over_yaml_value() {
    let mut file = NamedTempFile::new().expect("create temp config file");
    writeln!(file, "execution:\n  max_workers: 2\n").unwrap();

    std::env::set_var("MAX_WORKERS", "9");
    let config = SandboxConfig::load(Some(file.path())).expect("load config");
    std::env::remove_var("MAX_WORKERS");

    assert_eq!(config.execution.max_workers, 9);
}

#[test]
#[serial]
fn missing_config_file_falls_back_to_defaults() {
    let config = SandboxConfig::load(Some(std::path::Path::new("/nonexistent/mcp-config.yaml")))
        .expect("load config with missing file falls back");
    assert_eq!(config.execution.max_workers, 4);
    assert_eq!(config.mcp.transport.mode, TransportMode::Stdio);
}

#[test]
#[serial]
fn transport_mode_env_override_is_parsed() {
    std::env::set_var("MCP_TRANSPORT", "mcp");
    let config = SandboxConfig::load(None).expect("load config");
    std::env::remove_var("MCP_TRANSPORT");
    assert_eq!(config.mcp.transport.mode, TransportMode::StreamableHttp);
}

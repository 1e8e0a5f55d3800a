//! Configuration resolution tests.
//!
//! Tests the CLI > environment > file > defaults merge and the
//! one-channel rule for the supervised command.

use clap::Parser;
use serial_test::serial;

use logsieve_cli::cli::Cli;
use logsieve_cli::settings::resolve_config;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).expect("cli args should parse")
}

#[tokio::test]
async fn test_defaults_without_file() {
    // Given: no config file, no overrides
    let cli = parse(&["logsieve"]);

    // When: resolving configuration
    let config = resolve_config(&cli).await.expect("resolve should succeed");

    // Then: defaults apply
    assert_eq!(config.general.log_level, "info");
    assert!(config.command.argv.is_empty());
    assert_eq!(config.debug.listen_addr, "127.0.0.1:4083");
}

#[tokio::test]
async fn test_trailing_command_fills_argv() {
    let cli = parse(&["logsieve", "--", "sh", "-c", "ls"]);
    let config = resolve_config(&cli).await.expect("resolve should succeed");
    assert_eq!(config.command.argv, vec!["sh", "-c", "ls"]);
}

#[tokio::test]
async fn test_command_in_both_channels_is_rejected() {
    // Given: a config file that already sets [command].argv
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logsieve.toml");
    tokio::fs::write(&path, "[command]\nargv = [\"sleep\", \"1\"]\n")
        .await
        .unwrap();

    // When: a trailing command is also given on the CLI
    let cli = parse(&[
        "logsieve",
        "--config",
        path.to_str().unwrap(),
        "--",
        "echo",
        "hi",
    ]);
    let result = resolve_config(&cli).await;

    // Then: resolution fails before any pipeline work starts
    let err = result.expect_err("conflicting command channels must be rejected");
    assert!(err.to_string().contains("both"));
}

#[tokio::test]
async fn test_cli_log_level_wins_over_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logsieve.toml");
    tokio::fs::write(&path, "[general]\nlog_level = \"warn\"\n")
        .await
        .unwrap();

    let cli = parse(&[
        "logsieve",
        "--config",
        path.to_str().unwrap(),
        "--log-level",
        "trace",
    ]);
    let config = resolve_config(&cli).await.expect("resolve should succeed");
    assert_eq!(config.general.log_level, "trace");
}

#[tokio::test]
#[serial]
async fn test_env_override_applies_without_file() {
    unsafe { std::env::set_var("LOGSIEVE_CAPTURE_PATH", "/tmp/logsieve-full.log") };
    let cli = parse(&["logsieve"]);
    let config = resolve_config(&cli).await.expect("resolve should succeed");
    unsafe { std::env::remove_var("LOGSIEVE_CAPTURE_PATH") };

    assert_eq!(config.capture.path, "/tmp/logsieve-full.log");
}

#[tokio::test]
async fn test_invalid_merged_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logsieve.toml");
    tokio::fs::write(
        &path,
        r#"
[filter]
exclude_template = "{{ level }}"
query = ".level"
"#,
    )
    .await
    .unwrap();

    let cli = parse(&["logsieve", "--config", path.to_str().unwrap()]);
    assert!(resolve_config(&cli).await.is_err());
}

#[tokio::test]
async fn test_missing_config_file_is_reported() {
    let cli = parse(&["logsieve", "--config", "/nonexistent/logsieve.toml"]);
    let err = resolve_config(&cli).await.expect_err("missing file must fail");
    assert!(err.to_string().contains("not found"));
}

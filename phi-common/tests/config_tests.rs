//! Integration tests for configuration loading and resolution
//!
//! Tests that manipulate PHI_CONFIG are marked with #[serial] so they do not
//! race each other on the process environment.

use phi_common::config::{
    load_toml_config, resolve_config, write_toml_config, StageSpec, TomlConfig, CONFIG_ENV_VAR,
};
use phi_common::Error;
use serial_test::serial;
use std::env;
use tempfile::TempDir;

#[test]
fn test_write_then_load_preserves_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("phi.toml");

    let mut config = TomlConfig::default();
    config.stages = vec![
        StageSpec::new("vision", 2.0).with_timeout_ms(250),
        StageSpec::new("quantum", 1.0).depends_on(["vision"]),
    ];
    config.scoring.hold = 0.4;
    config.balance.water = 3.0;

    write_toml_config(&config, &path).unwrap();
    let loaded = load_toml_config(&path).unwrap();

    assert_eq!(loaded, config);
}

#[test]
fn test_load_full_document() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("phi.toml");
    std::fs::write(
        &path,
        r#"
[logging]
level = "debug"

[scoring]
hold = 0.3
accept = 0.7

[balance]
fire = 2.0

[[stages]]
name = "vision"
weight = 1.0
timeout_ms = 500

[[stages]]
name = "reasoning"
weight = 2.0
depends_on = ["vision"]
"#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.scoring.hold, 0.3);
    assert_eq!(config.balance.fire, 2.0);
    assert_eq!(config.balance.earth, 1.0);
    assert_eq!(config.stages[1].depends_on, vec!["vision".to_string()]);
    assert_eq!(config.stages[1].timeout_ms, 1000);
}

#[test]
fn test_load_rejects_non_positive_weight() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("phi.toml");
    std::fs::write(
        &path,
        r#"
[[stages]]
name = "vision"
weight = -1.0
"#,
    )
    .unwrap();

    assert!(matches!(load_toml_config(&path), Err(Error::Config(_))));
}

#[test]
fn test_load_rejects_malformed_toml() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("phi.toml");
    std::fs::write(&path, "[[stages]\nname = ").unwrap();

    assert!(matches!(load_toml_config(&path), Err(Error::TomlParse(_))));
}

#[test]
fn test_load_rejects_misspelled_category_key() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("phi.toml");
    std::fs::write(&path, "[balance]\nfyre = 5.0\n").unwrap();

    let err = load_toml_config(&path).unwrap_err();
    assert!(matches!(err, Error::TomlParse(_)));
    assert!(err.to_string().contains("fyre"));
}

#[test]
fn test_load_rejects_misspelled_stage_key() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("phi.toml");
    std::fs::write(
        &path,
        r#"
[[stages]]
name = "a"
weight = 1.0

[[stages]]
name = "b"
weight = 1.0
depend_on = ["a"]
"#,
    )
    .unwrap();

    let err = load_toml_config(&path).unwrap_err();
    assert!(matches!(err, Error::TomlParse(_)));
    assert!(err.to_string().contains("depend_on"));
}

#[test]
fn test_load_rejects_unknown_section() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("phi.toml");
    std::fs::write(&path, "[scoreing]\nhold = 0.2\n").unwrap();

    assert!(matches!(load_toml_config(&path), Err(Error::TomlParse(_))));
}

#[test]
fn test_load_missing_file_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("absent.toml");

    assert!(matches!(load_toml_config(&path), Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_cli_path_takes_priority_over_env() {
    let temp_dir = TempDir::new().unwrap();
    let cli_path = temp_dir.path().join("cli.toml");
    let env_path = temp_dir.path().join("env.toml");

    let mut cli_config = TomlConfig::default();
    cli_config.scoring.hold = 0.1;
    write_toml_config(&cli_config, &cli_path).unwrap();

    let mut env_config = TomlConfig::default();
    env_config.scoring.hold = 0.2;
    write_toml_config(&env_config, &env_path).unwrap();

    env::set_var(CONFIG_ENV_VAR, &env_path);
    let resolved = resolve_config(Some(&cli_path)).unwrap();
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(resolved.scoring.hold, 0.1);
}

#[test]
#[serial]
fn test_env_var_used_without_cli_path() {
    let temp_dir = TempDir::new().unwrap();
    let env_path = temp_dir.path().join("env.toml");

    let mut env_config = TomlConfig::default();
    env_config.scoring.accept = 0.9;
    write_toml_config(&env_config, &env_path).unwrap();

    env::set_var(CONFIG_ENV_VAR, &env_path);
    let resolved = resolve_config(None).unwrap();
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(resolved.scoring.accept, 0.9);
}

#[test]
#[serial]
fn test_env_var_pointing_nowhere_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    env::set_var(CONFIG_ENV_VAR, temp_dir.path().join("missing.toml"));
    let resolved = resolve_config(None);
    env::remove_var(CONFIG_ENV_VAR);

    assert!(resolved.is_err());
}

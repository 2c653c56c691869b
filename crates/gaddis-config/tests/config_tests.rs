//! Configuration loading and precedence tests

use gaddis_config::{ConfigError, ConfigLoader};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

/// Loader whose global config lives inside the temp dir, never the user's.
fn isolated_loader(temp: &TempDir) -> ConfigLoader {
    ConfigLoader::with_global_path(temp.path().join("global").join("config.toml"))
}

// ============================================================================
// Loading
// ============================================================================

#[test]
#[serial]
fn test_defaults_without_any_file() {
    let temp = TempDir::new().unwrap();
    let mut loader = isolated_loader(&temp);
    let config = loader.load_from_directory(temp.path()).unwrap();

    assert_eq!(config.settings.vm.max_instructions, 1 << 30);
    assert_eq!(config.settings.vm.max_stack_depth, 1024);
    assert_eq!(config.project_root, None);
}

#[test]
#[serial]
fn test_project_file_found_in_parent() {
    let temp = TempDir::new().unwrap();
    write_file(
        temp.path(),
        "gaddis.toml",
        r#"
[vm]
max_stack_depth = 64
seed = 7
"#,
    );
    let nested = temp.path().join("src").join("lessons");
    fs::create_dir_all(&nested).unwrap();

    let mut loader = isolated_loader(&temp);
    let config = loader.load_from_directory(&nested).unwrap();

    assert_eq!(config.settings.vm.max_stack_depth, 64);
    assert_eq!(config.settings.vm.seed, Some(7));
    assert_eq!(config.project_root.as_deref(), Some(temp.path()));
}

#[test]
#[serial]
fn test_project_overrides_global() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("global")).unwrap();
    write_file(
        &temp.path().join("global"),
        "config.toml",
        r#"
[debug]
stop_on_entry = true

[log]
level = "info"
"#,
    );
    write_file(
        temp.path(),
        "gaddis.toml",
        r#"
[log]
level = "trace"
"#,
    );

    let mut loader = isolated_loader(&temp);
    let config = loader.load_from_directory(temp.path()).unwrap();

    assert!(config.settings.debug.stop_on_entry);
    assert_eq!(config.settings.log.level, "trace");
}

#[test]
#[serial]
fn test_invalid_toml_reports_file() {
    let temp = TempDir::new().unwrap();
    let path = write_file(temp.path(), "gaddis.toml", "[vm\nseed = ");

    let mut loader = isolated_loader(&temp);
    match loader.load_from_file(&path) {
        Err(ConfigError::TomlParseError { file, .. }) => assert_eq!(file, path),
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[test]
#[serial]
fn test_missing_explicit_file() {
    let temp = TempDir::new().unwrap();
    let mut loader = isolated_loader(&temp);
    let result = loader.load_from_file(&temp.path().join("nope.toml"));
    assert!(matches!(result, Err(ConfigError::NotFound(_))));
}

// ============================================================================
// Environment Overrides
// ============================================================================

#[test]
#[serial]
fn test_env_overrides_project() {
    let temp = TempDir::new().unwrap();
    write_file(
        temp.path(),
        "gaddis.toml",
        r#"
[vm]
seed = 1
"#,
    );

    env::set_var("GADDIS_SEED", "99");
    env::set_var("GADDIS_NO_DEBUG", "yes");

    let mut loader = isolated_loader(&temp);
    let config = loader.load_from_directory(temp.path()).unwrap();

    env::remove_var("GADDIS_SEED");
    env::remove_var("GADDIS_NO_DEBUG");

    assert_eq!(config.settings.vm.seed, Some(99));
    assert!(config.settings.debug.no_debug);
}

#[test]
#[serial]
fn test_env_bad_number() {
    let temp = TempDir::new().unwrap();
    env::set_var("GADDIS_MAX_INSTRUCTIONS", "lots");

    let mut loader = isolated_loader(&temp);
    let result = loader.load_from_directory(temp.path());

    env::remove_var("GADDIS_MAX_INSTRUCTIONS");

    assert!(matches!(
        result,
        Err(ConfigError::InvalidValue { field, .. }) if field == "GADDIS_MAX_INSTRUCTIONS"
    ));
}

#[test]
#[serial]
fn test_env_zero_depth_fails_validation() {
    let temp = TempDir::new().unwrap();
    env::set_var("GADDIS_MAX_STACK_DEPTH", "0");

    let mut loader = isolated_loader(&temp);
    let result = loader.load_from_directory(temp.path());

    env::remove_var("GADDIS_MAX_STACK_DEPTH");

    assert!(result.is_err());
}

use super::*;

use std::{
    collections::HashMap,
    env,
    time::{SystemTime, UNIX_EPOCH},
};

use block_store::{BlockConfig, BlockStore};
use shared::{domain::BlockState, error::StoreError};

fn temp_path(name: &str) -> PathBuf {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    env::temp_dir().join(format!("blockctl_test_{suffix}_{name}"))
}

#[test]
fn parses_block_types_from_toml() {
    let settings = parse_settings(
        r#"
        event_capacity = 16

        [[block_types]]
        type = "quote"
        display_name = "Quote"
        max_blocks = 2
        max_length = 10

        [[block_types]]
        type = "note"
        "#,
    )
    .expect("parse");

    assert_eq!(settings.event_capacity, 16);
    assert_eq!(settings.log_filter, "info");
    assert_eq!(settings.block_types.len(), 2);
    assert_eq!(settings.block_types[0].max_blocks, Some(2));
    assert_eq!(settings.block_types[1].display_name, None);
}

#[test]
fn rejects_zero_max_blocks() {
    let err = parse_settings(
        r#"
        [[block_types]]
        type = "text"
        max_blocks = 0
        "#,
    )
    .expect_err("zero limit");
    assert!(err.to_string().contains("greater than zero"));
}

#[test]
fn rejects_duplicate_types() {
    let err = parse_settings(
        r#"
        [[block_types]]
        type = "text"

        [[block_types]]
        type = "text"
        "#,
    )
    .expect_err("duplicate");
    assert!(err.to_string().contains("configured twice"));
}

#[test]
fn env_overrides_take_precedence() {
    let vars: HashMap<String, String> = [
        ("BLOCKCTL__EVENT_CAPACITY", "8"),
        ("BLOCKCTL__LOG_FILTER", "debug"),
        ("BLOCKCTL__SAVE_LOG", "/tmp/blocks.jsonl"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let settings =
        apply_env_overrides(Settings::default(), |key| vars.get(key).cloned()).expect("env");

    assert_eq!(settings.event_capacity, 8);
    assert_eq!(settings.log_filter, "debug");
    assert_eq!(settings.save_log, Some(PathBuf::from("/tmp/blocks.jsonl")));
}

#[test]
fn bad_env_capacity_is_an_error() {
    let err = apply_env_overrides(Settings::default(), |key| {
        (key == "BLOCKCTL__EVENT_CAPACITY").then(|| "lots".to_string())
    })
    .expect_err("not a number");
    assert!(err.to_string().contains("EVENT_CAPACITY"));
}

#[test]
fn missing_explicit_settings_file_is_an_error() {
    let path = temp_path("missing.toml");
    let err = load_settings(Some(path.as_path())).expect_err("missing file");
    assert!(err.to_string().contains("failed to read settings file"));
}

#[test]
fn block_configs_apply_limits_and_length_checks() {
    let settings = Settings::default();
    let configs = settings.block_configs();
    let heading = configs
        .iter()
        .find(|config| config.block_type().as_str() == "heading")
        .expect("heading config");

    assert_eq!(heading.display_name(), "Heading");
    assert_eq!(heading.limit().max_blocks(), Some(3));
    assert!(heading.validate(&default_payload()).is_ok());
    assert!(heading
        .validate(&json!({ "text": "x".repeat(81) }))
        .is_err());
    assert!(heading.validate(&json!({ "title": "x" })).is_err());
    assert!(heading.validate(&json!({ "text": 5 })).is_err());
}

#[tokio::test]
async fn save_handler_appends_to_save_log() {
    let path = temp_path("saves.jsonl");
    let settings = Settings {
        save_log: Some(path.clone()),
        ..Settings::default()
    };
    let store: BlockStore<Value> = BlockStore::new();
    for config in settings.block_configs() {
        store.register_config(config);
    }

    let id = store.add_block("text").expect("add").expect("below limit");
    store
        .update_block_data(id, json!({ "text": "hello" }))
        .expect("update");
    store.save_block(id).await.expect("save");

    let raw = fs::read_to_string(&path).expect("save log");
    let lines: Vec<Value> = raw
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["id"], json!(id.to_string()));
    assert_eq!(lines[0]["data"]["text"], "hello");

    fs::remove_file(path).expect("cleanup");
}

#[test]
fn unknown_keys_are_rejected() {
    let err = parse_settings(
        r#"
        [[block_types]]
        type = "title"
        required = true
        "#,
    )
    .expect_err("unknown block type key");
    assert!(err.to_string().contains("required"), "{err}");

    parse_settings("log_level = \"debug\"").expect_err("unknown top-level key");
}

#[test]
fn absent_default_file_falls_back_but_unreadable_one_fails() {
    let missing = temp_path("absent.toml");
    assert!(read_optional(&missing).expect("missing is fine").is_none());

    let dir = temp_path("settings_dir");
    fs::create_dir(&dir).expect("create dir");
    let err = read_optional(&dir).expect_err("directory is not readable as text");
    assert!(err.to_string().contains("failed to read settings file"));
    fs::remove_dir(dir).expect("cleanup");
}

#[tokio::test]
async fn save_log_write_failure_fails_the_save() {
    let dir = temp_path("save_log_dir");
    fs::create_dir(&dir).expect("create dir");
    let settings = Settings {
        save_log: Some(dir.clone()),
        ..Settings::default()
    };
    let store: BlockStore<Value> = BlockStore::new();
    for config in settings.block_configs() {
        store.register_config(config);
    }

    let id = store.add_block("text").expect("add").expect("below limit");
    store.enable_block_edit(id).expect("edit");
    store
        .update_block_data(id, json!({ "text": "kept" }))
        .expect("update");

    let err = store.save_block(id).await.expect_err("log is a directory");
    assert!(matches!(err, StoreError::SaveFailed { .. }));

    let block = store.get_block(id).expect("block");
    assert_eq!(block.state, BlockState::Dirty);
    assert!(block.is_editing);
    assert_eq!(block.saved_at, None);

    fs::remove_dir(dir).expect("cleanup");
}

use std::{
    collections::HashSet,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use block_store::{Block, FnBlockConfig};
use serde::Deserialize;
use serde_json::{json, Value};
use shared::domain::BlockLimit;
use tokio::io::AsyncWriteExt;
use tracing::info;

pub const DEFAULT_SETTINGS_PATH: &str = "blockctl.toml";
const ENV_PREFIX: &str = "BLOCKCTL__";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub event_capacity: usize,
    pub log_filter: String,
    pub save_log: Option<PathBuf>,
    pub block_types: Vec<BlockTypeSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockTypeSettings {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub max_blocks: Option<usize>,
    /// Longest text accepted at save time, in characters.
    #[serde(default)]
    pub max_length: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            event_capacity: 256,
            log_filter: "info".into(),
            save_log: None,
            block_types: vec![
                BlockTypeSettings {
                    block_type: "text".into(),
                    display_name: Some("Text".into()),
                    max_blocks: None,
                    max_length: None,
                },
                BlockTypeSettings {
                    block_type: "heading".into(),
                    display_name: Some("Heading".into()),
                    max_blocks: Some(3),
                    max_length: Some(80),
                },
            ],
        }
    }
}

/// Reads settings from `path` (or `blockctl.toml` when present), then applies
/// `BLOCKCTL__*` environment overrides.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let settings = match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
            parse_settings(&raw)
                .with_context(|| format!("invalid settings file '{}'", path.display()))?
        }
        None => match read_optional(Path::new(DEFAULT_SETTINGS_PATH))? {
            Some(raw) => parse_settings(&raw)
                .with_context(|| format!("invalid settings file '{DEFAULT_SETTINGS_PATH}'"))?,
            None => Settings::default(),
        },
    };

    let settings = apply_env_overrides(settings, |key| std::env::var(key).ok())?;
    validate_settings(&settings)?;
    Ok(settings)
}

/// `Ok(None)` only when the file does not exist.
fn read_optional(path: &Path) -> anyhow::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err)
            .with_context(|| format!("failed to read settings file '{}'", path.display())),
    }
}

pub fn parse_settings(raw: &str) -> anyhow::Result<Settings> {
    let settings: Settings = toml::from_str(raw)?;
    validate_settings(&settings)?;
    Ok(settings)
}

pub fn apply_env_overrides(
    mut settings: Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    if let Some(v) = lookup(&format!("{ENV_PREFIX}EVENT_CAPACITY")) {
        settings.event_capacity = v
            .parse()
            .with_context(|| format!("{ENV_PREFIX}EVENT_CAPACITY must be a number, got '{v}'"))?;
    }
    if let Some(v) = lookup(&format!("{ENV_PREFIX}LOG_FILTER")) {
        settings.log_filter = v;
    }
    if let Some(v) = lookup(&format!("{ENV_PREFIX}SAVE_LOG")) {
        settings.save_log = if v.trim().is_empty() {
            None
        } else {
            Some(PathBuf::from(v))
        };
    }
    Ok(settings)
}

fn validate_settings(settings: &Settings) -> anyhow::Result<()> {
    let mut seen = HashSet::new();
    for entry in &settings.block_types {
        if entry.block_type.trim().is_empty() {
            bail!("block type names must not be empty");
        }
        if !seen.insert(entry.block_type.as_str()) {
            bail!("block type '{}' is configured twice", entry.block_type);
        }
        if BlockLimit::from_max_blocks(entry.max_blocks).is_none() {
            bail!(
                "max_blocks for block type '{}' must be greater than zero",
                entry.block_type
            );
        }
    }
    Ok(())
}

pub fn default_payload() -> Value {
    json!({ "text": "" })
}

pub fn payload_text(data: &Value) -> &str {
    data.get("text").and_then(Value::as_str).unwrap_or_default()
}

impl Settings {
    /// One store configuration per configured block type. Saved blocks are
    /// appended as JSON lines to `save_log` when it is set.
    pub fn block_configs(&self) -> Vec<FnBlockConfig<Value>> {
        self.block_types
            .iter()
            .map(|entry| {
                let display_name = entry
                    .display_name
                    .clone()
                    .unwrap_or_else(|| entry.block_type.clone());
                let limit = BlockLimit::from_max_blocks(entry.max_blocks).unwrap_or_default();
                let max_length = entry.max_length;
                let save_log = self.save_log.clone();

                FnBlockConfig::new(entry.block_type.as_str(), display_name, default_payload)
                    .with_limit(limit)
                    .with_validator(move |data: &Value| validate_payload(data, max_length))
                    .with_save_handler(move |block: Block<Value>| {
                        let save_log = save_log.clone();
                        async move {
                            if let Some(path) = save_log {
                                append_save_record(&path, &block).await?;
                            }
                            info!(block_id = %block.id, block_type = %block.block_type, "block saved");
                            Ok(())
                        }
                    })
            })
            .collect()
    }
}

fn validate_payload(data: &Value, max_length: Option<usize>) -> Result<(), String> {
    let Some(text) = data.get("text") else {
        return Err("payload must carry a \"text\" field".to_string());
    };
    let Some(text) = text.as_str() else {
        return Err("\"text\" must be a string".to_string());
    };
    if let Some(max) = max_length {
        let len = text.chars().count();
        if len > max {
            return Err(format!("text is {len} characters, limit is {max}"));
        }
    }
    Ok(())
}

async fn append_save_record(path: &Path, block: &Block<Value>) -> anyhow::Result<()> {
    let mut line = serde_json::to_vec(block)?;
    line.push(b'\n');
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("failed to open save log '{}'", path.display()))?;
    file.write_all(&line)
        .await
        .with_context(|| format!("failed to append to save log '{}'", path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("failed to flush save log '{}'", path.display()))?;
    Ok(())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;

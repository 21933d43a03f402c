//! Line-oriented front end over a [`BlockStore`]: parses commands, forwards
//! them to the store and renders the results.

use std::{collections::HashMap, str::FromStr, sync::Arc};

use block_store::{Block, BlockConfig, BlockStore, SaveOutcome};
use serde_json::{json, Value};
use shared::{
    domain::{BlockId, BlockType},
    error::{ErrorCode, ErrorReport, StoreError},
};
use thiserror::Error;
use tracing::debug;

use crate::{
    config::Settings,
    render::{BlockRenderer, RawRenderer, TextRenderer},
};

pub const HELP: &str = "\
commands:
  types                 list registered block types
  add <type>            add a block of <type>
  edit <id>             enter edit mode
  done <id>             leave edit mode without saving
  set <id> <text|json>  replace a block's payload
  save <id>             validate and save a block
  move <id> <order>     move a block within its type
  rm <id>               remove a block
  ls [type]             list blocks
  show <id>             print a block as JSON
  editing               show the block in edit mode
  reset                 clear the store and re-register types
  quit                  exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Types,
    Add(String),
    Edit(String),
    Done(String),
    Set { id: String, payload: String },
    Save(String),
    Move { id: String, order: usize },
    Remove(String),
    List(Option<String>),
    Show(String),
    Editing,
    Reset,
    Help,
    Quit,
}

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("{0}")]
    Parse(String),
    #[error("no block matches '{0}'")]
    UnknownBlock(String),
    #[error("'{0}' matches more than one block")]
    AmbiguousBlock(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to render block: {0}")]
    Render(#[from] serde_json::Error),
}

impl ConsoleError {
    /// Store failures keep their code; console-level failures report as
    /// validation errors of the input line.
    pub fn report(&self) -> ErrorReport {
        match self {
            ConsoleError::Store(err) => ErrorReport::from(err),
            ConsoleError::UnknownBlock(_) => {
                ErrorReport::new(ErrorCode::BlockNotFound, self.to_string())
            }
            ConsoleError::Parse(_) | ConsoleError::AmbiguousBlock(_) | ConsoleError::Render(_) => {
                ErrorReport::new(ErrorCode::Validation, self.to_string())
            }
        }
    }
}

fn one_arg(args: &[&str], usage: &str) -> Result<String, ConsoleError> {
    match args {
        [arg] => Ok((*arg).to_string()),
        _ => Err(ConsoleError::Parse(format!("usage: {usage}"))),
    }
}

impl FromStr for Command {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = line
            .split_once(char::is_whitespace)
            .map(|(verb, rest)| (verb, rest.trim()))
            .unwrap_or((line, ""));
        let args: Vec<&str> = rest.split_whitespace().collect();

        match verb {
            "types" => Ok(Command::Types),
            "add" => one_arg(&args, "add <type>").map(Command::Add),
            "edit" => one_arg(&args, "edit <id>").map(Command::Edit),
            "done" => one_arg(&args, "done <id>").map(Command::Done),
            "set" => {
                let (id, payload) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| ConsoleError::Parse("usage: set <id> <text|json>".into()))?;
                Ok(Command::Set {
                    id: id.to_string(),
                    payload: payload.trim().to_string(),
                })
            }
            "save" => one_arg(&args, "save <id>").map(Command::Save),
            "move" => match args.as_slice() {
                [id, order] => {
                    let order = order.parse().map_err(|_| {
                        ConsoleError::Parse(format!("order must be a number, got '{order}'"))
                    })?;
                    Ok(Command::Move {
                        id: (*id).to_string(),
                        order,
                    })
                }
                _ => Err(ConsoleError::Parse("usage: move <id> <order>".into())),
            },
            "rm" => one_arg(&args, "rm <id>").map(Command::Remove),
            "ls" => match args.as_slice() {
                [] => Ok(Command::List(None)),
                [block_type] => Ok(Command::List(Some((*block_type).to_string()))),
                _ => Err(ConsoleError::Parse("usage: ls [type]".into())),
            },
            "show" => one_arg(&args, "show <id>").map(Command::Show),
            "editing" => Ok(Command::Editing),
            "reset" => Ok(Command::Reset),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            "" => Err(ConsoleError::Parse("empty command".into())),
            other => Err(ConsoleError::Parse(format!(
                "unknown command '{other}' (try 'help')"
            ))),
        }
    }
}

/// Text that is valid JSON is taken as the whole payload, anything else
/// becomes `{"text": ...}`.
pub fn parse_payload(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => value,
        _ => json!({ "text": raw }),
    }
}

pub struct Console {
    store: Arc<BlockStore<Value>>,
    settings: Settings,
    renderers: HashMap<BlockType, Box<dyn BlockRenderer>>,
    fallback: RawRenderer,
}

impl Console {
    pub fn new(store: Arc<BlockStore<Value>>, settings: Settings) -> Self {
        let mut console = Self {
            store,
            settings,
            renderers: HashMap::new(),
            fallback: RawRenderer,
        };
        console.register_types();
        console
    }

    pub fn store(&self) -> &Arc<BlockStore<Value>> {
        &self.store
    }

    fn register_types(&mut self) {
        self.renderers.clear();
        for config in self.settings.block_configs() {
            let block_type = config.block_type().clone();
            let display_name = config.display_name().to_string();
            self.renderers
                .insert(block_type, Box::new(TextRenderer::new(display_name)));
            self.store.register_config(config);
        }
    }

    fn renderer_for(&self, block: &Block<Value>) -> &dyn BlockRenderer {
        match self.renderers.get(&block.block_type) {
            Some(renderer) if self.store.is_registered(block.block_type.as_str()) => {
                &**renderer
            }
            _ => &self.fallback,
        }
    }

    fn render(&self, block: &Block<Value>) -> String {
        self.renderer_for(block).render(block)
    }

    /// Resolves a full id or a unique id prefix.
    fn resolve(&self, reference: &str) -> Result<BlockId, ConsoleError> {
        if let Ok(id) = reference.parse::<BlockId>() {
            return Ok(id);
        }
        let mut matches = self
            .store
            .list_blocks()
            .into_iter()
            .map(|block| block.id)
            .filter(|id| id.to_string().starts_with(reference));
        match (matches.next(), matches.next()) {
            (Some(id), None) => Ok(id),
            (None, _) => Err(ConsoleError::UnknownBlock(reference.to_string())),
            (Some(_), Some(_)) => Err(ConsoleError::AmbiguousBlock(reference.to_string())),
        }
    }

    fn render_id(&self, id: BlockId) -> Vec<String> {
        self.store
            .get_block(id)
            .map(|block| vec![self.render(&block)])
            .unwrap_or_default()
    }

    /// Runs one command and returns the lines to print.
    pub async fn execute(&mut self, command: Command) -> Result<Vec<String>, ConsoleError> {
        debug!(?command, "console command");
        match command {
            Command::Types => Ok(self
                .store
                .registered_types()
                .into_iter()
                .map(|block_type| {
                    let name = self
                        .store
                        .display_name(block_type.as_str())
                        .unwrap_or_default();
                    let count = self.store.block_count(block_type.as_str());
                    let room = if self.store.can_add_block(block_type.as_str()) {
                        "open"
                    } else {
                        "full"
                    };
                    format!("{block_type}\t{name}\t{count} block(s)\t{room}")
                })
                .collect()),
            Command::Add(block_type) => match self.store.add_block(&block_type)? {
                Some(id) => Ok(self.render_id(id)),
                None => Ok(vec![format!(
                    "limit reached: no more '{block_type}' blocks can be added"
                )]),
            },
            Command::Edit(reference) => {
                let id = self.resolve(&reference)?;
                self.store.enable_block_edit(id)?;
                Ok(self.render_id(id))
            }
            Command::Done(reference) => {
                let id = self.resolve(&reference)?;
                self.store.disable_block_edit(id)?;
                Ok(self.render_id(id))
            }
            Command::Set { id, payload } => {
                let id = self.resolve(&id)?;
                self.store.update_block_data(id, parse_payload(&payload))?;
                Ok(self.render_id(id))
            }
            Command::Save(reference) => {
                let id = self.resolve(&reference)?;
                let outcome = self.store.save_block(id).await?;
                let mut lines = self.render_id(id);
                match outcome {
                    SaveOutcome::Saved => {}
                    SaveOutcome::Superseded => {
                        lines.push("saved, but the block changed meanwhile".to_string())
                    }
                    SaveOutcome::Discarded => {
                        lines.push("block was removed before the save finished".to_string())
                    }
                }
                Ok(lines)
            }
            Command::Move { id, order } => {
                let id = self.resolve(&id)?;
                self.store.move_block(id, order)?;
                Ok(self.render_id(id))
            }
            Command::Remove(reference) => {
                let id = self.resolve(&reference)?;
                let removed = self.store.remove_block(id)?;
                Ok(vec![format!("removed {} block {}", removed.block_type, removed.id)])
            }
            Command::List(block_type) => {
                let blocks = match block_type {
                    Some(block_type) => self.store.get_blocks_by_type(&block_type),
                    None => self.store.list_blocks(),
                };
                Ok(blocks.iter().map(|block| self.render(block)).collect())
            }
            Command::Show(reference) => {
                let id = self.resolve(&reference)?;
                let block = self
                    .store
                    .get_block(id)
                    .ok_or(StoreError::BlockNotFound(id))?;
                let rendered = serde_json::to_string_pretty(&block)?;
                Ok(rendered.lines().map(str::to_string).collect())
            }
            Command::Editing => Ok(self
                .store
                .get_editing_block()
                .map(|block| vec![self.render(&block)])
                .unwrap_or_else(|| vec!["no block is being edited".to_string()])),
            Command::Reset => {
                self.store.reset();
                self.register_types();
                Ok(vec!["store reset".to_string()])
            }
            Command::Help => Ok(HELP.lines().map(str::to_string).collect()),
            Command::Quit => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
#[path = "tests/console_tests.rs"]
mod tests;

//! View and edit renderings for blocks shown in the console.

use block_store::Block;
use serde_json::Value;
use shared::domain::BlockState;

use crate::config::payload_text;

pub trait BlockRenderer: Send + Sync {
    fn render_view(&self, block: &Block<Value>) -> String;
    fn render_edit(&self, block: &Block<Value>) -> String;

    fn render(&self, block: &Block<Value>) -> String {
        if block.is_editing {
            self.render_edit(block)
        } else {
            self.render_view(block)
        }
    }
}

fn short_id(block: &Block<Value>) -> String {
    block.id.to_string().chars().take(8).collect()
}

fn state_marker(state: BlockState) -> &'static str {
    match state {
        BlockState::Empty => " ",
        BlockState::Dirty => "*",
        BlockState::Clean => "=",
    }
}

/// Renders `{"text": ...}` payloads.
pub struct TextRenderer {
    display_name: String,
}

impl TextRenderer {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
        }
    }
}

impl BlockRenderer for TextRenderer {
    fn render_view(&self, block: &Block<Value>) -> String {
        let text = payload_text(&block.data);
        let body = if text.is_empty() { "(empty)" } else { text };
        format!(
            "{}{} {} #{} {}",
            state_marker(block.state),
            short_id(block),
            self.display_name,
            block.order,
            body
        )
    }

    fn render_edit(&self, block: &Block<Value>) -> String {
        format!(
            "{}{} {} #{} [editing, {}] > {}",
            state_marker(block.state),
            short_id(block),
            self.display_name,
            block.order,
            block.state,
            payload_text(&block.data)
        )
    }
}

/// Fallback for blocks whose type is no longer registered.
pub struct RawRenderer;

impl BlockRenderer for RawRenderer {
    fn render_view(&self, block: &Block<Value>) -> String {
        format!(
            "{}{} <{}> #{} {}",
            state_marker(block.state),
            short_id(block),
            block.block_type,
            block.order,
            block.data
        )
    }

    fn render_edit(&self, block: &Block<Value>) -> String {
        format!("{} [editing]", self.render_view(block))
    }
}

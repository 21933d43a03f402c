use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{BlockId, BlockType};

/// Change notification published by the block store after each mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum StoreEvent {
    ConfigRegistered {
        block_type: BlockType,
    },
    ConfigUnregistered {
        block_type: BlockType,
    },
    BlockAdded {
        id: BlockId,
        block_type: BlockType,
        order: usize,
    },
    BlockRemoved {
        id: BlockId,
        block_type: BlockType,
    },
    BlockUpdated {
        id: BlockId,
        updated_at: DateTime<Utc>,
    },
    BlockMoved {
        id: BlockId,
        from: usize,
        to: usize,
    },
    EditStarted {
        id: BlockId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous: Option<BlockId>,
    },
    EditEnded {
        id: BlockId,
    },
    BlockSaved {
        id: BlockId,
        saved_at: DateTime<Utc>,
    },
    StoreReset,
}

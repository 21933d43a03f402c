//! In-memory orchestration store for typed content blocks.
//!
//! The store owns every block and every per-type configuration. It keeps one
//! global "currently editing" pointer, per-type live counters and a dense
//! per-type ordering (`0..count` for each type), and hands callers owned
//! snapshots only.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{
    domain::{BlockId, BlockState, BlockType},
    error::StoreError,
    protocol::StoreEvent,
};
use tokio::sync::broadcast;
use tracing::{debug, trace};

mod block_config;
pub use block_config::{BlockConfig, FnBlockConfig};

const DEFAULT_EVENT_CAPACITY: usize = 256;

/// One unit of content. Values handed out by the store are snapshots;
/// changing them has no effect on the store.
#[derive(Debug, Clone, Serialize)]
pub struct Block<D> {
    pub id: BlockId,
    pub block_type: BlockType,
    pub data: D,
    pub order: usize,
    pub state: BlockState,
    pub is_editing: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    revision: u64,
}

impl<D> Block<D> {
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// Data changed while the handler ran, so the block stays dirty.
    Superseded,
    Discarded,
}

struct StoreState<D>
where
    D: Send + Sync + 'static,
{
    blocks: HashMap<BlockId, Block<D>>,
    configs: HashMap<BlockType, Arc<dyn BlockConfig<D>>>,
    counts: HashMap<BlockType, usize>,
    editing: Option<BlockId>,
}

impl<D> StoreState<D>
where
    D: Send + Sync + 'static,
{
    fn new() -> Self {
        Self {
            blocks: HashMap::new(),
            configs: HashMap::new(),
            counts: HashMap::new(),
            editing: None,
        }
    }

    fn count(&self, block_type: &str) -> usize {
        self.counts.get(block_type).copied().unwrap_or(0)
    }

    fn block_mut(&mut self, id: BlockId) -> Result<&mut Block<D>, StoreError> {
        self.blocks
            .get_mut(&id)
            .ok_or(StoreError::BlockNotFound(id))
    }
}

fn now_after(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous)
}

pub struct BlockStore<D = serde_json::Value>
where
    D: Send + Sync + 'static,
{
    inner: Mutex<StoreState<D>>,
    events: broadcast::Sender<StoreEvent>,
}

impl<D> Default for BlockStore<D>
where
    D: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<D> BlockStore<D>
where
    D: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_event_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Mutex::new(StoreState::new()),
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState<D>> {
        // Every mutation completes before callbacks run, so a poisoned lock
        // still guards consistent state.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: StoreEvent) {
        trace!(?event, "store event");
        let _ = self.events.send(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn register_config<C>(&self, config: C)
    where
        C: BlockConfig<D> + 'static,
    {
        self.register_shared_config(Arc::new(config));
    }

    pub fn register_shared_config(&self, config: Arc<dyn BlockConfig<D>>) {
        let block_type = config.block_type().clone();
        let mut state = self.state();
        let replaced = state.configs.insert(block_type.clone(), config).is_some();
        debug!(block_type = %block_type, replaced, "registered block config");
        self.emit(StoreEvent::ConfigRegistered { block_type });
    }

    /// Blocks of the type stay in the store as orphans.
    pub fn unregister_config(&self, block_type: &str) -> bool {
        let mut state = self.state();
        let Some((block_type, _)) = state.configs.remove_entry(block_type) else {
            return false;
        };
        debug!(
            block_type = %block_type,
            orphaned = state.count(block_type.as_str()),
            "unregistered block config"
        );
        self.emit(StoreEvent::ConfigUnregistered { block_type });
        true
    }

    /// Returns `Ok(None)` when the type's limit is reached.
    pub fn add_block(&self, block_type: &str) -> Result<Option<BlockId>, StoreError> {
        loop {
            let config = {
                let state = self.state();
                let config = state
                    .configs
                    .get(block_type)
                    .cloned()
                    .ok_or_else(|| StoreError::ConfigNotFound(BlockType::from(block_type)))?;
                if !config.limit().allows(state.count(block_type)) {
                    debug!(block_type, "block limit reached");
                    return Ok(None);
                }
                config
            };

            let data = config.create_default();
            config
                .validate(&data)
                .map_err(|reason| StoreError::InvalidDefault {
                    block_type: BlockType::from(block_type),
                    reason,
                })?;

            let mut guard = self.state();
            // The registry may have moved while the factory ran.
            match guard.configs.get(block_type) {
                Some(current) if Arc::ptr_eq(current, &config) => {}
                Some(_) => {
                    debug!(block_type, "config replaced during add, retrying");
                    continue;
                }
                None => return Err(StoreError::ConfigNotFound(BlockType::from(block_type))),
            }
            return Ok(self.insert_block(&mut guard, &config, data));
        }
    }

    fn insert_block(
        &self,
        state: &mut StoreState<D>,
        config: &Arc<dyn BlockConfig<D>>,
        data: D,
    ) -> Option<BlockId> {
        let count = state.count(config.block_type().as_str());
        if !config.limit().allows(count) {
            debug!(block_type = %config.block_type(), "block limit reached");
            return None;
        }

        let block_type = config.block_type().clone();
        let id = BlockId::new();
        let now = Utc::now();
        state.blocks.insert(
            id,
            Block {
                id,
                block_type: block_type.clone(),
                data,
                order: count,
                state: BlockState::Empty,
                is_editing: false,
                created_at: now,
                updated_at: now,
                saved_at: None,
                revision: 0,
            },
        );
        *state.counts.entry(block_type.clone()).or_insert(0) += 1;

        debug!(block_id = %id, block_type = %block_type, order = count, "added block");
        self.emit(StoreEvent::BlockAdded {
            id,
            block_type,
            order: count,
        });
        Some(id)
    }

    pub fn remove_block(&self, id: BlockId) -> Result<Block<D>, StoreError> {
        let mut guard = self.state();
        let state = &mut *guard;
        let removed = state
            .blocks
            .remove(&id)
            .ok_or(StoreError::BlockNotFound(id))?;

        if let Some(count) = state.counts.get_mut(&removed.block_type) {
            *count = count.saturating_sub(1);
        }
        for block in state
            .blocks
            .values_mut()
            .filter(|block| block.block_type == removed.block_type && block.order > removed.order)
        {
            block.order -= 1;
        }

        let was_editing = state.editing == Some(id);
        if was_editing {
            state.editing = None;
        }

        debug!(block_id = %id, block_type = %removed.block_type, was_editing, "removed block");
        if was_editing {
            self.emit(StoreEvent::EditEnded { id });
        }
        self.emit(StoreEvent::BlockRemoved {
            id,
            block_type: removed.block_type.clone(),
        });
        Ok(removed)
    }

    pub fn update_block_data(&self, id: BlockId, data: D) -> Result<(), StoreError> {
        let mut state = self.state();
        let block = state.block_mut(id)?;
        block.data = data;
        block.state = BlockState::Dirty;
        block.updated_at = now_after(block.updated_at);
        block.revision += 1;
        let updated_at = block.updated_at;

        trace!(block_id = %id, revision = block.revision, "updated block data");
        self.emit(StoreEvent::BlockUpdated { id, updated_at });
        Ok(())
    }

    /// Targets past the end are clamped. Returns the applied position.
    pub fn move_block(&self, id: BlockId, new_order: usize) -> Result<usize, StoreError> {
        let mut guard = self.state();
        let state = &mut *guard;
        let (block_type, old_order) = state
            .blocks
            .get(&id)
            .map(|block| (block.block_type.clone(), block.order))
            .ok_or(StoreError::BlockNotFound(id))?;

        let last = state.count(block_type.as_str()).saturating_sub(1);
        let target = new_order.min(last);
        if target == old_order {
            return Ok(target);
        }

        for block in state
            .blocks
            .values_mut()
            .filter(|block| block.block_type == block_type)
        {
            if block.id == id {
                block.order = target;
            } else if target > old_order && block.order > old_order && block.order <= target {
                block.order -= 1;
            } else if target < old_order && block.order >= target && block.order < old_order {
                block.order += 1;
            }
        }

        debug!(block_id = %id, from = old_order, to = target, "moved block");
        self.emit(StoreEvent::BlockMoved {
            id,
            from: old_order,
            to: target,
        });
        Ok(target)
    }

    pub fn enable_block_edit(&self, id: BlockId) -> Result<(), StoreError> {
        let mut guard = self.state();
        let state = &mut *guard;
        if !state.blocks.contains_key(&id) {
            return Err(StoreError::BlockNotFound(id));
        }

        let previous = state.editing.replace(id).filter(|previous| *previous != id);
        if let Some(previous_block) = previous.and_then(|prev| state.blocks.get_mut(&prev)) {
            previous_block.is_editing = false;
        }
        let block = state.block_mut(id)?;
        let already_editing = block.is_editing && previous.is_none();
        block.is_editing = true;

        if already_editing {
            return Ok(());
        }
        debug!(block_id = %id, previous = ?previous, "edit mode enabled");
        if let Some(previous) = previous {
            self.emit(StoreEvent::EditEnded { id: previous });
        }
        self.emit(StoreEvent::EditStarted { id, previous });
        Ok(())
    }

    pub fn disable_block_edit(&self, id: BlockId) -> Result<(), StoreError> {
        let mut guard = self.state();
        let state = &mut *guard;
        let block = state.block_mut(id)?;
        let was_editing = std::mem::replace(&mut block.is_editing, false);
        if state.editing == Some(id) {
            state.editing = None;
        }

        if was_editing {
            debug!(block_id = %id, "edit mode disabled");
            self.emit(StoreEvent::EditEnded { id });
        }
        Ok(())
    }

    /// The store is not locked while the handler runs; see [`SaveOutcome`].
    pub async fn save_block(&self, id: BlockId) -> Result<SaveOutcome, StoreError> {
        let (config, snapshot) = {
            let state = self.state();
            let block = state.blocks.get(&id).ok_or(StoreError::BlockNotFound(id))?;
            let config = state
                .configs
                .get(&block.block_type)
                .cloned()
                .ok_or_else(|| StoreError::ConfigNotFound(block.block_type.clone()))?;
            (config, block.clone())
        };

        config
            .validate(&snapshot.data)
            .map_err(|reason| StoreError::ValidationFailed { id, reason })?;

        debug!(block_id = %id, revision = snapshot.revision, "running save handler");
        config
            .on_save(&snapshot)
            .await
            .map_err(|source| StoreError::SaveFailed { id, source })?;

        let mut guard = self.state();
        let state = &mut *guard;
        let Some(block) = state.blocks.get_mut(&id) else {
            debug!(block_id = %id, "block removed while saving");
            return Ok(SaveOutcome::Discarded);
        };

        let saved_at = now_after(block.updated_at);
        block.saved_at = Some(saved_at);
        if block.revision != snapshot.revision {
            debug!(
                block_id = %id,
                saved_revision = snapshot.revision,
                current_revision = block.revision,
                "block changed while saving"
            );
            self.emit(StoreEvent::BlockSaved { id, saved_at });
            return Ok(SaveOutcome::Superseded);
        }

        block.state = BlockState::Clean;
        block.updated_at = saved_at;
        let was_editing = std::mem::replace(&mut block.is_editing, false);
        if state.editing == Some(id) {
            state.editing = None;
        }

        debug!(block_id = %id, "saved block");
        if was_editing {
            self.emit(StoreEvent::EditEnded { id });
        }
        self.emit(StoreEvent::BlockSaved { id, saved_at });
        Ok(SaveOutcome::Saved)
    }

    pub fn get_block(&self, id: BlockId) -> Option<Block<D>> {
        self.state().blocks.get(&id).cloned()
    }

    pub fn get_blocks_by_type(&self, block_type: &str) -> Vec<Block<D>> {
        let state = self.state();
        let mut blocks: Vec<_> = state
            .blocks
            .values()
            .filter(|block| block.block_type.as_str() == block_type)
            .cloned()
            .collect();
        blocks.sort_by_key(|block| block.order);
        blocks
    }

    pub fn list_blocks(&self) -> Vec<Block<D>> {
        let state = self.state();
        let mut blocks: Vec<_> = state.blocks.values().cloned().collect();
        blocks.sort_by(|a, b| {
            a.block_type
                .cmp(&b.block_type)
                .then_with(|| a.order.cmp(&b.order))
        });
        blocks
    }

    pub fn can_add_block(&self, block_type: &str) -> bool {
        let state = self.state();
        state
            .configs
            .get(block_type)
            .is_some_and(|config| config.limit().allows(state.count(block_type)))
    }

    pub fn block_count(&self, block_type: &str) -> usize {
        self.state().count(block_type)
    }

    pub fn get_editing_block(&self) -> Option<Block<D>> {
        let state = self.state();
        state.editing.and_then(|id| state.blocks.get(&id).cloned())
    }

    pub fn editing_block_id(&self) -> Option<BlockId> {
        self.state().editing
    }

    pub fn is_registered(&self, block_type: &str) -> bool {
        self.state().configs.contains_key(block_type)
    }

    pub fn display_name(&self, block_type: &str) -> Option<String> {
        self.state()
            .configs
            .get(block_type)
            .map(|config| config.display_name().to_string())
    }

    pub fn registered_types(&self) -> Vec<BlockType> {
        let mut types: Vec<_> = self.state().configs.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn reset(&self) {
        let mut state = self.state();
        *state = StoreState::new();
        debug!("store reset");
        self.emit(StoreEvent::StoreReset);
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

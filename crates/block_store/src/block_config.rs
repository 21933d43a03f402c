//! Per-type configuration contract consumed by [`crate::BlockStore`].

use std::{future::Future, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use futures::{future::BoxFuture, FutureExt};
use shared::domain::{BlockLimit, BlockType};

use crate::Block;

/// None of these run while the store's lock is held.
#[async_trait]
pub trait BlockConfig<D>: Send + Sync
where
    D: Send + Sync + 'static,
{
    fn block_type(&self) -> &BlockType;

    fn display_name(&self) -> &str;

    fn limit(&self) -> BlockLimit {
        BlockLimit::Unlimited
    }

    fn create_default(&self) -> D;

    fn validate(&self, _data: &D) -> std::result::Result<(), String> {
        Ok(())
    }

    async fn on_save(&self, _block: &Block<D>) -> Result<()> {
        Ok(())
    }
}

type DefaultFactory<D> = Arc<dyn Fn() -> D + Send + Sync>;
type Validator<D> = Arc<dyn Fn(&D) -> std::result::Result<(), String> + Send + Sync>;
type SaveHandler<D> = Arc<dyn Fn(Block<D>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

pub struct FnBlockConfig<D> {
    block_type: BlockType,
    display_name: String,
    limit: BlockLimit,
    create_default: DefaultFactory<D>,
    validator: Option<Validator<D>>,
    save_handler: Option<SaveHandler<D>>,
}

impl<D> FnBlockConfig<D>
where
    D: Clone + Send + Sync + 'static,
{
    pub fn new(
        block_type: impl Into<BlockType>,
        display_name: impl Into<String>,
        create_default: impl Fn() -> D + Send + Sync + 'static,
    ) -> Self {
        Self {
            block_type: block_type.into(),
            display_name: display_name.into(),
            limit: BlockLimit::Unlimited,
            create_default: Arc::new(create_default),
            validator: None,
            save_handler: None,
        }
    }

    pub fn with_limit(mut self, limit: BlockLimit) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_validator(
        mut self,
        validator: impl Fn(&D) -> std::result::Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn with_save_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Block<D>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.save_handler = Some(Arc::new(move |block: Block<D>| handler(block).boxed()));
        self
    }
}

#[async_trait]
impl<D> BlockConfig<D> for FnBlockConfig<D>
where
    D: Clone + Send + Sync + 'static,
{
    fn block_type(&self) -> &BlockType {
        &self.block_type
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn limit(&self) -> BlockLimit {
        self.limit
    }

    fn create_default(&self) -> D {
        (self.create_default)()
    }

    fn validate(&self, data: &D) -> std::result::Result<(), String> {
        match &self.validator {
            Some(validator) => validator(data),
            None => Ok(()),
        }
    }

    async fn on_save(&self, block: &Block<D>) -> Result<()> {
        match &self.save_handler {
            Some(handler) => handler(block.clone()).await,
            None => Ok(()),
        }
    }
}

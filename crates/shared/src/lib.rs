//! Vocabulary shared by the block store and its presentation adapters.

pub mod domain;
pub mod error;
pub mod protocol;

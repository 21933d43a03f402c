use std::{borrow::Borrow, fmt, num::NonZeroUsize, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.hyphenated())
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

id_newtype!(BlockId);

/// Registry key naming a category of block, e.g. `"text"` or `"image"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockType(String);

impl BlockType {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BlockType {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for BlockType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for BlockType {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockState {
    /// Holds the default payload produced at creation.
    Empty,
    /// Carries changes that have not been saved.
    Dirty,
    /// Matches the last successful save.
    Clean,
}

impl fmt::Display for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BlockState::Empty => "empty",
            BlockState::Dirty => "dirty",
            BlockState::Clean => "clean",
        };
        f.write_str(label)
    }
}

/// Per-type capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockLimit {
    #[default]
    Unlimited,
    AtMost(NonZeroUsize),
}

impl BlockLimit {
    /// Builds a limit from an optional raw cap. `Some(0)` has no meaningful
    /// interpretation and yields `None`.
    pub fn from_max_blocks(max_blocks: Option<usize>) -> Option<Self> {
        match max_blocks {
            None => Some(BlockLimit::Unlimited),
            Some(n) => NonZeroUsize::new(n).map(BlockLimit::AtMost),
        }
    }

    /// Whether one more block fits when `count` already exist.
    pub fn allows(&self, count: usize) -> bool {
        match self {
            BlockLimit::Unlimited => true,
            BlockLimit::AtMost(max) => count < max.get(),
        }
    }

    pub fn max_blocks(&self) -> Option<usize> {
        match self {
            BlockLimit::Unlimited => None,
            BlockLimit::AtMost(max) => Some(max.get()),
        }
    }
}

//! Eviction policy selection

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Strategy used to pick a victim when the cache is over capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Oldest creation time first
    #[default]
    Recency,
    /// Lowest access count first, oldest creation time on ties
    Frequency,
    /// Largest in-memory footprint first
    Size,
}

impl EvictionPolicy {
    pub const ALL: [EvictionPolicy; 3] = [Self::Recency, Self::Frequency, Self::Size];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recency => "recency",
            Self::Frequency => "frequency",
            Self::Size => "size",
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "recency" | "lru" => Ok(Self::Recency),
            "frequency" | "lfu" => Ok(Self::Frequency),
            "size" => Ok(Self::Size),
            other => Err(format!("Unknown eviction policy: {}", other)),
        }
    }
}

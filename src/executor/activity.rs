//! Activity log - newest first, capped

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::info;

/// Entries kept for observers
pub const MAX_ACTIVITY_ENTRIES: usize = 20;

/// Which side of the cross-chain flow produced an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceChain {
    /// Chain where the rebalance condition is checked
    Origin,
    /// Chain where the vault holds funds
    Destination,
}

impl std::fmt::Display for SourceChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceChain::Origin => write!(f, "Origin"),
            SourceChain::Destination => write!(f, "Destination"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub source_chain: SourceChain,
    pub event_type: String,
    pub details: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivityLog {
    entries: VecDeque<ActivityEntry>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, source_chain: SourceChain, event_type: &str, details: impl Into<String>) {
        let details = details.into();
        info!("[{}] {}: {}", source_chain, event_type, details);

        self.entries.push_front(ActivityEntry {
            timestamp: Utc::now(),
            source_chain,
            event_type: event_type.to_string(),
            details,
        });
        self.entries.truncate(MAX_ACTIVITY_ENTRIES);
    }

    /// Newest first
    pub fn entries(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.entries.iter()
    }

    #[cfg(test)]
    pub fn latest(&self) -> Option<&ActivityEntry> {
        self.entries.front()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Endpoint Pool
//!
//! Ordered list of RPC endpoints plus a cursor pointing at the last one that
//! answered. Every fetch cycle starts at the cursor and walks the list
//! round-robin, so a flaky endpoint is skipped this cycle but retried next.

use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use crate::error::VaultError;

#[derive(Debug)]
pub struct EndpointPool {
    endpoints: Vec<String>,
    /// Last known-good index. A lost race only costs one redundant attempt.
    preferred: AtomicUsize,
}

impl EndpointPool {
    pub fn new(endpoints: Vec<String>) -> Result<Self, VaultError> {
        let endpoints: Vec<String> = endpoints
            .into_iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();

        if endpoints.is_empty() {
            return Err(VaultError::ConfigError(
                "endpoint pool needs at least one RPC URL".to_string(),
            ));
        }

        Ok(Self {
            endpoints,
            preferred: AtomicUsize::new(0),
        })
    }

    /// Endpoint for the given attempt of the current cycle.
    ///
    /// Returns the absolute index alongside the URI so the caller can report
    /// it back through [`record_success`](Self::record_success).
    pub fn select_endpoint(&self, attempt: usize) -> (usize, &str) {
        let index = (self.preferred_index() + attempt) % self.endpoints.len();
        (index, &self.endpoints[index])
    }

    pub fn record_success(&self, index: usize) {
        let index = index % self.endpoints.len();
        let previous = self.preferred.swap(index, Ordering::Relaxed);
        if previous != index {
            debug!(
                "Preferred endpoint moved {} -> {} ({})",
                previous, index, self.endpoints[index]
            );
        }
    }

    pub fn preferred_index(&self) -> usize {
        self.preferred.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }
}

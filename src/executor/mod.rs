//! The Executor
//!
//! This module tracks a rebalance from detection to settlement:
//! - Debounced detection of a sustained rebalance condition
//! - Withdraw / supply legs through a pluggable settlement executor
//! - A capped activity log of every lifecycle transition
//!
//! Nothing here signs or submits transactions. Live legs are confirmed by
//! re-reading the vault; simulated legs take a fixed time.

mod activity;
mod orchestrator;
mod settlement;

pub use activity::{ActivityEntry, ActivityLog, SourceChain};
pub use orchestrator::{
    Phase, PhaseChange, RebalanceOrchestrator, RebalanceTask, Settlement, SettlementStep,
};
pub use settlement::{LedgerSettlement, SettlementExecutor, TimedSettlement};

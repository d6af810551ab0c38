//! Engine - the single event loop
//!
//! Owns every timer and every piece of mutable state. Fetches and settlement
//! legs run as tasks on the same current-thread runtime; their results come
//! back through the `JoinSet` and are applied one at a time, so no
//! transition can observe a half-applied snapshot.
//!
//! Fetches may overlap. Each carries a sequence number and a completion
//! older than the newest one already seen is dropped.

use alloy_primitives::U256;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::brain::{decision, Decision};
use crate::cartographer::{VaultFeed, VaultSnapshot};
use crate::error::VaultError;
use crate::executor::{
    ActivityEntry, ActivityLog, Phase, PhaseChange, RebalanceOrchestrator, RebalanceTask,
    Settlement, SettlementExecutor, SettlementStep, SourceChain,
};
use crate::ray;

/// Rate moves at or below 0.10% are not worth an activity entry
const RATE_UPDATE_BAND: U256 = alloy_primitives::uint!(1_000_000_000_000_000_000_000_000_U256);

/// The vault reports no TVL; the dashboard shows a fixed 10,000 USDT
pub const MOCK_TVL: U256 = alloy_primitives::uint!(10_000_000_000_U256);

const USDT_DECIMALS: u32 = 6;

// ============================================
// READ MODEL
// ============================================

/// Latest applied snapshot plus the outcome of the newest fetch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VaultView {
    /// Retained across failed fetches
    pub snapshot: Option<VaultSnapshot>,
    pub last_error: Option<String>,
    pub applied_seq: u64,
    pub is_loading: bool,
    /// USDT base units (6 decimals)
    pub total_value_locked: U256,
}

impl VaultView {
    /// Whole USDT with thousands separators, e.g. `$10,000 USDT`
    pub fn tvl_display(&self) -> String {
        let whole = (self.total_value_locked / U256::from(10u64.pow(USDT_DECIMALS))).to_string();
        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, digit) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(digit);
        }
        format!("${} USDT", grouped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub phase: Phase,
    pub task: Option<RebalanceTask>,
    pub blocks_until_check: u32,
}

/// Independently subscribable views for observers
#[derive(Clone)]
pub struct ReadModel {
    pub vault: watch::Receiver<VaultView>,
    pub decision: watch::Receiver<Option<Decision>>,
    pub status: watch::Receiver<EngineStatus>,
    pub activity: watch::Receiver<Vec<ActivityEntry>>,
}

struct Publishers {
    vault: watch::Sender<VaultView>,
    decision: watch::Sender<Option<Decision>>,
    status: watch::Sender<EngineStatus>,
    activity: watch::Sender<Vec<ActivityEntry>>,
}

fn publish<T: PartialEq>(tx: &watch::Sender<T>, value: T) {
    tx.send_if_modified(|current| {
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    });
}

// ============================================
// ENGINE STATE
// ============================================

/// Everything the loop mutates. Each method handles exactly one event.
pub struct EngineState {
    view: VaultView,
    decision: Option<Decision>,
    orchestrator: RebalanceOrchestrator,
    activity: ActivityLog,
    /// Highest fetch sequence whose completion has been seen
    latest_seq: u64,
    cron_cycle: u32,
    blocks_until_check: u32,
    block_height: u64,
}

impl EngineState {
    /// The first cron entry fires after `cron_start` ticks, later ones every
    /// `cron_cycle` ticks
    pub fn new(debounce: Duration, cron_start: u32, cron_cycle: u32) -> Self {
        let cron_cycle = cron_cycle.max(1);
        Self {
            view: VaultView {
                is_loading: true,
                total_value_locked: MOCK_TVL,
                ..VaultView::default()
            },
            decision: None,
            orchestrator: RebalanceOrchestrator::new(debounce),
            activity: ActivityLog::new(),
            latest_seq: 0,
            cron_cycle,
            blocks_until_check: cron_start.max(1),
            block_height: 0,
        }
    }

    pub fn view(&self) -> &VaultView {
        &self.view
    }

    pub fn decision(&self) -> Option<&Decision> {
        self.decision.as_ref()
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn debounce_deadline(&self) -> Option<Instant> {
        self.orchestrator.debounce_deadline()
    }

    /// Apply a finished fetch. Returns the phase change it caused, if any.
    ///
    /// Completions older than the newest one seen are discarded whole,
    /// successes and failures alike.
    pub fn apply_fetch(
        &mut self,
        seq: u64,
        result: Result<VaultSnapshot, VaultError>,
        now: Instant,
    ) -> Option<PhaseChange> {
        if seq <= self.latest_seq {
            debug!("Discarding stale fetch #{} (newest #{})", seq, self.latest_seq);
            return None;
        }
        self.latest_seq = seq;
        self.view.is_loading = false;

        match result {
            Ok(snapshot) => {
                self.log_rate_moves(&snapshot);
                self.view.snapshot = Some(snapshot);
                self.view.last_error = None;
                self.view.applied_seq = seq;
                self.evaluate(now)
            }
            Err(e) => {
                warn!("Fetch #{} failed, keeping previous snapshot: {}", seq, e);
                self.view.last_error = Some(e.to_string());
                None
            }
        }
    }

    /// Re-run the decision rule on the current snapshot
    pub fn evaluate(&mut self, now: Instant) -> Option<PhaseChange> {
        let snapshot = self.view.snapshot.as_ref()?;

        let decision = match decision::evaluate(snapshot) {
            Ok(d) => d,
            Err(VaultError::NoValidQuotes) => {
                if !self.decision.as_ref().is_some_and(|d| d.insufficient_data) {
                    warn!("No valid pool quotes, decision degraded to insufficient data");
                }
                Decision::insufficient_data(snapshot)
            }
            Err(e) => {
                warn!("Decision failed: {}", e);
                Decision::insufficient_data(snapshot)
            }
        };

        let change = self
            .orchestrator
            .on_decision(&decision, snapshot, now, &mut self.activity);
        self.decision = Some(decision);
        change
    }

    /// Countdown tick: advance the block counter, then re-evaluate
    pub fn on_tick(&mut self, now: Instant) -> Option<PhaseChange> {
        self.block_height += 1;
        self.blocks_until_check = self.blocks_until_check.saturating_sub(1);
        if self.blocks_until_check == 0 {
            self.activity.record(
                SourceChain::Origin,
                "Cron Job",
                format!("Triggered (Block #{})", self.block_height),
            );
            self.blocks_until_check = self.cron_cycle;
        }
        self.evaluate(now)
    }

    pub fn on_debounce_elapsed(&mut self, now: Instant) -> Option<PhaseChange> {
        let snapshot = self.view.snapshot.as_ref()?;
        self.orchestrator
            .on_debounce_elapsed(self.decision.as_ref(), snapshot, now, &mut self.activity)
    }

    /// Apply a finished settlement leg.
    ///
    /// When the supply leg lands, the settlement is folded into the current
    /// snapshot before returning, so observers never see `Settled` with the
    /// old active pool.
    pub fn on_step_result(
        &mut self,
        step: SettlementStep,
        result: Result<(), VaultError>,
    ) -> (Option<PhaseChange>, Option<Settlement>) {
        let change = match result {
            Ok(()) => self.orchestrator.on_step_confirmed(step, &mut self.activity),
            Err(e) => self
                .orchestrator
                .on_step_failed(step, &e.to_string(), &mut self.activity),
        };

        if self.orchestrator.phase() != Phase::Settled {
            return (change, None);
        }

        let settlement = self.orchestrator.finish_settlement(&mut self.activity);
        if let Some(s) = &settlement {
            self.view.snapshot = self
                .view
                .snapshot
                .take()
                .map(|snapshot| snapshot.with_active_pool(s.to_pool.clone(), s.rate_raw));
        }
        (change, settlement)
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            phase: self.orchestrator.phase(),
            task: self.orchestrator.task().cloned(),
            blocks_until_check: self.blocks_until_check,
        }
    }

    fn log_rate_moves(&mut self, next: &VaultSnapshot) {
        let Some(prev) = &self.view.snapshot else {
            return;
        };
        for quote in next.all_quotes.iter().filter(|q| q.fetch_succeeded) {
            let Some(old) = prev.quote(&quote.pool_id) else {
                continue;
            };
            let moved = if quote.rate_raw > old.rate_raw {
                quote.rate_raw - old.rate_raw
            } else {
                old.rate_raw - quote.rate_raw
            };
            if moved > RATE_UPDATE_BAND {
                self.activity.record(
                    SourceChain::Destination,
                    "Rate Update",
                    format!(
                        "{} rate updated to {}%",
                        quote.display_name(),
                        ray::to_percent(quote.rate_raw)
                    ),
                );
            }
        }
    }
}

// ============================================
// ENGINE
// ============================================

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub poll_interval: Duration,
    pub tick_interval: Duration,
    pub debounce: Duration,
    pub cron_start_blocks: u32,
    pub cron_cycle_blocks: u32,
}

enum Completion {
    Fetch {
        seq: u64,
        result: Result<VaultSnapshot, VaultError>,
    },
    Step {
        step: SettlementStep,
        result: Result<(), VaultError>,
    },
}

enum Event {
    Shutdown,
    Poll,
    Tick,
    DebounceElapsed,
    Completed(Completion),
    TaskLost(String),
}

pub struct Engine {
    feed: Arc<dyn VaultFeed>,
    settlement: Arc<dyn SettlementExecutor>,
    settings: EngineSettings,
    state: EngineState,
    publishers: Publishers,
    next_seq: u64,
}

impl Engine {
    pub fn new(
        feed: Arc<dyn VaultFeed>,
        settlement: Arc<dyn SettlementExecutor>,
        settings: EngineSettings,
    ) -> (Self, ReadModel) {
        let state = EngineState::new(
            settings.debounce,
            settings.cron_start_blocks,
            settings.cron_cycle_blocks,
        );

        let (vault_tx, vault_rx) = watch::channel(state.view().clone());
        let (decision_tx, decision_rx) = watch::channel(None);
        let (status_tx, status_rx) = watch::channel(state.status());
        let (activity_tx, activity_rx) = watch::channel(Vec::new());

        let engine = Self {
            feed,
            settlement,
            settings,
            state,
            publishers: Publishers {
                vault: vault_tx,
                decision: decision_tx,
                status: status_tx,
                activity: activity_tx,
            },
            next_seq: 0,
        };
        let read_model = ReadModel {
            vault: vault_rx,
            decision: decision_rx,
            status: status_rx,
            activity: activity_rx,
        };
        (engine, read_model)
    }

    /// Run until `shutdown` flips to true or its sender is dropped.
    ///
    /// Pending fetches and settlement legs are aborted on the way out.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut tasks: JoinSet<Completion> = JoinSet::new();

        // first tick of each interval fires immediately
        let mut poll = interval(self.settings.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tick = interval(self.settings.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Engine started ({} feed, poll every {:?})",
            self.feed.kind(),
            self.settings.poll_interval
        );

        loop {
            let deadline = self.state.debounce_deadline();
            let debounce = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            let event = tokio::select! {
                biased;
                changed = shutdown.changed() => match changed {
                    Ok(()) if !*shutdown.borrow() => continue,
                    _ => Event::Shutdown,
                },
                Some(joined) = tasks.join_next() => match joined {
                    Ok(done) => Event::Completed(done),
                    Err(e) => Event::TaskLost(e.to_string()),
                },
                _ = debounce => Event::DebounceElapsed,
                _ = tick.tick() => Event::Tick,
                _ = poll.tick() => Event::Poll,
            };

            if matches!(event, Event::Shutdown) || *shutdown.borrow() {
                break;
            }

            self.handle(event, &mut tasks);
            self.publish();
        }

        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
        info!("Engine stopped");
    }

    fn handle(&mut self, event: Event, tasks: &mut JoinSet<Completion>) {
        let now = Instant::now();
        let change = match event {
            Event::Shutdown => None,
            Event::Poll => {
                self.spawn_fetch(tasks);
                None
            }
            Event::Tick => self.state.on_tick(now),
            Event::DebounceElapsed => self.state.on_debounce_elapsed(now),
            Event::Completed(Completion::Fetch { seq, result }) => {
                self.state.apply_fetch(seq, result, now)
            }
            Event::Completed(Completion::Step { step, result }) => {
                let (change, settlement) = self.state.on_step_result(step, result);
                if let Some(s) = settlement {
                    info!("Rebalance settled: {} -> {}", s.from_pool, s.to_pool);
                    self.feed.apply_settlement(&s.to_pool, s.rate_raw);
                }
                change
            }
            Event::TaskLost(reason) => {
                warn!("Background task ended abnormally: {}", reason);
                None
            }
        };

        if let Some(change) = change {
            self.start_leg(change, tasks);
        }
    }

    fn spawn_fetch(&mut self, tasks: &mut JoinSet<Completion>) {
        self.next_seq += 1;
        let seq = self.next_seq;
        let feed = Arc::clone(&self.feed);
        debug!("Fetch #{} started", seq);

        tasks.spawn(async move {
            let result = feed.fetch_snapshot().await;
            Completion::Fetch { seq, result }
        });
    }

    /// Kick off the settlement leg a phase change calls for
    fn start_leg(&self, change: PhaseChange, tasks: &mut JoinSet<Completion>) {
        debug!("Phase {} -> {}", change.from, change.to);
        let step = match change.to {
            Phase::Withdrawing => SettlementStep::Withdraw,
            Phase::Supplying => SettlementStep::Supply,
            _ => return,
        };
        let Some(task) = self.state.orchestrator.task().cloned() else {
            return;
        };
        let executor = Arc::clone(&self.settlement);

        tasks.spawn(async move {
            let result = executor.execute(step, &task).await;
            Completion::Step { step, result }
        });
    }

    fn publish(&self) {
        publish(&self.publishers.vault, self.state.view().clone());
        publish(&self.publishers.decision, self.state.decision().cloned());
        publish(&self.publishers.status, self.state.status());
        publish(
            &self.publishers.activity,
            self.state.activity().entries().cloned().collect(),
        );
    }
}

// ============================================
// TESTS
// ============================================

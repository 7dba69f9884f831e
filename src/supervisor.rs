//! Polling supervisor
//!
//! One periodic cycle: list the gated users, run each through the
//! explore → discover → reconcile pipeline with bounded concurrency,
//! log the cycle stats. Ticks that fire while a cycle is still running
//! are dropped; SIGINT/SIGTERM stops ticking and lets in-flight users
//! drain before the process exits.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::canonical::normalize_url;
use crate::discovery::{DiscoveryEngine, IdentityExploration};
use crate::explorer::PathExplorer;
use crate::ledger::{LedgerApi, RpcTally};
use crate::reconciler::{reconcile_inbox, ReconcileOutcome};
use crate::store::{InboxStore, UserRecord};
use crate::types::Result;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    pub user_concurrency: usize,
    pub delegation_depth: u32,
    pub dry_run: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(600),
            user_concurrency: 8,
            delegation_depth: 10,
            dry_run: false,
        }
    }
}

/// Per-cycle counters, shared across the user worker tasks.
#[derive(Debug, Default)]
pub struct CycleStats {
    pub total_users: AtomicU64,
    pub processed_users: AtomicU64,
    pub skipped_users: AtomicU64,
    pub failed_users: AtomicU64,
    pub total_pending: AtomicU64,
    /// Incremented once per user whose inbox write committed, regardless
    /// of batch size.
    pub store_writes: AtomicU64,
}

impl CycleStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, duration_ms: u64) -> CycleSnapshot {
        CycleSnapshot {
            total_users: self.total_users.load(Ordering::Relaxed),
            processed_users: self.processed_users.load(Ordering::Relaxed),
            skipped_users: self.skipped_users.load(Ordering::Relaxed),
            failed_users: self.failed_users.load(Ordering::Relaxed),
            total_pending: self.total_pending.load(Ordering::Relaxed),
            store_writes: self.store_writes.load(Ordering::Relaxed),
            duration_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSnapshot {
    pub total_users: u64,
    pub processed_users: u64,
    pub skipped_users: u64,
    pub failed_users: u64,
    pub total_pending: u64,
    pub store_writes: u64,
    pub duration_ms: u64,
}

/// The periodic discovery scheduler.
pub struct Poller {
    ledger: Arc<dyn LedgerApi>,
    store: Arc<dyn InboxStore>,
    config: PollerConfig,
    running: AtomicBool,
    shutting_down: AtomicBool,
}

impl Poller {
    pub fn new(
        ledger: Arc<dyn LedgerApi>,
        store: Arc<dyn InboxStore>,
        config: PollerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            ledger,
            store,
            config,
            running: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Run until a shutdown signal arrives: an immediate cycle, then one
    /// per interval tick. A tick that fires mid-cycle is dropped rather
    /// than overlapped.
    pub async fn run(self: Arc<Self>) {
        info!(
            poll_interval_sec = self.config.poll_interval.as_secs(),
            user_concurrency = self.config.user_concurrency,
            delegation_depth = self.config.delegation_depth,
            dry_run = self.config.dry_run,
            "polling supervisor starting"
        );

        let mut current = Some(self.spawn_cycle());

        let mut interval = tokio::time::interval(self.config.poll_interval);
        // Ticks missed while a cycle runs long are skipped, not bursted:
        // the next cycle starts on an interval boundary.
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately; the startup cycle above
        // already covers it.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if self.running.load(Ordering::SeqCst) {
                        debug!("previous cycle still running, dropping tick");
                        continue;
                    }
                    current = Some(self.spawn_cycle());
                }
                _ = shutdown_signal() => {
                    info!("shutdown signal received, draining in-flight work");
                    self.shutting_down.store(true, Ordering::SeqCst);
                    break;
                }
            }
        }

        if let Some(handle) = current {
            let _ = handle.await;
        }
        info!("polling supervisor stopped");
    }

    fn spawn_cycle(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let poller = Arc::clone(self);
        tokio::spawn(async move {
            if poller.running.swap(true, Ordering::SeqCst) {
                return;
            }
            poller.run_cycle().await;
            poller.running.store(false, Ordering::SeqCst);
        })
    }

    /// One full cycle over every gated user.
    async fn run_cycle(self: &Arc<Self>) {
        let started = Instant::now();
        let stats = Arc::new(CycleStats::default());

        let users = match self.store.list_users_with_identities().await {
            Ok(users) => users,
            Err(e) => {
                error!(error = %e, "failed to list users, aborting cycle");
                return;
            }
        };
        stats.total_users.store(users.len() as u64, Ordering::Relaxed);

        let semaphore = Arc::new(Semaphore::new(self.config.user_concurrency.max(1)));
        let mut handles = Vec::with_capacity(users.len());

        for user in users {
            if self.shutting_down.load(Ordering::SeqCst) {
                debug!("shutdown in progress, not scheduling further users");
                break;
            }
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let poller = Arc::clone(self);
            let stats = Arc::clone(&stats);
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                poller.process_user(user, &stats).await;
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "user worker panicked");
                CycleStats::bump(&stats.failed_users);
            }
        }

        let snapshot = stats.snapshot(started.elapsed().as_millis() as u64);
        info!(
            total_users = snapshot.total_users,
            processed_users = snapshot.processed_users,
            skipped_users = snapshot.skipped_users,
            failed_users = snapshot.failed_users,
            total_pending = snapshot.total_pending,
            store_writes = snapshot.store_writes,
            duration_ms = snapshot.duration_ms,
            "cycle complete"
        );
    }

    /// One user, isolated: any failure is counted and logged without
    /// touching the rest of the cycle.
    async fn process_user(&self, user: UserRecord, stats: &CycleStats) {
        if user.identities.is_empty() {
            debug!(uid = %user.uid, "no identities, skipping");
            CycleStats::bump(&stats.skipped_users);
            return;
        }

        let tally = RpcTally::default();
        match self.discover_and_reconcile(&user, &tally).await {
            Ok(Some(outcome)) => {
                CycleStats::bump(&stats.processed_users);
                stats
                    .total_pending
                    .fetch_add(outcome.total as u64, Ordering::Relaxed);
                if !outcome.dry_run {
                    CycleStats::bump(&stats.store_writes);
                }
            }
            Ok(None) => {
                // Ledger unreachable; previous inbox kept.
                CycleStats::bump(&stats.failed_users);
            }
            Err(e) => {
                error!(uid = %user.uid, error = %e, "user cycle failed");
                CycleStats::bump(&stats.failed_users);
            }
        }
    }

    async fn discover_and_reconcile(
        &self,
        user: &UserRecord,
        tally: &RpcTally,
    ) -> Result<Option<ReconcileOutcome>> {
        let explorer = PathExplorer::new(self.ledger.as_ref(), self.config.delegation_depth);

        let mut explorations = Vec::with_capacity(user.identities.len());
        for identity in &user.identities {
            let result = explorer.explore_identity(identity, tally).await;

            if !result.live_books.is_empty() && !self.config.dry_run {
                let identity_url = normalize_url(&identity.identity_url);
                if let Err(e) = self
                    .store
                    .save_identity_snapshot(&user.uid, &identity_url, result.live_books.clone())
                    .await
                {
                    warn!(uid = %user.uid, identity = %identity_url, error = %e, "identity snapshot refresh failed");
                }
            }

            explorations.push(IdentityExploration::from_parts(identity, result));
        }

        let engine = DiscoveryEngine::new(self.ledger.as_ref());
        let discovery = engine.discover(user, &explorations, tally).await;

        if discovery.ledger_unreachable() {
            warn!(
                uid = %user.uid,
                attempts = discovery.rpc_attempts,
                "every ledger RPC failed this cycle, keeping previous inbox"
            );
            return Ok(None);
        }

        let outcome =
            reconcile_inbox(self.store.as_ref(), &user.uid, &discovery, self.config.dry_run).await?;
        Ok(Some(outcome))
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler, falling back to ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

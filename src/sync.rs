//! Automatic order sync engine.
//!
//! Owns the pending-collection lifecycle: eligibility filtering, batch
//! submission to the order service, bounded per-order retry bookkeeping,
//! and the background loop that drives periodic sync. Competing passes of
//! the automatic sync command follow last-invocation-wins: a pass whose
//! remote call resolves after a newer pass has started discards its result
//! instead of applying stale state on top of fresher state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::api::RemoteSync;
use crate::error::SyncError;
use crate::events::{EventBus, SyncEvent};
use crate::order::{Order, SyncRequest, SyncStatus};
use crate::retry;
use crate::store::OrderStore;

// ---------------------------------------------------------------------------
// Engine state
// ---------------------------------------------------------------------------

/// Shared runtime state for the sync engine.
pub struct SyncState {
    pub is_running: AtomicBool,
    last_sync: StdMutex<Option<DateTime<Utc>>>,
    /// Generation token for the automatic-sync command class. Each pass
    /// takes a fresh token; only the pass holding the latest token may
    /// apply its result.
    generation: AtomicU64,
    /// Serializes read-modify-write cycles on the pending collection.
    pub(crate) pending_lock: AsyncMutex<()>,
    /// Serializes writers of the backup collection.
    pub(crate) backup_lock: AsyncMutex<()>,
}

impl SyncState {
    pub fn new() -> Self {
        SyncState {
            is_running: AtomicBool::new(false),
            last_sync: StdMutex::new(None),
            generation: AtomicU64::new(0),
            pending_lock: AsyncMutex::new(()),
            backup_lock: AsyncMutex::new(()),
        }
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync.lock().ok().and_then(|g| *g)
    }
}

impl Default for SyncState {
    fn default() -> Self {
        SyncState::new()
    }
}

/// Result of one sync command, shaped for direct serialization to the UI.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub success: bool,
    pub synced: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SyncReport {
    fn ok(synced: usize) -> Self {
        SyncReport {
            success: true,
            synced,
            message: None,
        }
    }

    fn info(message: &str) -> Self {
        SyncReport {
            success: true,
            synced: 0,
            message: Some(message.to_string()),
        }
    }

    fn failed(message: String) -> Self {
        SyncReport {
            success: false,
            synced: 0,
            message: Some(message),
        }
    }
}

/// Queue counters for UI indicators.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub pending: usize,
    pub failed: usize,
    pub synced: usize,
    pub is_running: bool,
    pub last_sync: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Sync engine
// ---------------------------------------------------------------------------

/// Offline order backup & sync engine over a persistent store and the
/// remote order service.
pub struct SyncEngine<S, R> {
    pub(crate) store: Arc<S>,
    pub(crate) remote: Arc<R>,
    pub(crate) state: Arc<SyncState>,
    pub(crate) events: EventBus,
}

impl<S: OrderStore, R: RemoteSync> SyncEngine<S, R> {
    pub fn new(store: Arc<S>, remote: Arc<R>) -> Self {
        SyncEngine {
            store,
            remote,
            state: Arc::new(SyncState::new()),
            events: EventBus::default(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Append a locally created order to the pending collection. An entry
    /// with the same session is replaced, latest wins.
    pub async fn record_order(&self, order: Order) -> Result<(), SyncError> {
        let _guard = self.state.pending_lock.lock().await;
        let mut pending = self.store.pending_orders()?;
        match pending.iter_mut().find(|o| o.session == order.session) {
            Some(slot) => {
                debug!(session = %order.session, "replacing order with same session");
                *slot = order;
            }
            None => {
                info!(session = %order.session, total = order.total, "order recorded");
                pending.push(order);
            }
        }
        self.store.replace_pending_orders(&pending)
    }

    /// Most recently created pending order, if any.
    pub fn last_order(&self) -> Result<Option<Order>, SyncError> {
        self.store.last_order()
    }

    /// Sync every eligible pending order to the order service in one batch.
    ///
    /// Exactly one read of the pending collection happens up front and, when
    /// anything was eligible, exactly one write afterwards. Remote failures
    /// (transport or a logical rejection) drive the per-order retry
    /// transition and come back as a failed report, never as an `Err`; only
    /// storage problems do that.
    pub async fn sync_pending_orders(&self) -> Result<SyncReport, SyncError> {
        let generation = self.state.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let pending = self.store.pending_orders()?;
        let eligible: Vec<Order> = pending
            .iter()
            .filter(|o| retry::is_eligible(o))
            .cloned()
            .collect();

        if eligible.is_empty() {
            debug!("no eligible pending orders; nothing to sync");
            return Ok(SyncReport::info("nothing to sync"));
        }

        info!(count = eligible.len(), "submitting pending order batch");
        let outcome = self.remote.submit(SyncRequest::new(eligible.clone())).await;

        // Serialize the write-back against other pending-collection writers.
        let _guard = self.state.pending_lock.lock().await;

        // A newer pass started while our remote call was in flight. Its
        // result wins; ours is dropped without touching the store.
        let latest = self.state.generation.load(Ordering::SeqCst);
        if latest != generation {
            debug!(generation, latest, "sync pass superseded; discarding result");
            return Ok(SyncReport::info("superseded by a newer sync"));
        }

        let now = Utc::now();
        match outcome {
            Ok(resp) if resp.success => {
                let updated: Vec<Order> = eligible
                    .into_iter()
                    .map(|o| retry::on_success(o, now))
                    .collect();
                let count = updated.len();
                self.write_back(pending, updated)?;
                self.touch_last_sync(now);
                info!(synced = count, "order batch synced");
                self.events.emit(SyncEvent::SyncComplete { synced: count });
                Ok(SyncReport::ok(count))
            }
            Ok(resp) => {
                let message = resp
                    .message
                    .unwrap_or_else(|| "order service rejected the batch".to_string());
                self.fail_batch(pending, eligible, &message, now)?;
                Ok(SyncReport::failed(message))
            }
            Err(err) => {
                let message = err.to_string();
                self.fail_batch(pending, eligible, &message, now)?;
                Ok(SyncReport::failed(message))
            }
        }
    }

    /// Immediate sync trigger for the UI "sync now" action.
    pub async fn force_sync(&self) -> Result<SyncReport, SyncError> {
        info!("manual sync triggered");
        let report = self.sync_pending_orders().await?;
        self.emit_status();
        Ok(report)
    }

    /// Queue counters plus loop state, shaped for UI indicators.
    pub fn status_snapshot(&self) -> Result<StatusSnapshot, SyncError> {
        let pending = self.store.pending_orders()?;
        let mut snapshot = StatusSnapshot {
            pending: 0,
            failed: 0,
            synced: 0,
            is_running: self.state.is_running.load(Ordering::SeqCst),
            last_sync: self.state.last_sync(),
        };
        for order in &pending {
            match order.sync_status {
                SyncStatus::Pending => snapshot.pending += 1,
                SyncStatus::Failed => snapshot.failed += 1,
                SyncStatus::Synced => snapshot.synced += 1,
            }
        }
        Ok(snapshot)
    }

    /// Stop the background loop after its current tick.
    pub fn stop(&self) {
        self.state.is_running.store(false, Ordering::SeqCst);
    }

    pub(crate) fn emit_status(&self) {
        if let Ok(snapshot) = self.status_snapshot() {
            self.events.emit(SyncEvent::SyncStatus(snapshot));
        }
    }

    fn touch_last_sync(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.state.last_sync.lock() {
            *guard = Some(now);
        }
    }

    /// Apply the failure transition to every attempted order, write the
    /// collection back, and surface orders that just ran out of retries.
    fn fail_batch(
        &self,
        pending: Vec<Order>,
        attempted: Vec<Order>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        warn!(count = attempted.len(), error, "order batch sync failed");

        let updated: Vec<Order> = attempted
            .into_iter()
            .map(|o| retry::on_failure(o, now))
            .collect();
        let exhausted: Vec<String> = updated
            .iter()
            .filter(|o| o.sync_status == SyncStatus::Failed)
            .map(|o| o.session.clone())
            .collect();

        self.write_back(pending, updated)?;

        for session in &exhausted {
            let err = SyncError::RetriesExhausted {
                session: session.clone(),
            };
            warn!("{err}");
        }
        if !exhausted.is_empty() {
            self.events.emit(SyncEvent::RetriesExhausted {
                sessions: exhausted,
            });
        }
        self.events.emit(SyncEvent::SyncFailed {
            error: error.to_string(),
        });
        Ok(())
    }

    /// Merge updated orders back into the snapshot by session and replace
    /// the stored collection. Orders outside the attempted subset pass
    /// through untouched.
    fn write_back(&self, mut pending: Vec<Order>, updated: Vec<Order>) -> Result<(), SyncError> {
        let mut by_session: HashMap<String, Order> = updated
            .into_iter()
            .map(|o| (o.session.clone(), o))
            .collect();
        for order in pending.iter_mut() {
            if let Some(fresh) = by_session.remove(&order.session) {
                *order = fresh;
            }
        }
        self.store.replace_pending_orders(&pending)
    }
}

// ---------------------------------------------------------------------------
// Background sync loop
// ---------------------------------------------------------------------------

impl<S, R> SyncEngine<S, R>
where
    S: OrderStore + 'static,
    R: RemoteSync + 'static,
{
    /// Start the background sync loop. Spawns a tokio task that wakes every
    /// `interval_secs`, probes reachability, and runs one sync pass while
    /// online. Offline ticks leave the queue untouched.
    pub fn start_sync_loop(engine: Arc<Self>, interval_secs: u64) {
        engine.state.is_running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            info!("Sync loop started (interval: {interval_secs}s)");
            let mut previous_online: Option<bool> = None;

            loop {
                if !engine.state.is_running.load(Ordering::SeqCst) {
                    info!("Sync loop stopped");
                    break;
                }

                tokio::time::sleep(Duration::from_secs(interval_secs)).await;

                if !engine.state.is_running.load(Ordering::SeqCst) {
                    break;
                }

                let online = engine.remote.is_reachable().await;
                engine
                    .events
                    .emit(SyncEvent::NetworkStatus { is_online: online });

                if !online {
                    if previous_online != Some(false) {
                        info!("Order service unreachable; keeping pending orders queued");
                    }
                    previous_online = Some(false);
                    engine.emit_status();
                    continue;
                }

                if previous_online == Some(false) {
                    info!("Network restored; resuming queued sync");
                }
                previous_online = Some(true);

                match engine.sync_pending_orders().await {
                    Ok(report) if report.synced > 0 => {
                        info!(synced = report.synced, "Sync cycle complete");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Sync cycle failed: {e}");
                    }
                }

                engine.emit_status();
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

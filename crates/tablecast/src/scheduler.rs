//! Scheduler: owner of the capture pipeline's background loops.
//!
//! Three loops run as tokio tasks once [`Scheduler::start`] returns:
//! 1. The poll loop drains the change log through the decoder into the
//!    event store, then sweeps the consumed rows.
//! 2. The dispatch loop fans buffered events out to the registered
//!    subscribers of each table and marks them processed.
//! 3. The reclaim loop periodically compacts the event store.
//!
//! One broadcast shutdown signal, sent by [`Scheduler::stop`], is observed
//! by every loop at the top of its next iteration; `stop` waits for all
//! three tasks to return. In-flight `on_event` calls are allowed to finish.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::CaptureConfig;
use crate::decoder::decode_row;
use crate::error::{CdcError, Result};
use crate::event::SourceTable;
use crate::gateway::ChangeLogGateway;
use crate::registry::{ComponentDescriptor, ComponentStatus, Registration, SubscriberRegistry};
use crate::store::EventStore;

/// Tunables the facade may adjust while the loops are running; changes take
/// effect from the next tick.
struct Tunables {
    batch_size:       AtomicUsize,
    poll_interval_ms: AtomicU64,
}

/// Point-in-time pipeline statistics for introspection
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    /// Number of registered components
    pub component_count:   usize,
    /// Number of tables currently holding buffered events
    pub table_count:       usize,
    /// Buffered event count per table (processed-but-unreclaimed included)
    pub event_counts:      HashMap<SourceTable, usize>,
    /// Cumulative count of events marked processed since construction
    pub processed_events:  u64,
    /// Number of components currently in `Active` status
    pub active_components: usize,
}

/// Builder for [`Scheduler`]
#[derive(Default)]
pub struct SchedulerBuilder {
    pool:   Option<SqlitePool>,
    config: CaptureConfig,
}

impl SchedulerBuilder {
    /// Start an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shared database handle
    #[must_use]
    pub fn pool(mut self, pool: SqlitePool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Set the capture configuration
    #[must_use]
    pub fn config(mut self, config: CaptureConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the scheduler.
    ///
    /// # Errors
    ///
    /// `MissingDatabaseHandle` when no pool was provided.
    pub fn build(self) -> Result<Scheduler> {
        let pool = self.pool.ok_or(CdcError::MissingDatabaseHandle)?;
        let config = self.config.normalized();

        Ok(Scheduler {
            gateway: Arc::new(ChangeLogGateway::new(pool, config.log_table_name.clone())),
            store: Arc::new(EventStore::new()),
            registry: Arc::new(SubscriberRegistry::new()),
            tunables: Arc::new(Tunables {
                batch_size:       AtomicUsize::new(config.batch_size),
                poll_interval_ms: AtomicU64::new(config.poll_interval_ms),
            }),
            dispatch_interval: Duration::from_millis(config.dispatch_interval_ms),
            dispatch_batch_size: config.dispatch_batch_size,
            reclaim_interval: Duration::from_secs(config.reclaim_interval_secs),
            running: Arc::new(AtomicBool::new(false)),
            processed_events: Arc::new(AtomicU64::new(0)),
            shutdown_tx: None,
            tasks: Vec::new(),
        })
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}

/// Public facade of the CDC bus: lifecycle, registration and introspection
pub struct Scheduler {
    gateway:             Arc<ChangeLogGateway>,
    store:               Arc<EventStore>,
    registry:            Arc<SubscriberRegistry>,
    tunables:            Arc<Tunables>,
    dispatch_interval:   Duration,
    dispatch_batch_size: usize,
    reclaim_interval:    Duration,
    running:             Arc<AtomicBool>,
    processed_events:    Arc<AtomicU64>,
    shutdown_tx:         Option<broadcast::Sender<()>>,
    tasks:               Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Start a builder
    #[must_use]
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    /// Create the change-log table if it does not exist.
    ///
    /// Also runs as part of [`Scheduler::start`]; exposed for embedders
    /// that write change rows before starting the loops.
    ///
    /// # Errors
    ///
    /// `CaptureTx` if the DDL statement fails.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.gateway.ensure_schema().await
    }

    /// Start the three background loops.
    ///
    /// A no-op (with a warning) when already running.
    ///
    /// # Errors
    ///
    /// `CaptureTx` if the change-log table cannot be bootstrapped.
    pub async fn start(&mut self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("scheduler already running");
            return Ok(());
        }

        if let Err(e) = self.gateway.ensure_schema().await {
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        self.tasks = vec![
            tokio::spawn(Self::poll_loop(
                Arc::clone(&self.gateway),
                Arc::clone(&self.store),
                Arc::clone(&self.tunables),
                shutdown_tx.subscribe(),
            )),
            tokio::spawn(Self::dispatch_loop(
                Arc::clone(&self.store),
                Arc::clone(&self.registry),
                Arc::clone(&self.processed_events),
                self.dispatch_interval,
                self.dispatch_batch_size,
                shutdown_tx.subscribe(),
            )),
            tokio::spawn(Self::reclaim_loop(
                Arc::clone(&self.store),
                self.reclaim_interval,
                shutdown_tx.subscribe(),
            )),
        ];
        self.shutdown_tx = Some(shutdown_tx);

        info!(log_table = %self.gateway.log_table(), "scheduler started");
        Ok(())
    }

    /// Signal shutdown and wait for the poll, dispatch and reclaim loops to
    /// return. In-flight `on_event` calls finish; nothing is interrupted
    /// forcibly. Unconsumed change-log rows stay in the table for a future
    /// restart.
    pub async fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!(error = %e, "scheduler loop panicked");
                }
            }
        }

        info!("scheduler stopped");
    }

    /// Check whether the loops are running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register a component (see [`SubscriberRegistry::register`])
    ///
    /// # Errors
    ///
    /// Propagates registration validation errors.
    pub fn register(&self, registration: Registration) -> Result<()> {
        self.registry.register(registration)
    }

    /// Unregister a component (see [`SubscriberRegistry::unregister`])
    ///
    /// # Errors
    ///
    /// `UnknownComponent` if no component of that name is registered.
    pub fn unregister(&self, name: &str) -> Result<()> {
        self.registry.unregister(name)
    }

    /// Set a component's status; this is the only path back to `Active`
    /// after a delivery failure.
    ///
    /// # Errors
    ///
    /// `UnknownComponent` if no component of that name is registered.
    pub fn set_status(&self, name: &str, status: ComponentStatus) -> Result<()> {
        self.registry.set_status(name, status)
    }

    /// Snapshot of one component's descriptor
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<ComponentDescriptor> {
        self.registry.descriptor(name)
    }

    /// Snapshot of every component descriptor
    #[must_use]
    pub fn all_descriptors(&self) -> Vec<ComponentDescriptor> {
        self.registry.all_descriptors()
    }

    /// Snapshot of the component names subscribed to `table`
    #[must_use]
    pub fn subscribers_of(&self, table: SourceTable) -> Vec<String> {
        self.registry.subscribers_of(table)
    }

    /// Point-in-time pipeline statistics
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let event_counts = self.store.count_by_table();
        SchedulerStats {
            component_count:   self.registry.len(),
            table_count:       event_counts.len(),
            processed_events:  self.processed_events.load(Ordering::Relaxed),
            active_components: self.registry.active_count(),
            event_counts,
        }
    }

    /// Adjust the poll batch size; takes effect from the next tick.
    /// Zero is ignored (the lower bound is 1).
    pub fn set_batch_size(&self, size: usize) {
        if size == 0 {
            warn!("ignoring batch_size = 0");
            return;
        }
        self.tunables.batch_size.store(size, Ordering::Relaxed);
    }

    /// Adjust the poll interval; takes effect from the next tick.
    /// Zero is ignored (the lower bound is 1 ms).
    pub fn set_poll_interval_ms(&self, ms: u64) {
        if ms == 0 {
            warn!("ignoring poll_interval_ms = 0");
            return;
        }
        self.tunables.poll_interval_ms.store(ms, Ordering::Relaxed);
    }

    /// Poll loop: capture -> decode -> buffer, then sweep the log.
    async fn poll_loop(
        gateway: Arc<ChangeLogGateway>,
        store: Arc<EventStore>,
        tunables: Arc<Tunables>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        debug!("poll loop started");
        loop {
            let interval = Duration::from_millis(tunables.poll_interval_ms.load(Ordering::Relaxed));
            tokio::select! {
                _ = shutdown.recv() => break,
                () = tokio::time::sleep(interval) => {}
            }

            // The drain races the shutdown signal so stop() also unblocks a
            // pending statement instead of waiting out a slow query.
            tokio::select! {
                _ = shutdown.recv() => break,
                () = Self::drain_change_log(&gateway, &store, &tunables) => {}
            }
        }
        debug!("poll loop stopped");
    }

    /// One poll tick: fetch batches until the log is empty. Capture errors
    /// end the tick (the batch is retried next tick); decode errors drop
    /// only their row.
    async fn drain_change_log(
        gateway: &ChangeLogGateway,
        store: &EventStore,
        tunables: &Tunables,
    ) {
        loop {
            let batch_size = tunables.batch_size.load(Ordering::Relaxed);
            let rows = match gateway.fetch_batch(batch_size).await {
                Ok(rows) => rows,
                Err(e) => {
                    error!(error = %e, "change log fetch failed");
                    return;
                },
            };
            let Some(last) = rows.last() else {
                return;
            };
            let max_id = last.id;

            for row in &rows {
                match decode_row(row) {
                    Ok(event) => {
                        if !store.store(event) {
                            debug!(id = row.id, "duplicate change row ignored");
                        }
                    },
                    Err(e) => {
                        // Row-local by policy: the row is dropped and still
                        // swept below, so a poison row cannot stall the log.
                        warn!(
                            id = row.id,
                            table = %row.table_name,
                            operation = %row.operation,
                            error = %e,
                            "dropping undecodable change row"
                        );
                    },
                }
            }

            if let Err(e) = gateway.delete_up_to(max_id).await {
                error!(max_id, error = %e, "change log sweep failed, batch will be retried");
                return;
            }
        }
    }

    /// Dispatch loop: fan buffered events out to subscribers.
    async fn dispatch_loop(
        store: Arc<EventStore>,
        registry: Arc<SubscriberRegistry>,
        processed_events: Arc<AtomicU64>,
        interval: Duration,
        batch_size: usize,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        debug!("dispatch loop started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                () = tokio::time::sleep(interval) => {}
            }
            Self::dispatch_pending(&store, &registry, &processed_events, batch_size).await;
        }
        debug!("dispatch loop stopped");
    }

    /// One dispatch tick: for every table with buffered events, offer up to
    /// `batch_size` of them to each subscriber of that table, then mark
    /// them processed. A failing or panicking subscriber is marked `Error`
    /// and delivery continues; the event still counts as delivered because
    /// the failure is recorded on the subscriber.
    async fn dispatch_pending(
        store: &EventStore,
        registry: &SubscriberRegistry,
        processed_events: &AtomicU64,
        batch_size: usize,
    ) {
        for (table, buffered) in store.count_by_table() {
            if buffered == 0 {
                continue;
            }
            let events = store.list(table, batch_size);
            if events.is_empty() {
                continue;
            }
            let targets = registry.dispatch_targets(table);

            for event in events {
                for (name, instance) in &targets {
                    let delivery = AssertUnwindSafe(instance.on_event(&event))
                        .catch_unwind()
                        .await;
                    match delivery {
                        Ok(Ok(())) => {},
                        Ok(Err(e)) => {
                            warn!(
                                component = %name,
                                id = event.id(),
                                table = %table,
                                error = %e,
                                "subscriber rejected event"
                            );
                            let _ = registry.set_status(name, ComponentStatus::Error);
                        },
                        Err(_) => {
                            error!(
                                component = %name,
                                id = event.id(),
                                table = %table,
                                "subscriber panicked during delivery"
                            );
                            let _ = registry.set_status(name, ComponentStatus::Error);
                        },
                    }
                }

                store.mark_processed(event.id());
                processed_events.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Reclaim loop: periodic compaction of the event store.
    async fn reclaim_loop(
        store: Arc<EventStore>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        debug!("reclaim loop started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                () = tokio::time::sleep(interval) => {}
            }
            let reclaimed = store.reclaim();
            if reclaimed > 0 {
                debug!(reclaimed, "reclaimed processed events");
            }
        }
        debug!("reclaim loop stopped");
    }
}

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::{Database, ObjectRef, Resource, Table};
use schemahero_planner::Planner;

use crate::queue::retry_delay;

type Tables = BTreeMap<ObjectRef, (Table, Instant)>;
type SharedBatch = Arc<tokio::sync::Mutex<PendingBatch>>;

#[derive(Default)]
struct PendingBatch {
    tables: Tables,
    timer: Option<JoinHandle<()>>,
    generation: u64,
    /// Flushes in a row that failed and were put back.
    failures: u32,
    /// Dropped from the coalescer's map; enqueuers look the database up again.
    retired: bool,
}

impl PendingBatch {
    fn is_idle(&self) -> bool {
        self.tables.is_empty() && self.timer.is_none()
    }
}

/// Coalesces table plans per database into one migration per batch window.
///
/// Every enqueue restarts the database's timer, so a burst of table changes
/// is planned together once the burst has been quiet for the window. A flush
/// that fails with a retryable error puts its tables back and tries again
/// with backoff.
pub struct BatchCoalescer {
    planner: Planner,
    databases: Mutex<HashMap<ObjectRef, SharedBatch>>,
}

impl BatchCoalescer {
    pub fn new(planner: Planner) -> Arc<Self> {
        Arc::new(Self {
            planner,
            databases: Mutex::new(HashMap::new()),
        })
    }

    fn databases(&self) -> MutexGuard<'_, HashMap<ObjectRef, SharedBatch>> {
        match self.databases.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn batch(&self, database: &ObjectRef) -> SharedBatch {
        Arc::clone(self.databases().entry(database.clone()).or_default())
    }

    /// Add or replace `table` in the database's pending batch and restart its timer.
    pub async fn enqueue(self: &Arc<Self>, database: &Database, table: Table, window: Duration) {
        let db_ref = database.object_ref();
        loop {
            let batch = self.batch(&db_ref);
            let mut pending = batch.lock().await;
            if pending.retired {
                continue;
            }
            tracing::debug!(
                database = %db_ref,
                table = %table.object_ref(),
                window_ms = window.as_millis() as u64,
                "table queued for batch planning"
            );
            pending
                .tables
                .insert(table.object_ref(), (table, Instant::now()));
            pending.failures = 0;
            self.arm(&batch, &mut pending, db_ref, window);
            return;
        }
    }

    /// Replace any running timer with one that flushes after `delay`.
    fn arm(self: &Arc<Self>, batch: &SharedBatch, pending: &mut PendingBatch, db_ref: ObjectRef, delay: Duration) {
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
        pending.generation += 1;
        let generation = pending.generation;
        let this = Arc::clone(self);
        let batch = Arc::clone(batch);
        pending.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.flush(batch, db_ref, generation).await;
        }));
    }

    /// Number of tables waiting for `database`'s timer.
    pub async fn pending(&self, database: &ObjectRef) -> usize {
        let batch = self.databases().get(database).cloned();
        match batch {
            Some(batch) => batch.lock().await.tables.len(),
            None => 0,
        }
    }

    /// Number of databases with queued tables or a running timer.
    pub fn tracked(&self) -> usize {
        self.databases().len()
    }

    async fn flush(self: Arc<Self>, batch: SharedBatch, db_ref: ObjectRef, generation: u64) {
        let drained = {
            let mut pending = batch.lock().await;
            if pending.generation != generation || pending.retired {
                return;
            }
            // Detach before the lock is released so a later enqueue cannot
            // abort this flush mid-plan.
            pending.timer = None;
            std::mem::take(&mut pending.tables)
        };
        if drained.is_empty() {
            self.retire_if_idle(&db_ref, &batch);
            return;
        }

        let oldest = drained.values().map(|(_, at)| *at).min();
        let tables: Vec<Table> = drained.values().map(|(table, _)| table.clone()).collect();
        tracing::info!(
            database = %db_ref,
            tables = tables.len(),
            waited_ms = oldest.map(|at| at.elapsed().as_millis() as u64).unwrap_or(0),
            "flushing batch"
        );

        match self.plan(&db_ref, tables).await {
            Ok(()) => {
                batch.lock().await.failures = 0;
                self.retire_if_idle(&db_ref, &batch);
            }
            Err(e) if e.kind().is_retryable() => self.put_back(batch, db_ref, drained, &e).await,
            Err(e) => {
                tracing::warn!(database = %db_ref, error = %e, "batch planning failed");
                for (table, _) in drained.values() {
                    if let Err(status) = self.planner.record_error(table, Some(&e)).await {
                        tracing::warn!(table = %table.object_ref(), error = %status, "could not update status");
                    }
                }
                batch.lock().await.failures = 0;
                self.retire_if_idle(&db_ref, &batch);
            }
        }
    }

    async fn plan(&self, db_ref: &ObjectRef, tables: Vec<Table>) -> Result<(), SchemaHeroError> {
        let Some(database) = self
            .planner
            .client()
            .get::<Database>(&db_ref.namespace, &db_ref.name)
            .await?
        else {
            tracing::warn!(database = %db_ref, "database gone before batch flush");
            return Ok(());
        };
        let outcome = self.planner.plan_batch(&database, tables).await?;
        for (table, error) in &outcome.failed {
            tracing::warn!(database = %db_ref, table = %table, error = %error, "table left out of batch");
        }
        Ok(())
    }

    /// Return a failed flush's tables to the batch without overwriting newer
    /// snapshots, and arm a retry unless an enqueue already restarted the window.
    async fn put_back(self: &Arc<Self>, mut batch: SharedBatch, db_ref: ObjectRef, drained: Tables, error: &SchemaHeroError) {
        loop {
            let mut pending = batch.lock().await;
            if pending.retired {
                drop(pending);
                batch = self.batch(&db_ref);
                continue;
            }
            for (key, entry) in drained {
                pending.tables.entry(key).or_insert(entry);
            }
            let delay = retry_delay(pending.failures);
            pending.failures = pending.failures.saturating_add(1);
            tracing::warn!(
                database = %db_ref,
                tables = pending.tables.len(),
                error = %error,
                retry_secs = delay.as_secs(),
                "batch planning failed, will retry"
            );
            if pending.timer.is_none() {
                self.arm(&batch, &mut pending, db_ref, delay);
            }
            return;
        }
    }

    /// Forget `db_ref` once its batch has nothing queued and no timer.
    fn retire_if_idle(&self, db_ref: &ObjectRef, batch: &SharedBatch) {
        let mut databases = self.databases();
        // An enqueue holding the batch lock is about to make it busy again.
        let Ok(mut pending) = batch.try_lock() else {
            return;
        };
        let current = databases.get(db_ref).is_some_and(|b| Arc::ptr_eq(b, batch));
        if current && pending.is_idle() {
            pending.retired = true;
            databases.remove(db_ref);
        }
    }

    /// Cancel every pending timer. Pending tables are picked up again by resync.
    pub async fn shut_down(&self) {
        let batches: Vec<_> = self.databases().drain().map(|(_, batch)| batch).collect();
        for batch in batches {
            let mut pending = batch.lock().await;
            if let Some(timer) = pending.timer.take() {
                timer.abort();
            }
            pending.tables.clear();
            pending.retired = true;
        }
    }
}

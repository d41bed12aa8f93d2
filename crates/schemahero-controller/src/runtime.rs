use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use schemahero_core::config::SchemaHeroConfig;
use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::{ObjectRef, Resource};
use schemahero_store::Client;

use crate::queue::WorkQueue;

/// What to do with a key after a successful reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Done,
    RequeueAfter(Duration),
}

/// Brings one kind of resource towards its desired state.
///
/// Implementations must be idempotent: reconciling an object whose spec has
/// not changed writes nothing.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    type Object: Resource;

    /// Controller name used in logs.
    fn name(&self) -> &'static str;

    /// Whether this instance is responsible for `obj`.
    fn owns(&self, _obj: &Self::Object) -> bool {
        true
    }

    async fn reconcile(&self, obj: Self::Object) -> Result<Action, SchemaHeroError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RuntimeSettings {
    pub workers: usize,
    pub timeout: Duration,
    pub resync: Duration,
}

impl RuntimeSettings {
    pub fn from_config(config: &SchemaHeroConfig) -> Self {
        Self {
            workers: config.reconcile_workers.max(1),
            timeout: Duration::from_secs(config.reconcile_timeout_secs.max(1)),
            resync: Duration::from_secs(config.resync_interval_secs.max(1)),
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_config(&SchemaHeroConfig::default())
    }
}

/// Runs a [`Reconciler`] off store watch events, a periodic resync and
/// delayed requeues.
pub struct Controller<R: Reconciler> {
    client: Client,
    reconciler: Arc<R>,
    settings: RuntimeSettings,
    queue: Arc<WorkQueue>,
}

impl<R: Reconciler> Controller<R> {
    pub fn new(client: Client, reconciler: R, settings: RuntimeSettings) -> Self {
        Self {
            client,
            reconciler: Arc::new(reconciler),
            settings,
            queue: WorkQueue::new(),
        }
    }

    /// Run until `cancel` fires. In-flight reconciles are abandoned at their
    /// next suspension point.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), SchemaHeroError> {
        let name = self.reconciler.name();
        let events = self.client.watch();
        self.enqueue_all().await?;
        tracing::info!(controller = name, workers = self.settings.workers, "controller started");

        let this = Arc::new(self);
        let mut tasks = JoinSet::new();
        tasks.spawn(Arc::clone(&this).pump_events(events, cancel.clone()));
        tasks.spawn(Arc::clone(&this).resync(cancel.clone()));
        for _ in 0..this.settings.workers {
            tasks.spawn(Arc::clone(&this).work(cancel.clone()));
        }

        cancel.cancelled().await;
        this.queue.shut_down();
        while tasks.join_next().await.is_some() {}
        tracing::info!(controller = name, "controller stopped");
        Ok(())
    }

    async fn enqueue_all(&self) -> Result<(), SchemaHeroError> {
        for obj in self.client.list::<R::Object>(None).await? {
            self.queue.add(obj.object_ref());
        }
        Ok(())
    }

    async fn pump_events(
        self: Arc<Self>,
        mut events: tokio::sync::broadcast::Receiver<schemahero_store::WatchEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => return,
                event = events.recv() => event,
            };
            match event {
                Ok(event) if event.kind == R::Object::KIND => {
                    self.queue.add(ObjectRef::new(event.namespace, event.name));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(controller = self.reconciler.name(), missed, "watch lagged, resyncing");
                    if let Err(e) = self.enqueue_all().await {
                        tracing::warn!(controller = self.reconciler.name(), error = %e, "resync failed");
                    }
                }
                Err(RecvError::Closed) => return,
            }
        }
    }

    async fn resync(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.resync);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
            if let Err(e) = self.enqueue_all().await {
                tracing::warn!(controller = self.reconciler.name(), error = %e, "resync failed");
            }
        }
    }

    async fn work(self: Arc<Self>, cancel: CancellationToken) {
        while let Some(key) = self.queue.get().await {
            let result = tokio::select! {
                _ = cancel.cancelled() => Err(SchemaHeroError::Cancelled),
                result = tokio::time::timeout(self.settings.timeout, self.reconcile_key(&key)) => {
                    result.unwrap_or_else(|_| Err(SchemaHeroError::Timeout {
                        seconds: self.settings.timeout.as_secs(),
                    }))
                }
            };
            self.finish(&key, result);
            self.queue.done(&key);
        }
    }

    async fn reconcile_key(&self, key: &ObjectRef) -> Result<Action, SchemaHeroError> {
        let Some(obj) = self.client.get::<R::Object>(&key.namespace, &key.name).await? else {
            return Ok(Action::Done);
        };
        if !self.reconciler.owns(&obj) {
            return Ok(Action::Done);
        }
        self.reconciler.reconcile(obj).await
    }

    fn finish(&self, key: &ObjectRef, result: Result<Action, SchemaHeroError>) {
        let name = self.reconciler.name();
        match result {
            Ok(Action::Done) => self.queue.forget(key),
            Ok(Action::RequeueAfter(delay)) => {
                self.queue.forget(key);
                tracing::debug!(controller = name, key = %key, delay_secs = delay.as_secs(), "requeue");
                self.queue.add_after(key.clone(), delay);
            }
            Err(SchemaHeroError::Cancelled) => {}
            Err(e) if e.kind().is_retryable() => {
                let delay = self.queue.backoff(key);
                tracing::warn!(controller = name, key = %key, error = %e, retry_secs = delay.as_secs(), "reconcile failed");
                self.queue.add_after(key.clone(), delay);
            }
            Err(e) => {
                self.queue.forget(key);
                tracing::error!(controller = name, key = %key, kind = %e.kind(), error = %e, "reconcile failed");
            }
        }
    }
}

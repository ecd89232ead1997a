//! Controller - delivers reconcile requests for stored objects.
//!
//! Keys are delivered when the store reports a change, on a periodic full
//! resync, and when a pass asks to be requeued. At most one pass runs per key;
//! a key delivered while its pass is running is run again once it finishes.
//! Different keys reconcile concurrently.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::{Id, JoinSet};
use tokio::time::{Instant, interval, sleep_until};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::reconciler::{Action, Reconciler};
use crate::store::ObjectStore;

pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(600);

pub struct Controller<R> {
    store: Arc<dyn ObjectStore>,
    reconciler: Arc<R>,
    retry_interval: Duration,
    resync_interval: Duration,
}

/// Per-key bookkeeping for the run loop.
#[derive(Default)]
struct Queue {
    in_flight: HashSet<String>,
    /// Keys delivered again while their pass was running.
    dirty: HashSet<String>,
    /// Pending delayed deliveries; only the earliest is kept per key.
    scheduled: HashMap<String, Instant>,
    /// Key of every running pass, so a panicked pass can be retried.
    tasks: HashMap<Id, String>,
}

impl<R: Reconciler + 'static> Controller<R> {
    pub fn new(store: Arc<dyn ObjectStore>, reconciler: Arc<R>, config: &Config) -> Self {
        Self {
            store,
            reconciler,
            retry_interval: config.retry_interval,
            resync_interval: DEFAULT_RESYNC_INTERVAL,
        }
    }

    pub fn with_resync_interval(mut self, resync_interval: Duration) -> Self {
        self.resync_interval = resync_interval;
        self
    }

    /// Decide when a finished pass should run again.
    fn error_policy(&self, key: &str, result: Result<Action>) -> Action {
        match result {
            Ok(action) => action,
            // A newer write already carries more current intent
            Err(e @ Error::PersistenceConflict(_)) => {
                debug!(key, error = %e, "write conflict, retrying now");
                Action::requeue(Duration::ZERO)
            }
            Err(e) => {
                error!(key, error = %e, "reconcile failed");
                Action::requeue(self.retry_interval)
            }
        }
    }

    fn start(&self, queue: &mut Queue, passes: &mut JoinSet<(String, Result<Action>)>, key: String) {
        if queue.in_flight.contains(&key) {
            queue.dirty.insert(key);
            return;
        }
        queue.in_flight.insert(key.clone());

        let reconciler = Arc::clone(&self.reconciler);
        let task_key = key.clone();
        let handle = passes.spawn(async move {
            let result = reconciler.reconcile(&task_key).await;
            (task_key, result)
        });
        queue.tasks.insert(handle.id(), key);
    }

    fn schedule(
        &self,
        queue: &mut Queue,
        timers: &mpsc::UnboundedSender<(String, Instant)>,
        key: String,
        after: Duration,
    ) {
        let deadline = Instant::now() + after;
        if let Some(existing) = queue.scheduled.get(&key)
            && *existing <= deadline
        {
            return;
        }
        queue.scheduled.insert(key.clone(), deadline);

        let timers = timers.clone();
        tokio::spawn(async move {
            sleep_until(deadline).await;
            let _ = timers.send((key, deadline));
        });
    }

    async fn resync(&self, queue: &mut Queue, passes: &mut JoinSet<(String, Result<Action>)>) {
        match self.store.list().await {
            Ok(devices) => {
                debug!(count = devices.len(), "resync");
                for dev in devices {
                    self.start(queue, passes, dev.name().to_string());
                }
            }
            Err(e) => warn!(error = %e, "resync failed to list objects"),
        }
    }

    /// Run until `shutdown` resolves. Passes already running are completed.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        info!(
            retry_interval = ?self.retry_interval,
            resync_interval = ?self.resync_interval,
            "controller started"
        );

        let mut queue = Queue::default();
        let mut passes = JoinSet::new();
        let mut events = self.store.subscribe();
        let (timer_tx, mut timer_rx) = mpsc::unbounded_channel::<(String, Instant)>();
        let mut resync = interval(self.resync_interval);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,

                _ = resync.tick() => self.resync(&mut queue, &mut passes).await,

                event = events.recv() => match event {
                    Ok(event) => self.start(&mut queue, &mut passes, event.name().to_string()),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "missed store events, resyncing");
                        self.resync(&mut queue, &mut passes).await;
                    }
                    Err(RecvError::Closed) => {
                        warn!("store event stream closed");
                        break;
                    }
                },

                Some((key, deadline)) = timer_rx.recv() => {
                    if queue.scheduled.get(&key) == Some(&deadline) {
                        queue.scheduled.remove(&key);
                        self.start(&mut queue, &mut passes, key);
                    }
                }

                Some(joined) = passes.join_next_with_id(), if !passes.is_empty() => {
                    let (key, action) = match joined {
                        Ok((id, (key, result))) => {
                            queue.tasks.remove(&id);
                            let action = self.error_policy(&key, result);
                            (key, action)
                        }
                        Err(e) => {
                            let Some(key) = queue.tasks.remove(&e.id()) else {
                                error!(error = %e, "reconcile task failed");
                                continue;
                            };
                            error!(key = %key, error = %e, "reconcile task failed");
                            (key, Action::requeue(self.retry_interval))
                        }
                    };
                    queue.in_flight.remove(&key);

                    let rerun = queue.dirty.remove(&key);
                    match action.requeue_after {
                        Some(after) if after.is_zero() => {
                            self.start(&mut queue, &mut passes, key);
                        }
                        Some(after) => {
                            if rerun {
                                self.start(&mut queue, &mut passes, key.clone());
                            }
                            self.schedule(&mut queue, &timer_tx, key, after);
                        }
                        None if rerun => self.start(&mut queue, &mut passes, key),
                        None => {}
                    }
                }
            }
        }

        info!(running = passes.len(), "controller stopping");
        while passes.join_next().await.is_some() {}
    }
}

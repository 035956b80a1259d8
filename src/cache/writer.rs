//! Background writer for read-through population
//!
//! `get_or_set` hands its write here and returns immediately. A single
//! supervised task owns the queue and runs each write in a `JoinSet`, so one
//! slow backend call does not hold up the ones behind it. Outcomes only reach
//! the log and the manager's counters.

use crate::backend::CacheBackend;
use crate::cache::types::{CacheKey, CacheValue};
use crate::error::{CacheError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, warn};

/// Counters shared between the manager and the writer task
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub writes: AtomicU64,
    pub write_failures: AtomicU64,
    pub deletes: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

enum WriteCommand {
    Set {
        backend: Arc<CacheBackend>,
        key: CacheKey,
        value: CacheValue,
        ttl_secs: Option<u64>,
    },
    Flush(oneshot::Sender<()>),
}

pub(crate) struct BackgroundWriter {
    tx: mpsc::UnboundedSender<WriteCommand>,
    _task: JoinHandle<()>,
}

impl BackgroundWriter {
    /// Spawn the writer task on the current tokio runtime
    ///
    /// Fails with [`CacheError::ConfigError`] when called outside a runtime.
    pub fn spawn(counters: Arc<StatsCounters>) -> Result<Self> {
        let handle = tokio::runtime::Handle::try_current().map_err(|e| {
            CacheError::ConfigError(format!("cache manager needs a tokio runtime: {}", e))
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let task = handle.spawn(run(rx, counters));
        Ok(Self { tx, _task: task })
    }

    /// Queue a write; returns false if the writer task is gone
    pub fn submit(
        &self,
        backend: Arc<CacheBackend>,
        key: CacheKey,
        value: CacheValue,
        ttl_secs: Option<u64>,
    ) -> bool {
        let sent = self.tx.send(WriteCommand::Set {
            backend,
            key,
            value,
            ttl_secs,
        });
        if let Err(e) = sent {
            if let WriteCommand::Set { key, .. } = e.0 {
                error!("Background writer stopped, dropping write for {}", key);
            }
            return false;
        }
        true
    }

    /// Wait until every write queued so far has finished
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriteCommand::Flush(done_tx)).is_err() {
            return;
        }
        let _ = done_rx.await;
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<WriteCommand>, counters: Arc<StatsCounters>) {
    let mut in_flight: JoinSet<(CacheKey, bool)> = JoinSet::new();
    let mut pending_flushes: Vec<oneshot::Sender<()>> = Vec::new();

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(WriteCommand::Set { backend, key, value, ttl_secs }) => {
                    in_flight.spawn(async move {
                        let ok = backend.set(&key, &value, ttl_secs).await;
                        (key, ok)
                    });
                }
                Some(WriteCommand::Flush(done)) => {
                    if in_flight.is_empty() {
                        let _ = done.send(());
                    } else {
                        pending_flushes.push(done);
                    }
                }
                None => break,
            },
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                record(joined, &counters);
                if in_flight.is_empty() {
                    for done in pending_flushes.drain(..) {
                        let _ = done.send(());
                    }
                }
            }
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        record(joined, &counters);
    }
    for done in pending_flushes {
        let _ = done.send(());
    }
    debug!("Background writer exiting");
}

fn record(
    joined: std::result::Result<(CacheKey, bool), tokio::task::JoinError>,
    counters: &StatsCounters,
) {
    match joined {
        Ok((key, true)) => {
            debug!("Background write stored {}", key);
            StatsCounters::bump(&counters.writes);
        }
        Ok((key, false)) => {
            warn!("Background write for {} was not stored", key);
            StatsCounters::bump(&counters.write_failures);
        }
        Err(e) => {
            error!("Background write task failed: {}", e);
            StatsCounters::bump(&counters.write_failures);
        }
    }
}

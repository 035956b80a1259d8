//! Bounded lease pool around the shared remote connection
//!
//! The remote store multiplexes every command over one connection, so the pool
//! does not hand out separate sockets. It bounds how many operations may be in
//! flight at once and queues the rest in FIFO order. Each in-flight operation
//! holds a [`PoolLease`] on one of `max_connections` fixed slots.
//!
//! Slots carry a generation counter. Reclaiming a slot (idle sweep or
//! disconnect) bumps the generation, so a late `release` from the previous
//! holder is recognised as stale and ignored.

use crate::connection::RemoteStore;
use crate::error::{CacheError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Pool sizing and timeouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of concurrent leases
    pub max_connections: usize,

    /// How long `acquire` may wait for a free slot
    pub acquire_timeout: Duration,

    /// Leases held longer than this are reclaimed by the sweep
    pub max_idle_time: Duration,

    /// How often the background sweep runs
    pub sweep_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_millis(5_000),
            max_idle_time: Duration::from_millis(30_000),
            sweep_interval: Duration::from_millis(10_000),
        }
    }
}

impl PoolConfig {
    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_connections == 0 {
            return Err("max_connections must be greater than 0".to_string());
        }
        if self.acquire_timeout.is_zero() {
            return Err("acquire_timeout must be greater than 0".to_string());
        }
        if self.max_idle_time.is_zero() {
            return Err("max_idle_time must be greater than 0".to_string());
        }
        if self.sweep_interval.is_zero() {
            return Err("sweep_interval must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Point-in-time pool counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolStats {
    pub max_connections: usize,
    pub active: usize,
    pub waiting: usize,
    pub total_acquired: u64,
    pub timeouts: u64,
    pub reclaimed: u64,
    pub disconnects: u64,
}

/// Lease pool over one shared [`RemoteStore`]
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

struct PoolShared {
    store: Arc<dyn RemoteStore>,
    config: PoolConfig,
    state: Mutex<PoolState>,
}

struct PoolState {
    active: usize,
    slots: Vec<Slot>,
    free: Vec<usize>,
    waiters: VecDeque<Waiter>,
    next_waiter_id: u64,
    stats: PoolStats,
}

struct Slot {
    generation: u64,
    leased_at: Option<Instant>,
}

struct Waiter {
    id: u64,
    enqueued_at: Instant,
    tx: oneshot::Sender<Result<PoolLease>>,
}

impl ConnectionPool {
    /// Create a pool; no connection is opened until the first command
    pub fn new(store: Arc<dyn RemoteStore>, config: PoolConfig) -> Self {
        let max = config.max_connections;
        let state = PoolState {
            active: 0,
            slots: (0..max)
                .map(|_| Slot {
                    generation: 0,
                    leased_at: None,
                })
                .collect(),
            free: (0..max).rev().collect(),
            waiters: VecDeque::new(),
            next_waiter_id: 0,
            stats: PoolStats {
                max_connections: max,
                ..Default::default()
            },
        };

        Self {
            shared: Arc::new(PoolShared {
                store,
                config,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Acquire a lease, waiting up to `acquire_timeout` for a free slot
    pub async fn acquire(&self) -> Result<PoolLease> {
        let (id, rx) = {
            let mut state = self.shared.state.lock();
            if let Some(slot) = state.free.pop() {
                state.active += 1;
                return Ok(state.grant(&self.shared, slot));
            }

            let id = state.next_waiter_id;
            state.next_waiter_id += 1;
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(Waiter {
                id,
                enqueued_at: Instant::now(),
                tx,
            });
            debug!("Pool saturated, queued waiter {} ({} waiting)", id, state.waiters.len());
            (id, rx)
        };

        let timeout = self.shared.config.acquire_timeout;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CacheError::Disconnected(
                "pool dropped the pending acquire".to_string(),
            )),
            Err(_) => {
                // The receiver is gone, so a concurrent hand-off to this waiter
                // fails and moves on to the next one.
                let mut state = self.shared.state.lock();
                state.waiters.retain(|w| w.id != id);
                state.stats.timeouts += 1;
                warn!("Pool acquire timed out after {:?}", timeout);
                Err(CacheError::TimeoutError {
                    timeout_ms: timeout.as_millis() as u64,
                    context: "connection pool acquire".to_string(),
                })
            }
        }
    }

    /// Reclaim leases held past `max_idle_time` and expire stale waiters
    ///
    /// Returns the number of reclaimed leases.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let max_idle = self.shared.config.max_idle_time;
        let acquire_timeout = self.shared.config.acquire_timeout;
        let mut expired = Vec::new();

        let reclaimed = {
            let mut state = self.shared.state.lock();

            let mut i = 0;
            while i < state.waiters.len() {
                let waiter = &state.waiters[i];
                if waiter.tx.is_closed() || now.duration_since(waiter.enqueued_at) > acquire_timeout {
                    if let Some(waiter) = state.waiters.remove(i) {
                        expired.push(waiter);
                    }
                } else {
                    i += 1;
                }
            }

            let idle: Vec<usize> = state
                .slots
                .iter()
                .enumerate()
                .filter_map(|(slot, s)| match s.leased_at {
                    Some(at) if now.duration_since(at) > max_idle => Some(slot),
                    _ => None,
                })
                .collect();

            for &slot in &idle {
                warn!("Reclaiming pool slot {} held longer than {:?}", slot, max_idle);
                state.slots[slot].generation += 1;
                state.stats.reclaimed += 1;
                state.hand_off(&self.shared, slot);
            }
            idle.len()
        };

        for waiter in expired {
            let _ = waiter.tx.send(Err(CacheError::TimeoutError {
                timeout_ms: acquire_timeout.as_millis() as u64,
                context: "connection pool acquire (expired by sweep)".to_string(),
            }));
        }

        if reclaimed > 0 {
            debug!("Pool sweep reclaimed {} leases", reclaimed);
        }
        reclaimed
    }

    /// Reset the pool after the shared connection dropped for good
    ///
    /// Every outstanding lease becomes stale and every queued waiter fails
    /// with [`CacheError::Disconnected`] so callers retry on a fresh connection.
    pub fn handle_disconnect(&self) {
        let waiters = {
            let mut state = self.shared.state.lock();
            let max = state.slots.len();
            for slot in state.slots.iter_mut() {
                slot.generation += 1;
                slot.leased_at = None;
            }
            state.free = (0..max).rev().collect();
            state.active = 0;
            state.stats.disconnects += 1;
            std::mem::take(&mut state.waiters)
        };

        warn!(
            "Shared connection lost, pool reset ({} waiters failed)",
            waiters.len()
        );
        for waiter in waiters {
            let _ = waiter.tx.send(Err(CacheError::Disconnected(
                "shared connection lost while waiting for a lease".to_string(),
            )));
        }
    }

    /// Spawn the periodic sweep; it stops once the pool is dropped
    pub fn start_reaper(&self) -> JoinHandle<()> {
        let weak: Weak<PoolShared> = Arc::downgrade(&self.shared);
        let period = self.shared.config.sweep_interval;

        info!("Starting pool reaper (interval: {:?})", period);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(shared) => {
                        ConnectionPool { shared }.sweep();
                    }
                    None => {
                        debug!("Pool dropped, reaper exiting");
                        break;
                    }
                }
            }
        })
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            active: state.active,
            waiting: state.waiters.len(),
            ..state.stats.clone()
        }
    }
}

impl PoolState {
    fn grant(&mut self, shared: &Arc<PoolShared>, slot: usize) -> PoolLease {
        let entry = &mut self.slots[slot];
        entry.generation += 1;
        entry.leased_at = Some(Instant::now());
        self.stats.total_acquired += 1;

        PoolLease {
            shared: Arc::clone(shared),
            slot,
            generation: entry.generation,
            leased_at: Instant::now(),
            released: false,
        }
    }

    // Pass the slot to the oldest live waiter, or return it to the free list.
    fn hand_off(&mut self, shared: &Arc<PoolShared>, slot: usize) {
        while let Some(waiter) = self.waiters.pop_front() {
            let lease = self.grant(shared, slot);
            match waiter.tx.send(Ok(lease)) {
                Ok(()) => return,
                Err(rejected) => {
                    if let Ok(mut lease) = rejected {
                        lease.disarm();
                    }
                }
            }
        }

        self.slots[slot].leased_at = None;
        self.active = self.active.saturating_sub(1);
        self.free.push(slot);
    }
}

impl PoolShared {
    fn release(self: &Arc<Self>, slot: usize, generation: u64) {
        let mut state = self.state.lock();
        let current = &state.slots[slot];
        if current.generation != generation || current.leased_at.is_none() {
            debug!("Ignoring release of stale lease on slot {}", slot);
            return;
        }
        state.hand_off(self, slot);
    }
}

/// A caller's right to issue commands on the shared connection
///
/// Released explicitly with [`PoolLease::release`] or implicitly on drop.
pub struct PoolLease {
    shared: Arc<PoolShared>,
    slot: usize,
    generation: u64,
    leased_at: Instant,
    released: bool,
}

impl PoolLease {
    /// The shared store this lease grants access to
    pub fn store(&self) -> &dyn RemoteStore {
        self.shared.store.as_ref()
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// How long this lease has been held
    pub fn held_for(&self) -> Duration {
        self.leased_at.elapsed()
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.shared.release(self.slot, self.generation);
        }
    }

    // Used while the pool lock is held: the slot is being handed elsewhere.
    fn disarm(&mut self) {
        self.released = true;
    }
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl std::fmt::Debug for PoolLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolLease")
            .field("slot", &self.slot)
            .field("generation", &self.generation)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NullStore;

    #[async_trait]
    impl RemoteStore for NullStore {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }
        async fn set_ex(&self, _key: &str, _value: &str, _ttl_secs: u64) -> Result<()> {
            Ok(())
        }
        async fn del(&self, _key: &str) -> Result<u64> {
            Ok(0)
        }
        async fn ping(&self) -> Result<Duration> {
            Ok(Duration::ZERO)
        }
    }

    fn pool(max: usize, acquire_timeout_ms: u64, max_idle_ms: u64) -> ConnectionPool {
        ConnectionPool::new(
            Arc::new(NullStore),
            PoolConfig {
                max_connections: max,
                acquire_timeout: Duration::from_millis(acquire_timeout_ms),
                max_idle_time: Duration::from_millis(max_idle_ms),
                sweep_interval: Duration::from_millis(20),
            },
        )
    }

    #[tokio::test]
    async fn test_saturation_queues_and_hand_off() {
        let pool = pool(2, 1_000, 60_000);

        let a = pool.acquire().await.unwrap();
        let _b = pool.acquire().await.unwrap();
        assert_eq!(pool.stats().active, 2);

        let p = pool.clone();
        let waiter = tokio::spawn(async move { p.acquire().await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(pool.stats().waiting, 1);
        assert!(!waiter.is_finished());

        let freed_slot = a.slot();
        a.release();
        let c = waiter.await.unwrap().unwrap();
        assert_eq!(c.slot(), freed_slot);

        let stats = pool.stats();
        assert_eq!(stats.active, 2);
        assert_eq!(stats.waiting, 0);
        assert_eq!(stats.total_acquired, 3);
    }

    #[tokio::test]
    async fn test_waiters_are_fifo() {
        let pool = pool(1, 1_000, 60_000);
        let first = pool.acquire().await.unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        for n in 0..3 {
            let p = pool.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let lease = p.acquire().await.unwrap();
                tx.send(n).unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
                lease.release();
            });
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        first.release();
        let mut order = Vec::new();
        for _ in 0..3 {
            order.push(rx.recv().await.unwrap());
        }
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_timeout_removes_waiter() {
        let pool = pool(1, 50, 60_000);
        let held = pool.acquire().await.unwrap();

        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, CacheError::TimeoutError { .. }));
        assert_eq!(pool.stats().waiting, 0);
        assert_eq!(pool.stats().timeouts, 1);

        // The slot must come back to the free list, not to the timed-out waiter
        held.release();
        assert_eq!(pool.stats().active, 0);
        let again = pool.acquire().await.unwrap();
        assert_eq!(pool.stats().active, 1);
        drop(again);
        assert_eq!(pool.stats().active, 0);
    }

    #[tokio::test]
    async fn test_drop_releases() {
        let pool = pool(1, 100, 60_000);
        {
            let _lease = pool.acquire().await.unwrap();
            assert_eq!(pool.stats().active, 1);
        }
        assert_eq!(pool.stats().active, 0);
    }

    #[tokio::test]
    async fn test_disconnect_fails_waiters() {
        let pool = pool(1, 5_000, 60_000);
        let held = pool.acquire().await.unwrap();

        let p = pool.clone();
        let waiter = tokio::spawn(async move { p.acquire().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        pool.handle_disconnect();
        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, CacheError::Disconnected(_)));

        let stats = pool.stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.waiting, 0);
        assert_eq!(stats.disconnects, 1);

        // A fresh lease works; the old one is stale and must not free it
        let fresh = pool.acquire().await.unwrap();
        held.release();
        assert_eq!(pool.stats().active, 1);
        drop(fresh);
        assert_eq!(pool.stats().active, 0);
    }

    #[tokio::test]
    async fn test_sweep_reclaims_idle_leases() {
        let pool = pool(1, 1_000, 30);
        let stale = pool.acquire().await.unwrap();

        assert_eq!(pool.sweep(), 0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pool.sweep(), 1);
        assert_eq!(pool.stats().active, 0);
        assert_eq!(pool.stats().reclaimed, 1);

        let current = pool.acquire().await.unwrap();
        drop(stale);
        assert_eq!(pool.stats().active, 1);
        drop(current);
    }

    #[tokio::test]
    async fn test_sweep_hands_reclaimed_slot_to_waiter() {
        let pool = pool(1, 1_000, 30);
        let _stale = pool.acquire().await.unwrap();

        let p = pool.clone();
        let waiter = tokio::spawn(async move { p.acquire().await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        pool.sweep();
        let lease = waiter.await.unwrap().unwrap();
        assert_eq!(lease.slot(), 0);
        assert_eq!(pool.stats().active, 1);
    }

    #[tokio::test]
    async fn test_reaper_runs_in_background() {
        let pool = pool(1, 1_000, 10);
        let handle = pool.start_reaper();
        let stale = pool.acquire().await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(pool.stats().reclaimed >= 1);
        assert_eq!(pool.stats().active, 0);

        drop(stale);
        drop(pool);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reaper should stop after the pool is dropped")
            .unwrap();
    }

    #[test]
    fn test_config_validation() {
        assert!(PoolConfig::default().validate().is_ok());
        let config = PoolConfig {
            max_connections: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

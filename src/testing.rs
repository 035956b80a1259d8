//! In-process remote store used by unit tests

use crate::connection::RemoteStore;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
pub(crate) struct MockStore {
    pub data: Mutex<HashMap<String, (String, u64)>>,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    pub disconnected: AtomicBool,
    pub gets: AtomicUsize,
    pub sets: AtomicUsize,
    pub dels: AtomicUsize,
}

impl MockStore {
    pub fn raw(&self, key: &str) -> Option<String> {
        self.data.lock().get(key).map(|(value, _)| value.clone())
    }

    pub fn ttl(&self, key: &str) -> Option<u64> {
        self.data.lock().get(key).map(|(_, ttl)| *ttl)
    }

    pub fn put_raw(&self, key: &str, value: &str) {
        self.data
            .lock()
            .insert(key.to_string(), (value.to_string(), 60));
    }

    fn check(&self, fail: &AtomicBool) -> Result<()> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(CacheError::Disconnected("mock connection closed".to_string()));
        }
        if fail.load(Ordering::SeqCst) {
            return Err(CacheError::ConnectionError("mock transport failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MockStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check(&self.fail_reads)?;
        Ok(self.raw(key))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.check(&self.fail_writes)?;
        self.data
            .lock()
            .insert(key.to_string(), (value.to_string(), ttl_secs));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<u64> {
        self.dels.fetch_add(1, Ordering::SeqCst);
        self.check(&self.fail_writes)?;
        Ok(u64::from(self.data.lock().remove(key).is_some()))
    }

    async fn ping(&self) -> Result<Duration> {
        self.check(&self.fail_reads)?;
        Ok(Duration::ZERO)
    }
}

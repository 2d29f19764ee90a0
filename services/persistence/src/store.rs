//! Durable store boundary
//!
//! The engine talks to durability through `DurableStore` only. A store must
//! be idempotent under retry for a given sequence number: replaying an
//! already-committed bundle acknowledges without double-applying.
//!
//! `MemoryStore` is the reference implementation used in tests and
//! simulations; `FailingStore` wraps any store with an externally
//! controllable failure switch for exercising the rollback path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::bundle::CommitBundle;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("commit rejected: {0}")]
    Rejected(String),
}

/// Atomic, sequence-idempotent durable storage.
pub trait DurableStore {
    /// Write one bundle atomically. Replaying a sequence number at or below
    /// the last committed one must acknowledge without re-applying.
    fn commit(&mut self, bundle: &CommitBundle) -> Result<(), StoreError>;

    /// Highest sequence number durably committed, if any.
    fn last_sequence(&self) -> Option<u64>;
}

/// In-memory reference store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    bundles: Vec<CommitBundle>,
    last_sequence: Option<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every bundle committed, in commit order.
    pub fn bundles(&self) -> &[CommitBundle] {
        &self.bundles
    }
}

impl DurableStore for MemoryStore {
    fn commit(&mut self, bundle: &CommitBundle) -> Result<(), StoreError> {
        if let Some(last) = self.last_sequence {
            if bundle.sequence <= last {
                // Retry of an already-committed bundle
                return Ok(());
            }
        }
        self.bundles.push(bundle.clone());
        self.last_sequence = Some(bundle.sequence);
        Ok(())
    }

    fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }
}

/// Wrapper that fails commits while its switch is on.
pub struct FailingStore<S> {
    inner: S,
    fail: Arc<AtomicBool>,
}

impl<S> FailingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for flipping the failure switch from outside the engine.
    pub fn switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: DurableStore> DurableStore for FailingStore<S> {
    fn commit(&mut self, bundle: &CommitBundle) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("injected write failure".into()));
        }
        self.inner.commit(bundle)
    }

    fn last_sequence(&self) -> Option<u64> {
        self.inner.last_sequence()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_commits_in_order() {
        let mut store = MemoryStore::new();
        store.commit(&CommitBundle::new(1, 10)).unwrap();
        store.commit(&CommitBundle::new(2, 20)).unwrap();

        assert_eq!(store.last_sequence(), Some(2));
        assert_eq!(store.bundles().len(), 2);
    }

    #[test]
    fn test_memory_store_replay_is_idempotent() {
        let mut store = MemoryStore::new();
        let bundle = CommitBundle::new(1, 10);
        store.commit(&bundle).unwrap();
        store.commit(&bundle).unwrap();

        assert_eq!(store.bundles().len(), 1);
        assert_eq!(store.last_sequence(), Some(1));
    }

    #[test]
    fn test_failing_store_switch() {
        let mut store = FailingStore::new(MemoryStore::new());
        let switch = store.switch();

        store.commit(&CommitBundle::new(1, 10)).unwrap();

        switch.store(true, Ordering::SeqCst);
        assert!(store.commit(&CommitBundle::new(2, 20)).is_err());
        assert_eq!(store.last_sequence(), Some(1));

        switch.store(false, Ordering::SeqCst);
        store.commit(&CommitBundle::new(3, 30)).unwrap();
        assert_eq!(store.last_sequence(), Some(3));
    }
}

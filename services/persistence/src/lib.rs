//! Sequencer & Persistence Coordinator backend
//!
//! Everything a committed unit of work needs to become durable: the
//! monotonic sequence counter, the commit bundle (wallet deltas + order-book
//! deltas + processed message + sequence number, written atomically), the
//! `DurableStore` boundary, the append-only checksummed journal store, and
//! recovery (rebuild engine state by replaying the journal).

pub mod bundle;
pub mod journal;
pub mod reader;
pub mod recovery;
pub mod sequence;
pub mod store;

pub use bundle::{BalanceEntry, CommitBundle, OrderBookDelta};
pub use journal::{FsyncPolicy, JournalConfig, JournalFrame, JournalStore};
pub use recovery::{recover, RecoveredState};
pub use sequence::SequenceCounter;
pub use store::{DurableStore, FailingStore, MemoryStore, StoreError};

//! Balance Ledger
//!
//! Owns the client → per-asset balance mapping. Balance deltas are applied in
//! two phases: `pre_process` computes the resulting balances without touching
//! the live registry, and `apply` publishes them only after the persistence
//! coordinator confirms a durable write. Externally-originated cash
//! operations are deduplicated by (client, business id).
//!
//! The ledger assumes no concurrent mutation; the dispatch loop is its single
//! writer.

pub mod dedup;
pub mod processor;
pub mod wallets;

pub use dedup::{CompletedOperation, DedupIndex};
pub use processor::{BalanceError, StagedBalances};
pub use wallets::WalletRegistry;

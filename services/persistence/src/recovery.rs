//! Recovery — rebuild engine state from the journal
//!
//! Replays every committed bundle in sequence order and folds it into the
//! final picture: last-write-wins balances, still-resting orders, the
//! processed-message set, and the last committed sequence number. Dispatch
//! resumes only after this completes.

use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::info;

use rust_decimal::Decimal;
use types::ids::{AssetId, ClientId, OrderId};
use types::instruction::ProcessedMessage;
use types::order::LimitOrder;

use crate::bundle::BalanceEntry;
use crate::reader::{JournalReader, ReaderError};

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("reader error: {0}")]
    Reader(#[from] ReaderError),
}

/// Everything the dispatcher needs to resume where the journal left off.
#[derive(Debug, Clone, Default)]
pub struct RecoveredState {
    /// Highest durably committed sequence number
    pub last_sequence: Option<u64>,
    /// Final balance per touched (client, asset) pair
    pub balances: Vec<BalanceEntry>,
    /// Orders still resting at the end of the journal
    pub orders: Vec<LimitOrder>,
    /// Every processed-message record, in commit order
    pub processed_messages: Vec<ProcessedMessage>,
    /// Bundles replayed
    pub replayed: u64,
}

/// Replay the journal in `dir` into a `RecoveredState`.
///
/// Tolerates a truncated tail: the valid prefix wins, matching what was
/// actually durable at the time of the crash.
pub fn recover(dir: &Path) -> Result<RecoveredState, RecoveryError> {
    let mut reader = JournalReader::open(dir)?;
    let bundles = reader.read_all_tolerant()?;

    let mut balances: BTreeMap<(ClientId, AssetId), Decimal> = BTreeMap::new();
    let mut orders: BTreeMap<OrderId, LimitOrder> = BTreeMap::new();
    let mut processed_messages = Vec::new();
    let mut last_sequence = None;
    let mut replayed = 0u64;

    for bundle in bundles {
        for entry in bundle.balances {
            balances.insert((entry.client_id, entry.asset_id), entry.balance);
        }
        for delta in bundle.order_deltas {
            for order in delta.orders_to_save {
                orders.insert(order.order_id, order);
            }
            for order_id in delta.orders_to_remove {
                orders.remove(&order_id);
            }
        }
        if let Some(message) = bundle.processed_message {
            processed_messages.push(message);
        }
        last_sequence = Some(bundle.sequence);
        replayed += 1;
    }

    let state = RecoveredState {
        last_sequence,
        balances: balances
            .into_iter()
            .map(|((client_id, asset_id), balance)| BalanceEntry {
                client_id,
                asset_id,
                balance,
            })
            .collect(),
        orders: orders.into_values().collect(),
        processed_messages,
        replayed,
    };

    info!(
        replayed = state.replayed,
        last_sequence = ?state.last_sequence,
        balances = state.balances.len(),
        orders = state.orders.len(),
        "journal recovery complete"
    );
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{CommitBundle, OrderBookDelta};
    use crate::journal::{JournalConfig, JournalStore};
    use crate::store::DurableStore;
    use rust_decimal_macros::dec;
    use types::ids::{InstrumentId, MessageId};
    use types::numeric::{Price, Volume};
    use types::order::Side;

    fn order(client: ClientId, price: u64) -> LimitOrder {
        LimitOrder::new(
            client,
            InstrumentId::new("BTC/USDT"),
            Side::Buy,
            Price::from_u64(price),
            Volume::from_str("1.0").unwrap(),
            1_708_123_456_789,
        )
    }

    #[test]
    fn test_recover_empty_journal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let state = recover(tmp.path()).unwrap();

        assert_eq!(state.last_sequence, None);
        assert_eq!(state.replayed, 0);
        assert!(state.balances.is_empty());
        assert!(state.orders.is_empty());
    }

    #[test]
    fn test_recover_balances_last_write_wins() {
        let tmp = tempfile::TempDir::new().unwrap();
        let client = ClientId::new();
        {
            let mut store = JournalStore::open(JournalConfig::new(tmp.path())).unwrap();
            store
                .commit(&CommitBundle::new(1, 10).with_balances(vec![BalanceEntry {
                    client_id: client,
                    asset_id: AssetId::new("USDT"),
                    balance: dec!(100),
                }]))
                .unwrap();
            store
                .commit(&CommitBundle::new(2, 20).with_balances(vec![BalanceEntry {
                    client_id: client,
                    asset_id: AssetId::new("USDT"),
                    balance: dec!(60),
                }]))
                .unwrap();
            store.sync().unwrap();
        }

        let state = recover(tmp.path()).unwrap();
        assert_eq!(state.last_sequence, Some(2));
        assert_eq!(state.replayed, 2);
        assert_eq!(state.balances.len(), 1);
        assert_eq!(state.balances[0].balance, dec!(60));
    }

    #[test]
    fn test_recover_orders_saved_then_removed() {
        let tmp = tempfile::TempDir::new().unwrap();
        let client = ClientId::new();
        let resting = order(client, 50_000);
        let cancelled = order(client, 51_000);
        let cancelled_id = cancelled.order_id;
        {
            let mut store = JournalStore::open(JournalConfig::new(tmp.path())).unwrap();
            store
                .commit(&CommitBundle::new(1, 10).with_order_delta(OrderBookDelta::save(
                    InstrumentId::new("BTC/USDT"),
                    vec![resting.clone(), cancelled],
                )))
                .unwrap();
            store
                .commit(&CommitBundle::new(2, 20).with_order_delta(OrderBookDelta::remove(
                    InstrumentId::new("BTC/USDT"),
                    vec![cancelled_id],
                )))
                .unwrap();
            store.sync().unwrap();
        }

        let state = recover(tmp.path()).unwrap();
        assert_eq!(state.orders.len(), 1);
        assert_eq!(state.orders[0].order_id, resting.order_id);
    }

    #[test]
    fn test_recover_processed_messages() {
        let tmp = tempfile::TempDir::new().unwrap();
        let client = ClientId::new();
        {
            let mut store = JournalStore::open(JournalConfig::new(tmp.path())).unwrap();
            store
                .commit(&CommitBundle::new(1, 10).with_processed_message(
                    ProcessedMessage::new(MessageId::new(), 10).with_dedup_key(
                        client, "biz-1", "rec-1",
                    ),
                ))
                .unwrap();
            store.sync().unwrap();
        }

        let state = recover(tmp.path()).unwrap();
        assert_eq!(state.processed_messages.len(), 1);
        assert_eq!(
            state.processed_messages[0].business_id.as_deref(),
            Some("biz-1")
        );
    }
}

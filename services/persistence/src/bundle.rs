//! Commit bundle — the atomic unit of durability
//!
//! Either every field of a bundle is durably written or none is; in-memory
//! state must not advance past a bundle that failed to persist.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::{AssetId, ClientId, InstrumentId, OrderId};
use types::instruction::ProcessedMessage;
use types::order::LimitOrder;

/// Resulting balance for one (client, asset) pair touched by the commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub client_id: ClientId,
    pub asset_id: AssetId,
    /// Pinned to string form so bincode frames need no type hint
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
}

/// Order-book changes for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookDelta {
    pub instrument_id: InstrumentId,
    /// Orders newly resting after this commit
    pub orders_to_save: Vec<LimitOrder>,
    /// Ids of orders no longer resting after this commit
    pub orders_to_remove: Vec<OrderId>,
}

impl OrderBookDelta {
    pub fn save(instrument_id: InstrumentId, orders: Vec<LimitOrder>) -> Self {
        Self {
            instrument_id,
            orders_to_save: orders,
            orders_to_remove: Vec::new(),
        }
    }

    pub fn remove(instrument_id: InstrumentId, order_ids: Vec<OrderId>) -> Self {
        Self {
            instrument_id,
            orders_to_save: Vec::new(),
            orders_to_remove: order_ids,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.orders_to_save.is_empty() && self.orders_to_remove.is_empty()
    }
}

/// One committed unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitBundle {
    pub sequence: u64,
    pub timestamp: i64,
    pub balances: Vec<BalanceEntry>,
    pub order_deltas: Vec<OrderBookDelta>,
    pub processed_message: Option<ProcessedMessage>,
}

impl CommitBundle {
    pub fn new(sequence: u64, timestamp: i64) -> Self {
        Self {
            sequence,
            timestamp,
            balances: Vec::new(),
            order_deltas: Vec::new(),
            processed_message: None,
        }
    }

    pub fn with_balances(mut self, balances: Vec<BalanceEntry>) -> Self {
        self.balances = balances;
        self
    }

    pub fn with_order_delta(mut self, delta: OrderBookDelta) -> Self {
        self.order_deltas.push(delta);
        self
    }

    pub fn with_processed_message(mut self, message: ProcessedMessage) -> Self {
        self.processed_message = Some(message);
        self
    }

    /// A bundle carrying neither balances, nor order deltas, nor a processed
    /// message carries nothing worth writing.
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
            && self.order_deltas.iter().all(|delta| delta.is_empty())
            && self.processed_message.is_none()
    }

    /// Compact single-line summary for commit logging.
    pub fn details(&self) -> String {
        let saves: usize = self
            .order_deltas
            .iter()
            .map(|delta| delta.orders_to_save.len())
            .sum();
        let removes: usize = self
            .order_deltas
            .iter()
            .map(|delta| delta.orders_to_remove.len())
            .sum();
        format!(
            "sn: {}, b: {}, os: {}, or: {}, m: {}",
            self.sequence,
            self.balances.len(),
            saves,
            removes,
            self.processed_message
                .as_ref()
                .map(|message| message.message_id.to_string())
                .unwrap_or_else(|| "-".to_string()),
        )
    }
}

//! Limit order lifecycle types

use crate::ids::{ClientId, InstrumentId, OrderId};
use crate::numeric::{Price, Volume};
use serde::{Deserialize, Serialize};

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order (bid)
    Buy,
    /// Sell order (ask)
    Sell,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Order status
///
/// Identity fields are immutable once created; only `remaining_volume` and
/// `status` change over an order's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Resting in the book
    Active,
    /// Removed by a cancel instruction (terminal)
    Cancelled,
    /// Fully executed (terminal)
    Filled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Filled)
    }
}

/// A resting limit order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrder {
    pub order_id: OrderId,
    pub client_id: ClientId,
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub price: Price,
    pub volume: Volume,
    pub remaining_volume: Volume,
    pub status: OrderStatus,
    pub created_at: i64,
}

impl LimitOrder {
    /// Create a new active order with full remaining volume.
    pub fn new(
        client_id: ClientId,
        instrument_id: InstrumentId,
        side: Side,
        price: Price,
        volume: Volume,
        timestamp: i64,
    ) -> Self {
        Self {
            order_id: OrderId::new(),
            client_id,
            instrument_id,
            side,
            price,
            volume,
            remaining_volume: volume,
            status: OrderStatus::Active,
            created_at: timestamp,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, OrderStatus::Active)
    }

    /// Mark the order cancelled. Identity and volumes are left untouched so
    /// the removed order can be reported to the originator.
    pub fn cancel(&mut self) {
        self.status = OrderStatus::Cancelled;
    }
}

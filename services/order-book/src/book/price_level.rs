//! Price level with FIFO queue
//!
//! A price level holds all resting orders at one price point, in strict
//! arrival order to enforce time priority within the level.

use std::collections::VecDeque;
use types::ids::OrderId;
use types::numeric::Volume;
use types::order::LimitOrder;

/// All orders resting at a single price, oldest first.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    orders: VecDeque<LimitOrder>,
    /// Sum of remaining volume across the level
    total_volume: Volume,
}

impl PriceLevel {
    pub fn new() -> Self {
        Self {
            orders: VecDeque::new(),
            total_volume: Volume::zero(),
        }
    }

    /// Append an order at the back of the queue (time priority).
    pub fn insert(&mut self, order: LimitOrder) {
        self.total_volume = self.total_volume + order.remaining_volume;
        self.orders.push_back(order);
    }

    /// Remove an order by id, returning it if present.
    pub fn remove(&mut self, order_id: &OrderId) -> Option<LimitOrder> {
        let position = self
            .orders
            .iter()
            .position(|order| &order.order_id == order_id)?;
        let order = self.orders.remove(position)?;
        self.total_volume = self.total_volume.saturating_sub(order.remaining_volume);
        Some(order)
    }

    /// Iterate orders oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &LimitOrder> {
        self.orders.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn total_volume(&self) -> Volume {
        self.total_volume
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}

impl Default for PriceLevel {
    fn default() -> Self {
        Self::new()
    }
}

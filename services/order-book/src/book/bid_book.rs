//! Bid (buy-side) order book
//!
//! Maintains buy orders sorted by price descending (best bid first).
//! Uses BTreeMap for deterministic iteration order; FIFO within a level.

use std::collections::BTreeMap;
use types::ids::{ClientId, OrderId};
use types::numeric::{Price, Volume};
use types::order::LimitOrder;

use super::price_level::PriceLevel;

/// Buy side of a book. Highest price wins; equal prices tie-break on
/// insertion order.
#[derive(Debug, Clone, Default)]
pub struct BidBook {
    levels: BTreeMap<Price, PriceLevel>,
}

impl BidBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, order: LimitOrder) {
        let level = self.levels.entry(order.price).or_default();
        level.insert(order);
    }

    /// Remove an order at a known price. Empty levels are dropped.
    pub fn remove(&mut self, order_id: &OrderId, price: Price) -> Option<LimitOrder> {
        let level = self.levels.get_mut(&price)?;
        let removed = level.remove(order_id)?;
        if level.is_empty() {
            self.levels.remove(&price);
        }
        Some(removed)
    }

    /// Best (highest) bid price.
    pub fn best_price(&self) -> Option<Price> {
        // BTreeMap iterates ascending, so the best bid is last
        self.levels.keys().next_back().copied()
    }

    /// Iterate all orders, best price first, FIFO within a price.
    pub fn iter(&self) -> impl Iterator<Item = &LimitOrder> {
        self.levels.values().rev().flat_map(|level| level.iter())
    }

    /// (order id, price) of every resting order owned by `client_id`.
    pub fn client_orders(&self, client_id: &ClientId) -> Vec<(OrderId, Price)> {
        self.iter()
            .filter(|order| &order.client_id == client_id)
            .map(|order| (order.order_id, order.price))
            .collect()
    }

    /// Top `depth` levels as (price, total volume), best first.
    pub fn depth(&self, depth: usize) -> Vec<(Price, Volume)> {
        self.levels
            .iter()
            .rev()
            .take(depth)
            .map(|(price, level)| (*price, level.total_volume()))
            .collect()
    }

    pub fn order_count(&self) -> usize {
        self.levels.values().map(|level| level.order_count()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}

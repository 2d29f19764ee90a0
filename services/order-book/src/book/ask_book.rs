//! Ask (sell-side) order book
//!
//! Maintains sell orders sorted by price ascending (best ask first).

use std::collections::BTreeMap;
use types::ids::{ClientId, OrderId};
use types::numeric::{Price, Volume};
use types::order::LimitOrder;

use super::price_level::PriceLevel;

/// Sell side of a book. Lowest price wins; equal prices tie-break on
/// insertion order.
#[derive(Debug, Clone, Default)]
pub struct AskBook {
    levels: BTreeMap<Price, PriceLevel>,
}

impl AskBook {
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

    /// Best (lowest) ask price.
    pub fn best_price(&self) -> Option<Price> {
        self.levels.keys().next().copied()
    }

    /// Iterate all orders, best price first, FIFO within a price.
    pub fn iter(&self) -> impl Iterator<Item = &LimitOrder> {
        self.levels.values().flat_map(|level| level.iter())
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

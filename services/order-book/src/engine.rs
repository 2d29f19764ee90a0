//! Order book engine
//!
//! Per-instrument books plus a global order locator index for O(1) cancel
//! by id. Sides are held behind `Arc` handles: `snapshot` clones the
//! handles, and mutation goes through `Arc::make_mut`, which copies a side
//! only while a snapshot still references it. A snapshot therefore never
//! observes later mutation, and taking one costs two reference-count bumps.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use types::ids::{ClientId, InstrumentId, OrderId};
use types::numeric::Price;
use types::order::{LimitOrder, Side};

use crate::book::{AskBook, BidBook};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BookError {
    #[error("duplicate order id: {0}")]
    DuplicateOrder(OrderId),
}

/// Where a resting order lives, for cancel-by-id.
#[derive(Debug, Clone, PartialEq)]
struct OrderLocator {
    instrument_id: InstrumentId,
    side: Side,
    price: Price,
}

/// Both sides of one instrument's book.
#[derive(Debug, Clone, Default)]
struct InstrumentBook {
    bids: Arc<BidBook>,
    asks: Arc<AskBook>,
}

/// Immutable view of one instrument's book at a point in time.
///
/// Shares storage with the live book until the live book is next mutated;
/// the contents observed through a snapshot never change.
#[derive(Debug, Clone)]
pub struct BookSnapshot {
    pub instrument_id: InstrumentId,
    bids: Arc<BidBook>,
    asks: Arc<AskBook>,
}

impl BookSnapshot {
    /// Bids, best price first, FIFO within a price.
    pub fn bids(&self) -> impl Iterator<Item = &LimitOrder> {
        self.bids.iter()
    }

    /// Asks, best price first, FIFO within a price.
    pub fn asks(&self) -> impl Iterator<Item = &LimitOrder> {
        self.asks.iter()
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.best_price()
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.best_price()
    }

    /// Midpoint of best bid and best ask, when both sides are populated.
    pub fn mid_price(&self) -> Option<Decimal> {
        let bid = self.best_bid()?.as_decimal();
        let ask = self.best_ask()?.as_decimal();
        Some((bid + ask) / Decimal::from(2))
    }

    pub fn order_count(&self) -> usize {
        self.bids.order_count() + self.asks.order_count()
    }
}

/// Pre-mutation side handles, captured so a failed durable write can put an
/// instrument's book back exactly as it was.
#[derive(Debug, Clone)]
pub struct BookCheckpoint {
    instrument_id: InstrumentId,
    bids: Arc<BidBook>,
    asks: Arc<AskBook>,
}

/// All books, plus the order locator index.
#[derive(Debug, Clone, Default)]
pub struct OrderBookEngine {
    books: HashMap<InstrumentId, InstrumentBook>,
    locators: HashMap<OrderId, OrderLocator>,
}

impl OrderBookEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a resting order, maintaining price-time priority.
    pub fn insert(&mut self, order: LimitOrder) -> Result<(), BookError> {
        if self.locators.contains_key(&order.order_id) {
            return Err(BookError::DuplicateOrder(order.order_id));
        }

        let book = self.books.entry(order.instrument_id.clone()).or_default();
        self.locators.insert(
            order.order_id,
            OrderLocator {
                instrument_id: order.instrument_id.clone(),
                side: order.side,
                price: order.price,
            },
        );

        match order.side {
            Side::Buy => Arc::make_mut(&mut book.bids).insert(order),
            Side::Sell => Arc::make_mut(&mut book.asks).insert(order),
        }
        Ok(())
    }

    /// Cancel one order by id.
    ///
    /// Idempotent: an id that is not resting (never existed, already
    /// cancelled, or filled) returns `None` rather than failing. The removed
    /// order is returned with its status set to cancelled.
    pub fn cancel(&mut self, order_id: &OrderId) -> Option<LimitOrder> {
        let locator = self.locators.remove(order_id)?;
        let book = self.books.get_mut(&locator.instrument_id)?;

        let removed = match locator.side {
            Side::Buy => Arc::make_mut(&mut book.bids).remove(order_id, locator.price),
            Side::Sell => Arc::make_mut(&mut book.asks).remove(order_id, locator.price),
        };

        removed.map(|mut order| {
            order.cancel();
            order
        })
    }

    /// Cancel every resting order owned by `client_id` on one side of one
    /// instrument.
    ///
    /// All removals complete before this returns, so a snapshot taken
    /// afterwards reflects the fully cancelled book; no intermediate state is
    /// ever observable.
    pub fn cancel_all(
        &mut self,
        client_id: &ClientId,
        instrument_id: &InstrumentId,
        side: Side,
    ) -> Vec<LimitOrder> {
        let Some(book) = self.books.get_mut(instrument_id) else {
            return Vec::new();
        };

        let targets: Vec<(OrderId, Price)> = match side {
            Side::Buy => book.bids.client_orders(client_id),
            Side::Sell => book.asks.client_orders(client_id),
        };

        let mut removed = Vec::with_capacity(targets.len());
        for (order_id, price) in targets {
            let order = match side {
                Side::Buy => Arc::make_mut(&mut book.bids).remove(&order_id, price),
                Side::Sell => Arc::make_mut(&mut book.asks).remove(&order_id, price),
            };
            if let Some(mut order) = order {
                self.locators.remove(&order_id);
                order.cancel();
                removed.push(order);
            }
        }
        removed
    }

    /// Immutable snapshot of one instrument's book. O(1): clones the two
    /// side handles.
    pub fn snapshot(&self, instrument_id: &InstrumentId) -> Option<BookSnapshot> {
        self.books.get(instrument_id).map(|book| BookSnapshot {
            instrument_id: instrument_id.clone(),
            bids: Arc::clone(&book.bids),
            asks: Arc::clone(&book.asks),
        })
    }

    /// Capture the current side handles of an instrument, creating an empty
    /// book for a first-touch instrument.
    pub fn checkpoint(&mut self, instrument_id: &InstrumentId) -> BookCheckpoint {
        let book = self.books.entry(instrument_id.clone()).or_default();
        BookCheckpoint {
            instrument_id: instrument_id.clone(),
            bids: Arc::clone(&book.bids),
            asks: Arc::clone(&book.asks),
        }
    }

    /// Restore an instrument's book from a checkpoint after a failed durable
    /// write.
    ///
    /// `inserted` and `removed` are the orders this (now abandoned) mutation
    /// added and took out; their locator entries are reverted alongside the
    /// side handles.
    pub fn rollback(
        &mut self,
        checkpoint: BookCheckpoint,
        inserted: &[OrderId],
        removed: &[LimitOrder],
    ) {
        for order_id in inserted {
            self.locators.remove(order_id);
        }
        for order in removed {
            self.locators.insert(
                order.order_id,
                OrderLocator {
                    instrument_id: order.instrument_id.clone(),
                    side: order.side,
                    price: order.price,
                },
            );
        }
        self.books.insert(
            checkpoint.instrument_id,
            InstrumentBook {
                bids: checkpoint.bids,
                asks: checkpoint.asks,
            },
        );
    }

    /// Instrument a resting order belongs to, when the id is resting.
    pub fn instrument_of(&self, order_id: &OrderId) -> Option<&InstrumentId> {
        self.locators
            .get(order_id)
            .map(|locator| &locator.instrument_id)
    }

    pub fn best_bid(&self, instrument_id: &InstrumentId) -> Option<Price> {
        self.books.get(instrument_id)?.bids.best_price()
    }

    pub fn best_ask(&self, instrument_id: &InstrumentId) -> Option<Price> {
        self.books.get(instrument_id)?.asks.best_price()
    }

    /// Midpoint of best bid and best ask, when both sides are populated.
    pub fn mid_price(&self, instrument_id: &InstrumentId) -> Option<Decimal> {
        let book = self.books.get(instrument_id)?;
        let bid = book.bids.best_price()?.as_decimal();
        let ask = book.asks.best_price()?.as_decimal();
        Some((bid + ask) / Decimal::from(2))
    }

    /// Total resting orders across all instruments.
    pub fn order_count(&self) -> usize {
        self.locators.len()
    }

    pub fn instrument_ids(&self) -> impl Iterator<Item = &InstrumentId> {
        self.books.keys()
    }
}

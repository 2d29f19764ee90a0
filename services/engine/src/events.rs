//! Outgoing events
//!
//! After an instruction reaches the applied state the dispatcher submits one
//! event describing the committed effect. Submission is fire-and-forget:
//! delivery guarantees past the queue are the publisher's concern, never the
//! dispatch loop's.

use crossbeam_channel::Sender;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;
use types::ids::{AssetId, ClientId, InstrumentId, MessageId, OperationId};
use types::order::LimitOrder;

use order_book::BookSnapshot;

/// Flattened book snapshot suitable for serialization and fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedBook {
    pub instrument_id: InstrumentId,
    /// Best price first, FIFO within a price
    pub bids: Vec<LimitOrder>,
    pub asks: Vec<LimitOrder>,
    pub timestamp: i64,
}

impl PublishedBook {
    pub fn from_snapshot(snapshot: &BookSnapshot, timestamp: i64) -> Self {
        Self {
            instrument_id: snapshot.instrument_id.clone(),
            bids: snapshot.bids().cloned().collect(),
            asks: snapshot.asks().cloned().collect(),
            timestamp,
        }
    }

    pub fn order_count(&self) -> usize {
        self.bids.len() + self.asks.len()
    }
}

/// One event per committed instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum OutgoingEvent {
    CashOperation {
        sequence: u64,
        message_id: MessageId,
        operation_id: OperationId,
        client_id: ClientId,
        asset_id: AssetId,
        amount: Decimal,
        old_balance: Decimal,
        new_balance: Decimal,
        timestamp: i64,
    },
    BalanceUpdated {
        sequence: u64,
        message_id: MessageId,
        client_id: ClientId,
        asset_id: AssetId,
        old_balance: Decimal,
        new_balance: Decimal,
        timestamp: i64,
    },
    OrderPlaced {
        sequence: u64,
        message_id: MessageId,
        order: LimitOrder,
        book: PublishedBook,
        timestamp: i64,
    },
    OrdersCancelled {
        sequence: u64,
        message_id: MessageId,
        orders: Vec<LimitOrder>,
        book: PublishedBook,
        timestamp: i64,
    },
}

impl OutgoingEvent {
    /// Sequence number of the commit this event describes.
    pub fn sequence(&self) -> u64 {
        match self {
            OutgoingEvent::CashOperation { sequence, .. } => *sequence,
            OutgoingEvent::BalanceUpdated { sequence, .. } => *sequence,
            OutgoingEvent::OrderPlaced { sequence, .. } => *sequence,
            OutgoingEvent::OrdersCancelled { sequence, .. } => *sequence,
        }
    }
}

/// Boundary to the external fan-out pipeline.
pub trait EventPublisher {
    /// Submit one committed event. Must not block the dispatch loop.
    fn submit(&self, event: OutgoingEvent);
}

/// Publisher backed by an unbounded FIFO channel; the consumer side is the
/// external transport's concern.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    sender: Sender<OutgoingEvent>,
}

impl ChannelPublisher {
    pub fn new(sender: Sender<OutgoingEvent>) -> Self {
        Self { sender }
    }
}

impl EventPublisher for ChannelPublisher {
    fn submit(&self, event: OutgoingEvent) {
        if self.sender.send(event).is_err() {
            // Fire-and-forget: a vanished consumer must not stall dispatch
            warn!("outgoing event receiver dropped; event discarded");
        }
    }
}

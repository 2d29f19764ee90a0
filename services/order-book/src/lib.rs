//! Order Book Engine
//!
//! Owns, per instrument, the buy and sell order collections. Supports
//! insertion with price-time priority, idempotent cancellation by id,
//! atomic multi-cancel, and cheap immutable snapshots for external
//! publication: book sides live behind `Arc` handles, so a snapshot is two
//! reference-count bumps and mutation after a snapshot copies the side
//! exactly once (`Arc::make_mut`).
//!
//! The dispatch loop is the single writer; the engine itself takes no locks.

pub mod book;
pub mod engine;

pub use book::{AskBook, BidBook, PriceLevel};
pub use engine::{BookCheckpoint, BookError, BookSnapshot, OrderBookEngine};

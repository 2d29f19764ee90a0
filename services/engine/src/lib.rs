//! Transactional engine core
//!
//! Wires the ledger, order books, reference-price estimator, and persistence
//! coordinator behind a single-threaded dispatch loop. One instruction is
//! processed at a time: validate, pre-apply in memory, assign a sequence
//! number, write one atomic commit bundle, and only then make the effects
//! visible, publish the outgoing event, and answer the originator. A failed
//! durable write rolls the pre-applied state back and reports a persistence
//! failure; nothing escapes the process uncommitted.
//!
//! # Architecture
//!
//! ```text
//!  inbound queue ──▶ Dispatcher (single writer)
//!                      │  validate / dedup-check
//!                      │  pre-apply (ledger staging, book mutation)
//!                      │  sequence ──▶ DurableStore.commit(bundle)
//!                      │                  │ success        │ failure
//!                      ▼                  ▼                ▼
//!                   response        apply + publish     rollback
//! ```

pub mod config;
pub mod dispatcher;
pub mod events;
pub mod validator;

pub use config::Settings;
pub use dispatcher::{Dispatcher, DispatcherConfig, InstructionEnvelope};
pub use events::{ChannelPublisher, EventPublisher, OutgoingEvent, PublishedBook};

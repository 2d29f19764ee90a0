//! Reference Price Estimator
//!
//! Maintains, per instrument, a sliding time-window of mid-price samples and
//! an incrementally updated weighted average. Incremental updates accumulate
//! decimal rounding error, so the estimator counts them and replaces the
//! running estimate with a full arithmetic mean once a configured maximum is
//! reached (or whenever the estimate degenerates to zero while samples
//! remain). Independent of the ledger; fed by the dispatch loop after
//! committed book mutations.

pub mod estimator;

pub use estimator::{MidPriceSample, ReferencePriceConfig, ReferencePriceTracker};

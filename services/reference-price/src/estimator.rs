//! Incremental reference mid-price tracking
//!
//! The running estimate is a streaming mean:
//! - add with `n` retained samples: `ref' = (ref * n + mid) / (n + 1)`
//! - expiry of `k` samples summing to `S` from initial count `n0`:
//!   `ref' = (ref * n0 - S) / (n0 - k)`
//!
//! The full recompute (plain mean over retained samples) is the source of
//! truth; the incremental paths are a bounded-error optimization and every
//! incremental step counts toward the recompute trigger.

use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::{HashMap, VecDeque};
use tracing::debug;
use types::asset::Instrument;
use types::ids::InstrumentId;

/// One observed mid price.
#[derive(Debug, Clone, PartialEq)]
pub struct MidPriceSample {
    pub price: Decimal,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferencePriceConfig {
    /// How long a sample stays in the window, in milliseconds
    pub retention_period_ms: i64,
    /// Incremental updates allowed before a forced full recompute
    pub max_incremental_recalculations: u32,
}

impl Default for ReferencePriceConfig {
    fn default() -> Self {
        Self {
            retention_period_ms: 60_000,
            max_incremental_recalculations: 1_000,
        }
    }
}

/// Per-instrument sample windows and reference estimates.
#[derive(Debug, Clone, Default)]
pub struct ReferencePriceTracker {
    config: ReferencePriceConfig,
    samples: HashMap<InstrumentId, VecDeque<MidPriceSample>>,
    reference: HashMap<InstrumentId, Decimal>,
    /// Incremental steps since the last full recompute
    recalculations: u32,
}

impl ReferencePriceTracker {
    pub fn new(config: ReferencePriceConfig) -> Self {
        Self {
            config,
            samples: HashMap::new(),
            reference: HashMap::new(),
            recalculations: 0,
        }
    }

    /// Record a new mid-price observation.
    ///
    /// Expired samples are purged first, so the incremental blend weights
    /// reflect the retained count only.
    pub fn add(&mut self, instrument_id: &InstrumentId, mid_price: Decimal, now_ms: i64) {
        self.purge_expired(instrument_id, self.lower_bound(now_ms));

        let count = self
            .samples
            .get(instrument_id)
            .map(|window| window.len())
            .unwrap_or(0);
        let previous = self
            .reference
            .get(instrument_id)
            .copied()
            .unwrap_or(Decimal::ZERO);

        let mut incremental = false;
        let next = if previous.is_zero() || count == 0 {
            mid_price
        } else {
            incremental = true;
            let n = Decimal::from(count);
            (previous * n + mid_price) / (n + Decimal::ONE)
        };
        self.reference.insert(instrument_id.clone(), next);

        self.samples
            .entry(instrument_id.clone())
            .or_default()
            .push_back(MidPriceSample {
                price: mid_price,
                timestamp: now_ms,
            });

        if incremental {
            self.recalculations += 1;
            if self.recalculations >= self.config.max_incremental_recalculations {
                self.full_recompute(instrument_id);
            }
        }
    }

    /// Current estimate for an instrument, scaled to its display accuracy.
    ///
    /// Purges samples outside the window relative to `as_of_ms` first;
    /// returns `None` once no samples remain.
    pub fn reference_price(&mut self, instrument: &Instrument, as_of_ms: i64) -> Option<Decimal> {
        self.purge_expired(&instrument.instrument_id, self.lower_bound(as_of_ms));

        self.reference
            .get(&instrument.instrument_id)
            .map(|estimate| {
                estimate.round_dp_with_strategy(
                    instrument.price_accuracy,
                    RoundingStrategy::AwayFromZero,
                )
            })
    }

    /// Retained sample count for an instrument.
    pub fn sample_count(&self, instrument_id: &InstrumentId) -> usize {
        self.samples
            .get(instrument_id)
            .map(|window| window.len())
            .unwrap_or(0)
    }

    /// Incremental steps since the last full recompute.
    pub fn recalculation_count(&self) -> u32 {
        self.recalculations
    }

    /// Drop all windows and estimates.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.reference.clear();
        self.recalculations = 0;
    }

    fn lower_bound(&self, now_ms: i64) -> i64 {
        now_ms - self.config.retention_period_ms
    }

    /// Remove samples older than `cutoff` and compensate the estimate for
    /// their lost contribution.
    fn purge_expired(&mut self, instrument_id: &InstrumentId, cutoff: i64) {
        let Some(window) = self.samples.get_mut(instrument_id) else {
            return;
        };

        let initial = window.len();
        let mut removed_sum = Decimal::ZERO;
        while window
            .front()
            .map(|sample| sample.timestamp < cutoff)
            .unwrap_or(false)
        {
            if let Some(sample) = window.pop_front() {
                removed_sum += sample.price;
            }
        }

        let current = window.len();
        let removed = initial - current;
        if initial == 0 || removed == 0 {
            return;
        }
        if current == 0 {
            // Window drained: no estimate until a fresh sample arrives
            self.reference.remove(instrument_id);
            return;
        }

        let previous = self
            .reference
            .get(instrument_id)
            .copied()
            .unwrap_or(Decimal::ZERO);
        if previous.is_zero()
            || self.recalculations >= self.config.max_incremental_recalculations
        {
            // Degenerate or drifted estimate; rebuild from the window
            self.full_recompute(instrument_id);
            return;
        }

        let next =
            (previous * Decimal::from(initial) - removed_sum) / Decimal::from(current);
        self.reference.insert(instrument_id.clone(), next);
        self.recalculations += 1;
        if self.recalculations >= self.config.max_incremental_recalculations {
            self.full_recompute(instrument_id);
        }
    }

    /// Replace the running estimate with the plain mean over retained
    /// samples, resetting the drift counter.
    fn full_recompute(&mut self, instrument_id: &InstrumentId) {
        self.recalculations = 0;

        let Some(window) = self.samples.get(instrument_id) else {
            self.reference.remove(instrument_id);
            return;
        };
        if window.is_empty() {
            self.reference.remove(instrument_id);
            return;
        }

        let sum: Decimal = window.iter().map(|sample| sample.price).sum();
        let mean = sum / Decimal::from(window.len());
        debug!(
            instrument = %instrument_id,
            samples = window.len(),
            reference = %mean,
            "full reference price recomputation"
        );
        self.reference.insert(instrument_id.clone(), mean);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn btc_usdt() -> InstrumentId {
        InstrumentId::new("BTC/USDT")
    }

    fn instrument(accuracy: u32) -> Instrument {
        Instrument::new(btc_usdt(), accuracy)
    }

    fn tracker(retention_ms: i64, max_recalcs: u32) -> ReferencePriceTracker {
        ReferencePriceTracker::new(ReferencePriceConfig {
            retention_period_ms: retention_ms,
            max_incremental_recalculations: max_recalcs,
        })
    }

    #[test]
    fn test_first_sample_becomes_estimate() {
        let mut tracker = tracker(60_000, 1_000);
        tracker.add(&btc_usdt(), dec!(50000), 0);

        let price = tracker.reference_price(&instrument(2), 0).unwrap();
        assert_eq!(price, dec!(50000));
        assert_eq!(tracker.recalculation_count(), 0);
    }

    #[test]
    fn test_no_samples_no_value() {
        let mut tracker = tracker(60_000, 1_000);
        assert!(tracker.reference_price(&instrument(2), 0).is_none());
    }

    #[test]
    fn test_incremental_mean_matches_running_mean() {
        let mut tracker = tracker(60_000, 1_000);
        tracker.add(&btc_usdt(), dec!(100), 0);
        tracker.add(&btc_usdt(), dec!(200), 1);
        tracker.add(&btc_usdt(), dec!(300), 2);

        // (100 + 200 + 300) / 3
        let price = tracker.reference_price(&instrument(8), 3).unwrap();
        assert_eq!(price, dec!(200));
        assert_eq!(tracker.sample_count(&btc_usdt()), 3);
    }

    #[test]
    fn test_window_purge_excludes_old_samples() {
        let retention = 1_000;
        let mut tracker = tracker(retention, 1_000);

        tracker.add(&btc_usdt(), dec!(100), 0);
        tracker.add(&btc_usdt(), dec!(300), retention + 1);

        // Evaluated at retention+1, the t=0 sample is outside the window
        let price = tracker
            .reference_price(&instrument(8), retention + 1)
            .unwrap();
        assert_eq!(price, dec!(300));
        assert_eq!(tracker.sample_count(&btc_usdt()), 1);
    }

    #[test]
    fn test_query_after_window_drains_returns_none() {
        let retention = 1_000;
        let mut tracker = tracker(retention, 1_000);
        tracker.add(&btc_usdt(), dec!(100), 0);

        assert!(tracker
            .reference_price(&instrument(8), retention + 1)
            .is_none());
        assert_eq!(tracker.sample_count(&btc_usdt()), 0);
    }

    #[test]
    fn test_expiry_compensation_keeps_mean_of_survivors() {
        let retention = 1_000;
        let mut tracker = tracker(retention, 1_000);

        tracker.add(&btc_usdt(), dec!(100), 0);
        tracker.add(&btc_usdt(), dec!(200), 600);
        tracker.add(&btc_usdt(), dec!(400), 900);

        // At t=1200 the t=0 sample expires; survivors are 200 and 400
        let price = tracker.reference_price(&instrument(8), 1_200).unwrap();
        assert_eq!(price, dec!(300));
    }

    #[test]
    fn test_forced_full_recompute_after_max_incremental_steps() {
        let mut tracker = tracker(i64::MAX / 2, 1_000);

        // First add is a direct set; the next 1000 are incremental and the
        // 1000th triggers the full recompute
        for i in 0..1_001u32 {
            tracker.add(&btc_usdt(), Decimal::from(i + 1), i as i64);
        }
        assert_eq!(tracker.recalculation_count(), 0, "counter reset by recompute");

        // Exact arithmetic mean of 1..=1001
        let price = tracker.reference_price(&instrument(2), 1_001).unwrap();
        assert_eq!(price, dec!(501));
    }

    #[test]
    fn test_rounding_uses_display_accuracy() {
        let mut tracker = tracker(60_000, 1_000);
        tracker.add(&btc_usdt(), dec!(100), 0);
        tracker.add(&btc_usdt(), dec!(101), 1);

        // Mean is 100.5; accuracy 0 rounds away from zero
        let price = tracker.reference_price(&instrument(0), 2).unwrap();
        assert_eq!(price, dec!(101));

        let price = tracker.reference_price(&instrument(1), 2).unwrap();
        assert_eq!(price, dec!(100.5));
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut tracker = tracker(60_000, 1_000);
        tracker.add(&btc_usdt(), dec!(100), 0);
        tracker.add(&btc_usdt(), dec!(200), 1);
        tracker.clear();

        assert_eq!(tracker.sample_count(&btc_usdt()), 0);
        assert_eq!(tracker.recalculation_count(), 0);
        assert!(tracker.reference_price(&instrument(2), 2).is_none());
    }
}

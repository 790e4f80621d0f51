//! Propagation path aggregation.
//!
//! The channel server returns a list of paths, each a complex gain and a
//! delay. Under the narrowband assumption the received amplitude is the
//! coherent sum of the gains; propagation delay is the earliest path and
//! jitter is the delay spread.

use num_complex::Complex64;

/// One propagation path between a transmitter and a receiver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropagationPath {
    pub gain: Complex64,
    pub delay_s: f64,
}

/// Coherent aggregate of all paths of a directed pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathAggregate {
    /// `|Σ a_i|²` — linear power gain of the channel.
    pub power_gain: f64,
    /// Earliest path delay in seconds.
    pub min_delay_s: f64,
    /// Span `max τ_i − min τ_i` in seconds.
    pub delay_span_s: f64,
}

impl PathAggregate {
    /// Coherent sum over `paths`. Returns `None` for an empty list or a
    /// fully destructive sum (`|Σ a_i|² = 0`), both of which mean "no
    /// propagation".
    pub fn coherent(paths: &[PropagationPath]) -> Option<Self> {
        if paths.is_empty() {
            return None;
        }
        let sum: Complex64 = paths.iter().map(|p| p.gain).sum();
        let power_gain = sum.norm_sqr();
        if power_gain <= 0.0 || !power_gain.is_finite() {
            return None;
        }
        let mut min_delay = f64::INFINITY;
        let mut max_delay = f64::NEG_INFINITY;
        for p in paths {
            min_delay = min_delay.min(p.delay_s);
            max_delay = max_delay.max(p.delay_s);
        }
        Some(Self {
            power_gain,
            min_delay_s: min_delay,
            delay_span_s: max_delay - min_delay,
        })
    }

    /// Received power in dBm given the transmit power and any gain added at
    /// the budget level (zero in path-embedded antenna mode).
    pub fn received_dbm(&self, tx_power_dbm: f64, budget_gain_db: f64) -> f64 {
        tx_power_dbm + 10.0 * self.power_gain.log10() + budget_gain_db
    }
}

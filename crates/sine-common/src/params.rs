//! Per-link emulation parameters — the output of the PHY pipeline and the
//! input to the tc synthesizer.

use serde::{Deserialize, Serialize};

/// Derived state of a directed link. Recomputed whenever any endpoint or
/// interferer position changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkParams {
    /// Received power at rx from tx over all paths, dBm. `-inf` when no
    /// propagation paths exist.
    pub signal_dbm: f64,
    /// Expected co-channel interference power at rx, dBm.
    pub interference_dbm: f64,
    pub snr_db: f64,
    pub sinr_db: f64,
    /// Selected MCS table position; `-1` means the link is down.
    pub mcs_index: i32,
    /// Packet-error rate for the configured packet size, 0..=1.
    pub per: f64,
    pub delay_ms: f64,
    pub jitter_ms: f64,
    pub loss_pct: f64,
    pub rate_mbps: f64,
}

impl LinkParams {
    /// Parameters of a link with no usable channel.
    pub fn down(fallback_rate_mbps: f64) -> Self {
        Self {
            signal_dbm: f64::NEG_INFINITY,
            interference_dbm: f64::NEG_INFINITY,
            snr_db: f64::NEG_INFINITY,
            sinr_db: f64::NEG_INFINITY,
            mcs_index: -1,
            per: 1.0,
            delay_ms: 0.0,
            jitter_ms: 0.0,
            loss_pct: 100.0,
            rate_mbps: fallback_rate_mbps,
        }
    }

    pub fn is_down(&self) -> bool {
        self.mcs_index < 0
    }

    /// True when the netem-visible fields moved by more than the configured
    /// epsilons (an MCS transition always counts).
    pub fn differs_from(&self, applied: &LinkParams, eps: &ParamEpsilon) -> bool {
        if self.mcs_index != applied.mcs_index {
            return true;
        }
        exceeds(self.delay_ms, applied.delay_ms, eps.delay_ms)
            || exceeds(self.jitter_ms, applied.jitter_ms, eps.jitter_ms)
            || exceeds(self.loss_pct, applied.loss_pct, eps.loss_pct)
            || exceeds(self.rate_mbps, applied.rate_mbps, eps.rate_mbps)
    }
}

fn exceeds(a: f64, b: f64, eps: f64) -> bool {
    if a.is_infinite() && b.is_infinite() && a == b {
        return false;
    }
    (a - b).abs() > eps
}

/// Per-field change thresholds below which a tc update is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamEpsilon {
    pub delay_ms: f64,
    pub jitter_ms: f64,
    pub loss_pct: f64,
    pub rate_mbps: f64,
}

impl Default for ParamEpsilon {
    fn default() -> Self {
        Self {
            delay_ms: 0.01,
            jitter_ms: 0.01,
            loss_pct: 0.01,
            rate_mbps: 0.01,
        }
    }
}

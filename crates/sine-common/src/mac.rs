//! Channel-access (MAC) configuration.
//!
//! These are the declarative settings carried in the topology file. The
//! statistical models built from them live in `sine-phy`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// MAC variant of a wireless interface.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacConfig {
    /// No channel access coordination: every other node is assumed to be
    /// transmitting at all times (worst case).
    #[default]
    None,
    Csma(CsmaConfig),
    Tdma(TdmaConfig),
}

impl MacConfig {
    /// Discriminant used to reject mixed-MAC bridge groups at deploy.
    pub fn kind(&self) -> &'static str {
        match self {
            MacConfig::None => "none",
            MacConfig::Csma(_) => "csma",
            MacConfig::Tdma(_) => "tdma",
        }
    }
}

/// Statistical CSMA-CA parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsmaConfig {
    /// SNR at which a reference link just closes; defines the
    /// communication range `R_c`.
    #[serde(default = "default_range_snr_threshold_db")]
    pub range_snr_threshold_db: f64,
    /// Carrier-sense range multiplier: `R_cs = m · R_c`.
    #[serde(default = "default_carrier_sense_multiplier")]
    pub carrier_sense_multiplier: f64,
    /// Probability that a node outside carrier-sense range is transmitting.
    #[serde(default = "default_traffic_load")]
    pub traffic_load: f64,
}

fn default_range_snr_threshold_db() -> f64 {
    10.0
}

fn default_carrier_sense_multiplier() -> f64 {
    2.5
}

fn default_traffic_load() -> f64 {
    0.3
}

impl Default for CsmaConfig {
    fn default() -> Self {
        Self {
            range_snr_threshold_db: default_range_snr_threshold_db(),
            carrier_sense_multiplier: default_carrier_sense_multiplier(),
            traffic_load: default_traffic_load(),
        }
    }
}

/// TDMA frame layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TdmaConfig {
    pub slots_per_frame: u32,
    #[serde(default)]
    pub slots: TdmaSlots,
}

/// Slot ownership: an explicit node → slot list map, or round-robin over
/// the bridge group.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TdmaSlots {
    #[default]
    RoundRobin,
    Fixed(BTreeMap<String, Vec<u32>>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = CsmaConfig::default();
        assert_eq!(c.carrier_sense_multiplier, 2.5);
        assert_eq!(c.traffic_load, 0.3);
    }

    #[test]
    fn kinds_differ() {
        assert_eq!(MacConfig::None.kind(), "none");
        assert_eq!(MacConfig::Csma(CsmaConfig::default()).kind(), "csma");
    }
}

//! MAC overlays as concurrent-transmission probabilities.
//!
//! Every variant answers two questions: how likely is interferer `i` to
//! transmit while `t` transmits, and what share of channel time does `t`
//! own. Nothing else is shared between variants.

use std::collections::BTreeMap;

use sine_common::mac::{CsmaConfig, MacConfig, TdmaConfig, TdmaSlots};
use sine_common::units::{noise_floor_dbm, SPEED_OF_LIGHT_M_S};
use sine_common::Radio;

use crate::PhyError;

pub trait MacOverlay: Send + Sync {
    /// `Pr[interferer transmits | transmitter transmits]`, with
    /// `interferer_to_tx_m` the distance between the two.
    fn tx_probability(&self, interferer: &str, transmitter: &str, interferer_to_tx_m: f64) -> f64;

    /// Share of channel time the transmitter is entitled to.
    fn airtime_fraction(&self, transmitter: &str) -> f64;
}

/// No coordination: every other node is always transmitting.
pub struct NoMac;

impl MacOverlay for NoMac {
    fn tx_probability(&self, _interferer: &str, _transmitter: &str, _dist_m: f64) -> f64 {
        1.0
    }

    fn airtime_fraction(&self, _transmitter: &str) -> f64 {
        1.0
    }
}

/// Statistical CSMA-CA: interferers inside the carrier-sense range of the
/// transmitter defer; everyone else transmits with the ambient traffic
/// load.
pub struct CsmaCa {
    pub carrier_sense_range_m: f64,
    pub traffic_load: f64,
}

impl CsmaCa {
    /// Derive the carrier-sense range from the radio's isotropic link
    /// budget: `R_c` is the free-space distance at which the SNR equals
    /// the configured threshold, and `R_cs = m · R_c`.
    pub fn from_radio(radio: &Radio, cfg: &CsmaConfig) -> Self {
        let noise = noise_floor_dbm(radio.bandwidth_hz, radio.noise_figure_db);
        let budget_db = radio.tx_power_dbm - noise - cfg.range_snr_threshold_db;
        let wavelength = SPEED_OF_LIGHT_M_S / radio.frequency_hz;
        let communication_range = if budget_db <= 0.0 {
            0.0
        } else {
            wavelength / (4.0 * std::f64::consts::PI) * 10f64.powf(budget_db / 20.0)
        };
        Self {
            carrier_sense_range_m: cfg.carrier_sense_multiplier * communication_range,
            traffic_load: cfg.traffic_load,
        }
    }
}

impl MacOverlay for CsmaCa {
    fn tx_probability(&self, _interferer: &str, _transmitter: &str, dist_m: f64) -> f64 {
        if dist_m < self.carrier_sense_range_m {
            0.0
        } else {
            self.traffic_load
        }
    }

    fn airtime_fraction(&self, _transmitter: &str) -> f64 {
        1.0
    }
}

/// TDMA with fixed or round-robin slot ownership. Links are evaluated
/// during the transmitter's own slots, where all other nodes are silent;
/// airtime is the owned share of the frame.
pub struct Tdma {
    slots_per_frame: u32,
    owned: BTreeMap<String, u32>,
}

impl Tdma {
    pub fn fixed(
        slots_per_frame: u32,
        assignment: &BTreeMap<String, Vec<u32>>,
    ) -> Result<Self, PhyError> {
        if slots_per_frame == 0 {
            return Err(PhyError::ZeroSlots);
        }
        let mut owner_of: BTreeMap<u32, &str> = BTreeMap::new();
        let mut owned = BTreeMap::new();
        for (node, slots) in assignment {
            let mut count = 0u32;
            for &slot in slots {
                if slot >= slots_per_frame {
                    return Err(PhyError::BadSlotAssignment(format!(
                        "slot {slot} outside frame of {slots_per_frame}"
                    )));
                }
                if let Some(other) = owner_of.insert(slot, node) {
                    if other != node {
                        return Err(PhyError::BadSlotAssignment(format!(
                            "slot {slot} assigned to both {other} and {node}"
                        )));
                    }
                    continue;
                }
                count += 1;
            }
            owned.insert(node.clone(), count);
        }
        Ok(Self {
            slots_per_frame,
            owned,
        })
    }

    /// Deal slots to `nodes` in order, wrapping around the frame.
    pub fn round_robin(slots_per_frame: u32, nodes: &[String]) -> Result<Self, PhyError> {
        if slots_per_frame == 0 {
            return Err(PhyError::ZeroSlots);
        }
        let mut owned: BTreeMap<String, u32> =
            nodes.iter().map(|n| (n.clone(), 0)).collect();
        if !nodes.is_empty() {
            for slot in 0..slots_per_frame {
                let node = &nodes[slot as usize % nodes.len()];
                if let Some(count) = owned.get_mut(node) {
                    *count += 1;
                }
            }
        }
        Ok(Self {
            slots_per_frame,
            owned,
        })
    }

    fn slots_owned(&self, node: &str) -> u32 {
        self.owned.get(node).copied().unwrap_or(0)
    }
}

impl MacOverlay for Tdma {
    fn tx_probability(&self, interferer: &str, transmitter: &str, _dist_m: f64) -> f64 {
        // Orthogonal slots: during the transmitter's own slots nobody else
        // is on the air.
        if interferer == transmitter {
            1.0
        } else {
            0.0
        }
    }

    fn airtime_fraction(&self, transmitter: &str) -> f64 {
        self.slots_owned(transmitter) as f64 / self.slots_per_frame as f64
    }
}

/// Build the overlay for a transmitter's MAC configuration.
pub fn build_mac(
    config: &MacConfig,
    radio: &Radio,
    bridge_nodes: &[String],
) -> Result<Box<dyn MacOverlay>, PhyError> {
    match config {
        MacConfig::None => Ok(Box::new(NoMac)),
        MacConfig::Csma(cfg) => Ok(Box::new(CsmaCa::from_radio(radio, cfg))),
        MacConfig::Tdma(TdmaConfig {
            slots_per_frame,
            slots,
        }) => match slots {
            TdmaSlots::Fixed(assignment) => {
                Ok(Box::new(Tdma::fixed(*slots_per_frame, assignment)?))
            }
            TdmaSlots::RoundRobin => {
                Ok(Box::new(Tdma::round_robin(*slots_per_frame, bridge_nodes)?))
            }
        },
    }
}

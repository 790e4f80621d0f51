//! Per-node RF parameters.

use serde::{Deserialize, Serialize};

use crate::units::SPEED_OF_LIGHT_M_S;

/// Antenna pattern used by the channel tracer and, in
/// [`AntennaGainMode::LinkBudget`] mode, by the link budget itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Antenna {
    Iso,
    #[default]
    Dipole,
}

impl Antenna {
    /// Peak power gain (linear).
    pub fn power_gain(&self) -> f64 {
        match self {
            Antenna::Iso => 1.0,
            Antenna::Dipole => 1.64,
        }
    }

    /// Peak gain in dBi.
    pub fn gain_dbi(&self) -> f64 {
        10.0 * self.power_gain().log10()
    }
}

impl std::fmt::Display for Antenna {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Antenna::Iso => write!(f, "iso"),
            Antenna::Dipole => write!(f, "dipole"),
        }
    }
}

/// Where antenna gains enter the received-power computation.
///
/// `PathEmbedded` (default): the channel server folds the pattern into each
/// path coefficient and the link budget adds nothing. `LinkBudget`: paths
/// are requested with isotropic patterns and `G_tx + G_rx` is added in the
/// budget instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AntennaGainMode {
    #[default]
    PathEmbedded,
    LinkBudget,
}

/// RF configuration of a wireless interface. Immutable after deploy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Radio {
    pub frequency_hz: f64,
    pub bandwidth_hz: f64,
    pub tx_power_dbm: f64,
    pub noise_figure_db: f64,
    #[serde(default)]
    pub antenna: Antenna,
}

impl Radio {
    /// Carrier wavelength in metres.
    pub fn wavelength_m(&self) -> f64 {
        SPEED_OF_LIGHT_M_S / self.frequency_hz
    }

    /// True when two radios share the same channel.
    pub fn same_channel(&self, other: &Radio) -> bool {
        self.frequency_hz == other.frequency_hz && self.bandwidth_hz == other.bandwidth_hz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dipole_gain() {
        assert!((Antenna::Dipole.gain_dbi() - 2.148).abs() < 0.01);
        assert_eq!(Antenna::Iso.gain_dbi(), 0.0);
    }

    #[test]
    fn wavelength_5ghz() {
        let r = Radio {
            frequency_hz: 5.18e9,
            bandwidth_hz: 80e6,
            tx_power_dbm: 20.0,
            noise_figure_db: 7.0,
            antenna: Antenna::Dipole,
        };
        assert!((r.wavelength_m() - 0.05788).abs() < 1e-4);
    }
}

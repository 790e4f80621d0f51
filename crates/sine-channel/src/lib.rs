//! Channel server interface.
//!
//! The ray-tracing engine is an external service speaking a small JSON
//! protocol: `POST /paths` with transmitter/receiver positions and radio
//! parameters, answered by a list of complex path gains. This crate holds
//! the wire types, a reference free-space implementation of the service,
//! and the client the orchestrator uses to reach it.

pub mod client;
pub mod freespace;
pub mod server;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use sine_common::{Antenna, Position};
use sine_phy::PropagationPath;

pub use client::{ChannelClient, ChannelError};

/// `POST /paths` request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsRequest {
    pub tx_position: Position,
    pub rx_position: Position,
    pub frequency_hz: f64,
    pub bandwidth_hz: f64,
    pub antenna: AntennaSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AntennaSpec {
    pub pattern: Antenna,
}

/// One propagation path on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathEntry {
    pub complex_gain_re: f64,
    pub complex_gain_im: f64,
    pub delay_s: f64,
    #[serde(default)]
    pub interaction_types: Vec<String>,
}

/// `POST /paths` response body. An empty list is a valid "no propagation"
/// answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsResponse {
    pub paths: Vec<PathEntry>,
    pub num_paths: usize,
}

impl From<&PathEntry> for PropagationPath {
    fn from(entry: &PathEntry) -> Self {
        PropagationPath {
            gain: Complex64::new(entry.complex_gain_re, entry.complex_gain_im),
            delay_s: entry.delay_s,
        }
    }
}

impl PathsResponse {
    pub fn into_paths(self) -> Vec<PropagationPath> {
        self.paths.iter().map(PropagationPath::from).collect()
    }
}

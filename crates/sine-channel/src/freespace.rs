//! Reference free-space channel model.
//!
//! Produces a single line-of-sight path with the Friis amplitude
//! `sqrt(G_tx·G_rx)·λ/(4πd)`, carrier phase `−2πd/λ`, and delay `d/c`.
//! Antenna patterns are folded into the path coefficient, matching the
//! path-embedded gain mode; isotropic patterns make the path bare.

use sine_common::units::SPEED_OF_LIGHT_M_S;

use crate::{PathEntry, PathsRequest, PathsResponse};

/// Trace the free-space channel for a request. Zero distance (or a
/// non-positive frequency) yields no propagation.
pub fn trace(request: &PathsRequest) -> PathsResponse {
    let distance = request.tx_position.distance(&request.rx_position);
    if distance <= f64::EPSILON || request.frequency_hz <= 0.0 {
        return PathsResponse {
            paths: Vec::new(),
            num_paths: 0,
        };
    }

    let wavelength = SPEED_OF_LIGHT_M_S / request.frequency_hz;
    // Identical pattern at both ends: sqrt(G·G) = G.
    let amplitude = request.antenna.pattern.power_gain() * wavelength
        / (4.0 * std::f64::consts::PI * distance);
    let phase = -2.0 * std::f64::consts::PI * distance / wavelength;

    let path = PathEntry {
        complex_gain_re: amplitude * phase.cos(),
        complex_gain_im: amplitude * phase.sin(),
        delay_s: distance / SPEED_OF_LIGHT_M_S,
        interaction_types: vec!["los".to_string()],
    };
    PathsResponse {
        paths: vec![path],
        num_paths: 1,
    }
}

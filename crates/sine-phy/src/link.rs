//! Directed-link evaluation: signal + MAC-weighted interference → SINR →
//! MCS → netem parameters.

use sine_common::units::{dbm_to_mw, mw_to_dbm, noise_floor_dbm};
use sine_common::{AntennaGainMode, Antenna, LinkParams, Radio};

use crate::error_rate::packet_error_rate;
use crate::mac::MacOverlay;
use crate::mcs::{McsTable, DOWN_MCS};
use crate::paths::{PathAggregate, PropagationPath};

/// Emulation-wide PHY knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhyOptions {
    pub hysteresis_db: f64,
    /// Global overhead efficiency factor η applied to the raw symbol rate.
    pub spectral_efficiency: f64,
    pub packet_bits: u32,
    pub max_jitter_ms: f64,
    pub fallback_rate_mbps: f64,
    pub gain_mode: AntennaGainMode,
}

impl Default for PhyOptions {
    fn default() -> Self {
        Self {
            hysteresis_db: 2.0,
            spectral_efficiency: 0.8,
            packet_bits: 12_000,
            max_jitter_ms: 10.0,
            fallback_rate_mbps: 0.1,
            gain_mode: AntennaGainMode::PathEmbedded,
        }
    }
}

/// A co-channel transmitter other than the link's own endpoints.
pub struct Interferer<'a> {
    pub node: &'a str,
    /// Paths from the interferer to the link's receiver.
    pub paths: &'a [PropagationPath],
    pub tx_power_dbm: f64,
    pub antenna: Antenna,
    /// Distance from the interferer to the link's transmitter, metres.
    pub distance_to_tx_m: f64,
}

fn budget_gain_db(mode: AntennaGainMode, tx: Antenna, rx: Antenna) -> f64 {
    match mode {
        AntennaGainMode::PathEmbedded => 0.0,
        AntennaGainMode::LinkBudget => tx.gain_dbi() + rx.gain_dbi(),
    }
}

/// Evaluate one directed link on the shared channel.
///
/// `prev_mcs` is the sticky index from the previous evaluation of this
/// link ([`DOWN_MCS`] on first contact). A link with no propagation paths,
/// a non-finite SINR, an SINR below the lowest table threshold, or zero
/// airtime comes back down: `mcs = -1`, 100 % loss, fallback rate.
#[allow(clippy::too_many_arguments)]
pub fn evaluate_link(
    tx: &str,
    tx_radio: &Radio,
    rx_radio: &Radio,
    signal_paths: &[PropagationPath],
    interferers: &[Interferer<'_>],
    mac: &dyn MacOverlay,
    table: &McsTable,
    prev_mcs: i32,
    opts: &PhyOptions,
) -> LinkParams {
    let noise_dbm = noise_floor_dbm(rx_radio.bandwidth_hz, rx_radio.noise_figure_db);
    let noise_mw = dbm_to_mw(noise_dbm);

    let Some(signal) = PathAggregate::coherent(signal_paths) else {
        return LinkParams::down(opts.fallback_rate_mbps);
    };
    let signal_dbm = signal.received_dbm(
        tx_radio.tx_power_dbm,
        budget_gain_db(opts.gain_mode, tx_radio.antenna, rx_radio.antenna),
    );
    let signal_mw = dbm_to_mw(signal_dbm);

    let mut interference_mw = 0.0;
    for interferer in interferers {
        let Some(agg) = PathAggregate::coherent(interferer.paths) else {
            continue;
        };
        let probability = mac.tx_probability(interferer.node, tx, interferer.distance_to_tx_m);
        if probability <= 0.0 {
            continue;
        }
        let power_dbm = agg.received_dbm(
            interferer.tx_power_dbm,
            budget_gain_db(opts.gain_mode, interferer.antenna, rx_radio.antenna),
        );
        interference_mw += probability * dbm_to_mw(power_dbm);
    }

    let snr_db = signal_dbm - noise_dbm;
    let sinr_db = {
        let sinr = 10.0 * (signal_mw / (noise_mw + interference_mw)).log10();
        if sinr.is_nan() {
            f64::NEG_INFINITY
        } else {
            sinr
        }
    };
    let interference_dbm = mw_to_dbm(interference_mw);
    let delay_ms = signal.min_delay_s * 1e3;
    let jitter_ms = (signal.delay_span_s * 1e3).min(opts.max_jitter_ms);

    let down = |mcs_index: i32| LinkParams {
        signal_dbm,
        interference_dbm,
        snr_db,
        sinr_db,
        mcs_index,
        per: 1.0,
        delay_ms,
        jitter_ms,
        loss_pct: 100.0,
        rate_mbps: opts.fallback_rate_mbps,
    };

    let mcs_index = table.select(sinr_db, prev_mcs, opts.hysteresis_db);
    let Some(row) = table.row(mcs_index) else {
        return down(DOWN_MCS);
    };

    let airtime = mac.airtime_fraction(tx);
    if airtime <= 0.0 {
        return down(DOWN_MCS);
    }

    let per = packet_error_rate(sinr_db, row.modulation, row.code_rate, opts.packet_bits);
    LinkParams {
        signal_dbm,
        interference_dbm,
        snr_db,
        sinr_db,
        mcs_index,
        per,
        delay_ms,
        jitter_ms,
        loss_pct: 100.0 * per,
        rate_mbps: table.rate_mbps(mcs_index, rx_radio.bandwidth_hz, opts.spectral_efficiency)
            * airtime,
    }
}

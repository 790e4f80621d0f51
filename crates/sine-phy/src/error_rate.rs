//! Bit and packet error rates.
//!
//! AWGN approximations with the SINR treated as per-symbol SNR:
//! BPSK `Q(√(2γ))`, QPSK `Q(√γ)`, square M-QAM
//! `(4/log2 M)·(1−1/√M)·Q(√(3γ/(M−1)))`.

use sine_common::units::db_to_linear;

use crate::mcs::Modulation;

/// Gaussian tail probability `Q(x) = erfc(x/√2)/2`.
fn q(x: f64) -> f64 {
    0.5 * libm::erfc(x / std::f64::consts::SQRT_2)
}

/// Uncoded bit-error rate for `modulation` at linear SNR `gamma`.
pub fn bit_error_rate(modulation: Modulation, gamma: f64) -> f64 {
    if gamma <= 0.0 {
        return 0.5;
    }
    let ber = match modulation {
        Modulation::Bpsk => q((2.0 * gamma).sqrt()),
        Modulation::Qpsk => q(gamma.sqrt()),
        m => {
            let order = m.order() as f64;
            let bits = m.bits_per_symbol() as f64;
            4.0 / bits * (1.0 - 1.0 / order.sqrt()) * q((3.0 * gamma / (order - 1.0)).sqrt())
        }
    };
    ber.clamp(0.0, 0.5)
}

/// SNR improvement attributed to the channel code, in dB.
///
/// `10·(1−r)` matches the ≈5 dB rule of thumb at rate 1/2 and vanishes for
/// uncoded transmission.
pub fn coding_gain_db(code_rate: f64) -> f64 {
    10.0 * (1.0 - code_rate.clamp(0.0, 1.0))
}

/// Packet-error rate for a packet of `packet_bits` at `sinr_db`.
pub fn packet_error_rate(
    sinr_db: f64,
    modulation: Modulation,
    code_rate: f64,
    packet_bits: u32,
) -> f64 {
    if !sinr_db.is_finite() {
        return 1.0;
    }
    let effective = db_to_linear(sinr_db + coding_gain_db(code_rate));
    let ber = bit_error_rate(modulation, effective);
    1.0 - (1.0 - ber).powi(packet_bits as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ber_decreases_with_snr() {
        for m in [
            Modulation::Bpsk,
            Modulation::Qpsk,
            Modulation::Qam16,
            Modulation::Qam64,
            Modulation::Qam256,
        ] {
            let low = bit_error_rate(m, db_to_linear(0.0));
            let high = bit_error_rate(m, db_to_linear(20.0));
            assert!(high < low, "{m:?}: {high} !< {low}");
        }
    }

    #[test]
    fn denser_constellations_need_more_snr() {
        let gamma = db_to_linear(12.0);
        assert!(bit_error_rate(Modulation::Qam64, gamma) > bit_error_rate(Modulation::Qpsk, gamma));
    }

    #[test]
    fn bpsk_reference_point() {
        // Q(sqrt(2*10^0.96)) ≈ 1e-5 at ~9.6 dB, the textbook BPSK point.
        let ber = bit_error_rate(Modulation::Bpsk, db_to_linear(9.6));
        assert!(ber > 1e-6 && ber < 1e-4, "ber {ber}");
    }

    #[test]
    fn per_saturates_to_one_when_down() {
        assert_eq!(
            packet_error_rate(f64::NEG_INFINITY, Modulation::Qpsk, 0.5, 12000),
            1.0
        );
        let per = packet_error_rate(-10.0, Modulation::Qam64, 0.5, 12000);
        assert!(per > 0.999);
    }

    #[test]
    fn per_negligible_at_high_sinr() {
        // Scenario: 64-QAM rate-1/2 at ~39.7 dB must give loss ≤ 0.01%.
        let per = packet_error_rate(39.7, Modulation::Qam64, 0.5, 12000);
        assert!(per < 1e-4, "per {per}");
    }

    #[test]
    fn coding_gain_rule_of_thumb() {
        assert_eq!(coding_gain_db(0.5), 5.0);
        assert_eq!(coding_gain_db(1.0), 0.0);
        assert!(coding_gain_db(0.75) < coding_gain_db(0.5));
    }
}

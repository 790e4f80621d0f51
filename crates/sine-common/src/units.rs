//! Power unit conversions and physical constants.

/// Boltzmann constant in J/K.
pub const BOLTZMANN_J_PER_K: f64 = 1.380_649e-23;

/// Reference receiver temperature in kelvin.
pub const REFERENCE_TEMPERATURE_K: f64 = 290.0;

/// Speed of light in vacuum, m/s.
pub const SPEED_OF_LIGHT_M_S: f64 = 299_792_458.0;

pub fn dbm_to_mw(dbm: f64) -> f64 {
    10f64.powf(dbm / 10.0)
}

pub fn mw_to_dbm(mw: f64) -> f64 {
    10.0 * mw.log10()
}

pub fn db_to_linear(db: f64) -> f64 {
    10f64.powf(db / 10.0)
}

pub fn linear_to_db(linear: f64) -> f64 {
    10.0 * linear.log10()
}

/// Thermal noise floor `kTB·F` in dBm.
///
/// The `10·log10(kT·1000)` term evaluates to ≈ −174 dBm/Hz at 290 K.
pub fn noise_floor_dbm(bandwidth_hz: f64, noise_figure_db: f64) -> f64 {
    let ktb_mw = BOLTZMANN_J_PER_K * REFERENCE_TEMPERATURE_K * 1000.0 * bandwidth_hz;
    mw_to_dbm(ktb_mw) + noise_figure_db
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dbm_round_trip() {
        assert!((dbm_to_mw(0.0) - 1.0).abs() < 1e-12);
        assert!((mw_to_dbm(dbm_to_mw(-48.3)) - -48.3).abs() < 1e-9);
    }

    #[test]
    fn noise_floor_80mhz_nf7() {
        // -174 + 10*log10(80e6) + 7 ≈ -88 dBm
        let n = noise_floor_dbm(80e6, 7.0);
        assert!((n - -88.0).abs() < 0.2, "noise floor {n}");
    }

    #[test]
    fn noise_floor_depends_only_on_bandwidth_and_nf() {
        assert_eq!(noise_floor_dbm(20e6, 5.0), noise_floor_dbm(20e6, 5.0));
        assert!(noise_floor_dbm(40e6, 5.0) > noise_floor_dbm(20e6, 5.0));
    }
}

//! MCS table loading and selection with hysteresis.
//!
//! The table maps minimum-SNR thresholds to modulation/code-rate pairs.
//! Selection is sticky: upgrades must clear the threshold plus a hysteresis
//! band, downgrades are immediate.

use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::PhyError;

/// Sentinel index for a link whose SINR meets no table row.
pub const DOWN_MCS: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Modulation {
    Bpsk,
    Qpsk,
    #[serde(rename = "16-qam")]
    Qam16,
    #[serde(rename = "64-qam")]
    Qam64,
    #[serde(rename = "256-qam")]
    Qam256,
}

impl Modulation {
    pub fn bits_per_symbol(&self) -> u32 {
        match self {
            Modulation::Bpsk => 1,
            Modulation::Qpsk => 2,
            Modulation::Qam16 => 4,
            Modulation::Qam64 => 6,
            Modulation::Qam256 => 8,
        }
    }

    /// Constellation order M.
    pub fn order(&self) -> u32 {
        1 << self.bits_per_symbol()
    }

    /// Default minimum SNR used when a fixed modulation is configured
    /// without a full table.
    pub fn default_min_snr_db(&self) -> f64 {
        match self {
            Modulation::Bpsk => 2.0,
            Modulation::Qpsk => 5.0,
            Modulation::Qam16 => 11.0,
            Modulation::Qam64 => 18.0,
            Modulation::Qam256 => 28.0,
        }
    }
}

impl FromStr for Modulation {
    type Err = PhyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match normalized.as_str() {
            "bpsk" => Ok(Modulation::Bpsk),
            "qpsk" => Ok(Modulation::Qpsk),
            "16qam" | "qam16" => Ok(Modulation::Qam16),
            "64qam" | "qam64" => Ok(Modulation::Qam64),
            "256qam" | "qam256" => Ok(Modulation::Qam256),
            _ => Err(PhyError::UnknownModulation(s.to_string())),
        }
    }
}

impl std::fmt::Display for Modulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Modulation::Bpsk => write!(f, "bpsk"),
            Modulation::Qpsk => write!(f, "qpsk"),
            Modulation::Qam16 => write!(f, "16-qam"),
            Modulation::Qam64 => write!(f, "64-qam"),
            Modulation::Qam256 => write!(f, "256-qam"),
        }
    }
}

/// One row of the MCS table.
#[derive(Debug, Clone, PartialEq)]
pub struct McsRow {
    /// Label from the source file; selection works on table positions.
    pub index: i32,
    pub modulation: Modulation,
    pub code_rate: f64,
    pub min_snr_db: f64,
}

/// Threshold table ordered by ascending `min_snr_db`. Ties keep file order.
#[derive(Debug, Clone, PartialEq)]
pub struct McsTable {
    rows: Vec<McsRow>,
}

/// Process-wide default table, 802.11-style ladder.
pub static DEFAULT_TABLE: Lazy<McsTable> = Lazy::new(|| {
    let rows = [
        (0, Modulation::Bpsk, 0.5, 2.0),
        (1, Modulation::Qpsk, 0.5, 5.0),
        (2, Modulation::Qpsk, 0.75, 9.0),
        (3, Modulation::Qam16, 0.5, 11.0),
        (4, Modulation::Qam16, 0.75, 15.0),
        (5, Modulation::Qam64, 2.0 / 3.0, 18.0),
        (6, Modulation::Qam64, 0.75, 20.0),
        (7, Modulation::Qam64, 5.0 / 6.0, 25.0),
        (8, Modulation::Qam256, 0.75, 28.0),
        (9, Modulation::Qam256, 5.0 / 6.0, 31.0),
    ]
    .into_iter()
    .map(|(index, modulation, code_rate, min_snr_db)| McsRow {
        index,
        modulation,
        code_rate,
        min_snr_db,
    })
    .collect();
    McsTable::from_rows(rows).unwrap()
});

impl McsTable {
    pub fn from_rows(mut rows: Vec<McsRow>) -> Result<Self, PhyError> {
        if rows.is_empty() {
            return Err(PhyError::EmptyTable);
        }
        rows.sort_by(|a, b| a.min_snr_db.total_cmp(&b.min_snr_db));
        Ok(Self { rows })
    }

    /// A one-row table for interfaces configured with a fixed modulation.
    pub fn single(modulation: Modulation, code_rate: f64) -> Self {
        Self {
            rows: vec![McsRow {
                index: 0,
                modulation,
                code_rate,
                min_snr_db: modulation.default_min_snr_db(),
            }],
        }
    }

    /// Load from CSV with columns
    /// `mcs_index,modulation,code_rate,min_snr_db[,fec_type,bandwidth_mhz]`.
    pub fn from_csv_path(path: &Path) -> Result<Self, PhyError> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file)
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, PhyError> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);
        let mut rows = Vec::new();
        for (i, record) in csv.records().enumerate() {
            let record = record?;
            let field = |n: usize| -> Result<&str, PhyError> {
                record.get(n).ok_or_else(|| PhyError::TableRow {
                    row: i + 1,
                    reason: format!("missing column {n}"),
                })
            };
            let index: i32 = field(0)?.parse().map_err(|_| PhyError::TableRow {
                row: i + 1,
                reason: "bad mcs_index".into(),
            })?;
            let modulation: Modulation = field(1)?.parse()?;
            let code_rate = parse_code_rate(field(2)?).ok_or_else(|| PhyError::TableRow {
                row: i + 1,
                reason: format!("bad code_rate `{}`", record.get(2).unwrap_or("")),
            })?;
            let min_snr_db: f64 = field(3)?.parse().map_err(|_| PhyError::TableRow {
                row: i + 1,
                reason: "bad min_snr_db".into(),
            })?;
            rows.push(McsRow {
                index,
                modulation,
                code_rate,
                min_snr_db,
            });
        }
        Self::from_rows(rows)
    }

    pub fn rows(&self) -> &[McsRow] {
        &self.rows
    }

    pub fn row(&self, position: i32) -> Option<&McsRow> {
        usize::try_from(position).ok().and_then(|p| self.rows.get(p))
    }

    /// Lowest threshold in the table; below it a link is down.
    pub fn floor_snr_db(&self) -> f64 {
        self.rows[0].min_snr_db
    }

    /// Largest position whose threshold is at or below `snr_db`.
    fn ceiling_position(&self, snr_db: f64) -> Option<usize> {
        self.rows
            .iter()
            .rposition(|row| row.min_snr_db <= snr_db)
    }

    /// Select an MCS position for `sinr_db` given the previously selected
    /// position (`DOWN_MCS` when none).
    ///
    /// Downgrades are immediate; upgrades must clear the target threshold
    /// by `hysteresis_db`. Returns `DOWN_MCS` when even the lowest row is
    /// out of reach.
    pub fn select(&self, sinr_db: f64, prev: i32, hysteresis_db: f64) -> i32 {
        let s = if sinr_db.is_nan() {
            f64::NEG_INFINITY
        } else {
            sinr_db
        };
        let Some(k_dn) = self.ceiling_position(s) else {
            return DOWN_MCS;
        };
        let prev_pos = match usize::try_from(prev) {
            Ok(p) if p < self.rows.len() => p,
            _ => return k_dn as i32,
        };
        if s < self.rows[prev_pos].min_snr_db {
            // Strict downgrade, no hysteresis.
            return k_dn as i32;
        }
        match self.ceiling_position(s - hysteresis_db) {
            Some(k_up) => prev_pos.max(k_up) as i32,
            None => prev_pos as i32,
        }
    }

    /// Achievable rate of the row at `position` over `bandwidth_hz`, with
    /// the global efficiency factor applied.
    pub fn rate_mbps(&self, position: i32, bandwidth_hz: f64, efficiency: f64) -> f64 {
        match self.row(position) {
            Some(row) => {
                bandwidth_hz / 1e6
                    * row.modulation.bits_per_symbol() as f64
                    * row.code_rate
                    * efficiency
            }
            None => 0.0,
        }
    }
}

/// Accepts `1/2`-style fractions and plain floats.
fn parse_code_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(num / den);
    }
    let rate: f64 = s.parse().ok()?;
    (0.0..=1.0).contains(&rate).then_some(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_is_sorted() {
        let rows = DEFAULT_TABLE.rows();
        assert!(rows.windows(2).all(|w| w[0].min_snr_db <= w[1].min_snr_db));
        assert_eq!(rows.len(), 10);
    }

    #[test]
    fn csv_round_trip() {
        let csv = "mcs_index,modulation,code_rate,min_snr_db\n\
                   0,bpsk,1/2,2.0\n\
                   1,qpsk,1/2,5.0\n\
                   2,64-qam,0.75,20.0\n";
        let table = McsTable::from_csv_reader(csv.as_bytes()).unwrap();
        assert_eq!(table.rows().len(), 3);
        assert_eq!(table.rows()[0].code_rate, 0.5);
        assert_eq!(table.rows()[2].modulation, Modulation::Qam64);
    }

    #[test]
    fn csv_sorts_by_min_snr() {
        let csv = "mcs_index,modulation,code_rate,min_snr_db\n\
                   1,qpsk,1/2,5.0\n\
                   0,bpsk,1/2,2.0\n";
        let table = McsTable::from_csv_reader(csv.as_bytes()).unwrap();
        assert_eq!(table.rows()[0].modulation, Modulation::Bpsk);
    }

    #[test]
    fn empty_table_rejected() {
        let csv = "mcs_index,modulation,code_rate,min_snr_db\n";
        assert!(matches!(
            McsTable::from_csv_reader(csv.as_bytes()),
            Err(PhyError::EmptyTable)
        ));
    }

    #[test]
    fn below_floor_is_down() {
        assert_eq!(DEFAULT_TABLE.select(1.0, DOWN_MCS, 2.0), DOWN_MCS);
        assert_eq!(DEFAULT_TABLE.select(f64::NEG_INFINITY, 5, 2.0), DOWN_MCS);
        assert_eq!(DEFAULT_TABLE.select(f64::NAN, 5, 2.0), DOWN_MCS);
    }

    #[test]
    fn fresh_selection_ignores_hysteresis() {
        // 5.5 dB sits above the qpsk-1/2 row; a fresh link takes it even
        // though 5.5 - 2.0 would not clear it.
        assert_eq!(DEFAULT_TABLE.select(5.5, DOWN_MCS, 2.0), 1);
    }

    #[test]
    fn upgrade_needs_hysteresis_margin() {
        // Sitting at position 1, SINR just over the position-2 threshold
        // stays put; clearing the band upgrades.
        assert_eq!(DEFAULT_TABLE.select(9.5, 1, 2.0), 1);
        assert_eq!(DEFAULT_TABLE.select(11.2, 1, 2.0), 2);
    }

    #[test]
    fn downgrade_is_immediate() {
        assert_eq!(DEFAULT_TABLE.select(8.0, 3, 2.0), 1);
    }

    #[test]
    fn hysteresis_suppresses_chatter() {
        // Trajectory oscillating inside [t, t+h) around the position-2
        // threshold (9.0 dB): at most one transition.
        let mut prev = DEFAULT_TABLE.select(8.0, DOWN_MCS, 2.0);
        let mut transitions = 0;
        for s in [9.2, 9.8, 9.1, 10.5, 9.3, 10.9, 9.05] {
            let next = DEFAULT_TABLE.select(s, prev, 2.0);
            if next != prev {
                transitions += 1;
            }
            prev = next;
        }
        assert!(transitions <= 1, "saw {transitions} transitions");
    }

    #[test]
    fn rate_for_64qam_half_over_80mhz() {
        let table = McsTable::single(Modulation::Qam64, 0.5);
        let rate = table.rate_mbps(0, 80e6, 0.8);
        assert!((rate - 192.0).abs() < 1e-9, "rate {rate}");
    }

    #[test]
    fn monotone_under_hysteresis() {
        // A monotonically decreasing SINR sweep never raises the index.
        let mut prev = DOWN_MCS;
        let mut last = i32::MAX;
        let mut s = 35.0;
        while s > -5.0 {
            let next = DEFAULT_TABLE.select(s, prev, 2.0);
            assert!(next <= last, "index rose from {last} to {next} at {s} dB");
            last = next;
            prev = next;
            s -= 0.5;
        }
        assert_eq!(prev, DOWN_MCS);
    }
}

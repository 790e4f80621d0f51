//! Topology file schema.
//!
//! Raw serde mirror of the YAML surface. Everything named here is optional
//! except node identity and interface IP; resolution into the validated
//! [`crate::model::Topology`] happens in `model.rs`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use sine_common::mac::{CsmaConfig, TdmaConfig};
use sine_common::{AntennaGainMode, Antenna, ParamEpsilon, Position};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopologyFile {
    pub topology: TopologySection,
    #[serde(default)]
    pub settings: SettingsSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopologySection {
    /// Lab name; defaults to the file stem.
    pub name: Option<String>,
    pub shared_bridge: SharedBridgeSection,
    pub nodes: BTreeMap<String, NodeSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SharedBridgeSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bridge_name")]
    pub name: String,
    #[serde(default = "default_interface_name")]
    pub interface_name: String,
    /// Bridge membership, in class-id order.
    pub nodes: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSection {
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default = "default_image")]
    pub image: String,
    pub interfaces: BTreeMap<String, InterfaceSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceSection {
    pub ip_address: String,
    pub wireless: Option<WirelessSection>,
    pub fixed_netem: Option<FixedNetemSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WirelessSection {
    #[serde(default)]
    pub position: Position,
    #[serde(default = "default_frequency")]
    pub frequency: f64,
    #[serde(default = "default_bandwidth")]
    pub bandwidth: f64,
    #[serde(default = "default_tx_power")]
    pub tx_power_dbm: f64,
    #[serde(default = "default_noise_figure")]
    pub noise_figure_db: f64,
    #[serde(default)]
    pub antenna: AntennaSection,
    /// Fixed modulation; ignored when `mcs_table` is given.
    pub modulation: Option<String>,
    /// Path to an MCS CSV, relative to the topology file.
    pub mcs_table: Option<PathBuf>,
    /// Informational FEC family (ldpc, convolutional, ...).
    pub fec_type: Option<String>,
    /// Code rate for a fixed modulation, `1/2` or decimal.
    pub fec_code_rate: Option<String>,
    pub hysteresis_db: Option<f64>,
    #[serde(default)]
    pub mac: MacSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AntennaSection {
    #[serde(default)]
    pub pattern: Antenna,
}

/// At most one variant may be present; none means no coordination.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MacSection {
    pub csma: Option<CsmaConfig>,
    pub tdma: Option<TdmaConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixedNetemSection {
    #[serde(default)]
    pub delay_ms: f64,
    #[serde(default)]
    pub jitter_ms: f64,
    #[serde(default)]
    pub loss_percent: f64,
    #[serde(default = "default_fixed_rate")]
    pub rate_mbps: f64,
    pub correlation_percent: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsSection {
    pub channel_server_url: Option<String>,
    pub channel_timeout_s: Option<u64>,
    pub mobility_listen: Option<String>,
    pub hysteresis_db: Option<f64>,
    pub spectral_efficiency: Option<f64>,
    pub packet_bits: Option<u32>,
    pub max_jitter_ms: Option<f64>,
    pub fallback_rate_mbps: Option<f64>,
    pub antenna_gain_mode: Option<AntennaGainMode>,
    pub correlation_percent: Option<f64>,
    pub ceiling_mbps: Option<f64>,
    pub default_class_rate_mbps: Option<f64>,
    pub epsilon: Option<ParamEpsilon>,
}

fn default_true() -> bool {
    true
}

fn default_bridge_name() -> String {
    "wbr0".into()
}

fn default_interface_name() -> String {
    "eth1".into()
}

fn default_kind() -> String {
    "linux".into()
}

fn default_image() -> String {
    "alpine:latest".into()
}

fn default_frequency() -> f64 {
    5.18e9
}

fn default_bandwidth() -> f64 {
    80e6
}

fn default_tx_power() -> f64 {
    20.0
}

fn default_noise_figure() -> f64 {
    7.0
}

fn default_fixed_rate() -> f64 {
    100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_topology_parses() {
        let yaml = r#"
topology:
  shared_bridge:
    nodes: [n1, n2]
  nodes:
    n1:
      interfaces:
        eth1:
          ip_address: 10.0.0.1/24
          wireless:
            position: {x: 0, y: 0, z: 1}
    n2:
      interfaces:
        eth1:
          ip_address: 10.0.0.2/24
          wireless:
            position: {x: 20, y: 0, z: 1}
"#;
        let file: TopologyFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(file.topology.shared_bridge.name, "wbr0");
        assert_eq!(file.topology.shared_bridge.interface_name, "eth1");
        let n1 = &file.topology.nodes["n1"];
        let w = n1.interfaces["eth1"].wireless.as_ref().unwrap();
        assert_eq!(w.frequency, 5.18e9);
        assert_eq!(w.tx_power_dbm, 20.0);
    }

    #[test]
    fn mac_and_fixed_netem_parse() {
        let yaml = r#"
topology:
  shared_bridge:
    name: air0
    nodes: [a, b]
  nodes:
    a:
      interfaces:
        eth1:
          ip_address: 10.0.0.1/24
          wireless:
            position: {x: 0, y: 0, z: 1}
            mac:
              csma:
                traffic_load: 0.5
    b:
      interfaces:
        eth1:
          ip_address: 10.0.0.2/24
          fixed_netem:
            delay_ms: 10
            loss_percent: 0.5
            rate_mbps: 50
"#;
        let file: TopologyFile = serde_yaml::from_str(yaml).unwrap();
        let a = &file.topology.nodes["a"].interfaces["eth1"];
        match &a.wireless.as_ref().unwrap().mac.csma {
            Some(csma) => {
                assert_eq!(csma.traffic_load, 0.5);
                assert_eq!(csma.carrier_sense_multiplier, 2.5);
            }
            None => panic!("expected csma"),
        }
        let b = &file.topology.nodes["b"].interfaces["eth1"];
        let fixed = b.fixed_netem.as_ref().unwrap();
        assert_eq!(fixed.delay_ms, 10.0);
        assert_eq!(fixed.jitter_ms, 0.0);
    }

    #[test]
    fn unknown_fields_rejected() {
        let yaml = r#"
topology:
  shared_bridge:
    nodes: [n1]
  nodes:
    n1:
      interfaces:
        eth1:
          ip_address: 10.0.0.1/24
          wireles: {}
"#;
        assert!(serde_yaml::from_str::<TopologyFile>(yaml).is_err());
    }
}

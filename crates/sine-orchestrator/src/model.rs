//! Resolved, validated topology model.
//!
//! The raw YAML schema allows almost everything to be omitted; this module
//! folds in defaults, loads MCS tables, and enforces the rules the rest of
//! the pipeline relies on: shared-bridge membership, unique addresses, one
//! MAC kind per channel.

use std::collections::{BTreeSet, HashSet};
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use sine_common::mac::{MacConfig, TdmaSlots};
use sine_common::{AntennaGainMode, ParamEpsilon, Position, Radio};
use sine_netem::Shaping;
use sine_phy::link::PhyOptions;
use sine_phy::mcs::DEFAULT_TABLE;
use sine_phy::{McsTable, Modulation, PhyError};

use crate::config::{self, TopologyFile};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid topology file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("shared_bridge must be enabled")]
    BridgeDisabled,
    #[error("shared_bridge.nodes is empty")]
    NoNodes,
    #[error("shared_bridge references unknown node `{0}`")]
    UnknownNode(String),
    #[error("node `{node}` has no interface `{iface}`")]
    MissingInterface { node: String, iface: String },
    #[error("node `{node}`: invalid ip_address `{ip}`")]
    BadIp { node: String, ip: String },
    #[error("ip address {ip} assigned to both `{first}` and `{second}`")]
    DuplicateIp {
        ip: String,
        first: String,
        second: String,
    },
    #[error("node `{node}`: mac may name at most one of csma/tdma")]
    AmbiguousMac { node: String },
    #[error("mixed MAC kinds on the shared channel: {0}")]
    MixedMac(String),
    #[error("node `{node}`: {source}")]
    Phy {
        node: String,
        #[source]
        source: PhyError,
    },
    #[error("TDMA assignment references unknown node `{0}`")]
    UnknownTdmaNode(String),
}

/// Emulation-wide settings with all defaults folded in.
#[derive(Debug, Clone)]
pub struct Settings {
    pub channel_server_url: String,
    pub channel_timeout: Duration,
    pub mobility_listen: String,
    pub phy: PhyOptions,
    pub correlation_pct: f64,
    pub ceiling_mbps: f64,
    pub default_class_rate_mbps: f64,
    pub epsilon: ParamEpsilon,
}

/// Wireless personality of a bridge interface.
#[derive(Debug, Clone)]
pub struct Wireless {
    pub position: Position,
    pub radio: Radio,
    pub mcs: McsTable,
    pub hysteresis_db: f64,
    pub mac: MacConfig,
}

/// What a node's bridge interface emulates.
#[derive(Debug, Clone)]
pub enum LinkRole {
    Wireless(Box<Wireless>),
    /// Parameters taken verbatim from configuration; the PHY pipeline is
    /// bypassed.
    Fixed(Shaping),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub image: String,
    /// Address with prefix, e.g. `10.0.0.1/24`.
    pub ip_cidr: String,
    /// Bare address used by flower filters.
    pub addr: Ipv4Addr,
    pub role: LinkRole,
}

impl Node {
    pub fn wireless(&self) -> Option<&Wireless> {
        match &self.role {
            LinkRole::Wireless(w) => Some(w),
            LinkRole::Fixed(_) => None,
        }
    }
}

/// Validated topology. Immutable after deploy; node positions move through
/// the orchestrator's position table, not through this struct.
#[derive(Debug, Clone)]
pub struct Topology {
    pub name: String,
    pub bridge_name: String,
    pub iface: String,
    /// Bridge members in class-id order.
    pub nodes: Vec<Node>,
    pub settings: Settings,
}

impl Topology {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file: TopologyFile = serde_yaml::from_str(&text)?;
        let name = file
            .topology
            .name
            .clone()
            .or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "sine".into());
        Self::resolve(file, &name, path.parent().unwrap_or(Path::new(".")))
    }

    pub fn resolve(file: TopologyFile, name: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let bridge = &file.topology.shared_bridge;
        if !bridge.enabled {
            return Err(ConfigError::BridgeDisabled);
        }
        if bridge.nodes.is_empty() {
            return Err(ConfigError::NoNodes);
        }

        let settings = resolve_settings(&file.settings);
        let mut nodes = Vec::with_capacity(bridge.nodes.len());
        let mut seen_ips: Vec<(Ipv4Addr, String)> = Vec::new();

        for node_name in &bridge.nodes {
            let section = file
                .topology
                .nodes
                .get(node_name)
                .ok_or_else(|| ConfigError::UnknownNode(node_name.clone()))?;
            let iface = section.interfaces.get(&bridge.interface_name).ok_or_else(|| {
                ConfigError::MissingInterface {
                    node: node_name.clone(),
                    iface: bridge.interface_name.clone(),
                }
            })?;

            let addr = parse_ipv4(&iface.ip_address).ok_or_else(|| ConfigError::BadIp {
                node: node_name.clone(),
                ip: iface.ip_address.clone(),
            })?;
            if let Some((_, first)) = seen_ips.iter().find(|(a, _)| *a == addr) {
                return Err(ConfigError::DuplicateIp {
                    ip: addr.to_string(),
                    first: first.clone(),
                    second: node_name.clone(),
                });
            }
            seen_ips.push((addr, node_name.clone()));

            let role = resolve_role(node_name, iface, &settings, base_dir)?;
            nodes.push(Node {
                name: node_name.clone(),
                image: section.image.clone(),
                ip_cidr: iface.ip_address.clone(),
                addr,
                role,
            });
        }

        let topology = Self {
            name: name.to_string(),
            bridge_name: bridge.name.clone(),
            iface: bridge.interface_name.clone(),
            nodes,
            settings,
        };
        topology.validate_macs()?;
        Ok(topology)
    }

    fn validate_macs(&self) -> Result<(), ConfigError> {
        let kinds: BTreeSet<&'static str> = self
            .nodes
            .iter()
            .filter_map(|n| n.wireless())
            .map(|w| w.mac.kind())
            .collect();
        if kinds.len() > 1 {
            let list: Vec<&str> = kinds.into_iter().collect();
            return Err(ConfigError::MixedMac(list.join(", ")));
        }

        // TDMA assignments must name bridge members.
        let members: HashSet<&str> = self.nodes.iter().map(|n| n.name.as_str()).collect();
        for node in &self.nodes {
            if let Some(Wireless {
                mac: MacConfig::Tdma(tdma),
                ..
            }) = node.wireless()
            {
                if let TdmaSlots::Fixed(assignment) = &tdma.slots {
                    for owner in assignment.keys() {
                        if !members.contains(owner.as_str()) {
                            return Err(ConfigError::UnknownTdmaNode(owner.clone()));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Class minor of `node` as a destination, from its bridge-group index.
    pub fn class_minor(&self, node: &str) -> Option<u32> {
        self.nodes
            .iter()
            .position(|n| n.name == node)
            .map(sine_netem::dest_class_minor)
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn has_wireless(&self) -> bool {
        self.nodes.iter().any(|n| n.wireless().is_some())
    }
}

fn resolve_settings(s: &config::SettingsSection) -> Settings {
    let defaults = PhyOptions::default();
    Settings {
        channel_server_url: s
            .channel_server_url
            .clone()
            .unwrap_or_else(|| "http://127.0.0.1:8081".into()),
        channel_timeout: Duration::from_secs(s.channel_timeout_s.unwrap_or(5)),
        mobility_listen: s
            .mobility_listen
            .clone()
            .unwrap_or_else(|| "0.0.0.0:8001".into()),
        phy: PhyOptions {
            hysteresis_db: s.hysteresis_db.unwrap_or(defaults.hysteresis_db),
            spectral_efficiency: s
                .spectral_efficiency
                .unwrap_or(defaults.spectral_efficiency),
            packet_bits: s.packet_bits.unwrap_or(defaults.packet_bits),
            max_jitter_ms: s.max_jitter_ms.unwrap_or(defaults.max_jitter_ms),
            fallback_rate_mbps: s.fallback_rate_mbps.unwrap_or(defaults.fallback_rate_mbps),
            gain_mode: s.antenna_gain_mode.unwrap_or(AntennaGainMode::PathEmbedded),
        },
        correlation_pct: s.correlation_percent.unwrap_or(25.0),
        ceiling_mbps: s.ceiling_mbps.unwrap_or(1000.0),
        default_class_rate_mbps: s.default_class_rate_mbps.unwrap_or(1.0),
        epsilon: s.epsilon.unwrap_or_default(),
    }
}

fn resolve_role(
    node: &str,
    iface: &config::InterfaceSection,
    settings: &Settings,
    base_dir: &Path,
) -> Result<LinkRole, ConfigError> {
    // Fixed netem bypasses the PHY pipeline entirely.
    if let Some(fixed) = &iface.fixed_netem {
        return Ok(LinkRole::Fixed(Shaping {
            delay_ms: fixed.delay_ms,
            jitter_ms: fixed.jitter_ms,
            loss_pct: fixed.loss_percent,
            correlation_pct: fixed
                .correlation_percent
                .unwrap_or(settings.correlation_pct),
            rate_mbps: fixed.rate_mbps,
        }));
    }

    let Some(w) = &iface.wireless else {
        // A bare bridge member: transparent fixed link at the ceiling.
        return Ok(LinkRole::Fixed(Shaping {
            delay_ms: 0.0,
            jitter_ms: 0.0,
            loss_pct: 0.0,
            correlation_pct: settings.correlation_pct,
            rate_mbps: settings.ceiling_mbps,
        }));
    };

    let mac = match (&w.mac.csma, &w.mac.tdma) {
        (Some(_), Some(_)) => {
            return Err(ConfigError::AmbiguousMac {
                node: node.to_string(),
            })
        }
        (Some(csma), None) => MacConfig::Csma(csma.clone()),
        (None, Some(tdma)) => MacConfig::Tdma(tdma.clone()),
        (None, None) => MacConfig::None,
    };

    let mcs = if let Some(table_path) = &w.mcs_table {
        let full = base_dir.join(table_path);
        McsTable::from_csv_path(&full).map_err(|source| ConfigError::Phy {
            node: node.to_string(),
            source,
        })?
    } else if let Some(modulation) = &w.modulation {
        let modulation: Modulation = modulation.parse().map_err(|source| ConfigError::Phy {
            node: node.to_string(),
            source,
        })?;
        let code_rate = w
            .fec_code_rate
            .as_deref()
            .and_then(parse_code_rate)
            .unwrap_or(0.5);
        McsTable::single(modulation, code_rate)
    } else {
        DEFAULT_TABLE.clone()
    };

    Ok(LinkRole::Wireless(Box::new(Wireless {
        position: w.position,
        radio: Radio {
            frequency_hz: w.frequency,
            bandwidth_hz: w.bandwidth,
            tx_power_dbm: w.tx_power_dbm,
            noise_figure_db: w.noise_figure_db,
            antenna: w.antenna.pattern,
        },
        mcs,
        hysteresis_db: w
            .hysteresis_db
            .unwrap_or(settings.phy.hysteresis_db),
        mac,
    })))
}

fn parse_ipv4(cidr: &str) -> Option<Ipv4Addr> {
    let addr = cidr.split('/').next()?;
    addr.parse().ok()
}

fn parse_code_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        return (den != 0.0).then(|| num / den);
    }
    s.parse().ok()
}

//! Deployment lifecycle: all-or-nothing deploy with rollback, best-effort
//! destroy, and the long-running mobility server.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

use sine_channel::ChannelClient;
use sine_netem::{dest_class_minor, DestSlot, Netns, TcProgram};

use crate::api::{self, ApiState};
use crate::clab::{self, ClabError};
use crate::engine::{Engine, Event, LinkReport, NetemSink, ShapingSink};
use crate::model::{ConfigError, LinkRole, Topology};

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Bad topology or options. Exit code 1.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Channel server or container-lab unreachable. Exit code 3.
    #[error("external dependency unavailable: {0}")]
    External(String),
    /// Deployment failed and was rolled back. Exit code 2.
    #[error("deploy failed (topology rolled back): {0}")]
    Failed(String),
}

pub struct DeploySummary {
    pub lab: String,
    pub reports: Vec<LinkReport>,
}

impl DeploySummary {
    pub fn failed_links(&self) -> Vec<&LinkReport> {
        self.reports.iter().filter(|r| r.error.is_some()).collect()
    }

    /// Per-link table for the post-deploy report.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "lab `{}`: {} directed links", self.lab, self.reports.len());
        let _ = writeln!(
            out,
            "{:<10} {:<10} {:>8} {:>8} {:>5} {:>10} {:>8}",
            "tx", "rx", "snr", "sinr", "mcs", "rate", "loss"
        );
        for r in &self.reports {
            let _ = writeln!(
                out,
                "{:<10} {:<10} {:>8.1} {:>8.1} {:>5} {:>9.2}M {:>7.2}%{}",
                r.tx,
                r.rx,
                r.params.snr_db,
                r.params.sinr_db,
                r.params.mcs_index,
                r.params.rate_mbps,
                r.params.loss_pct,
                r.error
                    .as_deref()
                    .map(|e| format!("  FAILED: {e}"))
                    .unwrap_or_default(),
            );
        }
        out
    }
}

/// The base tc program of one node: a class, netem/tbf chain, and filter
/// per peer, plus the default class.
pub fn base_program(topology: &Topology, node: &str) -> TcProgram {
    TcProgram {
        dev: topology.iface.clone(),
        ceiling_mbps: topology.settings.ceiling_mbps,
        default_rate_mbps: topology.settings.default_class_rate_mbps,
        initial_rate_mbps: topology.settings.phy.fallback_rate_mbps,
        slots: topology
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.name != node)
            .map(|(index, n)| DestSlot {
                node: n.name.clone(),
                ip: n.addr.to_string(),
                class_minor: dest_class_minor(index),
            })
            .collect(),
    }
}

/// Deploy the topology: bridge, containers, base tc programs, initial link
/// parameters. Any fatal error tears down whatever was created.
pub async fn deploy(
    topology: Topology,
    channel_url: Option<String>,
) -> Result<DeploySummary, DeployError> {
    let url = channel_url.unwrap_or_else(|| topology.settings.channel_server_url.clone());
    let client = ChannelClient::new(&url, topology.settings.channel_timeout);
    if topology.has_wireless() && !client.healthy().await {
        return Err(DeployError::External(format!(
            "channel server at {url} is not responding"
        )));
    }

    let file = {
        let t = topology.clone();
        tokio::task::spawn_blocking(move || -> Result<std::path::PathBuf, DeployError> {
            sine_netem::namespace::ensure_bridge(&t.bridge_name)
                .map_err(|e| DeployError::Failed(e.to_string()))?;
            let file =
                clab::write_topology_file(&t).map_err(|e| DeployError::Failed(e.to_string()))?;
            clab::deploy(&file).map_err(|e| match e {
                ClabError::Missing => DeployError::External(e.to_string()),
                other => DeployError::Failed(other.to_string()),
            })?;
            Ok(file)
        })
        .await
        .map_err(|e| DeployError::Failed(e.to_string()))??
    };

    tracing::info!(lab = %topology.name, nodes = topology.nodes.len(), "containers deployed");

    match initialize(&topology, client).await {
        Ok(summary) => {
            let failed = summary.failed_links();
            if failed.is_empty() {
                Ok(summary)
            } else {
                let mut reason = format!("{} link(s) failed to initialize:\n", failed.len());
                for r in failed {
                    let _ = writeln!(
                        reason,
                        "  {} -> {}: {}",
                        r.tx,
                        r.rx,
                        r.error.as_deref().unwrap_or("unknown")
                    );
                }
                rollback(&topology, &file);
                Err(DeployError::Failed(reason))
            }
        }
        Err(reason) => {
            rollback(&topology, &file);
            Err(DeployError::Failed(reason))
        }
    }
}

async fn initialize(topology: &Topology, client: ChannelClient) -> Result<DeploySummary, String> {
    {
        let t = topology.clone();
        tokio::task::spawn_blocking(move || install_base(&t))
            .await
            .map_err(|e| e.to_string())??;
    }

    let sink: Arc<dyn ShapingSink> = Arc::new(NetemSink {
        lab: topology.name.clone(),
    });

    {
        let t = topology.clone();
        let sink = Arc::clone(&sink);
        tokio::task::spawn_blocking(move || push_fixed(&t, sink.as_ref()))
            .await
            .map_err(|e| e.to_string())??;
    }

    let positions = Arc::new(DashMap::new());
    let mut engine = Engine::new(topology.clone(), client, sink, positions);
    let reports = engine.recompute_all().await;
    Ok(DeploySummary {
        lab: topology.name.clone(),
        reports,
    })
}

/// Address the bridge interface and install the structural tc program in
/// every container.
fn install_base(topology: &Topology) -> Result<(), String> {
    for node in &topology.nodes {
        let ns = Netns::named(clab::node_netns(&topology.name, &node.name));

        let addr = ns
            .exec("ip", &["addr", "replace", &node.ip_cidr, "dev", &topology.iface])
            .map_err(|e| format!("{}: {e}", node.name))?;
        if !addr.status.success() {
            return Err(format!(
                "{}: failed to assign {}: {}",
                node.name,
                node.ip_cidr,
                String::from_utf8_lossy(&addr.stderr)
            ));
        }
        let up = ns
            .exec("ip", &["link", "set", &topology.iface, "up"])
            .map_err(|e| format!("{}: {e}", node.name))?;
        if !up.status.success() {
            return Err(format!(
                "{}: failed to bring {} up: {}",
                node.name,
                topology.iface,
                String::from_utf8_lossy(&up.stderr)
            ));
        }

        let program = base_program(topology, &node.name);
        sine_netem::install(&ns, &program).map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Fixed-netem interfaces get their configured parameters verbatim on
/// every destination class.
fn push_fixed(topology: &Topology, sink: &dyn ShapingSink) -> Result<(), String> {
    for node in &topology.nodes {
        let LinkRole::Fixed(shaping) = &node.role else {
            continue;
        };
        for dest in &topology.nodes {
            if dest.name == node.name {
                continue;
            }
            let Some(minor) = topology.class_minor(&dest.name) else {
                continue;
            };
            sink.push(&node.name, &topology.iface, minor, shaping)
                .map_err(|e| e.to_string())?;
        }
    }
    Ok(())
}

fn rollback(topology: &Topology, file: &Path) {
    tracing::warn!(lab = %topology.name, "rolling back deployment");
    if let Err(e) = clab::destroy(file) {
        tracing::warn!(error = %e, "containerlab destroy during rollback failed");
    }
    sine_netem::namespace::delete_bridge(&topology.bridge_name);
}

/// Best-effort teardown; safe to run repeatedly.
pub async fn destroy(topology: Topology) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || {
        let file = clab::write_topology_file(&topology)?;
        if let Err(e) = clab::destroy(&file) {
            tracing::warn!(error = %e, "containerlab destroy reported an error");
        }
        sine_netem::namespace::delete_bridge(&topology.bridge_name);
        Ok::<(), std::io::Error>(())
    })
    .await??;
    Ok(())
}

/// Run the mobility API against an already-deployed topology until SIGINT.
pub async fn mobility_server(
    topology: Topology,
    listen: Option<SocketAddr>,
    channel_url: Option<String>,
) -> anyhow::Result<()> {
    let url = channel_url.unwrap_or_else(|| topology.settings.channel_server_url.clone());
    let client = ChannelClient::new(&url, topology.settings.channel_timeout);
    if topology.has_wireless() && !client.healthy().await {
        return Err(DeployError::External(format!(
            "channel server at {url} is not responding"
        ))
        .into());
    }
    let listen = match listen {
        Some(addr) => addr,
        None => topology.settings.mobility_listen.parse()?,
    };

    let (event_tx, event_rx) = mpsc::channel(1024);
    let (teardown_tx, teardown_rx) = watch::channel(false);
    let positions = Arc::new(DashMap::new());
    let sink: Arc<dyn ShapingSink> = Arc::new(NetemSink {
        lab: topology.name.clone(),
    });

    let mut engine = Engine::new(topology.clone(), client, sink, Arc::clone(&positions));
    // Bring link state in line with current positions before serving.
    engine.recompute_all().await;
    let engine_task = tokio::spawn(engine.run(event_rx));

    let state = ApiState::new(&topology, event_tx.clone(), positions, teardown_rx);
    let listener = TcpListener::bind(listen).await?;
    tracing::info!(addr = %listen, "mobility API listening");
    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("received SIGINT, draining events and shutting down");
            let _ = teardown_tx.send(true);
            let _ = event_tx.send(Event::Shutdown).await;
        })
        .await?;

    let _ = engine_task.await;
    Ok(())
}

/// Query a running mobility server and format its node table.
pub async fn status(api_url: &str) -> anyhow::Result<String> {
    let base = api_url.trim_end_matches('/');
    let nodes: Vec<serde_json::Value> = reqwest::get(format!("{base}/api/nodes"))
        .await?
        .error_for_status()?
        .json()
        .await?;

    let mut out = String::new();
    let _ = writeln!(out, "{:<12} {:<24} {}", "node", "position", "wireless");
    for n in nodes {
        let name = n["node"].as_str().unwrap_or("?");
        let position = n["position"]
            .as_object()
            .map(|p| {
                format!(
                    "({:.1}, {:.1}, {:.1})",
                    p["x"].as_f64().unwrap_or(0.0),
                    p["y"].as_f64().unwrap_or(0.0),
                    p["z"].as_f64().unwrap_or(0.0)
                )
            })
            .unwrap_or_else(|| "-".into());
        let wireless = n["wireless"]
            .as_object()
            .map(|w| {
                format!(
                    "{:.2} GHz / {:.0} MHz",
                    w["frequency_hz"].as_f64().unwrap_or(0.0) / 1e9,
                    w["bandwidth_hz"].as_f64().unwrap_or(0.0) / 1e6
                )
            })
            .unwrap_or_else(|| "fixed".into());
        let _ = writeln!(out, "{name:<12} {position:<24} {wireless}");
    }
    Ok(out)
}

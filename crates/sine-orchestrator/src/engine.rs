//! Single-writer reactor.
//!
//! One task owns all mutable link state (applied parameters, sticky MCS
//! memory, cached propagation paths) and processes mobility events from a
//! bounded queue. Channel-server RPCs fan out concurrently; tc pushes are
//! sorted by `(tx, rx)` and serialized per transmitter namespace, with
//! different namespaces running in parallel. Nothing else ever touches
//! the tables.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use sine_channel::{AntennaSpec, ChannelClient, PathsRequest};
use sine_common::{Antenna, AntennaGainMode, LinkParams, Position};
use sine_netem::{Netns, Shaping, TcError};
use sine_phy::link::PhyOptions;
use sine_phy::mac::build_mac;
use sine_phy::{evaluate_link, Interferer, PropagationPath, DOWN_MCS};

use crate::clab;
use crate::model::{Topology, Wireless};

/// Reactor input. Position values live in the shared snapshot map, so a
/// burst of events for one node naturally coalesces into one recompute
/// against the latest position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    PositionChanged { node: String },
    Shutdown,
}

/// Seam between the reactor and the tc data plane.
pub trait ShapingSink: Send + Sync {
    fn push(
        &self,
        tx_node: &str,
        dev: &str,
        class_minor: u32,
        shaping: &Shaping,
    ) -> Result<(), TcError>;
}

/// Production sink: parameter updates into the node's container namespace.
pub struct NetemSink {
    pub lab: String,
}

impl ShapingSink for NetemSink {
    fn push(
        &self,
        tx_node: &str,
        dev: &str,
        class_minor: u32,
        shaping: &Shaping,
    ) -> Result<(), TcError> {
        let ns = Netns::named(clab::node_netns(&self.lab, tx_node));
        sine_netem::update(&ns, dev, class_minor, shaping)
    }
}

/// Outcome of one directed link in a recompute pass.
#[derive(Debug, Clone)]
pub struct LinkReport {
    pub tx: String,
    pub rx: String,
    pub params: LinkParams,
    pub pushed: bool,
    pub error: Option<String>,
}

pub struct Engine {
    topology: Topology,
    positions: Arc<DashMap<String, Position>>,
    client: ChannelClient,
    sink: Arc<dyn ShapingSink>,
    /// Sticky previous MCS per directed link. Reset on re-deploy.
    mcs_memory: HashMap<(String, String), i32>,
    /// Last parameters actually applied to tc.
    applied: HashMap<(String, String), LinkParams>,
    /// Last known propagation paths per directed pair; kept across failed
    /// fetches so a channel-server hiccup leaves links on their previous
    /// parameters.
    path_cache: HashMap<(String, String), Vec<PropagationPath>>,
}

impl Engine {
    pub fn new(
        topology: Topology,
        client: ChannelClient,
        sink: Arc<dyn ShapingSink>,
        positions: Arc<DashMap<String, Position>>,
    ) -> Self {
        for node in &topology.nodes {
            if let Some(w) = node.wireless() {
                positions.entry(node.name.clone()).or_insert(w.position);
            }
        }
        Self {
            topology,
            positions,
            client,
            sink,
            mcs_memory: HashMap::new(),
            applied: HashMap::new(),
            path_cache: HashMap::new(),
        }
    }

    pub fn applied(&self) -> &HashMap<(String, String), LinkParams> {
        &self.applied
    }

    /// Process events until the queue closes or a shutdown event arrives.
    /// Returns the engine so callers can inspect final state.
    pub async fn run(mut self, mut events: mpsc::Receiver<Event>) -> Self {
        while let Some(event) = events.recv().await {
            let mut shutdown = matches!(event, Event::Shutdown);
            let mut stale = matches!(event, Event::PositionChanged { .. });
            // Drain whatever queued up behind this event; interference is
            // global, so one pass covers every pending change.
            while let Ok(next) = events.try_recv() {
                match next {
                    Event::Shutdown => shutdown = true,
                    Event::PositionChanged { .. } => stale = true,
                }
            }
            if stale {
                let reports = self.recompute_all().await;
                tracing::debug!(links = reports.len(), "recompute pass complete");
            }
            if shutdown {
                break;
            }
        }
        tracing::info!("engine stopped");
        self
    }

    fn position_of(&self, node: &str, w: &Wireless) -> Position {
        self.positions
            .get(node)
            .map(|entry| *entry.value())
            .unwrap_or(w.position)
    }

    /// Refresh the path cache for every same-channel ordered pair. Failed
    /// fetches keep the previous entry and are logged, not retried; a
    /// newer mobility event will try again.
    async fn fetch_paths(&mut self) {
        let gain_mode = self.topology.settings.phy.gain_mode;
        let mut requests = Vec::new();
        for tx in &self.topology.nodes {
            let Some(tx_w) = tx.wireless() else { continue };
            let pattern = match gain_mode {
                AntennaGainMode::PathEmbedded => tx_w.radio.antenna,
                AntennaGainMode::LinkBudget => Antenna::Iso,
            };
            for rx in &self.topology.nodes {
                let Some(rx_w) = rx.wireless() else { continue };
                if tx.name == rx.name || !tx_w.radio.same_channel(&rx_w.radio) {
                    continue;
                }
                requests.push((
                    tx.name.clone(),
                    rx.name.clone(),
                    PathsRequest {
                        tx_position: self.position_of(&tx.name, tx_w),
                        rx_position: self.position_of(&rx.name, rx_w),
                        frequency_hz: tx_w.radio.frequency_hz,
                        bandwidth_hz: tx_w.radio.bandwidth_hz,
                        antenna: AntennaSpec { pattern },
                    },
                ));
            }
        }

        let client = self.client.clone();
        let fetches = requests.into_iter().map(|(tx, rx, request)| {
            let client = client.clone();
            async move {
                let result = client.paths(&request).await;
                (tx, rx, result)
            }
        });
        for (tx, rx, result) in futures::future::join_all(fetches).await {
            match result {
                Ok(paths) => {
                    self.path_cache.insert((tx, rx), paths);
                }
                Err(e) => {
                    tracing::warn!(
                        tx = %tx,
                        rx = %rx,
                        error = %e,
                        "path fetch failed, keeping previous channel state"
                    );
                }
            }
        }
    }

    /// Evaluate every wireless directed link and push the ones whose
    /// parameters moved past the configured epsilons.
    pub async fn recompute_all(&mut self) -> Vec<LinkReport> {
        self.fetch_paths().await;

        let mut reports = Vec::new();
        let mut to_push: Vec<(String, String, LinkParams)> = Vec::new();

        {
            let topology = &self.topology;
            let positions = &self.positions;
            let path_cache = &self.path_cache;
            let mcs_memory = &mut self.mcs_memory;
            let applied = &self.applied;

            let wireless: Vec<(&str, &Wireless)> = topology
                .nodes
                .iter()
                .filter_map(|n| n.wireless().map(|w| (n.name.as_str(), w)))
                .collect();
            let wireless_names: Vec<String> =
                wireless.iter().map(|(n, _)| n.to_string()).collect();
            let position_of = |node: &str, w: &Wireless| {
                positions
                    .get(node)
                    .map(|entry| *entry.value())
                    .unwrap_or(w.position)
            };

            for &(tx_name, tx_w) in &wireless {
                let mac = match build_mac(&tx_w.mac, &tx_w.radio, &wireless_names) {
                    Ok(mac) => mac,
                    Err(e) => {
                        tracing::error!(node = %tx_name, error = %e, "cannot build MAC model, skipping transmitter");
                        continue;
                    }
                };
                let opts = PhyOptions {
                    hysteresis_db: tx_w.hysteresis_db,
                    ..topology.settings.phy
                };
                let tx_pos = position_of(tx_name, tx_w);

                for &(rx_name, rx_w) in &wireless {
                    if rx_name == tx_name || !tx_w.radio.same_channel(&rx_w.radio) {
                        continue;
                    }
                    let key = (tx_name.to_string(), rx_name.to_string());
                    let Some(signal) = path_cache.get(&key) else {
                        // Never traced: the link keeps whatever was applied
                        // last, or stays down.
                        let params = applied
                            .get(&key)
                            .copied()
                            .unwrap_or_else(|| LinkParams::down(opts.fallback_rate_mbps));
                        reports.push(LinkReport {
                            tx: key.0,
                            rx: key.1,
                            params,
                            pushed: false,
                            error: Some("no channel state available".into()),
                        });
                        continue;
                    };

                    let mut interferers = Vec::new();
                    for &(i_name, i_w) in &wireless {
                        if i_name == tx_name
                            || i_name == rx_name
                            || !tx_w.radio.same_channel(&i_w.radio)
                        {
                            continue;
                        }
                        let Some(paths) =
                            path_cache.get(&(i_name.to_string(), rx_name.to_string()))
                        else {
                            continue;
                        };
                        interferers.push(Interferer {
                            node: i_name,
                            paths,
                            tx_power_dbm: i_w.radio.tx_power_dbm,
                            antenna: i_w.radio.antenna,
                            distance_to_tx_m: position_of(i_name, i_w).distance(&tx_pos),
                        });
                    }

                    let prev = mcs_memory.get(&key).copied().unwrap_or(DOWN_MCS);
                    let params = evaluate_link(
                        tx_name,
                        &tx_w.radio,
                        &rx_w.radio,
                        signal,
                        &interferers,
                        mac.as_ref(),
                        &tx_w.mcs,
                        prev,
                        &opts,
                    );
                    mcs_memory.insert(key.clone(), params.mcs_index);

                    let changed = applied
                        .get(&key)
                        .map(|last| params.differs_from(last, &topology.settings.epsilon))
                        .unwrap_or(true);
                    if changed {
                        to_push.push((key.0.clone(), key.1.clone(), params));
                    }
                    reports.push(LinkReport {
                        tx: key.0,
                        rx: key.1,
                        params,
                        pushed: changed,
                        error: None,
                    });
                }
            }
        }

        self.push_updates(&mut reports, to_push).await;
        reports
    }

    fn shaping_for(&self, params: &LinkParams) -> Shaping {
        Shaping {
            delay_ms: params.delay_ms,
            jitter_ms: params.jitter_ms,
            loss_pct: params.loss_pct,
            correlation_pct: self.topology.settings.correlation_pct,
            rate_mbps: params.rate_mbps,
        }
    }

    async fn push_updates(
        &mut self,
        reports: &mut [LinkReport],
        to_push: Vec<(String, String, LinkParams)>,
    ) {
        if to_push.is_empty() {
            return;
        }
        let mut sorted = to_push;
        sorted.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));

        // Group per transmitter: one namespace, pushes in (tx, rx) order.
        let mut groups: BTreeMap<String, Vec<(String, u32, Shaping, LinkParams)>> =
            BTreeMap::new();
        for (tx, rx, params) in sorted {
            let Some(minor) = self.topology.class_minor(&rx) else {
                continue;
            };
            let shaping = self.shaping_for(&params);
            groups.entry(tx).or_default().push((rx, minor, shaping, params));
        }

        let dev = self.topology.iface.clone();
        let mut handles = Vec::new();
        for (tx, items) in groups {
            let sink = Arc::clone(&self.sink);
            let dev = dev.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                let mut outcomes = Vec::new();
                for (rx, minor, shaping, params) in items {
                    let result = sink.push(&tx, &dev, minor, &shaping);
                    outcomes.push((tx.clone(), rx, params, result));
                }
                outcomes
            }));
        }

        for handle in handles {
            let outcomes = match handle.await {
                Ok(outcomes) => outcomes,
                Err(e) => {
                    tracing::error!(error = %e, "tc push task failed");
                    continue;
                }
            };
            for (tx, rx, params, result) in outcomes {
                match result {
                    Ok(()) => {
                        self.applied.insert((tx, rx), params);
                    }
                    Err(e) => {
                        tracing::warn!(
                            tx = %tx,
                            rx = %rx,
                            error = %e,
                            "tc update failed, previous parameters stay live"
                        );
                        if let Some(report) =
                            reports.iter_mut().find(|r| r.tx == tx && r.rx == rx)
                        {
                            report.pushed = false;
                            report.error = Some(e.to_string());
                        }
                    }
                }
            }
        }
    }
}

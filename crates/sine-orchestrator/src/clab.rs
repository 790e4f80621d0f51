//! Container-lab integration.
//!
//! Generates the container-lab topology file for a shared-bridge scene and
//! shells out to `containerlab` for container lifecycle. Container-lab
//! publishes each container's network namespace as
//! `/run/netns/clab-<lab>-<node>`, which is where the tc layer operates.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;

use crate::model::Topology;

#[derive(Debug, thiserror::Error)]
pub enum ClabError {
    #[error("containerlab is not installed or not on PATH")]
    Missing,
    #[error("containerlab {action} failed: {stderr}")]
    Failed { action: String, stderr: String },
    #[error("failed to run containerlab: {0}")]
    Io(#[from] std::io::Error),
}

/// Namespace name of a deployed node.
pub fn node_netns(lab: &str, node: &str) -> String {
    format!("clab-{lab}-{node}")
}

#[derive(Serialize)]
struct ClabFile {
    name: String,
    topology: ClabTopology,
}

#[derive(Serialize)]
struct ClabTopology {
    nodes: BTreeMap<String, ClabNode>,
    links: Vec<ClabLink>,
}

#[derive(Serialize)]
struct ClabNode {
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
}

#[derive(Serialize)]
struct ClabLink {
    endpoints: [String; 2],
}

/// Render the container-lab topology: one linux container per node plus
/// the shared bridge, each node wired to it on the bridge interface.
pub fn topology_yaml(topo: &Topology) -> Result<String, serde_yaml::Error> {
    let mut nodes = BTreeMap::new();
    nodes.insert(
        topo.bridge_name.clone(),
        ClabNode {
            kind: "bridge".into(),
            image: None,
        },
    );
    for node in &topo.nodes {
        nodes.insert(
            node.name.clone(),
            ClabNode {
                kind: "linux".into(),
                image: Some(node.image.clone()),
            },
        );
    }

    let links = topo
        .nodes
        .iter()
        .map(|node| ClabLink {
            endpoints: [
                format!("{}:{}", node.name, topo.iface),
                format!("{}:{}-{}", topo.bridge_name, node.name, topo.iface),
            ],
        })
        .collect();

    serde_yaml::to_string(&ClabFile {
        name: topo.name.clone(),
        topology: ClabTopology { nodes, links },
    })
}

/// Write the rendered topology next to the working directory and return
/// its path. `destroy` regenerates the same file, so the path only needs
/// to be stable per lab name.
pub fn write_topology_file(topo: &Topology) -> std::io::Result<PathBuf> {
    let yaml = topology_yaml(topo).map_err(std::io::Error::other)?;
    let path = PathBuf::from(format!("{}.clab.yml", topo.name));
    std::fs::write(&path, yaml)?;
    Ok(path)
}

fn run(action: &str, args: &[&str]) -> Result<(), ClabError> {
    let output = Command::new("sudo").arg("containerlab").args(args).output()?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if stderr.contains("command not found") || stderr.contains("No such file") {
        return Err(ClabError::Missing);
    }
    Err(ClabError::Failed {
        action: action.to_string(),
        stderr,
    })
}

pub fn deploy(file: &Path) -> Result<(), ClabError> {
    let file = file.to_string_lossy();
    run(
        "deploy",
        &["deploy", "--topo", &file, "--reconfigure"],
    )
}

pub fn destroy(file: &Path) -> Result<(), ClabError> {
    let file = file.to_string_lossy();
    run("destroy", &["destroy", "--topo", &file, "--cleanup"])
}

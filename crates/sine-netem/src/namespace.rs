//! Command execution inside a named network namespace.
//!
//! Container-lab publishes each container's namespace under
//! `/run/netns/clab-<lab>-<node>`, so the orchestrator can drive tc with
//! plain `ip netns exec`. Host-side commands (bridge management) go
//! through [`host_exec`].

use std::io;
use std::process::{Command, Output};

/// A named network namespace. Does not own the namespace lifecycle —
/// container-lab creates and removes it with the container.
#[derive(Debug, Clone)]
pub struct Netns {
    pub name: String,
}

impl Netns {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn exec(&self, cmd: &str, args: &[&str]) -> io::Result<Output> {
        Command::new("sudo")
            .args(["ip", "netns", "exec", &self.name, cmd])
            .args(args)
            .output()
    }
}

/// Run a command on the host (outside any namespace).
pub fn host_exec(cmd: &str, args: &[&str]) -> io::Result<Output> {
    Command::new("sudo").arg(cmd).args(args).output()
}

/// Create the shared L2 bridge if it does not exist and bring it up.
pub fn ensure_bridge(name: &str) -> io::Result<()> {
    let exists = host_exec("ip", &["link", "show", name])?;
    if !exists.status.success() {
        let out = host_exec("ip", &["link", "add", "name", name, "type", "bridge"])?;
        if !out.status.success() {
            return Err(io::Error::other(format!(
                "failed to create bridge {name}: {}",
                String::from_utf8_lossy(&out.stderr)
            )));
        }
    }
    let out = host_exec("ip", &["link", "set", name, "up"])?;
    if !out.status.success() {
        return Err(io::Error::other(format!(
            "failed to bring up bridge {name}: {}",
            String::from_utf8_lossy(&out.stderr)
        )));
    }
    Ok(())
}

/// Remove the shared bridge, ignoring a missing link.
pub fn delete_bridge(name: &str) {
    let _ = host_exec("ip", &["link", "del", name]);
}

//! Applying tc programs inside a namespace.
//!
//! Structural failures (the class/filter skeleton cannot be built) are
//! fatal and abort the deployment. Update failures (a parameter push onto
//! an existing class) are retried up to three times with exponential
//! backoff; after that the previous parameters stay live and the caller
//! logs the error. Classes this crate did not create are never removed.

use std::time::Duration;

use crate::namespace::Netns;
use crate::program::{Shaping, TcProgram};

const UPDATE_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum TcError {
    #[error("structural tc failure in {ns}: `tc {cmd}`: {stderr}")]
    Structural {
        ns: String,
        cmd: String,
        stderr: String,
    },
    #[error("update failed in {ns} on class 1:{minor} after {attempts} attempts: {stderr}")]
    Update {
        ns: String,
        minor: u32,
        attempts: u32,
        stderr: String,
    },
    #[error("failed to run tc in {ns}: {source}")]
    Exec {
        ns: String,
        #[source]
        source: std::io::Error,
    },
}

fn run_tc(ns: &Netns, cmd: &[String]) -> Result<Result<(), String>, TcError> {
    let argv: Vec<&str> = cmd.iter().map(|s| s.as_str()).collect();
    let output = ns.exec("tc", &argv).map_err(|source| TcError::Exec {
        ns: ns.name.clone(),
        source,
    })?;
    if output.status.success() {
        Ok(Ok(()))
    } else {
        Ok(Err(String::from_utf8_lossy(&output.stderr).into_owned()))
    }
}

/// Install the structural program, replacing whatever hierarchy the
/// interface carried before. Fatal on the first failing command.
pub fn install(ns: &Netns, program: &TcProgram) -> Result<(), TcError> {
    // Clear any previous root qdisc; absence is not an error.
    let _ = ns.exec("tc", &["qdisc", "del", "dev", &program.dev, "root"]);

    for cmd in program.install_commands() {
        if let Err(stderr) = run_tc(ns, &cmd)? {
            return Err(TcError::Structural {
                ns: ns.name.clone(),
                cmd: cmd.join(" "),
                stderr,
            });
        }
    }
    tracing::debug!(ns = %ns.name, dev = %program.dev, classes = program.slots.len(), "tc program installed");
    Ok(())
}

/// Push new parameters onto one destination class, retrying transient
/// failures. The class topology is never modified here.
pub fn update(ns: &Netns, dev: &str, class_minor: u32, shaping: &Shaping) -> Result<(), TcError> {
    let cmds = TcProgram::update_commands(dev, class_minor, shaping);
    let mut last_stderr = String::new();

    for attempt in 0..UPDATE_ATTEMPTS {
        if attempt > 0 {
            std::thread::sleep(BACKOFF_BASE * 2u32.pow(attempt - 1));
        }
        let mut failed = None;
        for cmd in &cmds {
            if let Err(stderr) = run_tc(ns, cmd)? {
                failed = Some(stderr);
                break;
            }
        }
        match failed {
            None => return Ok(()),
            Some(stderr) => {
                tracing::warn!(
                    ns = %ns.name,
                    minor = class_minor,
                    attempt = attempt + 1,
                    error = %stderr.trim(),
                    "tc update failed"
                );
                last_stderr = stderr;
            }
        }
    }

    Err(TcError::Update {
        ns: ns.name.clone(),
        minor: class_minor,
        attempts: UPDATE_ATTEMPTS,
        stderr: last_stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{dest_class_minor, DestSlot};
    use std::process::Command;

    fn check_privileges() -> bool {
        match Command::new("sudo").args(["ip", "netns"]).output() {
            Ok(o) => o.status.success(),
            Err(_) => false,
        }
    }

    /// Privileged round trip: veth into a scratch namespace, install the
    /// program, push an update, verify the qdisc tree.
    #[test]
    fn install_and_update_round_trip() {
        if !check_privileges() {
            eprintln!("Skipping install_and_update_round_trip, insufficient privileges");
            return;
        }

        let ns_name = format!("sine_tc_{}", std::process::id());
        let _ = Command::new("sudo")
            .args(["ip", "netns", "del", &ns_name])
            .output();
        let ok = Command::new("sudo")
            .args(["ip", "netns", "add", &ns_name])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
        if !ok {
            eprintln!("Skipping, could not create namespace");
            return;
        }
        let ns = Netns::named(ns_name.clone());
        let _ = ns.exec("ip", &["link", "set", "lo", "up"]);
        let _ = ns.exec("ip", &["link", "add", "eth1", "type", "dummy"]);
        let _ = ns.exec("ip", &["link", "set", "eth1", "up"]);

        let program = TcProgram {
            dev: "eth1".into(),
            ceiling_mbps: 1000.0,
            default_rate_mbps: 1.0,
            initial_rate_mbps: 0.1,
            slots: vec![
                DestSlot {
                    node: "n2".into(),
                    ip: "10.0.0.2".into(),
                    class_minor: dest_class_minor(0),
                },
                DestSlot {
                    node: "n3".into(),
                    ip: "10.0.0.3".into(),
                    class_minor: dest_class_minor(1),
                },
            ],
        };

        let result = install(&ns, &program);
        if let Err(e) = &result {
            let _ = Command::new("sudo")
                .args(["ip", "netns", "del", &ns_name])
                .output();
            panic!("install failed: {e}");
        }

        let shaping = Shaping {
            delay_ms: 10.0,
            jitter_ms: 1.0,
            loss_pct: 2.5,
            correlation_pct: 25.0,
            rate_mbps: 50.0,
        };
        let updated = update(&ns, "eth1", dest_class_minor(0), &shaping);

        let qdiscs = ns.exec("tc", &["qdisc", "show", "dev", "eth1"]).unwrap();
        let listing = String::from_utf8_lossy(&qdiscs.stdout).into_owned();

        let _ = Command::new("sudo")
            .args(["ip", "netns", "del", &ns_name])
            .output();

        updated.expect("update failed");
        assert!(listing.contains("htb"), "listing: {listing}");
        assert!(listing.contains("netem"), "listing: {listing}");
        assert!(listing.contains("tbf"), "listing: {listing}");
    }
}

//! Deterministic tc program synthesis.
//!
//! Per node, on its shared-bridge interface:
//!
//! ```text
//! qdisc htb 1: root                      default 99
//!   class 1:1                            rate <ceiling>
//!     class 1:<10+i>  (per destination)  rate/ceil <rate_i>
//!       qdisc netem <100+i>:             delay/jitter/loss
//!         qdisc tbf <200+i>:             rate <rate_i>
//!     class 1:99      (default)          rate <default-rate>
//!       qdisc netem 199:                 no impairment
//! filter flower dst_ip <ip_i> → 1:<10+i>
//! ```
//!
//! Class minors come from the destination's index in the bridge group and
//! never change while the topology is stable; updates touch only the class
//! rate, the netem parameters, and the tbf rate. Ids are rendered as
//! decimal strings and used consistently on install and update.

/// Class minor of the i-th destination in the bridge group.
pub fn dest_class_minor(index: usize) -> u32 {
    10 + index as u32
}

/// Minor of the catch-all class (broadcast, multicast, unknown).
pub const DEFAULT_CLASS_MINOR: u32 = 99;

fn netem_handle(minor: u32) -> u32 {
    100 + minor
}

fn tbf_handle(minor: u32) -> u32 {
    200 + minor
}

/// Netem-visible parameters of one destination class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shaping {
    pub delay_ms: f64,
    pub jitter_ms: f64,
    pub loss_pct: f64,
    pub correlation_pct: f64,
    pub rate_mbps: f64,
}

/// One destination of a node: a peer on the same bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct DestSlot {
    pub node: String,
    /// Destination IP without prefix, matched by the flower filter.
    pub ip: String,
    pub class_minor: u32,
}

/// The full structural program of one node's interface.
#[derive(Debug, Clone, PartialEq)]
pub struct TcProgram {
    pub dev: String,
    /// Rate of the ceiling class 1:1.
    pub ceiling_mbps: f64,
    /// Rate of the default class 1:99.
    pub default_rate_mbps: f64,
    /// Rate destination classes start at until the first update.
    pub initial_rate_mbps: f64,
    pub slots: Vec<DestSlot>,
}

fn kbit(rate_mbps: f64) -> String {
    format!("{}kbit", (rate_mbps * 1000.0).round().max(1.0) as u64)
}

fn micros(ms: f64) -> String {
    format!("{}us", (ms * 1000.0).round().max(0.0) as u64)
}

fn pct(v: f64) -> String {
    format!("{:.4}%", v.clamp(0.0, 100.0))
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

impl TcProgram {
    /// Commands that build the class/filter skeleton. Applied once at
    /// deploy; any failure is structural and aborts the deployment.
    pub fn install_commands(&self) -> Vec<Vec<String>> {
        let dev = self.dev.as_str();
        let mut cmds = Vec::new();

        cmds.push(args(&[
            "qdisc", "add", "dev", dev, "root", "handle", "1:", "htb", "default", "99",
        ]));
        cmds.push(args(&[
            "class", "add", "dev", dev, "parent", "1:", "classid", "1:1", "htb", "rate",
            &kbit(self.ceiling_mbps),
        ]));

        for slot in &self.slots {
            let classid = format!("1:{}", slot.class_minor);
            let rate = kbit(self.initial_rate_mbps);
            cmds.push(args(&[
                "class", "add", "dev", dev, "parent", "1:1", "classid", &classid, "htb", "rate",
                &rate, "ceil", &rate,
            ]));
            let netem = format!("{}:", netem_handle(slot.class_minor));
            cmds.push(args(&[
                "qdisc", "add", "dev", dev, "parent", &classid, "handle", &netem, "netem",
                "delay", "0us",
            ]));
            let netem_child = format!("{}:1", netem_handle(slot.class_minor));
            let tbf = format!("{}:", tbf_handle(slot.class_minor));
            cmds.push(args(&[
                "qdisc", "add", "dev", dev, "parent", &netem_child, "handle", &tbf, "tbf",
                "rate", &rate, "burst", "32kbit", "latency", "400ms",
            ]));
        }

        let default_classid = format!("1:{DEFAULT_CLASS_MINOR}");
        cmds.push(args(&[
            "class", "add", "dev", dev, "parent", "1:1", "classid", &default_classid, "htb",
            "rate", &kbit(self.default_rate_mbps),
        ]));
        let default_netem = format!("{}:", netem_handle(DEFAULT_CLASS_MINOR));
        cmds.push(args(&[
            "qdisc", "add", "dev", dev, "parent", &default_classid, "handle", &default_netem,
            "netem", "delay", "0us",
        ]));

        for slot in &self.slots {
            let classid = format!("1:{}", slot.class_minor);
            cmds.push(args(&[
                "filter", "add", "dev", dev, "parent", "1:", "protocol", "ip", "prio", "1",
                "flower", "dst_ip", &slot.ip, "classid", &classid,
            ]));
        }

        cmds
    }

    /// The three commands that push new parameters onto one destination
    /// class. Everything else stays untouched.
    pub fn update_commands(dev: &str, class_minor: u32, shaping: &Shaping) -> Vec<Vec<String>> {
        let classid = format!("1:{class_minor}");
        let rate = kbit(shaping.rate_mbps);
        let netem = format!("{}:", netem_handle(class_minor));
        let netem_parent = format!("1:{class_minor}");
        let tbf = format!("{}:", tbf_handle(class_minor));
        let netem_child = format!("{}:1", netem_handle(class_minor));
        vec![
            args(&[
                "class", "change", "dev", dev, "parent", "1:1", "classid", &classid, "htb",
                "rate", &rate, "ceil", &rate,
            ]),
            args(&[
                "qdisc", "change", "dev", dev, "parent", &netem_parent, "handle", &netem,
                "netem", "delay", &micros(shaping.delay_ms), &micros(shaping.jitter_ms),
                "loss", &pct(shaping.loss_pct), &pct(shaping.correlation_pct),
            ]),
            args(&[
                "qdisc", "change", "dev", dev, "parent", &netem_child, "handle", &tbf, "tbf",
                "rate", &rate, "burst", "32kbit", "latency", "400ms",
            ]),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(n_destinations: usize) -> TcProgram {
        TcProgram {
            dev: "eth1".into(),
            ceiling_mbps: 1000.0,
            default_rate_mbps: 1.0,
            initial_rate_mbps: 0.1,
            slots: (0..n_destinations)
                .map(|i| DestSlot {
                    node: format!("n{}", i + 2),
                    ip: format!("10.0.0.{}", i + 2),
                    class_minor: dest_class_minor(i),
                })
                .collect(),
        }
    }

    #[test]
    fn program_is_deterministic() {
        let a = program(3).install_commands();
        let b = program(3).install_commands();
        assert_eq!(a, b);
    }

    #[test]
    fn class_count_for_bridge_group() {
        // N = 4 nodes → each holds 3 destination classes + 1 default.
        let cmds = program(3).install_commands();
        let class_adds = cmds
            .iter()
            .filter(|c| c[0] == "class" && c[1] == "add" && c.contains(&"1:1".to_string()))
            .count();
        // 3 destinations + default, all children of 1:1... plus 1:1 itself
        // is parented at 1:.
        let dest_and_default = cmds
            .iter()
            .filter(|c| c[0] == "class" && c[1] == "add" && c[4] == "parent" && c[5] == "1:1")
            .count();
        assert_eq!(dest_and_default, 4);
        assert!(class_adds >= 4);
    }

    #[test]
    fn filters_match_destination_ips() {
        let cmds = program(2).install_commands();
        let filters: Vec<_> = cmds.iter().filter(|c| c[0] == "filter").collect();
        assert_eq!(filters.len(), 2);
        assert!(filters[0].contains(&"10.0.0.2".to_string()));
        assert!(filters[0].contains(&"1:10".to_string()));
        assert!(filters[1].contains(&"10.0.0.3".to_string()));
        assert!(filters[1].contains(&"1:11".to_string()));
    }

    #[test]
    fn root_defaults_to_99() {
        let cmds = program(1).install_commands();
        assert_eq!(
            cmds[0],
            vec![
                "qdisc", "add", "dev", "eth1", "root", "handle", "1:", "htb", "default", "99"
            ]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()
        );
    }

    #[test]
    fn update_touches_only_the_class_chain() {
        let shaping = Shaping {
            delay_ms: 0.07,
            jitter_ms: 0.01,
            loss_pct: 0.5,
            correlation_pct: 25.0,
            rate_mbps: 192.0,
        };
        let cmds = TcProgram::update_commands("eth1", 10, &shaping);
        assert_eq!(cmds.len(), 3);
        assert_eq!(cmds[0][1], "change");
        assert!(cmds[0].contains(&"1:10".to_string()));
        assert!(cmds[1].contains(&"110:".to_string()));
        assert!(cmds[1].contains(&"70us".to_string()));
        assert!(cmds[1].contains(&"0.5000%".to_string()));
        assert!(cmds[1].contains(&"25.0000%".to_string()));
        assert!(cmds[2].contains(&"210:".to_string()));
        assert!(cmds[2].contains(&"192000kbit".to_string()));
    }

    #[test]
    fn rates_floor_at_one_kbit() {
        assert_eq!(kbit(0.0), "1kbit");
        assert_eq!(kbit(0.1), "100kbit");
    }
}

//! SVG plan view of a topology.
//!
//! Raster output is left to external tooling; the emitted SVG is
//! self-contained and deterministic.

use std::fmt::Write as _;

use crate::model::Topology;

const CANVAS: f64 = 640.0;
const MARGIN: f64 = 60.0;

pub fn render_svg(topology: &Topology) -> String {
    let placed: Vec<(&str, f64, f64)> = topology
        .nodes
        .iter()
        .filter_map(|n| n.wireless().map(|w| (n.name.as_str(), w.position.x, w.position.y)))
        .collect();

    let (min_x, max_x, min_y, max_y) = placed.iter().fold(
        (0.0f64, 1.0f64, 0.0f64, 1.0f64),
        |(lx, hx, ly, hy), (_, x, y)| (lx.min(*x), hx.max(*x), ly.min(*y), hy.max(*y)),
    );
    let span = (max_x - min_x).max(max_y - min_y).max(1.0);
    let scale = (CANVAS - 2.0 * MARGIN) / span;
    let project = |x: f64, y: f64| {
        (
            MARGIN + (x - min_x) * scale,
            CANVAS - MARGIN - (y - min_y) * scale,
        )
    };

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{CANVAS}" height="{CANVAS}" viewBox="0 0 {CANVAS} {CANVAS}">"#
    );
    let _ = writeln!(
        svg,
        r#"<rect width="100%" height="100%" fill="white"/><text x="{MARGIN}" y="30" font-family="monospace" font-size="16">{} — bridge {}</text>"#,
        topology.name, topology.bridge_name
    );

    for (name, x, y) in &placed {
        let (px, py) = project(*x, *y);
        let _ = writeln!(
            svg,
            r#"<circle cx="{px:.1}" cy="{py:.1}" r="7" fill="steelblue"/><text x="{:.1}" y="{:.1}" font-family="monospace" font-size="12">{name} ({x:.0}, {y:.0})</text>"#,
            px + 10.0,
            py + 4.0
        );
    }

    let fixed: Vec<&str> = topology
        .nodes
        .iter()
        .filter(|n| n.wireless().is_none())
        .map(|n| n.name.as_str())
        .collect();
    if !fixed.is_empty() {
        let _ = writeln!(
            svg,
            r#"<text x="{MARGIN}" y="{:.1}" font-family="monospace" font-size="12">fixed: {}</text>"#,
            CANVAS - 20.0,
            fixed.join(", ")
        );
    }

    svg.push_str("</svg>\n");
    svg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Topology;
    use std::path::Path;

    #[test]
    fn renders_all_wireless_nodes() {
        let yaml = r#"
topology:
  shared_bridge:
    nodes: [n1, n2]
  nodes:
    n1:
      interfaces:
        eth1: {ip_address: 10.0.0.1/24, wireless: {position: {x: 0, y: 0, z: 1}}}
    n2:
      interfaces:
        eth1: {ip_address: 10.0.0.2/24, wireless: {position: {x: 20, y: 30, z: 1}}}
"#;
        let file = serde_yaml::from_str(yaml).unwrap();
        let topo = Topology::resolve(file, "demo", Path::new(".")).unwrap();
        let svg = render_svg(&topo);
        assert!(svg.contains("<svg"));
        assert!(svg.contains("n1 (0, 0)"));
        assert!(svg.contains("n2 (20, 30)"));
        // Deterministic output.
        assert_eq!(svg, render_svg(&topo));
    }
}

//! `polypus check`: validate a topology and show how it resolves

use crate::config;
use crate::sse::StreamSource;
use anyhow::Result;
use serde::Serialize;
use shared::Topology;
use std::path::Path;

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeReport {
    pub id: String,
    pub addr: String,
    pub color: String,
    pub color_configured: bool,
    pub streams: Vec<String>,
}

pub fn build_report(topology: &Topology) -> Vec<NodeReport> {
    let book = topology.address_book();
    let streams = StreamSource::all(topology);
    topology
        .nodes
        .iter()
        .map(|node| NodeReport {
            id: book.resolve(&node.addr).unwrap_or(node.id.as_str()).to_string(),
            addr: node.addr.clone(),
            color: topology.color_of(&node.id).unwrap_or_default(),
            color_configured: node.color.is_some(),
            streams: streams
                .iter()
                .filter(|source| source.node_id == node.id)
                .map(|source| source.url.clone())
                .collect(),
        })
        .collect()
}

pub fn run_check(path: &Path, json: bool) -> Result<()> {
    let topology = config::load_topology(path)?;
    let report = build_report(&topology);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("✅ {} is valid: {} node(s)", path.display(), report.len());
    for node in &report {
        let origin = if node.color_configured { "" } else { " (palette)" };
        println!("  {:<24} -> {}  {}{}", node.addr, node.id, node.color, origin);
        for url in &node.streams {
            println!("      {url}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_lists_resolution_and_streams() {
        let topology = Topology::from_json_str(
            r##"{"nodes": [
                {"id": "A", "addr": "127.0.0.1:2001", "proxy": "http://127.0.0.1:8081"},
                {"id": "B", "addr": "127.0.0.1:2002", "proxy": "http://127.0.0.1:8082", "color": "#000000"}
            ]}"##,
        )
        .unwrap();

        let report = build_report(&topology);
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].id, "A");
        assert_eq!(report[0].color, shared::FALLBACK_PALETTE[0]);
        assert!(!report[0].color_configured);
        assert_eq!(
            report[1].streams,
            vec!["http://127.0.0.1:8082/sent", "http://127.0.0.1:8082/recv"]
        );
        assert!(report[1].color_configured);
    }
}

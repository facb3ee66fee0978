//! Inspect the published NetworkTopology

use crate::output::{
    color_cost, color_health_score, color_status, format_age, format_bandwidth, format_latency,
    print_info, print_json, print_table, OutputFormat,
};
use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use kube::{Api, Client};
use meshsched_lib::topology::{NetworkTopology, NetworkTopologySpec};
use std::collections::BTreeSet;
use tabled::Tabled;

/// One row per node in `topology show`
#[derive(Debug, Tabled, PartialEq)]
pub struct NodeRow {
    #[tabled(rename = "Node")]
    pub node: String,
    #[tabled(rename = "Zone")]
    pub zone: String,
    #[tabled(rename = "Capabilities")]
    pub capabilities: String,
    #[tabled(rename = "Peers")]
    pub peers: usize,
    #[tabled(rename = "Max BW")]
    pub max_bandwidth: String,
    #[tabled(rename = "Min Latency")]
    pub min_latency: String,
    #[tabled(rename = "Min Cost")]
    pub min_cost: String,
}

/// One row per target in `topology paths`
#[derive(Debug, Tabled, PartialEq)]
pub struct PathRow {
    #[tabled(rename = "Target")]
    pub target: String,
    #[tabled(rename = "Bandwidth")]
    pub bandwidth: String,
    #[tabled(rename = "Latency")]
    pub latency: String,
    #[tabled(rename = "Cost")]
    pub cost: String,
}

async fn fetch(client: Client, name: &str) -> Result<NetworkTopology> {
    let api: Api<NetworkTopology> = Api::all(client);
    api.get_opt(name)
        .await
        .with_context(|| format!("Failed to read NetworkTopology {}", name))?
        .with_context(|| format!("NetworkTopology {} not found; is the controller running?", name))
}

pub fn node_rows(spec: &NetworkTopologySpec) -> Vec<NodeRow> {
    spec.nodes
        .iter()
        .map(|(name, profile)| NodeRow {
            node: name.clone(),
            zone: profile.zone.clone().unwrap_or_else(|| "-".to_string()),
            capabilities: if profile.capabilities.is_empty() {
                "-".to_string()
            } else {
                profile
                    .capabilities
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(",")
            },
            peers: profile.bandwidth.len(),
            max_bandwidth: format_bandwidth(profile.max_bandwidth()),
            min_latency: format_latency(profile.min_latency()),
            min_cost: color_cost(profile.min_cost()),
        })
        .collect()
}

/// Rows for every target measured from `source`, sorted by target name
pub fn path_rows(spec: &NetworkTopologySpec, source: &str) -> Option<Vec<PathRow>> {
    let profile = spec.profile(source)?;
    let targets: BTreeSet<&String> = profile
        .bandwidth
        .keys()
        .chain(profile.latency.keys())
        .chain(profile.cost.keys())
        .collect();

    Some(
        targets
            .into_iter()
            .map(|target| PathRow {
                target: target.clone(),
                bandwidth: profile
                    .bandwidth
                    .get(target)
                    .map(|bw| format_bandwidth(*bw))
                    .unwrap_or_else(|| "-".to_string()),
                latency: format_latency(profile.latency.get(target).copied()),
                cost: color_cost(profile.cost.get(target).copied()),
            })
            .collect(),
    )
}

/// `meshctl topology show`
pub async fn show(client: Client, name: &str, format: OutputFormat) -> Result<()> {
    let topology = fetch(client, name).await?;

    match format {
        OutputFormat::Json => print_json(&topology.spec)?,
        OutputFormat::Table => {
            let spec = &topology.spec;
            println!("{}", format!("NetworkTopology {}", name).bold());
            println!("{}", "=".repeat(60));
            println!(
                "Updated: {} ago    Nodes: {}    Measurements: {}    Health: {}",
                format_age(spec.last_updated, Utc::now()),
                spec.node_count,
                spec.measurement_count,
                color_health_score(spec.health_score),
            );
            if let Some(ready) = spec.ready_condition() {
                println!(
                    "Ready: {} ({})",
                    color_status(&ready.status),
                    ready.message
                );
            }
            println!();
            print_table(node_rows(spec), "Topology has no nodes yet");
        }
    }

    Ok(())
}

/// `meshctl topology paths <node>`
pub async fn paths(client: Client, name: &str, node: &str, format: OutputFormat) -> Result<()> {
    let topology = fetch(client, name).await?;
    let profile = topology
        .spec
        .profile(node)
        .with_context(|| format!("Node {} is not part of NetworkTopology {}", node, name))?;

    match format {
        OutputFormat::Json => print_json(profile)?,
        OutputFormat::Table => {
            print_info(&format!("Paths measured from {}", node));
            let rows = path_rows(&topology.spec, node).unwrap_or_default();
            print_table(rows, "No paths measured from this node");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshsched_lib::models::NodeNetworkProfile;

    fn spec() -> NetworkTopologySpec {
        let mut worker = NodeNetworkProfile {
            zone: Some("zone-a".to_string()),
            ..Default::default()
        };
        worker.bandwidth.insert("gpu-1".to_string(), 2500);
        worker.latency.insert("gpu-1".to_string(), 1);
        worker.cost.insert("gpu-1".to_string(), 0.7);
        worker.latency.insert("edge-1".to_string(), 40);
        worker.capabilities.insert("low-latency".to_string());

        let mut spec = NetworkTopologySpec {
            node_count: 2,
            ..Default::default()
        };
        spec.nodes.insert("worker-1".to_string(), worker);
        spec.nodes.insert("gpu-1".to_string(), NodeNetworkProfile::default());
        spec
    }

    #[test]
    fn test_node_rows_summarise_profiles() {
        let rows = node_rows(&spec());

        assert_eq!(rows.len(), 2);
        // BTreeMap order
        assert_eq!(rows[0].node, "gpu-1");
        assert_eq!(rows[0].zone, "-");
        assert_eq!(rows[0].capabilities, "-");
        assert_eq!(rows[0].min_latency, "-");

        assert_eq!(rows[1].node, "worker-1");
        assert_eq!(rows[1].peers, 1);
        assert_eq!(rows[1].max_bandwidth, "2.5Gbps");
        assert_eq!(rows[1].min_latency, "1ms");
        assert_eq!(rows[1].capabilities, "low-latency");
    }

    #[test]
    fn test_path_rows_include_partial_measurements() {
        let rows = path_rows(&spec(), "worker-1").unwrap();

        let targets: Vec<_> = rows.iter().map(|r| r.target.as_str()).collect();
        assert_eq!(targets, vec!["edge-1", "gpu-1"]);
        assert_eq!(rows[0].bandwidth, "-");
        assert_eq!(rows[0].latency, "40ms");
        assert_eq!(rows[1].bandwidth, "2.5Gbps");
    }

    #[test]
    fn test_path_rows_unknown_node() {
        assert!(path_rows(&spec(), "missing").is_none());
    }
}

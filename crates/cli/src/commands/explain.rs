//! Dry-run the scheduling framework for one pod
//!
//! Runs the same filter and score plugins as the scheduler against the live
//! node list and topology, without binding anything.

use crate::output::{
    color_status, print_info, print_json, print_success, print_table, print_warning, OutputFormat,
};
use anyhow::{Context, Result};
use colored::Colorize;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::ListParams;
use kube::{Api, Client};
use meshsched_lib::scheduler::{default_framework, Evaluation, Framework, NetworkAwarePlugin};
use meshsched_lib::topology::KubeTopologyStore;
use serde::Serialize;
use std::sync::Arc;
use tabled::Tabled;

/// Machine-readable outcome of an explain run
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExplainReport {
    pub pod: String,
    pub scoring_source: &'static str,
    pub ignored_annotations: Vec<String>,
    pub rejected: Vec<RejectedRow>,
    pub scored: Vec<ScoredRow>,
    pub selected: Option<String>,
}

#[derive(Debug, Clone, Serialize, Tabled, PartialEq)]
pub struct RejectedRow {
    #[tabled(rename = "Node")]
    pub node: String,
    #[tabled(rename = "Plugin")]
    pub plugin: String,
    #[tabled(rename = "Reason")]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Tabled, PartialEq)]
pub struct ScoredRow {
    #[tabled(rename = "Node")]
    pub node: String,
    #[tabled(rename = "Raw")]
    pub raw: String,
    #[tabled(rename = "Total")]
    pub total: i64,
}

impl ExplainReport {
    pub fn from_evaluation(evaluation: &Evaluation) -> Self {
        let mut scored: Vec<ScoredRow> = evaluation
            .scores
            .iter()
            .map(|s| ScoredRow {
                node: s.node.clone(),
                raw: s
                    .raw
                    .iter()
                    .map(|(plugin, score)| format!("{}={}", plugin, score))
                    .collect::<Vec<_>>()
                    .join(" "),
                total: s.total,
            })
            .collect();
        scored.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.node.cmp(&b.node)));

        Self {
            pod: evaluation.state.pod_key(),
            scoring_source: if evaluation.state.scoring.is_topology_backed() {
                "topology"
            } else {
                "labels"
            },
            ignored_annotations: evaluation
                .state
                .malformed
                .iter()
                .map(|m| format!("{}={}", m.key, m.value))
                .collect(),
            rejected: evaluation
                .rejections
                .iter()
                .map(|r| RejectedRow {
                    node: r.node.clone(),
                    plugin: r.plugin.to_string(),
                    reason: r.reason.clone(),
                })
                .collect(),
            scored,
            selected: evaluation.selected().map(|s| s.node.clone()),
        }
    }
}

/// Evaluate `pod` against `nodes` with `framework` and build the report
pub async fn evaluate(framework: &Framework, pod: Pod, nodes: &[Node]) -> ExplainReport {
    let evaluation = framework.evaluate(pod, nodes).await;
    ExplainReport::from_evaluation(&evaluation)
}

/// `meshctl explain <namespace>/<pod>`
pub async fn explain(
    client: Client,
    namespace: &str,
    name: &str,
    topology_name: &str,
    format: OutputFormat,
) -> Result<()> {
    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let pod = pods
        .get(name)
        .await
        .with_context(|| format!("Failed to get pod {}/{}", namespace, name))?;

    let nodes: Api<Node> = Api::all(client.clone());
    let nodes = nodes
        .list(&ListParams::default())
        .await
        .context("Failed to list nodes")?
        .items;

    let plugin = NetworkAwarePlugin::new(Arc::new(KubeTopologyStore::new(client)))
        .with_topology_name(topology_name);
    let framework = default_framework(Arc::new(plugin));
    let report = evaluate(&framework, pod, &nodes).await;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => print_report(&report),
    }

    Ok(())
}

fn print_report(report: &ExplainReport) {
    println!("{}", format!("Scheduling dry-run for {}", report.pod).bold());
    println!("{}", "=".repeat(60));
    print_info(&format!("Network scores from {}", report.scoring_source));
    for annotation in &report.ignored_annotations {
        print_warning(&format!("Ignored malformed annotation {}", annotation));
    }

    if !report.rejected.is_empty() {
        println!("\n{}", color_status("Rejected"));
        print_table(report.rejected.clone(), "");
    }

    if !report.scored.is_empty() {
        println!("\n{}", color_status("Eligible"));
        print_table(report.scored.clone(), "");
    }

    println!();
    match &report.selected {
        Some(node) => print_success(&format!("Would bind to {}", node)),
        None => print_warning(&format!(
            "0/{} nodes are available",
            report.rejected.len() + report.scored.len()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use meshsched_lib::topology::{InMemoryTopologyStore, TopologyStore};
    use std::collections::BTreeMap;

    fn node(name: &str, labels: &[(&str, &str)]) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn pod(annotations: &[(&str, &str)]) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("trainer".to_string()),
                namespace: Some("ml".to_string()),
                annotations: Some(
                    annotations
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn label_framework() -> Framework {
        let store: Arc<dyn TopologyStore> = Arc::new(InMemoryTopologyStore::new());
        default_framework(Arc::new(NetworkAwarePlugin::new(store)))
    }

    #[tokio::test]
    async fn test_report_lists_rejections_and_selection() {
        let nodes = vec![
            node("slow", &[("network-speed", "100mbps")]),
            node("fast", &[("network-speed", "1000mbps")]),
        ];
        let report = evaluate(
            &label_framework(),
            pod(&[("meshsched.dev/min-bandwidth", "500mbps")]),
            &nodes,
        )
        .await;

        assert_eq!(report.pod, "ml/trainer");
        assert_eq!(report.scoring_source, "labels");
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].node, "slow");
        assert_eq!(report.rejected[0].plugin, "NetworkAware");
        assert!(report.rejected[0].reason.contains("insufficient bandwidth"));
        assert_eq!(report.scored.len(), 1);
        assert_eq!(report.selected.as_deref(), Some("fast"));
    }

    #[tokio::test]
    async fn test_report_surfaces_ignored_annotations() {
        let nodes = vec![node("a", &[])];
        let report = evaluate(
            &label_framework(),
            pod(&[("meshsched.dev/max-latency", "soon")]),
            &nodes,
        )
        .await;

        assert_eq!(
            report.ignored_annotations,
            vec!["meshsched.dev/max-latency=soon".to_string()]
        );
        assert_eq!(report.selected.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_report_scores_sorted_best_first() {
        let nodes = vec![
            node("a", &[("network-speed", "100mbps")]),
            node("b", &[("network-speed", "1000mbps")]),
        ];
        let report = evaluate(&label_framework(), pod(&[]), &nodes).await;

        assert_eq!(report.scored[0].node, "b");
        assert!(report.scored[0].total >= report.scored[1].total);
        assert!(report.scored[0].raw.starts_with("NetworkAware="));
    }
}

//! Minimal filter/score plugin framework
//!
//! A scheduling attempt for one pod runs every filter plugin against every
//! candidate node, then every score plugin against the nodes that passed.
//! Each score plugin's raw scores are normalised to `[0, MAX_NODE_SCORE]`
//! before they are summed, so plugins with different scales weigh the same.

use crate::models::{node_name, MalformedAnnotation, WorkloadNetworkRequirement};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::ScoringSource;

/// Upper bound of a normalised per-plugin score
pub const MAX_NODE_SCORE: i64 = 100;

/// Outcome of one filter plugin on one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterVerdict {
    Eligible,
    /// The node cannot host the pod; the reason is shown to users
    Rejected(String),
}

impl FilterVerdict {
    pub fn is_eligible(&self) -> bool {
        matches!(self, FilterVerdict::Eligible)
    }
}

/// Per-pod state shared by every plugin during one scheduling attempt
#[derive(Debug, Clone)]
pub struct CycleState {
    pub pod: Pod,
    pub requirement: WorkloadNetworkRequirement,
    /// Annotations that were present but ignored
    pub malformed: Vec<MalformedAnnotation>,
    /// Where network scores come from for this attempt
    pub scoring: ScoringSource,
}

impl CycleState {
    pub fn new(pod: Pod) -> Self {
        let (requirement, malformed) = WorkloadNetworkRequirement::from_pod(&pod);
        Self {
            pod,
            requirement,
            malformed,
            scoring: ScoringSource::LabelBacked,
        }
    }

    /// `namespace/name` of the pod being scheduled
    pub fn pod_key(&self) -> String {
        pod_key(&self.pod)
    }
}

/// Hard eligibility check
pub trait FilterPlugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn filter(&self, state: &CycleState, node: &Node) -> FilterVerdict;
}

/// Soft ranking of eligible nodes
#[async_trait]
pub trait ScorePlugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs once per attempt before any node is scored
    async fn pre_score(&self, _state: &mut CycleState) {}

    /// Raw score, higher is better. Any scale; normalised afterwards.
    fn score(&self, state: &CycleState, node: &Node) -> i64;
}

/// A node turned away by a filter plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub node: String,
    pub plugin: &'static str,
    pub reason: String,
}

/// Score breakdown for one feasible node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeScore {
    pub node: String,
    /// Raw score per plugin, before normalisation
    pub raw: BTreeMap<&'static str, i64>,
    /// Sum of normalised plugin scores
    pub total: i64,
}

/// Everything the framework learned about one pod
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub state: CycleState,
    pub scores: Vec<NodeScore>,
    pub rejections: Vec<Rejection>,
}

impl Evaluation {
    /// Node with the highest total; ties go to the lexicographically smallest name
    pub fn selected(&self) -> Option<&NodeScore> {
        select(&self.scores)
    }

    /// Human-readable summary in the style of `0/3 nodes are available: ...`
    pub fn unschedulable_message(&self) -> String {
        let total = self.scores.len() + self.rejections.len();
        let mut message = format!("0/{} nodes are available", total);
        if !self.rejections.is_empty() {
            let reasons: Vec<String> = self
                .rejections
                .iter()
                .map(|r| format!("{}: {}", r.node, r.reason))
                .collect();
            message.push_str(": ");
            message.push_str(&reasons.join("; "));
        }
        message
    }
}

/// Ordered filter and score plugins
#[derive(Clone, Default)]
pub struct Framework {
    filters: Vec<Arc<dyn FilterPlugin>>,
    scorers: Vec<Arc<dyn ScorePlugin>>,
}

impl Framework {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, plugin: Arc<dyn FilterPlugin>) -> Self {
        self.filters.push(plugin);
        self
    }

    pub fn with_scorer(mut self, plugin: Arc<dyn ScorePlugin>) -> Self {
        self.scorers.push(plugin);
        self
    }

    /// Run filter and score for `pod` over `nodes`
    pub async fn evaluate(&self, pod: Pod, nodes: &[Node]) -> Evaluation {
        let mut state = CycleState::new(pod);

        let mut feasible = Vec::with_capacity(nodes.len());
        let mut rejections = Vec::new();

        'nodes: for node in nodes {
            for plugin in &self.filters {
                if let FilterVerdict::Rejected(reason) = plugin.filter(&state, node) {
                    rejections.push(Rejection {
                        node: node_name(node).to_string(),
                        plugin: plugin.name(),
                        reason,
                    });
                    continue 'nodes;
                }
            }
            feasible.push(node);
        }

        if feasible.is_empty() {
            return Evaluation {
                state,
                scores: Vec::new(),
                rejections,
            };
        }

        for plugin in &self.scorers {
            plugin.pre_score(&mut state).await;
        }

        let mut scores: Vec<NodeScore> = feasible
            .iter()
            .map(|node| NodeScore {
                node: node_name(node).to_string(),
                raw: BTreeMap::new(),
                total: 0,
            })
            .collect();

        for plugin in &self.scorers {
            let raw: Vec<i64> = feasible.iter().map(|n| plugin.score(&state, n)).collect();
            let normalized = normalize(&raw);
            for ((entry, raw), norm) in scores.iter_mut().zip(raw).zip(normalized) {
                entry.raw.insert(plugin.name(), raw);
                entry.total += norm;
            }
        }

        Evaluation {
            state,
            scores,
            rejections,
        }
    }
}

/// Min-max scale raw scores onto `[0, MAX_NODE_SCORE]`.
///
/// When every node scored the same they all get `MAX_NODE_SCORE`.
pub fn normalize(raw: &[i64]) -> Vec<i64> {
    let (Some(&min), Some(&max)) = (raw.iter().min(), raw.iter().max()) else {
        return Vec::new();
    };
    if max == min {
        return vec![MAX_NODE_SCORE; raw.len()];
    }

    let span = (max - min) as i128;
    raw.iter()
        .map(|&s| ((s - min) as i128 * MAX_NODE_SCORE as i128 / span) as i64)
        .collect()
}

/// Highest total wins, ties broken by node name
pub fn select(scores: &[NodeScore]) -> Option<&NodeScore> {
    scores
        .iter()
        .min_by(|a, b| b.total.cmp(&a.total).then_with(|| a.node.cmp(&b.node)))
}

pub fn pod_key(pod: &Pod) -> String {
    format!(
        "{}/{}",
        pod.metadata.namespace.as_deref().unwrap_or("default"),
        pod.metadata.name.as_deref().unwrap_or_default()
    )
}

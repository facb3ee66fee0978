use super::framework::{CycleState, FilterPlugin, FilterVerdict};
use crate::models::node_name;
use k8s_openapi::api::core::v1::{Node, NodeSelectorRequirement, NodeSelectorTerm};
use std::collections::BTreeMap;

pub const PLUGIN_NAME: &str = "NodeAffinity";

const FIELD_NODE_NAME: &str = "metadata.name";

/// Evaluate one `matchExpressions` entry against a label lookup
fn matches_requirement(req: &NodeSelectorRequirement, value: Option<&str>) -> bool {
    let values = req.values.as_deref().unwrap_or_default();
    match req.operator.as_str() {
        "In" => value.is_some_and(|v| values.iter().any(|x| x == v)),
        "NotIn" => value.map_or(true, |v| values.iter().all(|x| x != v)),
        "Exists" => value.is_some(),
        "DoesNotExist" => value.is_none(),
        "Gt" | "Lt" => {
            let (Some(actual), [bound]) = (value.and_then(|v| v.parse::<i64>().ok()), values)
            else {
                return false;
            };
            let Ok(bound) = bound.parse::<i64>() else {
                return false;
            };
            if req.operator == "Gt" {
                actual > bound
            } else {
                actual < bound
            }
        }
        _ => false,
    }
}

/// All expressions and fields of a term must hold; an empty term matches nothing
fn matches_term(term: &NodeSelectorTerm, labels: &BTreeMap<String, String>, name: &str) -> bool {
    let expressions = term.match_expressions.as_deref().unwrap_or_default();
    let fields = term.match_fields.as_deref().unwrap_or_default();
    if expressions.is_empty() && fields.is_empty() {
        return false;
    }

    expressions
        .iter()
        .all(|req| matches_requirement(req, labels.get(&req.key).map(String::as_str)))
        && fields.iter().all(|req| {
            req.key == FIELD_NODE_NAME && matches_requirement(req, Some(name))
        })
}

/// Enforces `spec.nodeSelector` and required node affinity.
///
/// Preferred affinity only ranks nodes and is not evaluated here.
pub struct NodeAffinity;

impl FilterPlugin for NodeAffinity {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn filter(&self, state: &CycleState, node: &Node) -> FilterVerdict {
        let Some(spec) = state.pod.spec.as_ref() else {
            return FilterVerdict::Eligible;
        };
        let empty = BTreeMap::new();
        let labels = node.metadata.labels.as_ref().unwrap_or(&empty);

        let selector_ok = spec.node_selector.as_ref().map_or(true, |selector| {
            selector.iter().all(|(k, v)| labels.get(k) == Some(v))
        });

        // Terms are ORed
        let affinity_ok = spec
            .affinity
            .as_ref()
            .and_then(|a| a.node_affinity.as_ref())
            .and_then(|na| na.required_during_scheduling_ignored_during_execution.as_ref())
            .map_or(true, |required| {
                required
                    .node_selector_terms
                    .iter()
                    .any(|term| matches_term(term, labels, node_name(node)))
            });

        if selector_ok && affinity_ok {
            FilterVerdict::Eligible
        } else {
            FilterVerdict::Rejected("node didn't match Pod's node affinity/selector".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        Affinity, NodeAffinity as NodeAffinitySpec, NodeSelector, Pod, PodSpec,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn node(name: &str, labels: &[(&str, &str)]) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.into()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn expr(key: &str, operator: &str, values: &[&str]) -> NodeSelectorRequirement {
        NodeSelectorRequirement {
            key: key.into(),
            operator: operator.into(),
            values: Some(values.iter().map(|v| v.to_string()).collect()),
        }
    }

    fn requiring(terms: Vec<NodeSelectorTerm>) -> CycleState {
        CycleState::new(Pod {
            spec: Some(PodSpec {
                affinity: Some(Affinity {
                    node_affinity: Some(NodeAffinitySpec {
                        required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                            node_selector_terms: terms,
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn term(expressions: Vec<NodeSelectorRequirement>) -> NodeSelectorTerm {
        NodeSelectorTerm {
            match_expressions: Some(expressions),
            match_fields: None,
        }
    }

    #[test]
    fn test_no_constraints_passes() {
        let state = CycleState::new(Pod::default());
        assert!(NodeAffinity.filter(&state, &node("a", &[])).is_eligible());
    }

    #[test]
    fn test_node_selector_must_match_every_label() {
        let state = CycleState::new(Pod {
            spec: Some(PodSpec {
                node_selector: Some(
                    [("zone".to_string(), "local".to_string()), ("gpu".to_string(), "nvidia".to_string())]
                        .into_iter()
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        });

        assert!(NodeAffinity
            .filter(&state, &node("w1", &[("zone", "local"), ("gpu", "nvidia")]))
            .is_eligible());
        assert_eq!(
            NodeAffinity.filter(&state, &node("w2", &[("zone", "local")])),
            FilterVerdict::Rejected("node didn't match Pod's node affinity/selector".into())
        );
    }

    #[test]
    fn test_required_terms_are_ored() {
        let state = requiring(vec![
            term(vec![expr("zone", "In", &["local"])]),
            term(vec![expr("role", "In", &["public-gateway"])]),
        ]);

        assert!(NodeAffinity.filter(&state, &node("a", &[("zone", "local")])).is_eligible());
        assert!(NodeAffinity
            .filter(&state, &node("b", &[("role", "public-gateway")]))
            .is_eligible());
        assert!(!NodeAffinity.filter(&state, &node("c", &[("zone", "remote")])).is_eligible());
    }

    #[test]
    fn test_expressions_within_term_are_anded() {
        let state = requiring(vec![term(vec![
            expr("zone", "NotIn", &["remote"]),
            expr("gpu", "Exists", &[]),
        ])]);

        assert!(NodeAffinity.filter(&state, &node("a", &[("gpu", "nvidia")])).is_eligible());
        assert!(!NodeAffinity
            .filter(&state, &node("b", &[("zone", "remote"), ("gpu", "nvidia")]))
            .is_eligible());
        assert!(!NodeAffinity.filter(&state, &node("c", &[])).is_eligible());
    }

    #[test]
    fn test_numeric_and_absence_operators() {
        let state = requiring(vec![term(vec![
            expr("cores", "Gt", &["8"]),
            expr("spot", "DoesNotExist", &[]),
        ])]);

        assert!(NodeAffinity.filter(&state, &node("a", &[("cores", "16")])).is_eligible());
        assert!(!NodeAffinity.filter(&state, &node("b", &[("cores", "4")])).is_eligible());
        assert!(!NodeAffinity.filter(&state, &node("c", &[("cores", "many")])).is_eligible());
        assert!(!NodeAffinity
            .filter(&state, &node("d", &[("cores", "16"), ("spot", "true")]))
            .is_eligible());
    }

    #[test]
    fn test_match_fields_on_node_name() {
        let state = requiring(vec![NodeSelectorTerm {
            match_expressions: None,
            match_fields: Some(vec![expr(FIELD_NODE_NAME, "In", &["w2"])]),
        }]);

        assert!(NodeAffinity.filter(&state, &node("w2", &[])).is_eligible());
        assert!(!NodeAffinity.filter(&state, &node("w1", &[])).is_eligible());
    }

    #[test]
    fn test_empty_term_matches_nothing() {
        let state = requiring(vec![NodeSelectorTerm::default()]);
        assert!(!NodeAffinity.filter(&state, &node("a", &[])).is_eligible());
    }
}

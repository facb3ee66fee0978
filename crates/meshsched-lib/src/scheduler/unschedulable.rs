use super::framework::{CycleState, FilterPlugin, FilterVerdict};
use super::taint_toleration::tolerates;
use k8s_openapi::api::core::v1::Node;

pub const PLUGIN_NAME: &str = "NodeUnschedulable";

const UNSCHEDULABLE_TAINT: &str = "node.kubernetes.io/unschedulable";

/// Rejects cordoned nodes unless the pod tolerates the unschedulable taint
pub struct NodeUnschedulable;

impl FilterPlugin for NodeUnschedulable {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn filter(&self, state: &CycleState, node: &Node) -> FilterVerdict {
        let cordoned = node
            .spec
            .as_ref()
            .and_then(|s| s.unschedulable)
            .unwrap_or(false);
        if !cordoned {
            return FilterVerdict::Eligible;
        }

        let tolerated = state
            .pod
            .spec
            .as_ref()
            .and_then(|s| s.tolerations.as_ref())
            .map(|tolerations| {
                tolerations
                    .iter()
                    .any(|t| tolerates(t, UNSCHEDULABLE_TAINT, None, "NoSchedule"))
            })
            .unwrap_or(false);

        if tolerated {
            FilterVerdict::Eligible
        } else {
            FilterVerdict::Rejected("node is unschedulable".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeSpec, Pod, PodSpec, Toleration};

    fn cordoned() -> Node {
        Node {
            spec: Some(NodeSpec {
                unschedulable: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_schedulable_node_passes() {
        let state = CycleState::new(Pod::default());
        assert!(NodeUnschedulable.filter(&state, &Node::default()).is_eligible());
    }

    #[test]
    fn test_cordoned_node_rejected() {
        let state = CycleState::new(Pod::default());
        assert_eq!(
            NodeUnschedulable.filter(&state, &cordoned()),
            FilterVerdict::Rejected("node is unschedulable".into())
        );
    }

    #[test]
    fn test_toleration_admits_cordoned_node() {
        let pod = Pod {
            spec: Some(PodSpec {
                tolerations: Some(vec![Toleration {
                    key: Some(UNSCHEDULABLE_TAINT.into()),
                    operator: Some("Exists".into()),
                    effect: Some("NoSchedule".into()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let state = CycleState::new(pod);
        assert!(NodeUnschedulable.filter(&state, &cordoned()).is_eligible());
    }
}

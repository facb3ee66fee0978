use super::framework::{CycleState, FilterPlugin, FilterVerdict};
use k8s_openapi::api::core::v1::{Node, Taint, Toleration};

pub const PLUGIN_NAME: &str = "TaintToleration";

/// Whether `toleration` covers a taint with this key, value and effect.
///
/// An empty toleration key with `Exists` matches every key; an empty
/// toleration effect matches every effect.
pub(crate) fn tolerates(toleration: &Toleration, key: &str, value: Option<&str>, effect: &str) -> bool {
    let effect_matches = match toleration.effect.as_deref() {
        None | Some("") => true,
        Some(e) => e == effect,
    };
    if !effect_matches {
        return false;
    }

    let exists = toleration.operator.as_deref() == Some("Exists");
    match toleration.key.as_deref() {
        None | Some("") => exists,
        Some(k) if k != key => false,
        Some(_) if exists => true,
        Some(_) => toleration.value.as_deref().unwrap_or("") == value.unwrap_or(""),
    }
}

fn is_tolerated(taint: &Taint, tolerations: &[Toleration]) -> bool {
    tolerations
        .iter()
        .any(|t| tolerates(t, &taint.key, taint.value.as_deref(), &taint.effect))
}

/// Rejects nodes carrying a `NoSchedule` or `NoExecute` taint the pod does
/// not tolerate. `PreferNoSchedule` is advisory and ignored.
pub struct TaintToleration;

impl FilterPlugin for TaintToleration {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn filter(&self, state: &CycleState, node: &Node) -> FilterVerdict {
        let Some(taints) = node.spec.as_ref().and_then(|s| s.taints.as_ref()) else {
            return FilterVerdict::Eligible;
        };
        let tolerations = state
            .pod
            .spec
            .as_ref()
            .and_then(|s| s.tolerations.as_deref())
            .unwrap_or_default();

        let untolerated = taints
            .iter()
            .filter(|t| matches!(t.effect.as_str(), "NoSchedule" | "NoExecute"))
            .find(|t| !is_tolerated(t, tolerations));

        match untolerated {
            None => FilterVerdict::Eligible,
            Some(taint) => FilterVerdict::Rejected(format!(
                "node had untolerated taint {{{}: {}}}",
                taint.key,
                taint.value.as_deref().unwrap_or("")
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeSpec, Pod, PodSpec};

    fn tainted(key: &str, value: Option<&str>, effect: &str) -> Node {
        Node {
            spec: Some(NodeSpec {
                taints: Some(vec![Taint {
                    key: key.into(),
                    value: value.map(Into::into),
                    effect: effect.into(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn tolerating(tolerations: Vec<Toleration>) -> CycleState {
        CycleState::new(Pod {
            spec: Some(PodSpec {
                tolerations: Some(tolerations),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn control_plane() -> Node {
        tainted("node-role.kubernetes.io/control-plane", None, "NoSchedule")
    }

    #[test]
    fn test_untainted_node_passes() {
        let state = CycleState::new(Pod::default());
        assert!(TaintToleration.filter(&state, &Node::default()).is_eligible());
    }

    #[test]
    fn test_control_plane_taint_rejects() {
        let state = CycleState::new(Pod::default());
        assert_eq!(
            TaintToleration.filter(&state, &control_plane()),
            FilterVerdict::Rejected(
                "node had untolerated taint {node-role.kubernetes.io/control-plane: }".into()
            )
        );
    }

    #[test]
    fn test_prefer_no_schedule_ignored() {
        let state = CycleState::new(Pod::default());
        let node = tainted("spot", Some("true"), "PreferNoSchedule");
        assert!(TaintToleration.filter(&state, &node).is_eligible());
    }

    #[test]
    fn test_exists_toleration_admits() {
        let state = tolerating(vec![Toleration {
            key: Some("node-role.kubernetes.io/control-plane".into()),
            operator: Some("Exists".into()),
            effect: Some("NoSchedule".into()),
            ..Default::default()
        }]);
        assert!(TaintToleration.filter(&state, &control_plane()).is_eligible());
    }

    #[test]
    fn test_equal_toleration_requires_matching_value() {
        let node = tainted("dedicated", Some("gpu"), "NoExecute");

        let wrong = tolerating(vec![Toleration {
            key: Some("dedicated".into()),
            operator: Some("Equal".into()),
            value: Some("web".into()),
            ..Default::default()
        }]);
        assert!(!TaintToleration.filter(&wrong, &node).is_eligible());

        let right = tolerating(vec![Toleration {
            key: Some("dedicated".into()),
            value: Some("gpu".into()),
            ..Default::default()
        }]);
        assert!(TaintToleration.filter(&right, &node).is_eligible());
    }

    #[test]
    fn test_wildcard_toleration_admits_everything() {
        let state = tolerating(vec![Toleration {
            operator: Some("Exists".into()),
            ..Default::default()
        }]);
        let node = tainted("dedicated", Some("gpu"), "NoExecute");
        assert!(TaintToleration.filter(&state, &node).is_eligible());
    }

    #[test]
    fn test_effect_mismatch_does_not_tolerate() {
        let state = tolerating(vec![Toleration {
            key: Some("dedicated".into()),
            operator: Some("Exists".into()),
            effect: Some("NoExecute".into()),
            ..Default::default()
        }]);
        let node = tainted("dedicated", None, "NoSchedule");
        assert!(!TaintToleration.filter(&state, &node).is_eligible());
    }
}

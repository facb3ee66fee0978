//! Core data models shared by the network controller and the scheduler
//!
//! Labels and annotations carry human-friendly strings such as `"100mbps"` or
//! `"10ms"`. They are parsed here into typed integers and never travel past
//! this boundary as strings.

use k8s_openapi::api::core::v1::{Node, Pod};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Node label keys read by both components
pub mod labels {
    pub const ZONE: &str = "zone";
    pub const REGION: &str = "region";
    pub const ROLE: &str = "role";
    pub const NETWORK_SPEED: &str = "network-speed";
    pub const NETWORK_LATENCY: &str = "network-latency";
    pub const GPU: &str = "gpu";
    /// Pod label naming the workload class (`ai`, `web`, ...)
    pub const WORKLOAD_TYPE: &str = "workload-type";
}

/// Pod annotation keys declaring network requirements
pub mod annotations {
    pub const MIN_BANDWIDTH: &str = "meshsched.dev/min-bandwidth";
    pub const MAX_LATENCY: &str = "meshsched.dev/max-latency";
    pub const DATA_LOCALITY: &str = "meshsched.dev/data-locality";
    pub const INTERNET_ACCESS: &str = "meshsched.dev/internet-access";
}

/// Well-known label values
pub mod values {
    pub const ZONE_LOCAL: &str = "local";
    pub const ZONE_REMOTE: &str = "remote";
    pub const ROLE_AI_WORKER: &str = "ai-worker";
    pub const ROLE_PUBLIC_GATEWAY: &str = "public-gateway";
    pub const WORKLOAD_AI: &str = "ai";
    pub const WORKLOAD_WEB: &str = "web";
}

/// Capability tags derived from node labels
pub mod capabilities {
    pub const GPU_DIRECT: &str = "gpu-direct";
    pub const INTERNET: &str = "internet";
    pub const HIGH_BANDWIDTH: &str = "high-bandwidth";
    pub const LOW_LATENCY: &str = "low-latency";
}

/// Network characteristics from one source node to every other node.
///
/// A missing map entry means the path was not measured, not that it is zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeNetworkProfile {
    /// Throughput per target node, in Mbps
    #[serde(default)]
    pub bandwidth: BTreeMap<String, u64>,
    /// Round-trip latency per target node, in milliseconds
    #[serde(default)]
    pub latency: BTreeMap<String, u64>,
    /// Transfer cost per target node in `[0.0, 1.0]`
    #[serde(default)]
    pub cost: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
}

impl NodeNetworkProfile {
    /// Highest bandwidth to any peer, 0 when nothing was measured
    pub fn max_bandwidth(&self) -> u64 {
        self.bandwidth.values().copied().max().unwrap_or(0)
    }

    /// Lowest latency to any peer
    pub fn min_latency(&self) -> Option<u64> {
        self.latency.values().copied().min()
    }

    /// Lowest cost to any peer
    pub fn min_cost(&self) -> Option<f64> {
        self.cost.values().copied().reduce(f64::min)
    }
}

/// Data locality requested by a workload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DataLocality {
    #[default]
    Default,
    High,
}

/// Internet access requested by a workload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InternetAccess {
    #[default]
    Default,
    Required,
}

/// Network requirements derived from a pod's metadata. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkloadNetworkRequirement {
    pub min_bandwidth_mbps: Option<u64>,
    pub max_latency_ms: Option<u64>,
    pub data_locality: DataLocality,
    pub internet_access: InternetAccess,
    pub workload_type: Option<String>,
}

/// An annotation that was present but could not be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedAnnotation {
    pub key: &'static str,
    pub value: String,
}

impl WorkloadNetworkRequirement {
    /// Derive requirements from pod annotations and labels.
    ///
    /// Unparseable bandwidth or latency annotations fail open: the requirement
    /// is left unset and the offending annotation is returned so the caller can
    /// report it.
    pub fn from_pod(pod: &Pod) -> (Self, Vec<MalformedAnnotation>) {
        let pod_annotations = pod.metadata.annotations.as_ref();
        let annotation = |key: &str| {
            pod_annotations
                .and_then(|a| a.get(key))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let mut malformed = Vec::new();

        let min_bandwidth_mbps = annotation(annotations::MIN_BANDWIDTH).and_then(|raw| {
            let parsed = parse_bandwidth(raw);
            if parsed.is_none() {
                malformed.push(MalformedAnnotation {
                    key: annotations::MIN_BANDWIDTH,
                    value: raw.to_string(),
                });
            }
            parsed
        });

        let max_latency_ms = annotation(annotations::MAX_LATENCY).and_then(|raw| {
            let parsed = parse_latency(raw);
            if parsed.is_none() {
                malformed.push(MalformedAnnotation {
                    key: annotations::MAX_LATENCY,
                    value: raw.to_string(),
                });
            }
            parsed
        });

        let data_locality = match annotation(annotations::DATA_LOCALITY) {
            Some(v) if v.eq_ignore_ascii_case("high") => DataLocality::High,
            _ => DataLocality::Default,
        };

        let internet_access = match annotation(annotations::INTERNET_ACCESS) {
            Some(v) if v.eq_ignore_ascii_case("required") => InternetAccess::Required,
            _ => InternetAccess::Default,
        };

        let workload_type = pod
            .metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(labels::WORKLOAD_TYPE))
            .filter(|v| !v.is_empty())
            .cloned();

        (
            Self {
                min_bandwidth_mbps,
                max_latency_ms,
                data_locality,
                internet_access,
                workload_type,
            },
            malformed,
        )
    }

    pub fn is_workload_type(&self, kind: &str) -> bool {
        self.workload_type.as_deref() == Some(kind)
    }
}

/// Parse a bandwidth string (`"100mbps"`, `"1.5gbps"`, `"500kbps"`) into Mbps
pub fn parse_bandwidth(raw: &str) -> Option<u64> {
    let value = raw.trim().to_ascii_lowercase();

    let (number, scale) = if let Some(n) = value.strip_suffix("gbps") {
        (n, 1000.0)
    } else if let Some(n) = value.strip_suffix("mbps") {
        (n, 1.0)
    } else if let Some(n) = value.strip_suffix("kbps") {
        (n, 0.001)
    } else {
        return None;
    };

    let parsed: f64 = number.trim().parse().ok()?;
    if !parsed.is_finite() || parsed < 0.0 {
        return None;
    }
    Some((parsed * scale) as u64)
}

/// Parse a latency string (`"10ms"`, `"1s"`) into milliseconds
pub fn parse_latency(raw: &str) -> Option<u64> {
    let value = raw.trim().to_ascii_lowercase();

    let (number, scale) = if let Some(n) = value.strip_suffix("ms") {
        (n, 1.0)
    } else if let Some(n) = value.strip_suffix('s') {
        (n, 1000.0)
    } else {
        return None;
    };

    let parsed: f64 = number.trim().parse().ok()?;
    if !parsed.is_finite() || parsed < 0.0 {
        return None;
    }
    Some((parsed * scale) as u64)
}

/// Read-only view over a node's labels
#[derive(Debug, Clone, Copy)]
pub struct NodeLabels<'a> {
    labels: Option<&'a BTreeMap<String, String>>,
}

impl<'a> NodeLabels<'a> {
    pub fn of(node: &'a Node) -> Self {
        Self {
            labels: node.metadata.labels.as_ref(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.labels
            .and_then(|l| l.get(key))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn is(&self, key: &str, value: &str) -> bool {
        self.get(key) == Some(value)
    }

    pub fn zone(&self) -> Option<&'a str> {
        self.get(labels::ZONE)
    }

    pub fn role(&self) -> Option<&'a str> {
        self.get(labels::ROLE)
    }

    pub fn is_remote(&self) -> bool {
        self.is(labels::ZONE, values::ZONE_REMOTE)
    }

    pub fn is_local(&self) -> bool {
        self.is(labels::ZONE, values::ZONE_LOCAL)
    }

    /// True when the `gpu` label names a vendor
    pub fn has_gpu(&self) -> bool {
        match self.get(labels::GPU) {
            Some(v) => !matches!(v.to_ascii_lowercase().as_str(), "false" | "none"),
            None => false,
        }
    }

    /// Parsed `network-speed` label; malformed values read as absent
    pub fn network_speed_mbps(&self) -> Option<u64> {
        self.get(labels::NETWORK_SPEED).and_then(parse_bandwidth)
    }

    pub fn network_latency_class(&self) -> Option<&'a str> {
        self.get(labels::NETWORK_LATENCY)
    }

    /// Capability tags for the topology profile
    pub fn capabilities(&self) -> BTreeSet<String> {
        let mut caps = BTreeSet::new();
        if self.has_gpu() {
            caps.insert(capabilities::GPU_DIRECT.to_string());
        }
        if self.is(labels::ROLE, values::ROLE_PUBLIC_GATEWAY) {
            caps.insert(capabilities::INTERNET.to_string());
        }
        if self.is_local() {
            caps.insert(capabilities::HIGH_BANDWIDTH.to_string());
            caps.insert(capabilities::LOW_LATENCY.to_string());
        }
        caps
    }
}

/// Name of a node, empty when the object carries none
pub fn node_name(node: &Node) -> &str {
    node.metadata.name.as_deref().unwrap_or_default()
}

//! Topology construction from one cycle's measurements

use crate::models::{labels, node_name, NodeLabels, NodeNetworkProfile};
use crate::topology::{NetworkTopologySpec, TopologyCondition};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Node;
use std::collections::BTreeMap;

/// Result of probing one ordered node pair
#[derive(Debug, Clone, PartialEq)]
pub struct PairMeasurement {
    pub source: String,
    pub target: String,
    pub latency_ms: u64,
    pub bandwidth_mbps: u64,
    pub cost: f64,
}

impl PairMeasurement {
    /// Combine a latency average with a measured or estimated throughput
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        latency_avg_ms: f64,
        measured_mbps: Option<f64>,
    ) -> Self {
        let bandwidth_mbps = match measured_mbps {
            Some(mbps) => mbps.max(0.0) as u64,
            None => estimate_bandwidth(latency_avg_ms),
        };
        let latency_ms = latency_avg_ms.max(0.0) as u64;

        Self {
            source: source.into(),
            target: target.into(),
            latency_ms,
            bandwidth_mbps,
            cost: calculate_cost(bandwidth_mbps, latency_ms),
        }
    }
}

/// Rough throughput guess from round-trip latency
pub fn estimate_bandwidth(latency_ms: f64) -> u64 {
    match latency_ms {
        l if l < 5.0 => 1000,
        l if l < 20.0 => 100,
        l if l < 50.0 => 50,
        _ => 10,
    }
}

/// `clamp(1000 / bandwidth + latency / 100, 0, 1)`; zero bandwidth is the
/// maximum cost
pub fn calculate_cost(bandwidth_mbps: u64, latency_ms: u64) -> f64 {
    if bandwidth_mbps == 0 {
        return 1.0;
    }
    let cost = 1000.0 / bandwidth_mbps as f64 + latency_ms as f64 / 100.0;
    cost.clamp(0.0, 1.0)
}

/// `0.4 * latency_score + 0.6 * bandwidth_score` over all measured pairs,
/// 0.0 when nothing was measured
pub fn calculate_health_score(measurements: &[PairMeasurement]) -> f64 {
    if measurements.is_empty() {
        return 0.0;
    }

    let n = measurements.len() as f64;
    let avg_latency = measurements.iter().map(|m| m.latency_ms as f64).sum::<f64>() / n;
    let avg_bandwidth = measurements
        .iter()
        .map(|m| m.bandwidth_mbps as f64)
        .sum::<f64>()
        / n;

    let latency_score = (1.0 - avg_latency / 200.0).max(0.0);
    let bandwidth_score = (avg_bandwidth / 1000.0).min(1.0);

    latency_score * 0.4 + bandwidth_score * 0.6
}

/// Build a complete topology for `nodes`.
///
/// Every listed node gets a profile, even with no successful measurements.
/// Measurements whose source is not in `nodes` are dropped.
pub fn build_topology(
    nodes: &[Node],
    measurements: &[PairMeasurement],
    now: DateTime<Utc>,
) -> NetworkTopologySpec {
    let mut profiles: BTreeMap<String, NodeNetworkProfile> = nodes
        .iter()
        .map(|node| {
            let node_labels = NodeLabels::of(node);
            let profile = NodeNetworkProfile {
                zone: node_labels.zone().map(str::to_string),
                region: node_labels.get(labels::REGION).map(str::to_string),
                capabilities: node_labels.capabilities(),
                ..Default::default()
            };
            (node_name(node).to_string(), profile)
        })
        .collect();

    let mut accepted = Vec::with_capacity(measurements.len());
    for m in measurements {
        let Some(profile) = profiles.get_mut(&m.source) else {
            continue;
        };
        profile.latency.insert(m.target.clone(), m.latency_ms);
        profile.bandwidth.insert(m.target.clone(), m.bandwidth_mbps);
        profile.cost.insert(m.target.clone(), m.cost);
        accepted.push(m.clone());
    }

    let measurement_count = accepted.len() as u32;

    NetworkTopologySpec {
        node_count: nodes.len() as u32,
        measurement_count,
        health_score: calculate_health_score(&accepted),
        last_updated: Some(now),
        conditions: vec![TopologyCondition::ready(measurement_count, now)],
        nodes: profiles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_bandwidth_buckets() {
        assert_eq!(estimate_bandwidth(0.4), 1000);
        assert_eq!(estimate_bandwidth(4.99), 1000);
        assert_eq!(estimate_bandwidth(5.0), 100);
        assert_eq!(estimate_bandwidth(19.0), 100);
        assert_eq!(estimate_bandwidth(20.0), 50);
        assert_eq!(estimate_bandwidth(49.9), 50);
        assert_eq!(estimate_bandwidth(50.0), 10);
        assert_eq!(estimate_bandwidth(300.0), 10);
    }

    #[test]
    fn test_cost_is_clamped() {
        // 1000/1000 + 2/100 = 1.02
        assert_eq!(calculate_cost(1000, 2), 1.0);
        // 1000/10 + 45/100 = 100.45
        assert_eq!(calculate_cost(10, 45), 1.0);
        assert_eq!(calculate_cost(0, 0), 1.0);
    }

    #[test]
    fn test_cost_below_ceiling() {
        // 1000/10000 + 20/100 = 0.3
        let cost = calculate_cost(10_000, 20);
        assert!((cost - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_pair_measurement_estimates_when_unbenchmarked() {
        let m = PairMeasurement::new("a", "b", 2.35, None);
        assert_eq!(m.latency_ms, 2);
        assert_eq!(m.bandwidth_mbps, 1000);
        assert_eq!(m.cost, 1.0);
    }

    #[test]
    fn test_pair_measurement_prefers_benchmark() {
        let m = PairMeasurement::new("a", "b", 30.0, Some(2500.7));
        assert_eq!(m.bandwidth_mbps, 2500);
        assert!((m.cost - (0.4 + 0.3)).abs() < 1e-9);
    }

    #[test]
    fn test_health_score_empty() {
        assert_eq!(calculate_health_score(&[]), 0.0);
    }

    #[test]
    fn test_health_score_weighting() {
        let measurements = vec![
            PairMeasurement::new("a", "b", 100.0, Some(500.0)),
            PairMeasurement::new("b", "a", 100.0, Some(500.0)),
        ];
        // latency score 0.5, bandwidth score 0.5
        let score = calculate_health_score(&measurements);
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_health_score_saturates() {
        let measurements = vec![PairMeasurement::new("a", "b", 0.0, Some(10_000.0))];
        assert!((calculate_health_score(&measurements) - 1.0).abs() < 1e-9);

        let measurements = vec![PairMeasurement::new("a", "b", 400.0, Some(0.0))];
        assert_eq!(calculate_health_score(&measurements), 0.0);
    }
}

//! Mesh overlay status and node address resolution

use super::{async_trait, MeshStatusSource};
use crate::models::node_name;
use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Node;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// One peer as reported by the overlay network
#[derive(Debug, Clone, PartialEq)]
pub struct MeshPeer {
    pub host_name: String,
    pub dns_name: String,
    pub addresses: Vec<IpAddr>,
    pub online: bool,
}

/// `tailscale status --json`, reduced to the fields we read
#[derive(Debug, Deserialize)]
struct TailscaleStatus {
    #[serde(rename = "Self")]
    self_peer: Option<TailscalePeer>,
    #[serde(rename = "Peer", default)]
    peers: HashMap<String, TailscalePeer>,
}

#[derive(Debug, Deserialize)]
struct TailscalePeer {
    #[serde(rename = "HostName", default)]
    host_name: String,
    #[serde(rename = "DNSName", default)]
    dns_name: String,
    #[serde(rename = "TailscaleIPs", default)]
    tailscale_ips: Option<Vec<String>>,
    #[serde(rename = "Online", default)]
    online: bool,
}

impl From<TailscalePeer> for MeshPeer {
    fn from(peer: TailscalePeer) -> Self {
        Self {
            host_name: peer.host_name,
            dns_name: peer.dns_name,
            addresses: peer
                .tailscale_ips
                .unwrap_or_default()
                .iter()
                .filter_map(|ip| ip.parse().ok())
                .collect(),
            online: peer.online,
        }
    }
}

/// Parse the JSON printed by `tailscale status --json`
pub(crate) fn parse_tailscale_status(raw: &[u8]) -> Result<Vec<MeshPeer>> {
    let status: TailscaleStatus =
        serde_json::from_slice(raw).context("Failed to parse tailscale status")?;

    let mut peers: Vec<MeshPeer> = status.peers.into_values().map(MeshPeer::from).collect();
    if let Some(self_peer) = status.self_peer {
        peers.push(self_peer.into());
    }
    Ok(peers)
}

/// Reads peer status from the local tailscale daemon
#[derive(Debug, Clone)]
pub struct TailscaleStatusSource {
    command: String,
    timeout: Duration,
}

impl TailscaleStatusSource {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }
}

#[async_trait]
impl MeshStatusSource for TailscaleStatusSource {
    async fn peers(&self) -> Result<Vec<MeshPeer>> {
        let run = Command::new(&self.command)
            .args(["status", "--json"])
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .context("tailscale status timed out")?
            .with_context(|| format!("Failed to run {} status", self.command))?;

        if !output.status.success() {
            anyhow::bail!(
                "{} status failed: {}",
                self.command,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        parse_tailscale_status(&output.stdout)
    }
}

/// Hostname to overlay address map, rebuilt from scratch every cycle
#[derive(Debug, Clone, Default)]
pub struct AddressTable {
    overlay: HashMap<String, IpAddr>,
}

impl AddressTable {
    /// Build the table from online peers only
    pub fn from_peers(peers: &[MeshPeer]) -> Self {
        let mut overlay = HashMap::new();

        for peer in peers.iter().filter(|p| p.online) {
            let Some(addr) = peer.addresses.first().copied() else {
                continue;
            };

            if let Some(short) = peer.dns_name.split('.').next().filter(|s| !s.is_empty()) {
                overlay.insert(short.to_ascii_lowercase(), addr);
            }
            if !peer.host_name.is_empty() {
                overlay.insert(peer.host_name.to_ascii_lowercase(), addr);
            }
        }

        debug!(entries = overlay.len(), "Rebuilt mesh address table");
        Self { overlay }
    }

    pub fn len(&self) -> usize {
        self.overlay.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlay.is_empty()
    }

    pub fn overlay_address(&self, host: &str) -> Option<IpAddr> {
        self.overlay.get(&host.to_ascii_lowercase()).copied()
    }

    /// Overlay address if known, else the node's InternalIP
    pub fn resolve(&self, node: &Node) -> Option<IpAddr> {
        if let Some(addr) = self.overlay_address(node_name(node)) {
            return Some(addr);
        }

        let addresses = node.status.as_ref()?.addresses.as_ref()?;
        addresses
            .iter()
            .filter(|a| a.type_ == "InternalIP")
            .find_map(|a| match a.address.parse() {
                Ok(ip) => Some(ip),
                Err(_) => {
                    warn!(node = %node_name(node), address = %a.address, "Ignoring unparseable node address");
                    None
                }
            })
    }
}

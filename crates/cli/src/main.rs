//! meshctl - inspect network topology and scheduling decisions
//!
//! Reads the NetworkTopology published by the network controller, dry-runs
//! the network-aware scheduler for a pod, and checks component health.

mod client;
mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{explain, status, topology};
use kube::CustomResourceExt;
use meshsched_lib::topology::{NetworkTopology, DEFAULT_TOPOLOGY_NAME};
use output::OutputFormat;

/// meshctl - network-aware scheduling toolkit CLI
#[derive(Parser)]
#[command(name = "meshctl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to kubeconfig file
    #[arg(long, global = true)]
    kubeconfig: Option<String>,

    /// NetworkTopology object to read
    #[arg(long, global = true, env = "MESHCTL_TOPOLOGY")]
    topology: Option<String>,

    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect the measured network topology
    #[command(subcommand)]
    Topology(TopologyCommands),

    /// Dry-run scheduling for a pod and explain the outcome
    Explain {
        /// Pod reference as namespace/name, or name in the default namespace
        pod: String,
    },

    /// Show health and readiness of a controller or scheduler
    Status {
        /// Base URL of the component's API port
        #[arg(long, env = "MESHCTL_STATUS_URL")]
        url: Option<String>,
    },

    /// Print the NetworkTopology CustomResourceDefinition
    Crd,
}

#[derive(Subcommand)]
enum TopologyCommands {
    /// Summarise every node in the topology
    Show,

    /// List measured paths from one node
    Paths {
        /// Source node name
        node: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = config::Config::load()?;

    let topology_name = cli
        .topology
        .or(settings.topology_name)
        .unwrap_or_else(|| DEFAULT_TOPOLOGY_NAME.to_string());

    match cli.command {
        Commands::Topology(topology_cmd) => {
            let client = config::kube_client(cli.kubeconfig.as_deref()).await?;
            match topology_cmd {
                TopologyCommands::Show => {
                    topology::show(client, &topology_name, cli.format).await?;
                }
                TopologyCommands::Paths { node } => {
                    topology::paths(client, &topology_name, &node, cli.format).await?;
                }
            }
        }
        Commands::Explain { pod } => {
            let default_namespace = settings.default_namespace.as_deref().unwrap_or("default");
            let (namespace, name) = config::split_pod_ref(&pod, default_namespace)?;
            let client = config::kube_client(cli.kubeconfig.as_deref()).await?;
            explain::explain(client, namespace, name, &topology_name, cli.format).await?;
        }
        Commands::Status { url } => {
            let url = url
                .or(settings.status_url)
                .unwrap_or_else(|| "http://localhost:8080".to_string());
            let client = client::StatusClient::new(&url)?;
            status::status(&client, cli.format).await?;
        }
        Commands::Crd => {
            let crd = serde_json::to_string_pretty(&NetworkTopology::crd())
                .context("Failed to serialize CRD")?;
            println!("{}", crd);
        }
    }

    Ok(())
}

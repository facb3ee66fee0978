//! Health of a running controller or scheduler

use crate::client::StatusClient;
use crate::output::{color_status, print_error, print_json, print_success, print_table, OutputFormat};
use anyhow::Result;
use chrono::{TimeZone, Utc};
use meshsched_lib::health::{ComponentStatus, HealthResponse};
use serde_json::json;
use tabled::Tabled;

#[derive(Debug, Tabled, PartialEq)]
pub struct ComponentRow {
    #[tabled(rename = "Component")]
    pub name: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Message")]
    pub message: String,
    #[tabled(rename = "Last Check")]
    pub last_check: String,
}

fn status_label(status: ComponentStatus) -> &'static str {
    match status {
        ComponentStatus::Healthy => "healthy",
        ComponentStatus::Degraded => "degraded",
        ComponentStatus::Unhealthy => "unhealthy",
    }
}

pub fn component_rows(health: &HealthResponse) -> Vec<ComponentRow> {
    let mut rows: Vec<ComponentRow> = health
        .components
        .iter()
        .map(|(name, component)| ComponentRow {
            name: name.clone(),
            status: color_status(status_label(component.status)),
            message: component.message.clone().unwrap_or_else(|| "-".to_string()),
            last_check: Utc
                .timestamp_opt(component.last_check_timestamp, 0)
                .single()
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    rows
}

/// `meshctl status`
pub async fn status(client: &StatusClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;
    let readiness = client.readiness().await?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "health": health,
            "readiness": readiness,
        }))?,
        OutputFormat::Table => {
            let overall = status_label(health.status);
            if health.status.is_operational() {
                print_success(&format!("Overall: {}", color_status(overall)));
            } else {
                print_error(&format!("Overall: {}", color_status(overall)));
            }

            if readiness.ready {
                print_success("Ready");
            } else {
                print_error(&format!(
                    "Not ready: {}",
                    readiness.reason.as_deref().unwrap_or("unknown")
                ));
            }

            println!();
            print_table(component_rows(&health), "No components registered");
        }
    }

    Ok(())
}

//! Output formatting utilities

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a rounded table, or a notice when there is nothing to show
pub fn print_table<T: Tabled>(items: Vec<T>, empty_message: &str) {
    if items.is_empty() {
        print_warning(empty_message);
        return;
    }
    let table = Table::new(items).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    println!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a bandwidth in Mbps
pub fn format_bandwidth(mbps: u64) -> String {
    if mbps >= 1000 {
        format!("{:.1}Gbps", mbps as f64 / 1000.0)
    } else {
        format!("{}Mbps", mbps)
    }
}

/// Format an optional latency in milliseconds
pub fn format_latency(ms: Option<u64>) -> String {
    match ms {
        Some(ms) => format!("{}ms", ms),
        None => "-".to_string(),
    }
}

/// Color a path cost: cheap green, expensive red
pub fn color_cost(cost: Option<f64>) -> String {
    match cost {
        None => "-".to_string(),
        Some(c) => {
            let formatted = format!("{:.2}", c);
            if c < 0.5 {
                formatted.green().to_string()
            } else if c < 1.0 {
                formatted.yellow().to_string()
            } else {
                formatted.red().to_string()
            }
        }
    }
}

/// Color a cluster health score in `[0, 1]`
pub fn color_health_score(score: f64) -> String {
    let formatted = format!("{:.0}%", score * 100.0);
    if score >= 0.8 {
        formatted.green().to_string()
    } else if score >= 0.5 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "ready" | "true" | "eligible" => status.green().to_string(),
        "degraded" | "unknown" => status.yellow().to_string(),
        "unhealthy" | "not ready" | "false" | "rejected" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Human-readable age such as `42s`, `5m`, `3h`
pub fn format_age(timestamp: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(ts) = timestamp else {
        return "never".to_string();
    };
    let secs = (now - ts).num_seconds().max(0);
    match secs {
        s if s < 120 => format!("{}s", s),
        s if s < 7200 => format!("{}m", s / 60),
        s if s < 172_800 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86_400),
    }
}

//! Subcommand implementations

pub mod explain;
pub mod status;
pub mod topology;

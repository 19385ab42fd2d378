//! Output formatting for CLI commands
//!
//! Records can be printed as JSON, YAML or an aligned table. JSON and table
//! output are written record by record so long crawls show progress.

use anyhow::{Context, Result};
use serde::Serialize;
use std::str::FromStr;

use crate::secrets::SecretMetadata;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
    Table,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "yaml" => Ok(OutputFormat::Yaml),
            "table" => Ok(OutputFormat::Table),
            _ => anyhow::bail!(
                "Unsupported output format: '{}'. Use 'json', 'yaml', or 'table'.",
                s
            ),
        }
    }
}

/// Print data as pretty JSON
pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}

/// Print one record as a single JSON line
pub fn print_json_line<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string(data).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}

/// Print data as YAML
pub fn print_yaml<T: Serialize>(data: &T) -> Result<()> {
    let yaml = serde_yaml::to_string(data).context("Failed to serialize to YAML")?;
    println!("{}", yaml);
    Ok(())
}

/// Truncate string to maximum length with ellipsis
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

const SECRET_COLUMNS: [(&str, usize); 6] = [
    ("MOUNT", 16),
    ("KEY", 48),
    ("VERSION", 8),
    ("DESTROYED", 10),
    ("CREATED", 20),
    ("DELETED", 20),
];

/// Header for [`secret_row`] rows
pub fn secret_table_header() -> String {
    let header: String = SECRET_COLUMNS
        .iter()
        .map(|(name, width)| format!("{:<width$} ", name, width = width))
        .collect();
    let total_width: usize = SECRET_COLUMNS.iter().map(|(_, w)| w + 1).sum();

    format!("{}\n{}", header.trim_end(), "-".repeat(total_width.saturating_sub(1)))
}

/// One aligned table row for a secret
pub fn secret_row(metadata: &SecretMetadata) -> String {
    let deleted = metadata
        .deletion_time
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());

    let row = format!(
        "{:<16} {:<48} {:<8} {:<10} {:<20} {:<20}",
        truncate(metadata.mount(), 16),
        truncate(&metadata.key(), 48),
        metadata.version,
        metadata.destroyed,
        metadata.created_time.format("%Y-%m-%d %H:%M:%S"),
        deleted
    );
    row.trim_end().to_string()
}

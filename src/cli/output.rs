//! Output formatting for readings and ports

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::core::codec::ColorReading;
use crate::core::locator::CandidateDevice;

/// CLI output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON, one object per line
    Json,
    /// CSV rows
    Csv,
}

/// Format one reading
pub fn format_reading(reading: &ColorReading, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!("{}  {}", reading, reading.to_hex()),
        OutputFormat::Json => serde_json::json!({
            "r": reading.r,
            "g": reading.g,
            "b": reading.b,
            "hex": reading.to_hex(),
        })
        .to_string(),
        OutputFormat::Csv => format!("{},{},{}", reading.r, reading.g, reading.b),
    }
}

/// Format one port
pub fn format_candidate(candidate: &CandidateDevice, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let marker = if candidate.identity_match { '*' } else { ' ' };
            let mut line = format!("{} {}", marker, candidate.port_name);
            if let Some(ref id) = candidate.usb_id {
                line.push_str(&format!(" [{id}]"));
            }
            if let Some(ref desc) = candidate.description {
                line.push_str(&format!(" {desc}"));
            }
            line
        }
        OutputFormat::Json => serde_json::to_string(candidate).unwrap_or_default(),
        OutputFormat::Csv => format!(
            "{},{},{},{}",
            candidate.port_name,
            candidate.identity_match,
            candidate.usb_id.as_deref().unwrap_or(""),
            candidate.description.as_deref().unwrap_or("").replace(',', " "),
        ),
    }
}

/// Format a port list, with a header row for CSV
pub fn format_candidates(candidates: &[CandidateDevice], format: OutputFormat) -> String {
    let mut lines = Vec::with_capacity(candidates.len() + 1);
    if format == OutputFormat::Csv {
        lines.push("port,match,usb_id,description".to_string());
    }
    lines.extend(candidates.iter().map(|c| format_candidate(c, format)));
    lines.join("\n")
}

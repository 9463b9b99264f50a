//! Small helpers shared by the command implementations.

use std::fs;
use std::io::Read;

use anyhow::{Context, Result};
use serde_json::Value;

/// Resolve a `--data` argument: inline JSON, `@path` for a file, or `-` for
/// stdin. The payload must parse as a JSON object.
pub fn read_payload(data: &str) -> Result<Value> {
    let raw = if data == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read payload from stdin")?;
        buffer
    } else if let Some(path) = data.strip_prefix('@') {
        fs::read_to_string(path).with_context(|| format!("failed to read payload file {path}"))?
    } else {
        data.to_string()
    };

    let value: Value = serde_json::from_str(raw.trim()).context("payload is not valid JSON")?;
    anyhow::ensure!(value.is_object(), "payload must be a JSON object");
    Ok(value)
}

/// Pretty-print a JSON value.
pub fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print an aligned two-column-or-more table with a header row.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let line = |cells: &[String]| {
        let padded: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let width = widths.get(i).copied().unwrap_or(0);
                let pad = width.saturating_sub(cell.chars().count());
                format!("{cell}{}", " ".repeat(pad))
            })
            .collect();
        padded.join("  ")
    };

    let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    println!("{}", line(&header_cells));
    println!(
        "{}",
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  ")
    );
    for row in rows {
        println!("{}", line(row));
    }
}

/// A record field as a short display cell; objects/arrays collapse to a
/// marker, long strings are truncated.
pub fn display_cell(record: &Value, field: &str) -> String {
    let cell = match record.get(field) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => format!("[{}]", items.len()),
        Some(Value::Object(_)) => "{…}".to_string(),
        Some(other) => other.to_string(),
    };
    truncate(&cell, 40)
}

/// Truncate to `max` characters, appending an ellipsis when shortened.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{kept}…")
}

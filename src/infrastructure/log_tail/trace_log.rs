//! Trace log lines: whitespace-separated rows of numbers under a `Sample`
//! header.

use anyhow::{Context, Result};
use std::path::Path;

/// Classification of one trace log line.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceLine {
    /// Column labels, starting with the sample column.
    Header(Vec<String>),
    /// Values of one sample. Unparsable fields read as `0.0`.
    Row(Vec<f64>),
    /// Comments, blank lines and lines without numbers.
    Skip,
}

/// Classify a single trace log line.
pub fn parse_trace_line(line: &str) -> TraceLine {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return TraceLine::Skip;
    }
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() == 1 {
        return TraceLine::Skip;
    }
    if tokens[0].to_lowercase().starts_with("sample") {
        return TraceLine::Header(tokens.iter().map(ToString::to_string).collect());
    }

    let mut parsed = 0;
    let row: Vec<f64> = tokens
        .iter()
        .map(|token| match token.parse::<f64>() {
            Ok(value) => {
                parsed += 1;
                value
            }
            Err(_) => 0.0,
        })
        .collect();
    if parsed == 0 {
        TraceLine::Skip
    } else {
        TraceLine::Row(row)
    }
}

/// A complete trace log read from disk.
#[derive(Debug, Clone, Default)]
pub struct TraceLog {
    /// Header labels, if the log has a header
    pub labels: Option<Vec<String>>,
    /// Parsed sample rows
    pub rows: Vec<Vec<f64>>,
    /// Raw text of every accepted row, in order.
    pub lines: Vec<String>,
}

impl TraceLog {
    /// Parse log text; only the first header is kept.
    pub fn parse(text: &str) -> Self {
        let mut log = Self::default();
        for line in text.lines() {
            match parse_trace_line(line) {
                TraceLine::Header(labels) => {
                    if log.labels.is_none() {
                        log.labels = Some(labels);
                    }
                }
                TraceLine::Row(row) => {
                    log.rows.push(row);
                    log.lines.push(line.trim().to_string());
                }
                TraceLine::Skip => {}
            }
        }
        log
    }

    /// Read and parse a log file.
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read trace log {}", path.display()))?;
        Ok(Self::parse(&text))
    }

    /// Values of column `index` over all rows.
    pub fn column(&self, index: usize) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| row.get(index).copied().unwrap_or(0.0))
            .collect()
    }

    /// Distance between consecutive sample numbers, 1 for short logs.
    pub fn sample_interval(&self) -> u64 {
        match (self.rows.first(), self.rows.get(1)) {
            (Some(first), Some(second)) if second[0] > first[0] => (second[0] - first[0]) as u64,
            _ => 1,
        }
    }
}

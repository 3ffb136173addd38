//! Per-chain scalar trace tables.

use crate::domain::errors::ConfigError;

/// Columns used when a trace log carries no header: posterior, likelihood
/// and prior directly follow the sample number.
const DEFAULT_COLUMNS: [usize; 3] = [1, 2, 3];

/// Append-only table of named columns for one chain.
///
/// Every column has the same length; a row is only accepted whole.
#[derive(Debug, Clone, Default)]
pub struct ScalarTable {
    columns: Vec<Vec<f64>>,
}

impl ScalarTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of columns; zero until the first row arrives.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// True before the first row.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a row. The first row fixes the width; a later row of another
    /// width is returned as `Err(expected_width)`.
    pub fn push_row(&mut self, row: &[f64]) -> Result<(), usize> {
        if self.columns.is_empty() {
            self.columns = vec![Vec::new(); row.len()];
        }
        if row.len() != self.columns.len() {
            return Err(self.columns.len());
        }
        for (column, &value) in self.columns.iter_mut().zip(row) {
            column.push(value);
        }
        Ok(())
    }

    /// All samples of column `index`.
    pub fn column(&self, index: usize) -> Option<&[f64]> {
        self.columns.get(index).map(Vec::as_slice)
    }

    /// Copy of row `index`.
    pub fn row(&self, index: usize) -> Option<Vec<f64>> {
        if index >= self.len() {
            return None;
        }
        Some(self.columns.iter().map(|column| column[index]).collect())
    }
}

/// Maps the configured diagnostic trace names onto table columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticColumns {
    names: Vec<String>,
    indices: Vec<usize>,
}

impl DiagnosticColumns {
    /// Resolve `names` against the header `labels`. Without a header the
    /// conventional layout (sample, posterior, likelihood, prior) is assumed.
    pub fn resolve(names: &[String], labels: Option<&[String]>) -> Result<Self, ConfigError> {
        if names.is_empty() {
            return Err(ConfigError::EmptyTraceLabels);
        }
        let indices = match labels {
            Some(labels) => names
                .iter()
                .map(|name| {
                    labels
                        .iter()
                        .position(|label| label == name.trim())
                        .ok_or_else(|| ConfigError::UnknownTraceLabel {
                            label: name.clone(),
                            available: labels.to_vec(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => (0..names.len())
                .map(|i| DEFAULT_COLUMNS.get(i).copied().unwrap_or(i + 1))
                .collect(),
        };
        Ok(Self {
            names: names.to_vec(),
            indices,
        })
    }

    /// Configured names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Table column of each name.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// `(name, column index)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.indices.iter().copied())
    }
}

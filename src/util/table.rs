//! Rectangular string tables with CSV and parquet export.
//!
//! LIMS datasets, dataset manifests and annotation documents all pass through
//! [`Table`]. Cells are stored as strings; integer typing is inferred only at
//! export time (parquet columns, LIMS attribute types).

use std::path::Path;
use std::sync::Arc;

use arrow_array::{ArrayRef, Int64Array, RecordBatch, StringArray};
use parquet::arrow::ArrowWriter;

use crate::error::{AppRunnerError, Result};

/// A table of string cells with named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// Converts a one-character separator string into the byte the csv crate
/// expects.
pub fn separator_byte(separator: &str) -> Result<u8> {
    match separator.as_bytes() {
        [byte] => Ok(*byte),
        _ => Err(AppRunnerError::Table(format!(
            "separator must be a single ASCII character, got {:?}",
            separator
        ))),
    }
}

impl Table {
    /// Creates a table from column names and rows.
    ///
    /// Every row must have exactly one cell per column.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        if let Some(row) = rows.iter().find(|row| row.len() != columns.len()) {
            return Err(AppRunnerError::Table(format!(
                "row has {} cells but the table has {} columns",
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    /// Reads a delimited text file.
    ///
    /// Without a header, columns are named `column_1`, `column_2`, ...
    pub fn read_csv(path: &Path, separator: &str, has_header: bool) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(separator_byte(separator)?)
            .has_headers(has_header)
            .from_path(path)
            .map_err(|e| AppRunnerError::Table(format!("{}: {}", path.display(), e)))?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record =
                record.map_err(|e| AppRunnerError::Table(format!("{}: {}", path.display(), e)))?;
            rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }

        let columns = if has_header {
            reader
                .headers()
                .map_err(|e| AppRunnerError::Table(format!("{}: {}", path.display(), e)))?
                .iter()
                .map(str::to_string)
                .collect()
        } else {
            let width = rows.first().map(Vec::len).unwrap_or(0);
            (1..=width).map(|i| format!("column_{}", i)).collect()
        };

        Self::new(columns, rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Index of the column named exactly `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Index of the column whose name matches `name` ignoring ASCII case.
    pub fn column_index_ignore_case(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Cells of the column at `index`, top to bottom.
    pub fn column_values(&self, index: usize) -> Vec<&str> {
        self.rows.iter().map(|row| row[index].as_str()).collect()
    }

    /// Appends a column; `values` must have one entry per row.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<String>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(AppRunnerError::Table(format!(
                "column has {} values but the table has {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        self.columns.push(name.into());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// Keeps only the rows for which `keep` returns true.
    pub fn retain_rows<F: FnMut(&[String]) -> bool>(&mut self, mut keep: F) {
        self.rows.retain(|row| keep(row));
    }

    /// True when the column has at least one row and every cell parses as
    /// an integer.
    pub fn is_integer_column(&self, index: usize) -> bool {
        !self.rows.is_empty()
            && self
                .rows
                .iter()
                .all(|row| row[index].trim().parse::<i64>().is_ok())
    }

    /// Serialises the table as delimited text with a header line.
    pub fn to_csv(&self, separator: &str) -> Result<String> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(separator_byte(separator)?)
            .from_writer(Vec::new());

        writer
            .write_record(&self.columns)
            .map_err(|e| AppRunnerError::Table(e.to_string()))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|e| AppRunnerError::Table(e.to_string()))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| AppRunnerError::Table(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| AppRunnerError::Table(e.to_string()))
    }

    /// Serialises the table as a parquet file held in memory.
    ///
    /// Integer columns become `Int64`, everything else `Utf8`.
    pub fn to_parquet(&self) -> Result<Vec<u8>> {
        if self.columns.is_empty() {
            return Err(AppRunnerError::Table(
                "cannot write a table without columns to parquet".to_string(),
            ));
        }

        let mut arrays: Vec<(String, ArrayRef)> = Vec::with_capacity(self.columns.len());
        for (index, name) in self.columns.iter().enumerate() {
            let array: ArrayRef = if self.is_integer_column(index) {
                let values: Vec<i64> = self
                    .rows
                    .iter()
                    .map(|row| row[index].trim().parse::<i64>().unwrap_or_default())
                    .collect();
                Arc::new(Int64Array::from(values))
            } else {
                Arc::new(StringArray::from(self.column_values(index)))
            };
            arrays.push((name.clone(), array));
        }

        let batch =
            RecordBatch::try_from_iter(arrays).map_err(|e| AppRunnerError::Table(e.to_string()))?;

        let mut buffer = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), None)
            .map_err(|e| AppRunnerError::Table(e.to_string()))?;
        writer
            .write(&batch)
            .map_err(|e| AppRunnerError::Table(e.to_string()))?;
        writer
            .close()
            .map_err(|e| AppRunnerError::Table(e.to_string()))?;

        Ok(buffer)
    }
}

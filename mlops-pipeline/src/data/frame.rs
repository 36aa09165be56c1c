//! In-memory table of [`FieldValue`] rows with CSV I/O.

use crate::data::document::{Document, FieldValue};
use crate::error::StageError;
use crate::persistence::atomic_write;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

/// Ordered columns plus rows of equal width.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFrame {
    columns: Vec<String>,
    rows: Vec<Vec<FieldValue>>,
}

impl DataFrame {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Tabulate documents. Column order is the first-seen order of field
    /// names; fields absent from a document become [`FieldValue::Missing`].
    pub fn from_documents(docs: &[Document]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for doc in docs {
            for key in doc.keys() {
                if seen.insert(key.to_string()) {
                    columns.push(key.to_string());
                }
            }
        }

        let rows = docs
            .iter()
            .map(|doc| {
                columns
                    .iter()
                    .map(|c| doc.get(c).cloned().unwrap_or(FieldValue::Missing))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    /// Rows back to documents, skipping nothing (missing stays missing).
    pub fn to_documents(&self) -> Vec<Document> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<FieldValue>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, row: Vec<FieldValue>) -> Result<(), StageError> {
        if row.len() != self.columns.len() {
            return Err(StageError::ingestion(format!(
                "row has {} values but the frame has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &FieldValue>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Remove the named columns that are present; returns the ones removed.
    pub fn drop_columns(&mut self, names: &[String]) -> Vec<String> {
        let drop: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| names.contains(c))
            .map(|(i, _)| i)
            .collect();
        if drop.is_empty() {
            return Vec::new();
        }

        let dropped = drop.iter().map(|&i| self.columns[i].clone()).collect();
        let keep = |i: &usize| !drop.contains(i);
        self.columns = self
            .columns
            .drain(..)
            .enumerate()
            .filter(|(i, _)| keep(i))
            .map(|(_, c)| c)
            .collect();
        for row in &mut self.rows {
            *row = row
                .drain(..)
                .enumerate()
                .filter(|(i, _)| keep(i))
                .map(|(_, v)| v)
                .collect();
        }
        dropped
    }

    /// Replace blank text and any of `tokens` (case-insensitive) with
    /// [`FieldValue::Missing`]. Returns the number of cells replaced.
    pub fn normalize_missing(&mut self, tokens: &[String]) -> usize {
        let mut replaced = 0;
        for cell in self.rows.iter_mut().flatten() {
            if let FieldValue::Text(text) = cell {
                let text = text.trim();
                if text.is_empty() || tokens.iter().any(|t| t.eq_ignore_ascii_case(text)) {
                    *cell = FieldValue::Missing;
                    replaced += 1;
                }
            }
        }
        replaced
    }

    /// New frame holding the given rows in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, StageError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(|v| v.to_string()))?;
        }
        writer
            .into_inner()
            .map_err(|e| StageError::Io(e.into_error()))
    }

    /// Write with a header row; missing values are empty cells.
    pub fn write_csv(&self, path: &Path) -> Result<(), StageError> {
        let bytes = self.to_csv_bytes()?;
        atomic_write(path, &bytes)?;
        Ok(())
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, StageError> {
        Self::from_csv_reader_with_text(reader, &[])
    }

    /// Parse CSV, keeping every cell of `text_columns` verbatim as text so
    /// categories such as `001` or `True` survive a write/read cycle.
    pub fn from_csv_reader_with_text<R: Read>(
        reader: R,
        text_columns: &[String],
    ) -> Result<Self, StageError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);
        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let verbatim: Vec<bool> = columns.iter().map(|c| text_columns.contains(c)).collect();
        let mut frame = Self::new(columns);
        for record in reader.records() {
            let record = record?;
            frame.rows.push(
                record
                    .iter()
                    .zip(&verbatim)
                    .map(|(cell, &text)| {
                        if text {
                            FieldValue::text_cell(cell)
                        } else {
                            FieldValue::parse_cell(cell)
                        }
                    })
                    .collect(),
            );
        }
        Ok(frame)
    }

    pub fn read_csv(path: &Path) -> Result<Self, StageError> {
        Self::read_csv_with_text(path, &[])
    }

    pub fn read_csv_with_text(path: &Path, text_columns: &[String]) -> Result<Self, StageError> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader_with_text(std::io::BufReader::new(file), text_columns)
    }
}

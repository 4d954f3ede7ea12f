use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter};

use crate::models::Document;

/// A CSV file whose header row names the document fields.
///
/// Each call to [`CsvSource::records`] reopens the file, so the
/// sequence can be restarted; a single `CsvRecords` iterator is a
/// single pass.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
    headers: Vec<String>,
}

impl CsvSource {
    /// Open `path` and read its header row.
    ///
    /// Fails with `input file not found: PATH` when the file does not
    /// exist.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            bail!("input file not found: {}", path.display());
        }

        let mut reader = reader_for(path)?;
        let headers = reader
            .headers()
            .with_context(|| format!("failed to read CSV header from {}", path.display()))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            headers,
        })
    }

    /// Column names in file order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Lazily iterate the data rows, assigning ids from 1.
    pub fn records(&self) -> Result<CsvRecords> {
        let reader = reader_for(&self.path)?;
        Ok(CsvRecords {
            headers: self.headers.clone(),
            rows: reader.into_records(),
            next_id: 1,
        })
    }
}

fn reader_for(path: &Path) -> Result<csv::Reader<File>> {
    ReaderBuilder::new()
        .has_headers(true)
        // Short and long rows are normalized instead of rejected.
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))
}

/// A CSV row that could not be turned into a document.
#[derive(Debug)]
pub struct RowError {
    /// Id the row would have received.
    pub id: u64,
    pub message: String,
}

/// Iterator over the documents of a [`CsvSource`].
///
/// Malformed rows still consume an id so ids stay aligned with data
/// row numbers.
pub struct CsvRecords {
    headers: Vec<String>,
    rows: StringRecordsIntoIter<File>,
    next_id: u64,
}

impl Iterator for CsvRecords {
    type Item = Result<Document, RowError>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        let id = self.next_id;
        self.next_id += 1;

        Some(match row {
            Ok(record) => Ok(to_document(id, &self.headers, &record)),
            Err(err) => Err(RowError {
                id,
                message: err.to_string(),
            }),
        })
    }
}

/// Pair header names with cells. Missing cells become `""`; cells
/// past the last header are dropped.
fn to_document(id: u64, headers: &[String], record: &StringRecord) -> Document {
    let mut doc = Document::new(id);
    for (idx, column) in headers.iter().enumerate() {
        doc.insert(column.as_str(), record.get(idx).unwrap_or_default());
    }
    doc
}

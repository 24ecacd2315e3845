//! Tabular sink abstraction — one table per form, one row per submission.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::SinkError;

/// A completed submission, keyed by question text in question order.
///
/// Built once on form completion, consumed by the sink, never retained.
#[derive(Debug, Clone, Default)]
pub struct SubmissionRow {
    values: Vec<(String, String)>,
}

impl SubmissionRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value. Keys are unique; a repeated key overwrites in place
    /// so insertion order is preserved.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.values.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.values.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Map a keyed row onto a header order. Headers with no value become empty
/// strings, so the sink always receives one slot per header.
pub fn project_row(headers: &[String], row: &SubmissionRow) -> Vec<String> {
    headers
        .iter()
        .map(|h| row.get(h).unwrap_or("").to_string())
        .collect()
}

/// An external tabular store.
#[async_trait]
pub trait TabularSink: Send + Sync {
    /// Make sure the named table exists with exactly the expected header
    /// row. Idempotent; on a header mismatch the table content is cleared
    /// and replaced with the header row only (destructive reconciliation,
    /// existing data rows are discarded).
    async fn ensure_table(&self, name: &str, expected_headers: &[String])
    -> Result<(), SinkError>;

    /// Append one submission as the last record of the named table.
    async fn append_row(
        &self,
        name: &str,
        expected_headers: &[String],
        row: &SubmissionRow,
    ) -> Result<(), SinkError>;
}

/// In-memory sink (for tests and local runs without a spreadsheet).
#[derive(Default)]
pub struct MemorySink {
    tables: Mutex<HashMap<String, Vec<Vec<String>>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a table's rows, header first. Empty if the table does
    /// not exist.
    pub async fn rows(&self, name: &str) -> Vec<Vec<String>> {
        self.tables
            .lock()
            .await
            .get(name)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl TabularSink for MemorySink {
    async fn ensure_table(
        &self,
        name: &str,
        expected_headers: &[String],
    ) -> Result<(), SinkError> {
        let mut tables = self.tables.lock().await;
        let table = tables.entry(name.to_string()).or_default();

        match table.first() {
            Some(current) if current == expected_headers => {}
            _ => {
                table.clear();
                table.push(expected_headers.to_vec());
            }
        }
        Ok(())
    }

    async fn append_row(
        &self,
        name: &str,
        expected_headers: &[String],
        row: &SubmissionRow,
    ) -> Result<(), SinkError> {
        let mut tables = self.tables.lock().await;
        let table = tables
            .get_mut(name)
            .ok_or_else(|| SinkError::InvalidResponse {
                operation: "append_row".into(),
                reason: format!("table {name:?} does not exist"),
            })?;
        table.push(project_row(expected_headers, row));
        Ok(())
    }
}

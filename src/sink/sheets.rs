//! Google Sheets sink — v4 REST API over reqwest.
//!
//! One worksheet per form, addressed by worksheet title. No retries: any
//! API failure surfaces as a `SinkError` and the caller decides what to do.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use crate::error::SinkError;
use crate::sink::tabular::{SubmissionRow, TabularSink, project_row};

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Rows pre-allocated when creating a worksheet.
const NEW_SHEET_ROWS: usize = 2000;

/// Google Sheets implementation of the tabular sink.
pub struct SheetsSink {
    client: reqwest::Client,
    spreadsheet_id: String,
    token: SecretString,
}

impl SheetsSink {
    pub fn new(spreadsheet_id: String, token: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            spreadsheet_id,
            token,
        }
    }

    fn url(&self, suffix: &str) -> String {
        format!("{SHEETS_API_BASE}/{}{suffix}", self.spreadsheet_id)
    }

    async fn get_json(
        &self,
        operation: &str,
        url: String,
    ) -> Result<serde_json::Value, SinkError> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| SinkError::Request(format!("{operation}: {e}")))?;
        read_json(operation, resp).await
    }

    async fn post_json(
        &self,
        operation: &str,
        url: String,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, SinkError> {
        let resp = self
            .client
            .post(url)
            .bearer_auth(self.token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| SinkError::Request(format!("{operation}: {e}")))?;
        read_json(operation, resp).await
    }

    /// Titles of all worksheets in the spreadsheet.
    async fn sheet_titles(&self) -> Result<Vec<String>, SinkError> {
        let data = self
            .get_json(
                "sheet_titles",
                self.url("?fields=sheets.properties.title"),
            )
            .await?;

        let titles = data
            .get("sheets")
            .and_then(serde_json::Value::as_array)
            .map(|sheets| {
                sheets
                    .iter()
                    .filter_map(|s| s.pointer("/properties/title"))
                    .filter_map(serde_json::Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        Ok(titles)
    }

    async fn add_sheet(&self, title: &str, column_count: usize) -> Result<(), SinkError> {
        let body = serde_json::json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": title,
                        "gridProperties": {
                            "rowCount": NEW_SHEET_ROWS,
                            "columnCount": column_count,
                        }
                    }
                }
            }]
        });
        self.post_json("add_sheet", self.url(":batchUpdate"), &body)
            .await?;
        info!(sheet = title, "Worksheet created");
        Ok(())
    }

    /// Current first row of a worksheet; empty for a blank sheet.
    async fn header_row(&self, title: &str) -> Result<Vec<String>, SinkError> {
        let range = encode_path_segment(&a1_range(title, "1:1"));
        let data = self
            .get_json("header_row", self.url(&format!("/values/{range}")))
            .await?;

        let header = data
            .get("values")
            .and_then(serde_json::Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(serde_json::Value::as_array)
            .map(|cells| {
                cells
                    .iter()
                    .filter_map(serde_json::Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        Ok(header)
    }

    async fn clear_sheet(&self, title: &str) -> Result<(), SinkError> {
        // A bare quoted title addresses the whole sheet.
        let full = encode_path_segment(&quote_title(title));
        self.post_json(
            "clear_sheet",
            self.url(&format!("/values/{full}:clear")),
            &serde_json::json!({}),
        )
        .await?;
        Ok(())
    }

    async fn append(&self, title: &str, values: Vec<String>) -> Result<(), SinkError> {
        let range = encode_path_segment(&a1_range(title, "A1"));
        let body = serde_json::json!({ "values": [values] });
        self.post_json(
            "append",
            self.url(&format!(
                "/values/{range}:append?valueInputOption=USER_ENTERED&insertDataOption=INSERT_ROWS"
            )),
            &body,
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TabularSink for SheetsSink {
    async fn ensure_table(
        &self,
        name: &str,
        expected_headers: &[String],
    ) -> Result<(), SinkError> {
        let titles = self.sheet_titles().await?;

        if !titles.iter().any(|t| t == name) {
            self.add_sheet(name, expected_headers.len().max(10) + 5)
                .await?;
            self.append(name, expected_headers.to_vec()).await?;
            return Ok(());
        }

        let current = self.header_row(name).await?;
        if current != expected_headers {
            warn!(
                sheet = name,
                current = ?current,
                expected = ?expected_headers,
                "Header mismatch — clearing worksheet and rewriting header row"
            );
            self.clear_sheet(name).await?;
            self.append(name, expected_headers.to_vec()).await?;
        }
        Ok(())
    }

    async fn append_row(
        &self,
        name: &str,
        expected_headers: &[String],
        row: &SubmissionRow,
    ) -> Result<(), SinkError> {
        self.append(name, project_row(expected_headers, row)).await?;
        info!(sheet = name, "Submission row appended");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

async fn read_json(
    operation: &str,
    resp: reqwest::Response,
) -> Result<serde_json::Value, SinkError> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| SinkError::Request(format!("{operation}: {e}")))?;

    if !status.is_success() {
        return Err(SinkError::Api {
            operation: operation.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| SinkError::InvalidResponse {
        operation: operation.to_string(),
        reason: e.to_string(),
    })
}

/// Quote a worksheet title for A1 notation, doubling embedded quotes.
fn quote_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

/// Build a quoted A1 range like `'My sheet'!1:1`.
fn a1_range(title: &str, cells: &str) -> String {
    format!("{}!{cells}", quote_title(title))
}

/// Percent-encode a URL path segment (RFC 3986 unreserved set).
fn encode_path_segment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a1_range_quotes_title() {
        assert_eq!(a1_range("Sheet one", "1:1"), "'Sheet one'!1:1");
    }

    #[test]
    fn a1_range_escapes_embedded_quotes() {
        assert_eq!(a1_range("It's camp", "A1"), "'It''s camp'!A1");
    }

    #[test]
    fn path_segment_encoding() {
        assert_eq!(encode_path_segment("abc-123"), "abc-123");
        assert_eq!(
            encode_path_segment("'Parent questionnaire'!1:1"),
            "%27Parent%20questionnaire%27%211%3A1"
        );
    }

    #[test]
    fn url_building() {
        let sink = SheetsSink::new("SHEET42".into(), SecretString::from("tok"));
        assert_eq!(
            sink.url(":batchUpdate"),
            "https://sheets.googleapis.com/v4/spreadsheets/SHEET42:batchUpdate"
        );
        assert_eq!(
            sink.url("/values/x:clear"),
            "https://sheets.googleapis.com/v4/spreadsheets/SHEET42/values/x:clear"
        );
    }

    #[test]
    fn quote_title_round_trips_plain_names() {
        assert_eq!(quote_title("Camper questionnaire"), "'Camper questionnaire'");
    }
}

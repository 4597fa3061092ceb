use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::SheetsError;

/// Characters percent-encoded inside an A1 range path segment. `!` and `:`
/// stay literal; sheet names commonly carry spaces and quotes.
const RANGE_ENCODE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Builds a fully-qualified A1 range: `'Sheet name'!A2:Z`.
///
/// The sheet name is always single-quoted (embedded quotes doubled), which
/// is valid for plain names and required for names with spaces.
#[must_use]
pub(crate) fn a1_range(sheet_name: &str, cells: &str) -> String {
    let escaped = sheet_name.replace('\'', "''");
    format!("'{escaped}'!{cells}")
}

/// Settings for [`SheetsClient`], sourced from `AppConfig` in the binaries.
#[derive(Debug, Clone)]
pub struct SheetsSettings {
    pub api_base: String,
    pub token: String,
    pub request_timeout_secs: u64,
}

/// Thin HTTP client for the spreadsheet values API.
///
/// Reads and writes cell ranges; all sheet semantics (column discovery, the
/// results-cell protocol) live in [`crate::adapter`] and [`crate::columns`].
#[derive(Clone)]
pub struct SheetsClient {
    client: Client,
    api_base: String,
    token: String,
}

/// `values.get` response body.
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Renders one cell to a string. The API returns strings for formatted
/// reads, but numbers and bools appear on unformatted sheets.
fn cell_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

impl SheetsClient {
    /// Creates a `SheetsClient` with the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SheetsError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(settings: SheetsSettings) -> Result<Self, SheetsError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_owned(),
            token: settings.token,
        })
    }

    fn values_url(&self, source_id: &str, range: &str) -> String {
        let encoded = utf8_percent_encode(range, RANGE_ENCODE);
        format!(
            "{}/v4/spreadsheets/{source_id}/values/{encoded}",
            self.api_base
        )
    }

    /// Fetches a cell range as row-major strings.
    ///
    /// An empty range (no values key in the response) yields an empty vec.
    ///
    /// # Errors
    ///
    /// Returns [`SheetsError::Unavailable`] on any non-2xx response,
    /// [`SheetsError::Http`] on transport failure, or
    /// [`SheetsError::Deserialize`] if the body does not parse.
    pub async fn get_values(
        &self,
        source_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, SheetsError> {
        let url = self.values_url(source_id, range);
        let response = self.client.get(&url).bearer_auth(&self.token).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SheetsError::Unavailable {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.text().await?;
        let range: ValueRange =
            serde_json::from_str(&body).map_err(|e| SheetsError::Deserialize {
                context: format!("values for {source_id}"),
                source: e,
            })?;

        Ok(range
            .values
            .iter()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect())
    }

    /// Writes one cell range with raw (unparsed) input values.
    ///
    /// # Errors
    ///
    /// Returns [`SheetsError::Unavailable`] on any non-2xx response or
    /// [`SheetsError::Http`] on transport failure.
    pub async fn update_values(
        &self,
        source_id: &str,
        range: &str,
        values: Vec<Vec<String>>,
    ) -> Result<(), SheetsError> {
        let url = format!("{}?valueInputOption=RAW", self.values_url(source_id, range));
        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.token)
            .json(&json!({
                "range": range,
                "majorDimension": "ROWS",
                "values": values,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SheetsError::Unavailable {
                status: status.as_u16(),
                url,
            });
        }
        Ok(())
    }

    /// Writes several disjoint ranges in one `values:batchUpdate` call.
    ///
    /// Used for all state-transition writes so a batch of row markers is a
    /// single request; re-applying the same values is a no-op on the sheet.
    ///
    /// # Errors
    ///
    /// Returns [`SheetsError::Unavailable`] on any non-2xx response or
    /// [`SheetsError::Http`] on transport failure.
    pub async fn batch_update(
        &self,
        source_id: &str,
        data: &[(String, Vec<Vec<String>>)],
    ) -> Result<(), SheetsError> {
        let url = format!(
            "{}/v4/spreadsheets/{source_id}/values:batchUpdate",
            self.api_base
        );
        let entries: Vec<Value> = data
            .iter()
            .map(|(range, values)| {
                json!({
                    "range": range,
                    "majorDimension": "ROWS",
                    "values": values,
                })
            })
            .collect();

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&json!({
                "valueInputOption": "RAW",
                "data": entries,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SheetsError::Unavailable {
                status: status.as_u16(),
                url,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a1_range_quotes_sheet_name() {
        assert_eq!(a1_range("Tracked", "A1:Z1"), "'Tracked'!A1:Z1");
        assert_eq!(a1_range("My Sheet", "A2:Z"), "'My Sheet'!A2:Z");
    }

    #[test]
    fn a1_range_escapes_embedded_quotes() {
        assert_eq!(a1_range("Q1 'draft'", "C3"), "'Q1 ''draft'''!C3");
    }

    #[test]
    fn cell_to_string_renders_scalars() {
        assert_eq!(cell_to_string(&Value::String("x".into())), "x");
        assert_eq!(cell_to_string(&serde_json::json!(42)), "42");
        assert_eq!(cell_to_string(&Value::Bool(true)), "true");
        assert_eq!(cell_to_string(&Value::Null), "");
    }
}

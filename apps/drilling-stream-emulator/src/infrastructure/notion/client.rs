//! Notion Data Source Client
//!
//! Reads every row of a Notion data source via
//! `POST /data_sources/{id}/query`, following `next_cursor` until the result
//! set is exhausted, and turns each row into a [`Record`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

use super::page::{ApiErrorBody, QueryResponse};
use crate::application::ports::{RecordSource, SourceError};
use crate::domain::record::Record;
use crate::infrastructure::config::NotionSettings;

// =============================================================================
// Configuration
// =============================================================================

/// Connection settings for [`NotionRecordSource`].
#[derive(Clone)]
pub struct NotionConfig {
    /// Integration token.
    pub api_key: String,
    /// Data source identifier.
    pub data_source_id: String,
    /// API base URL.
    pub api_url: String,
    /// `Notion-Version` header value.
    pub api_version: String,
    /// Property to sort ascending by.
    pub sort_property: Option<String>,
    /// Rows requested per page.
    pub page_size: u32,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl std::fmt::Debug for NotionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotionConfig")
            .field("api_key", &"[REDACTED]")
            .field("data_source_id", &self.data_source_id)
            .field("api_url", &self.api_url)
            .field("api_version", &self.api_version)
            .field("sort_property", &self.sort_property)
            .field("page_size", &self.page_size)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl From<&NotionSettings> for NotionConfig {
    fn from(settings: &NotionSettings) -> Self {
        Self {
            api_key: settings.api_key().to_string(),
            data_source_id: settings.data_source_id.clone(),
            api_url: settings.api_url.clone(),
            api_version: settings.api_version.clone(),
            sort_property: settings.sort_property.clone(),
            page_size: settings.page_size,
            timeout: settings.timeout,
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Notion client errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotionError {
    /// Transport failure (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// Non-success HTTP status.
    #[error("notion api error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message from the error body, or the raw body.
        message: String,
    },

    /// Response body did not match the expected shape.
    #[error("failed to parse response: {0}")]
    JsonParse(String),

    /// Client could not be constructed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<NotionError> for SourceError {
    fn from(err: NotionError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

// =============================================================================
// Client
// =============================================================================

/// [`RecordSource`] backed by a Notion data source.
#[derive(Debug, Clone)]
pub struct NotionRecordSource {
    client: Client,
    config: NotionConfig,
}

impl NotionRecordSource {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns [`NotionError::InvalidConfig`] if credentials are missing or
    /// the HTTP client cannot be built.
    pub fn new(config: NotionConfig) -> Result<Self, NotionError> {
        if config.api_key.is_empty() {
            return Err(NotionError::InvalidConfig("api key is empty".to_string()));
        }
        if config.data_source_id.is_empty() {
            return Err(NotionError::InvalidConfig(
                "data source id is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NotionError::InvalidConfig(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn query_url(&self) -> String {
        format!(
            "{}/data_sources/{}/query",
            self.config.api_url.trim_end_matches('/'),
            self.config.data_source_id
        )
    }

    fn query_body(&self, start_cursor: Option<&str>) -> Value {
        let mut body = json!({ "page_size": self.config.page_size });
        if let Some(property) = &self.config.sort_property {
            body["sorts"] = json!([{ "property": property, "direction": "ascending" }]);
        }
        if let Some(cursor) = start_cursor {
            body["start_cursor"] = json!(cursor);
        }
        body
    }

    async fn query_page(&self, start_cursor: Option<&str>) -> Result<QueryResponse, NotionError> {
        let response = self
            .client
            .post(self.query_url())
            .bearer_auth(&self.config.api_key)
            .header("Notion-Version", &self.config.api_version)
            .json(&self.query_body(start_cursor))
            .send()
            .await
            .map_err(|e| NotionError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| NotionError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(api_error(status, &text));
        }

        serde_json::from_str(&text).map_err(|e| NotionError::JsonParse(e.to_string()))
    }

    /// Fetch every row, following pagination.
    ///
    /// # Errors
    ///
    /// Returns the first page failure; partial results are discarded.
    pub async fn fetch_records(&self) -> Result<Vec<Record>, NotionError> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0_u32;

        loop {
            let page = self.query_page(cursor.as_deref()).await?;
            pages += 1;
            records.extend(page.results.iter().map(super::page::PageObject::to_record));

            match (page.has_more, page.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                (true, None) => {
                    tracing::warn!(pages, "Notion reported more rows without a cursor, stopping");
                    break;
                }
                (false, _) => break,
            }
        }

        tracing::debug!(pages, rows = records.len(), "Fetched Notion data source");
        Ok(records)
    }
}

fn api_error(status: StatusCode, body: &str) -> NotionError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|err| match (err.code, err.message) {
            (Some(code), Some(message)) => Some(format!("{code}: {message}")),
            (None, Some(message)) => Some(message),
            (Some(code), None) => Some(code),
            (None, None) => None,
        })
        .unwrap_or_else(|| body.to_string());

    NotionError::Api {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl RecordSource for NotionRecordSource {
    async fn fetch_all(&self) -> Result<Vec<Record>, SourceError> {
        self.fetch_records().await.map_err(SourceError::from)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> NotionConfig {
        NotionConfig::from(&NotionSettings::new(
            "secret_abc".to_string(),
            "ds-123".to_string(),
        ))
    }

    #[test]
    fn rejects_empty_credentials() {
        let mut cfg = config();
        cfg.api_key = String::new();
        assert!(matches!(
            NotionRecordSource::new(cfg),
            Err(NotionError::InvalidConfig(_))
        ));

        let mut cfg = config();
        cfg.data_source_id = String::new();
        assert!(matches!(
            NotionRecordSource::new(cfg),
            Err(NotionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn query_url_strips_trailing_slash() {
        let mut cfg = config();
        cfg.api_url = "http://localhost:9999/v1/".to_string();
        let source = NotionRecordSource::new(cfg).unwrap();
        assert_eq!(
            source.query_url(),
            "http://localhost:9999/v1/data_sources/ds-123/query"
        );
    }

    #[test]
    fn query_body_includes_sort_and_cursor() {
        let source = NotionRecordSource::new(config()).unwrap();

        let first = source.query_body(None);
        assert_eq!(first["page_size"], 100);
        assert_eq!(first["sorts"][0]["property"], "Номер");
        assert_eq!(first["sorts"][0]["direction"], "ascending");
        assert!(first.get("start_cursor").is_none());

        let next = source.query_body(Some("cur-2"));
        assert_eq!(next["start_cursor"], "cur-2");
    }

    #[test]
    fn query_body_without_sort() {
        let mut cfg = config();
        cfg.sort_property = None;
        let source = NotionRecordSource::new(cfg).unwrap();
        assert!(source.query_body(None).get("sorts").is_none());
    }

    #[test]
    fn api_error_prefers_structured_body() {
        let err = api_error(
            StatusCode::UNAUTHORIZED,
            r#"{"object":"error","status":401,"code":"unauthorized","message":"API token is invalid."}"#,
        );
        assert_eq!(
            err,
            NotionError::Api {
                status: 401,
                message: "unauthorized: API token is invalid.".to_string()
            }
        );

        let raw = api_error(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(
            raw,
            NotionError::Api {
                status: 502,
                message: "upstream down".to_string()
            }
        );
    }

    #[test]
    fn notion_error_maps_to_unavailable() {
        let err = SourceError::from(NotionError::Network("connection refused".to_string()));
        assert_eq!(
            err,
            SourceError::Unavailable("network error: connection refused".to_string())
        );
    }

    #[test]
    fn debug_redacts_api_key() {
        let debug = format!("{:?}", config());
        assert!(!debug.contains("secret_abc"));
        assert!(debug.contains("[REDACTED]"));
    }
}

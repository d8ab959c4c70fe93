//! Notion API Payloads
//!
//! Serde models for the subset of the data source query response the
//! emulator reads. Everything else in the payload is ignored.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Number;

use crate::domain::record::Record;

/// One page of a data source query.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    /// Rows on this page.
    pub results: Vec<PageObject>,
    /// Whether more pages follow.
    #[serde(default)]
    pub has_more: bool,
    /// Cursor for the next page.
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// One row.
#[derive(Debug, Clone, Deserialize)]
pub struct PageObject {
    /// Page identifier.
    #[serde(default)]
    pub id: String,
    /// Column values keyed by property name.
    #[serde(default)]
    pub properties: HashMap<String, PropertyValue>,
}

/// A typed property value. Only numbers are modelled.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyValue {
    /// `number` column; `None` when the cell is empty.
    Number {
        /// Cell value.
        number: Option<Number>,
    },
    /// Any other column type.
    #[serde(other)]
    Other,
}

impl PageObject {
    /// Build a record from the page's number columns.
    ///
    /// Empty number cells become `0`; non-number columns are skipped.
    #[must_use]
    pub fn to_record(&self) -> Record {
        self.properties
            .iter()
            .filter_map(|(name, value)| match value {
                PropertyValue::Number { number } => Some((
                    name.clone(),
                    number.clone().unwrap_or_else(|| Number::from(0)),
                )),
                PropertyValue::Other => None,
            })
            .collect()
    }
}

/// Error body returned by the Notion API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Machine-readable error code.
    #[serde(default)]
    pub code: Option<String>,
    /// Human-readable message.
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn number_columns_become_fields() {
        let page: PageObject = serde_json::from_value(json!({
            "object": "page",
            "id": "p1",
            "properties": {
                "Depth": {"id": "a", "type": "number", "number": 1520.5},
                "WOB": {"id": "b", "type": "number", "number": 12},
                "Empty": {"id": "c", "type": "number", "number": null},
                "Name": {"id": "title", "type": "title", "title": [{"plain_text": "row"}]},
                "Done": {"id": "d", "type": "checkbox", "checkbox": true}
            }
        }))
        .unwrap();

        let record = page.to_record();
        assert_eq!(record.len(), 3);
        assert_eq!(record.get_f64("Depth"), Some(1520.5));
        assert_eq!(record.get("WOB"), Some(&Number::from(12)));
        assert_eq!(record.get("Empty"), Some(&Number::from(0)));
        assert!(record.get("Name").is_none());
    }

    #[test]
    fn query_response_pagination_fields() {
        let response: QueryResponse = serde_json::from_value(json!({
            "object": "list",
            "results": [],
            "has_more": true,
            "next_cursor": "abc"
        }))
        .unwrap();
        assert!(response.has_more);
        assert_eq!(response.next_cursor.as_deref(), Some("abc"));

        let last: QueryResponse =
            serde_json::from_value(json!({"results": [], "next_cursor": null})).unwrap();
        assert!(!last.has_more);
        assert!(last.next_cursor.is_none());
    }

    #[test]
    fn page_without_properties_is_empty_record() {
        let page: PageObject = serde_json::from_value(json!({"id": "p"})).unwrap();
        assert!(page.to_record().is_empty());
    }
}

//! Contact list handlers

use axum::{
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use std::sync::Arc;
use zapcast_core::ContactParseReport;

use crate::auth::AppState;

/// Content type assumed when the upload does not declare one
const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Declared content type of an upload
pub fn content_type(headers: &HeaderMap) -> &str {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}

/// Parse an uploaded contact list without storing it
///
/// POST /api/v1/contacts/parse
pub async fn parse_contacts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Json<ContactParseReport> {
    Json(state.parser.parse(&body, content_type(&headers)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_content_type_defaults_to_plain_text() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_type(&headers), "text/plain");

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/vcard"));
        assert_eq!(content_type(&headers), "text/vcard");
    }
}

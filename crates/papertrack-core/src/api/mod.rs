//! Paper server API: the trait the sync layer talks through, the response
//! envelope, and the error taxonomy for remote calls.

pub mod mock;
pub mod remote;

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::query::PaperQuery;
use crate::{CustomTag, Pagination, PaperId, PaperPage, StatusKind, TagRef};

/// Boxed future returned by [`PaperApi`] methods.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(u16),
    /// The server answered `success: false`; the message is shown verbatim.
    #[error("{0}")]
    Rejected(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// The paper server as seen by the front-end.
///
/// Every call is a single request/response with no retry.
pub trait PaperApi: Send + Sync {
    fn fetch_papers<'a>(&'a self, query: &'a PaperQuery) -> ApiFuture<'a, PaperPage>;

    /// Persist one flag for one paper (`/status/read` or `/status/favorite`).
    fn set_status<'a>(
        &'a self,
        kind: StatusKind,
        paper_id: &'a PaperId,
        value: bool,
    ) -> ApiFuture<'a, ()>;

    /// Every paper id the server holds in the given set.
    fn fetch_status_set(&self, kind: StatusKind) -> ApiFuture<'_, Vec<PaperId>>;

    fn fetch_taxonomy(&self) -> ApiFuture<'_, Vec<CustomTag>>;

    fn fetch_paper_tags<'a>(&'a self, paper_id: &'a PaperId) -> ApiFuture<'a, Vec<TagRef>>;

    fn assign_tag<'a>(&'a self, paper_id: &'a PaperId, tag_id: i64) -> ApiFuture<'a, ()>;

    fn remove_tag<'a>(&'a self, paper_id: &'a PaperId, tag_id: i64) -> ApiFuture<'a, ()>;

    fn fetch_categories(&self) -> ApiFuture<'_, Vec<String>>;

    fn fetch_fulltext<'a>(&'a self, paper_id: &'a PaperId) -> ApiFuture<'a, String>;
}

/// The `{success, data?, error?, message?}` wrapper every endpoint responds with.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

impl<T> Envelope<T> {
    /// Split into the payload, or the server's rejection message.
    pub fn into_result(self) -> Result<(Option<T>, Option<Pagination>), ApiError> {
        if self.success {
            Ok((self.data, self.pagination))
        } else {
            Err(ApiError::Rejected(
                self.failure_text()
                    .unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }

    /// `error` if present, else `message`. Some endpoints only fill the latter.
    fn failure_text(self) -> Option<String> {
        self.error.or(self.message)
    }
}

/// Parse a response body into an envelope, rejecting anything that doesn't
/// have the expected shape.
pub fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<Envelope<T>, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Malformed(e.to_string()))
}

/// Map an HTTP response to the envelope payload.
///
/// A non-2xx response carrying an envelope with an `error` (or `message`) is
/// reported with that text; any other non-2xx is reported by status code.
pub async fn read_envelope<T: DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<(Option<T>, Option<Pagination>), ApiError> {
    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        if let Ok(envelope) = serde_json::from_str::<Envelope<serde_json::Value>>(&body)
            && let Some(error) = envelope.failure_text()
        {
            return Err(ApiError::Rejected(error));
        }
        return Err(ApiError::Status(status.as_u16()));
    }

    parse_envelope::<T>(&body)?.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> reqwest::Response {
        let http_resp = http::Response::builder()
            .status(status)
            .body(body.to_string())
            .unwrap();
        reqwest::Response::from(http_resp)
    }

    // ── parse_envelope ─────────────────────────────────────────────────

    #[test]
    fn success_with_data() {
        let env: Envelope<Vec<String>> =
            parse_envelope(r#"{"success": true, "data": ["a", "b"]}"#).unwrap();
        let (data, pagination) = env.into_result().unwrap();
        assert_eq!(data.unwrap(), vec!["a", "b"]);
        assert!(pagination.is_none());
    }

    #[test]
    fn success_without_data() {
        let env: Envelope<serde_json::Value> =
            parse_envelope(r#"{"success": true, "message": "ok"}"#).unwrap();
        let (data, _) = env.into_result().unwrap();
        assert!(data.is_none());
    }

    #[test]
    fn failure_message_verbatim() {
        let env: Envelope<serde_json::Value> =
            parse_envelope(r#"{"success": false, "error": "duplicate"}"#).unwrap();
        let err = env.into_result().unwrap_err();
        assert_eq!(err.to_string(), "duplicate");
    }

    #[test]
    fn failure_falls_back_to_message_field() {
        let env: Envelope<serde_json::Value> =
            parse_envelope(r#"{"success": false, "message": "paper not found"}"#).unwrap();
        assert!(matches!(env.into_result(), Err(ApiError::Rejected(m)) if m == "paper not found"));
    }

    #[test]
    fn error_field_wins_over_message() {
        let env: Envelope<serde_json::Value> = parse_envelope(
            r#"{"success": false, "error": "duplicate", "message": "try again"}"#,
        )
        .unwrap();
        assert_eq!(env.into_result().unwrap_err().to_string(), "duplicate");
    }

    #[test]
    fn failure_without_message() {
        let env: Envelope<serde_json::Value> = parse_envelope(r#"{"success": false}"#).unwrap();
        assert!(matches!(env.into_result(), Err(ApiError::Rejected(m)) if m == "unknown error"));
    }

    #[test]
    fn missing_success_is_malformed() {
        let err = parse_envelope::<serde_json::Value>(r#"{"data": []}"#).unwrap_err();
        assert!(matches!(err, ApiError::Malformed(_)));
    }

    #[test]
    fn wrong_data_shape_is_malformed() {
        let err =
            parse_envelope::<Vec<String>>(r#"{"success": true, "data": {"x": 1}}"#).unwrap_err();
        assert!(matches!(err, ApiError::Malformed(_)));
    }

    // ── read_envelope ──────────────────────────────────────────────────

    #[tokio::test]
    async fn ok_response_yields_pagination() {
        let resp = response(
            200,
            r#"{"success": true, "data": [], "pagination": {"total": 7, "limit": 5, "offset": 0, "has_more": true}}"#,
        );
        let (data, pagination) = read_envelope::<Vec<String>>(resp).await.unwrap();
        assert!(data.unwrap().is_empty());
        let pagination = pagination.unwrap();
        assert_eq!(pagination.total, 7);
        assert!(pagination.has_more);
    }

    #[tokio::test]
    async fn server_error_with_envelope_uses_message() {
        let resp = response(500, r#"{"success": false, "error": "tag insert failed"}"#);
        let err = read_envelope::<serde_json::Value>(resp).await.unwrap_err();
        assert!(matches!(err, ApiError::Rejected(m) if m == "tag insert failed"));
    }

    #[tokio::test]
    async fn server_error_with_message_only_envelope() {
        let resp = response(404, r#"{"success": false, "message": "no such paper"}"#);
        let err = read_envelope::<serde_json::Value>(resp).await.unwrap_err();
        assert!(matches!(err, ApiError::Rejected(m) if m == "no such paper"));
    }

    #[tokio::test]
    async fn server_error_without_envelope_uses_status() {
        let resp = response(502, "<html>bad gateway</html>");
        let err = read_envelope::<serde_json::Value>(resp).await.unwrap_err();
        assert!(matches!(err, ApiError::Status(502)));
    }

    #[tokio::test]
    async fn ok_with_garbage_body_is_malformed() {
        let resp = response(200, "not json");
        let err = read_envelope::<serde_json::Value>(resp).await.unwrap_err();
        assert!(matches!(err, ApiError::Malformed(_)));
    }
}

pub mod base;
pub mod events;
pub mod follow;
pub mod skills;
pub mod users;

use once_cell::sync::Lazy;
use reqwest::{Client, Url};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use crate::config::AppConfig;
use crate::session::Session;

pub use users::Directory;

static HTTP: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent(concat!("event-lagbe/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("http client")
});

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("parse error: {0}")]
    Parse(String),
}

/// How a failed call should be reported to the person who triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Validation,
    NotFound,
    Unauthorized,
    Server,
    Decode,
}

impl ApiError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ApiError::InvalidUrl(_) | ApiError::Http(_) => FailureKind::Network,
            ApiError::Parse(_) => FailureKind::Decode,
            ApiError::Status { status, .. } => match *status {
                401 | 403 => FailureKind::Unauthorized,
                404 => FailureKind::NotFound,
                400 | 409 | 422 => FailureKind::Validation,
                _ => FailureKind::Server,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == FailureKind::NotFound
    }

    /// Short text suitable for a toast or inline banner. Prefers the
    /// backend's own `message`/`error` field when the body carries one.
    pub fn user_message(&self) -> String {
        if let ApiError::Status { body, .. } = self {
            if let Some(message) = backend_message(body) {
                return message;
            }
        }
        match self.kind() {
            FailureKind::Network => "Could not reach the server. Please try again.".to_string(),
            FailureKind::Validation => "The request was rejected. Check your input.".to_string(),
            FailureKind::NotFound => "The requested item no longer exists.".to_string(),
            FailureKind::Unauthorized => "You are not allowed to do that.".to_string(),
            FailureKind::Server => "The server failed to handle the request.".to_string(),
            FailureKind::Decode => "The server sent an unexpected response.".to_string(),
        }
    }
}

fn backend_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => ["message", "error"]
            .iter()
            .filter_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string),
        Ok(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Ok(_) => None,
        Err(_) if trimmed.len() <= 200 && !trimmed.starts_with('<') => Some(trimmed.to_string()),
        Err(_) => None,
    }
}

/// A list response that is either a bare array or a page wrapper.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Bare(Vec<T>),
    Paged(PageEnvelope<T>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub content: Vec<T>,
    #[serde(default)]
    pub last: Option<bool>,
    #[serde(default)]
    pub total_elements: Option<u64>,
    #[serde(default)]
    pub number: Option<u32>,
}

impl<T> Listing<T> {
    pub fn items(&self) -> &[T] {
        match self {
            Listing::Bare(items) => items,
            Listing::Paged(page) => &page.content,
        }
    }

    pub fn into_items(self) -> Vec<T> {
        match self {
            Listing::Bare(items) => items,
            Listing::Paged(page) => page.content,
        }
    }

    /// A bare array is always the whole result. A page without a `last`
    /// flag is treated as final so callers never walk forever.
    pub fn is_last(&self) -> bool {
        match self {
            Listing::Bare(_) => true,
            Listing::Paged(page) => page.last.unwrap_or(true),
        }
    }
}

/// Decodes any list endpoint body. `null`, an empty body or an object
/// without `content` all decode to an empty list.
pub fn decode_listing<T: DeserializeOwned>(body: &str) -> Result<Listing<T>, ApiError> {
    if body.trim().is_empty() {
        return Ok(Listing::Bare(Vec::new()));
    }
    let value: Value =
        serde_json::from_str(body).map_err(|err| ApiError::Parse(err.to_string()))?;
    if value.is_null() {
        return Ok(Listing::Bare(Vec::new()));
    }
    serde_json::from_value(value).map_err(|err| ApiError::Parse(err.to_string()))
}

/// Client for the Event Lagbe REST backend.
#[derive(Clone)]
pub struct ApiClient {
    base: Url,
    http: Client,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let base = Url::parse(base_url.trim())
            .map_err(|err| ApiError::InvalidUrl(format!("{base_url}: {err}")))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(format!("{base_url} cannot be a base url")));
        }
        Ok(Self {
            base,
            http: HTTP.clone(),
            token: None,
        })
    }

    pub fn from_config(config: &AppConfig, session: Option<&Session>) -> Result<Self, ApiError> {
        let client = Self::new(&config.api_base_url)?;
        Ok(match session.and_then(|s| s.id_token.clone()) {
            Some(token) => client.with_token(token),
            None => client,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Skill;

    #[test]
    fn listing_accepts_bare_arrays_and_pages() {
        let bare: Listing<Skill> = decode_listing(r#"[{"id": 1, "name": "Rust"}]"#).expect("bare");
        assert!(bare.is_last());
        assert_eq!(bare.items()[0].name, "Rust");

        let paged: Listing<Skill> =
            decode_listing(r#"{"content": [{"id": "2", "name": "Go"}], "last": false}"#)
                .expect("paged");
        assert!(!paged.is_last());
        assert_eq!(paged.into_items()[0].id, "2");
    }

    #[test]
    fn listing_degrades_to_empty() {
        for body in ["", "null", "{}", r#"{"message": "nothing here"}"#] {
            let listing: Listing<Skill> = decode_listing(body).expect("empty listing");
            assert!(listing.items().is_empty(), "body {body:?}");
        }
    }

    #[test]
    fn listing_rejects_garbage() {
        assert!(decode_listing::<Skill>("not json").is_err());
    }

    #[test]
    fn failure_kinds_follow_status_codes() {
        let status = |status| ApiError::Status {
            status,
            body: String::new(),
        };
        assert_eq!(status(404).kind(), FailureKind::NotFound);
        assert_eq!(status(403).kind(), FailureKind::Unauthorized);
        assert_eq!(status(409).kind(), FailureKind::Validation);
        assert_eq!(status(502).kind(), FailureKind::Server);
        assert_eq!(ApiError::Http("reset".into()).kind(), FailureKind::Network);
    }

    #[test]
    fn user_message_prefers_backend_text() {
        let err = ApiError::Status {
            status: 400,
            body: r#"{"message": "Username already taken"}"#.into(),
        };
        assert_eq!(err.user_message(), "Username already taken");

        let html = ApiError::Status {
            status: 500,
            body: "<html>boom</html>".into(),
        };
        assert_eq!(
            html.user_message(),
            "The server failed to handle the request."
        );
    }

    #[test]
    fn client_rejects_bad_base_url() {
        assert!(ApiClient::new("not a url").is_err());
        assert!(ApiClient::new("mailto:someone@example.com").is_err());
        assert!(ApiClient::new("http://localhost:8080").is_ok());
    }
}

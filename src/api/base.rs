use reqwest::{Method, RequestBuilder, Url};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::{decode_listing, ApiClient, ApiError, Listing};

impl ApiClient {
    /// Joins `segments` onto the base url, percent-encoding each one.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url().clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                ApiError::InvalidUrl(format!("{} cannot be a base", self.base_url()))
            })?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    pub fn endpoint_with_query(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<Url, ApiError> {
        let mut url = self.endpoint(segments)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.http.request(method, url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends once and returns the body text of a 2xx response.
    pub(crate) async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<String>,
    ) -> Result<String, ApiError> {
        debug!(%method, %url, "backend request");
        let mut request = self.request(method.clone(), url.clone());
        if let Some(json) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(json);
        }

        let response = request.send().await.map_err(|err| {
            warn!(%method, %url, error = %err, "backend unreachable");
            ApiError::Http(err.to_string())
        })?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| ApiError::Http(err.to_string()))?;

        if !status.is_success() {
            warn!(%method, %url, status = status.as_u16(), "backend rejected request");
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(text)
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let text = self.execute(Method::GET, url, None).await?;
        parse_body(&text)
    }

    pub(crate) async fn get_listing<T: DeserializeOwned>(
        &self,
        url: Url,
    ) -> Result<Listing<T>, ApiError> {
        let text = self.execute(Method::GET, url, None).await?;
        decode_listing(&text)
    }

    /// Sends a JSON body; returns the decoded response if the backend sent one.
    pub(crate) async fn send_json<B, T>(
        &self,
        method: Method,
        url: Url,
        payload: &B,
    ) -> Result<Option<T>, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let json = serde_json::to_string(payload).map_err(|err| ApiError::Parse(err.to_string()))?;
        let text = self.execute(method, url, Some(json)).await?;
        parse_optional_body(&text)
    }

    pub(crate) async fn send_empty(&self, method: Method, url: Url) -> Result<String, ApiError> {
        self.execute(method, url, None).await
    }
}

pub(crate) fn parse_body<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
    serde_json::from_str(text).map_err(|err| ApiError::Parse(err.to_string()))
}

pub(crate) fn parse_optional_body<T: DeserializeOwned>(text: &str) -> Result<Option<T>, ApiError> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(None);
    }
    parse_body(trimmed).map(Some)
}

//! HTTP plumbing shared by the provider adapters.
//!
//! Adapters speak to exactly one kind of endpoint: a form-encoded POST that
//! answers with a token (or OAuth error) payload. This module centralizes the
//! request shape, per-request timeouts, and the status-code to error mapping
//! so the adapters stay declarative.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{ProviderError, ProviderResult};
use crate::token::Token;

/// POST `params` to `url` as a form body and return the raw response body.
///
/// 2xx bodies are returned for the caller to decode. 4xx responses are mapped
/// to [`ProviderError::Oauth`] by decoding the error payload; 5xx responses
/// become [`ProviderError::Server`].
pub(crate) async fn post_form(
    client: &reqwest::Client,
    url: &Url,
    params: &[(&str, &str)],
    timeout: Option<Duration>,
) -> ProviderResult<Vec<u8>> {
    let mut request = client.post(url.clone()).form(params);
    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }

    let response = request.send().await?;
    let status = response.status();
    debug!(%url, %status, "authorization server responded");

    let body = response.bytes().await?;

    if status.is_success() {
        return Ok(body.to_vec());
    }
    if status.is_server_error() {
        return Err(ProviderError::Server { status: status.as_u16() });
    }

    Err(decode_oauth_error(status, &body))
}

/// POST a token request and decode the resulting token, anchoring expiry
/// arithmetic at `now`.
pub(crate) async fn post_token_request(
    client: &reqwest::Client,
    url: &Url,
    params: &[(&str, &str)],
    timeout: Option<Duration>,
    now: DateTime<Utc>,
) -> ProviderResult<Token> {
    let body = post_form(client, url, params, timeout).await?;
    Token::from_response_body(&body, now)
}

/// Wire form of an OAuth error payload (RFC 6749 §5.2).
#[derive(Debug, Deserialize)]
struct RawErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn decode_oauth_error(status: StatusCode, body: &[u8]) -> ProviderError {
    if let Ok(raw) = serde_json::from_slice::<RawErrorResponse>(body) {
        return ProviderError::oauth(raw.error, raw.error_description);
    }

    // Fall back to form-encoded error bodies before giving up on the payload.
    let mut code = None;
    let mut description = None;
    for (key, value) in url::form_urlencoded::parse(body) {
        match key.as_ref() {
            "error" => code = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    match code {
        Some(code) => ProviderError::oauth(code, description),
        None => ProviderError::Response(format!(
            "authorization server returned status {status} without an OAuth error payload"
        )),
    }
}

//! Token types shared by all provider adapters.
//!
//! A [`Token`] is the unit every flow produces: authorization-code exchange,
//! refresh, client credentials, device grant and RFC 8693 token exchange all
//! end in one. Authorization servers answer token requests with either a JSON
//! object or (for a few older implementations) a form-encoded body, so the
//! response decoder accepts both.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, ProviderResult};

/// Canonical rendering of the OAuth 2 bearer token type.
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// OAuth 2.0 token set with provider-specific extra data.
///
/// `expiry` is absent for tokens the server issued without `expires_in`;
/// such tokens are treated as never expiring by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Access token authorizing API calls.
    pub access_token: String,

    /// Token type as reported by the server (see [`Token::token_type`]).
    #[serde(default)]
    pub token_type: String,

    /// Refresh token, if the server issued one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Absolute expiration instant computed from `expires_in` at issue time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,

    /// Additional claims the provider surfaced alongside the token.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_data: BTreeMap<String, serde_json::Value>,
}

impl Token {
    /// Normalized token type: any case variant of `bearer` is rendered as
    /// `Bearer`; anything else is passed through unchanged.
    pub fn token_type(&self) -> &str {
        if self.token_type.eq_ignore_ascii_case(TOKEN_TYPE_BEARER) {
            TOKEN_TYPE_BEARER
        } else {
            &self.token_type
        }
    }

    /// Whether this token can be refreshed without user interaction.
    pub fn refreshable(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|rt| !rt.is_empty())
    }

    /// Whether the token has passed its expiry as of `now`.
    ///
    /// A token with no expiry never expires.
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => now >= expiry,
            None => false,
        }
    }

    /// Whether the token has an access token and will remain valid for at
    /// least `window` beyond `now`.
    pub fn valid_for(&self, now: DateTime<Utc>, window: Duration) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expiry {
            Some(expiry) => now + window < expiry,
            None => true,
        }
    }

    /// Parse a token endpoint response body.
    ///
    /// Tries JSON first and falls back to `application/x-www-form-urlencoded`
    /// key/value pairs. The expiry instant is anchored at `now`.
    pub fn from_response_body(body: &[u8], now: DateTime<Utc>) -> ProviderResult<Self> {
        if let Ok(raw) = serde_json::from_slice::<RawTokenResponse>(body) {
            return raw.into_token(now);
        }

        let text = std::str::from_utf8(body)
            .map_err(|_| ProviderError::Response("token response is not valid UTF-8".into()))?;
        RawTokenResponse::from_form(text)?.into_token(now)
    }
}

/// Wire form of a token endpoint response (RFC 6749 §5.1).
#[derive(Debug, Default, Deserialize)]
struct RawTokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default, deserialize_with = "deserialize_expires_in")]
    expires_in: Option<i64>,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

impl RawTokenResponse {
    fn from_form(text: &str) -> ProviderResult<Self> {
        let mut raw = RawTokenResponse::default();
        for (key, value) in url::form_urlencoded::parse(text.as_bytes()) {
            match key.as_ref() {
                "access_token" => raw.access_token = value.into_owned(),
                "token_type" => raw.token_type = value.into_owned(),
                "refresh_token" => raw.refresh_token = Some(value.into_owned()),
                "expires_in" => {
                    let seconds = value.parse::<i64>().map_err(|_| {
                        ProviderError::Response(format!("invalid expires_in value {value:?}"))
                    })?;
                    raw.expires_in = Some(seconds);
                }
                _ => {
                    raw.extra
                        .insert(key.into_owned(), serde_json::Value::String(value.into_owned()));
                }
            }
        }
        Ok(raw)
    }

    fn into_token(self, now: DateTime<Utc>) -> ProviderResult<Token> {
        if self.access_token.is_empty() {
            return Err(ProviderError::Response("token response has no access_token".into()));
        }

        let expiry = match self.expires_in {
            Some(seconds) if seconds > 0 => Some(now + Duration::seconds(seconds)),
            _ => None,
        };

        Ok(Token {
            access_token: self.access_token,
            token_type: self.token_type,
            refresh_token: self.refresh_token.filter(|rt| !rt.is_empty()),
            expiry,
            extra_data: self.extra,
        })
    }
}

/// `expires_in` arrives as a JSON number from conforming servers, but a few
/// send it as a string.
fn deserialize_expires_in<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => {
            s.parse::<i64>().map(Some).map_err(|_| serde::de::Error::custom("invalid expires_in"))
        }
    }
}

/// Pending device authorization (RFC 8628 §3.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceAuth {
    /// Server-issued code the client polls the token endpoint with.
    pub device_code: String,

    /// Short code the user enters at the verification URI.
    pub user_code: String,

    /// Where the user completes the authorization.
    pub verification_uri: String,

    /// Optional URI with the user code pre-filled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_uri_complete: Option<String>,

    /// Minimum polling interval in seconds.
    pub interval: u64,

    /// When the device code stops being exchangeable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Outcome of polling a pending device authorization.
///
/// Terminal denials (`access_denied`, `expired_token`) surface as
/// [`ProviderError::Oauth`] rather than a variant here. Interval arithmetic
/// (including the +5s `slow_down` penalty) is the caller's concern since the
/// caller holds the pending entry.
#[derive(Debug, Clone, PartialEq)]
pub enum DevicePoll {
    /// The user approved; the grant produced a token.
    Granted(Token),

    /// Authorization is still pending; poll again after the current interval.
    Pending,

    /// The server asked the client to back off before the next poll.
    SlowDown,
}

#[cfg(test)]
mod tests {
    //! Unit tests for token parsing and validity arithmetic.
    use super::*;

    fn epoch() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    /// Validates `Token::from_response_body` behavior for the JSON response
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `token.access_token` equals `"abcd"`.
    /// - Confirms `token.refresh_token` equals `Some("efgh".to_string())`.
    /// - Confirms `token.expiry` equals `Some(epoch() + 1 hour)`.
    /// - Confirms the unknown `id_token` field lands in `extra_data`.
    #[test]
    fn test_parse_json_response() {
        let body = br#"{
            "access_token": "abcd",
            "token_type": "bearer",
            "refresh_token": "efgh",
            "expires_in": 3600,
            "id_token": "header.payload.sig"
        }"#;

        let token = Token::from_response_body(body, epoch()).unwrap();
        assert_eq!(token.access_token, "abcd");
        assert_eq!(token.refresh_token, Some("efgh".to_string()));
        assert_eq!(token.expiry, Some(epoch() + Duration::hours(1)));
        assert_eq!(
            token.extra_data.get("id_token"),
            Some(&serde_json::Value::String("header.payload.sig".into()))
        );
    }

    /// Validates `Token::from_response_body` behavior for the form-encoded
    /// response scenario.
    ///
    /// Assertions:
    /// - Confirms `token.access_token` equals `"abcd"`.
    /// - Confirms `token.token_type()` equals `"Bearer"`.
    /// - Confirms `token.expiry` equals `Some(epoch() + 5 seconds)`.
    #[test]
    fn test_parse_form_response() {
        let body = b"access_token=abcd&refresh_token=efgh&token_type=bearer&expires_in=5";

        let token = Token::from_response_body(body, epoch()).unwrap();
        assert_eq!(token.access_token, "abcd");
        assert_eq!(token.token_type(), TOKEN_TYPE_BEARER);
        assert_eq!(token.refresh_token, Some("efgh".to_string()));
        assert_eq!(token.expiry, Some(epoch() + Duration::seconds(5)));
    }

    /// Validates `Token::from_response_body` behavior for the string
    /// `expires_in` scenario.
    ///
    /// Assertions:
    /// - Confirms `token.expiry` equals `Some(epoch() + 120 seconds)`.
    #[test]
    fn test_parse_string_expires_in() {
        let body = br#"{"access_token": "x", "token_type": "Bearer", "expires_in": "120"}"#;
        let token = Token::from_response_body(body, epoch()).unwrap();
        assert_eq!(token.expiry, Some(epoch() + Duration::seconds(120)));
    }

    /// Validates `Token::from_response_body` behavior for the missing access
    /// token scenario.
    ///
    /// Assertions:
    /// - Ensures the decode fails with `ProviderError::Response`.
    #[test]
    fn test_missing_access_token_rejected() {
        let body = br#"{"token_type": "Bearer"}"#;
        let err = Token::from_response_body(body, epoch()).unwrap_err();
        assert!(matches!(err, ProviderError::Response(_)));
    }

    /// Validates `Token::valid_for` behavior across the expiry window.
    ///
    /// Assertions:
    /// - Ensures a token expiring in 5s is valid for a zero-length window.
    /// - Ensures the same token is not valid for a 10s window.
    /// - Ensures a token without expiry is valid for any window.
    #[test]
    fn test_valid_for_window() {
        let token = Token {
            access_token: "abcd".into(),
            token_type: "Bearer".into(),
            refresh_token: None,
            expiry: Some(epoch() + Duration::seconds(5)),
            extra_data: BTreeMap::new(),
        };

        assert!(token.valid_for(epoch(), Duration::zero()));
        assert!(!token.valid_for(epoch(), Duration::seconds(10)));
        assert!(!token.valid_for(epoch() + Duration::seconds(5), Duration::zero()));

        let eternal = Token { expiry: None, ..token };
        assert!(eternal.valid_for(epoch(), Duration::days(365)));
    }

    /// Validates `Token::token_type` normalization for mixed-case bearer
    /// values.
    #[test]
    fn test_token_type_normalization() {
        for raw in ["bearer", "Bearer", "BEARER", "bEaReR"] {
            let token = Token {
                access_token: "x".into(),
                token_type: raw.into(),
                refresh_token: None,
                expiry: None,
                extra_data: BTreeMap::new(),
            };
            assert_eq!(token.token_type(), TOKEN_TYPE_BEARER);
        }

        let mac = Token {
            access_token: "x".into(),
            token_type: "MAC".into(),
            refresh_token: None,
            expiry: None,
            extra_data: BTreeMap::new(),
        };
        assert_eq!(mac.token_type(), "MAC");
    }

    /// Validates serde round-tripping of a fully populated token.
    #[test]
    fn test_token_serde_round_trip() {
        let mut extra = BTreeMap::new();
        extra.insert("scope".to_string(), serde_json::Value::String("a b".into()));

        let token = Token {
            access_token: "abcd".into(),
            token_type: "Bearer".into(),
            refresh_token: Some("efgh".into()),
            expiry: Some(epoch()),
            extra_data: extra,
        };

        let encoded = serde_json::to_vec(&token).unwrap();
        let decoded: Token = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded, token);
    }
}

//! Authentication material for the handshake request.
//!
//! The transport never acquires credentials itself; it attaches whatever
//! the caller configured (statically or through a [`DynamicAuthProvider`])
//! to the handshake request.

mod provider;

pub use provider::{ArcDynAuthProvider, DynamicAuthProvider, ResolvedAuth};

use crate::error::{LinkError, Result};
use base64::{engine::general_purpose, Engine as _};
use std::collections::BTreeMap;

/// Header carrying an API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Standard authorization header.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Credentials attached to the handshake request.
///
/// # Examples
///
/// ```rust
/// use realtime_link::AuthProvider;
///
/// let auth = AuthProvider::api_key("da2-abcdef");
/// assert_eq!(auth.headers().get("x-api-key").map(String::as_str), Some("da2-abcdef"));
///
/// let auth = AuthProvider::bearer_token("eyJhbGc...");
/// assert!(auth.is_authenticated());
///
/// let auth = AuthProvider::none();
/// assert!(auth.headers().is_empty());
/// ```
#[derive(Debug, Clone)]
pub enum AuthProvider {
    /// Static API key sent as `x-api-key`.
    ApiKey(String),

    /// Token sent as `Authorization: Bearer <token>`.
    BearerToken(String),

    /// HTTP Basic Auth (username, password)
    BasicAuth(String, String),

    /// No authentication
    None,
}

impl AuthProvider {
    /// API key authentication.
    pub fn api_key(key: impl Into<String>) -> Self {
        Self::ApiKey(key.into())
    }

    /// Bearer token authentication.
    pub fn bearer_token(token: impl Into<String>) -> Self {
        Self::BearerToken(token.into())
    }

    /// HTTP Basic Auth, encoded per RFC 7617.
    pub fn basic_auth(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::BasicAuth(username.into(), password.into())
    }

    /// No authentication
    pub fn none() -> Self {
        Self::None
    }

    /// Headers this credential contributes to the handshake request.
    pub fn headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        match self {
            Self::ApiKey(key) => {
                headers.insert(API_KEY_HEADER.to_string(), key.clone());
            },
            Self::BearerToken(token) => {
                headers.insert(AUTHORIZATION_HEADER.to_string(), format!("Bearer {}", token));
            },
            Self::BasicAuth(username, password) => {
                let credentials = format!("{}:{}", username, password);
                let encoded = general_purpose::STANDARD.encode(credentials.as_bytes());
                headers.insert(AUTHORIZATION_HEADER.to_string(), format!("Basic {}", encoded));
            },
            Self::None => {},
        }
        headers
    }

    /// Attach authentication headers to an HTTP request builder.
    pub fn apply_to_request(
        &self,
        mut request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder> {
        for (name, value) in self.headers() {
            if value.chars().any(|c| c == '\r' || c == '\n') {
                return Err(LinkError::AuthenticationError(format!(
                    "Credential for header '{}' contains a line break",
                    name
                )));
            }
            request = request.header(name, value);
        }
        Ok(request)
    }

    /// Check if authentication is configured
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Self::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_provider_creation() {
        assert!(AuthProvider::api_key("k").is_authenticated());
        assert!(AuthProvider::bearer_token("t").is_authenticated());
        assert!(AuthProvider::basic_auth("alice", "secret").is_authenticated());
        assert!(!AuthProvider::none().is_authenticated());
    }

    #[test]
    fn test_basic_auth_base64_format() {
        let auth = AuthProvider::basic_auth("alice", "secret123");
        let headers = auth.headers();
        // "YWxpY2U6c2VjcmV0MTIz" is base64 of "alice:secret123"
        assert_eq!(
            headers.get(AUTHORIZATION_HEADER).map(String::as_str),
            Some("Basic YWxpY2U6c2VjcmV0MTIz")
        );
    }

    #[test]
    fn test_bearer_header() {
        let headers = AuthProvider::bearer_token("abc").headers();
        assert_eq!(headers.get(AUTHORIZATION_HEADER).map(String::as_str), Some("Bearer abc"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_apply_rejects_header_injection() {
        let client = reqwest::Client::new();
        let auth = AuthProvider::api_key("key\r\nx-evil: 1");
        assert!(auth.apply_to_request(client.post("http://localhost:8080")).is_err());

        let auth = AuthProvider::api_key("fine");
        assert!(auth.apply_to_request(client.post("http://localhost:8080")).is_ok());
    }
}

use reqwest::Url;
use std::collections::BTreeMap;

use crate::error::{LinkError, Result};

/// Where and how to perform the handshake request.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    handshake_url: Url,
    headers: BTreeMap<String, String>,
}

impl EndpointConfig {
    /// Validate and wrap an `http://` or `https://` handshake URL.
    pub fn new(handshake_url: impl AsRef<str>) -> Result<Self> {
        let raw = handshake_url.as_ref().trim();
        if raw.is_empty() {
            return Err(LinkError::ConfigurationError("endpoint URL cannot be empty".into()));
        }
        let url = Url::parse(raw).map_err(|e| {
            LinkError::ConfigurationError(format!("invalid endpoint URL '{}': {}", raw, e))
        })?;
        match url.scheme() {
            "http" | "https" => {},
            other => {
                return Err(LinkError::ConfigurationError(format!(
                    "endpoint URL must use http or https, got '{}'",
                    other
                )))
            },
        }
        if url.host_str().is_none() {
            return Err(LinkError::ConfigurationError(format!(
                "endpoint URL '{}' has no host",
                raw
            )));
        }
        Ok(Self {
            handshake_url: url,
            headers: BTreeMap::new(),
        })
    }

    /// Add a static header sent with every handshake request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn url(&self) -> &Url {
        &self.handshake_url
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Host of the endpoint, used as a default reachability probe target.
    pub fn probe_target(&self) -> Option<String> {
        let host = self.handshake_url.host_str()?;
        let port = self.handshake_url.port_or_known_default()?;
        Some(format!("{}:{}", host, port))
    }
}

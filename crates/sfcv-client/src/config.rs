//! Gateway client configuration.

use url::Url;

/// Default gateway endpoint for a local node.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:18545";

/// Configuration for connecting to a contract-call gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// JSON-RPC endpoint of the gateway.
    pub endpoint: Url,
    /// Request timeout in seconds. Submissions wait until mined, so this
    /// bounds the block time as well as the network round trip.
    pub timeout_secs: u64,
}

impl ClientConfig {
    /// Parse `endpoint`, which must be an `http` or `https` URL.
    pub fn parse(endpoint: &str, timeout_secs: u64) -> Result<Self, ConfigError> {
        let url = Url::parse(endpoint).map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(Self {
                endpoint: url,
                timeout_secs,
            }),
            other => Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported scheme {0:?}, expected http or https")]
    UnsupportedScheme(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_default_endpoint() {
        let cfg = ClientConfig::parse(DEFAULT_ENDPOINT, 5).unwrap();
        assert_eq!(cfg.endpoint.as_str(), "http://127.0.0.1:18545/");
        assert_eq!(cfg.timeout_secs, 5);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            ClientConfig::parse("not a url", 5),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn rejects_websocket_endpoints() {
        let err = ClientConfig::parse("ws://127.0.0.1:18546", 5).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedScheme(ref s) if s == "ws"));
    }
}

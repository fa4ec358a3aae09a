use serde_json::Value;
use thiserror::Error;

/// Failures raised by the wiki clients and the per-record sync steps.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no access token configured (set access_token in the config file or {env})")]
    MissingToken { env: &'static str },
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidUrl { endpoint: String, reason: String },
    #[error("request to {endpoint} failed")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("response from {endpoint} is not JSON: {reason}")]
    Decode { endpoint: String, reason: String },
    #[error("request to {endpoint} failed with HTTP {status}: {body}")]
    Rejected {
        endpoint: String,
        status: u16,
        body: Value,
    },
    #[error("redirect chain for {title} exceeded {hops} hops")]
    RedirectLimit { title: String, hops: usize },
    #[error("MediaWiki API error [{code}]: {info}")]
    Api { code: String, info: String },
    #[error("unexpected response from {context}: {body}")]
    UnexpectedShape { context: String, body: Value },
    #[error("invalid {field} for {name}: {value}")]
    InvalidField {
        name: String,
        field: &'static str,
        value: String,
    },
}

impl SyncError {
    pub fn unexpected(context: impl Into<String>, body: Value) -> Self {
        Self::UnexpectedShape {
            context: context.into(),
            body,
        }
    }

    /// True for failures below the HTTP layer (DNS, connect, timeout).
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

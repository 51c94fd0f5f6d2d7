use thiserror::Error;

/// Failures seen while talking to the OCS upstream or the local proxy.
///
/// Everything is rendered verbatim to the operator, so the messages carry the
/// upstream text rather than a code.
#[derive(Debug, Error)]
pub enum OcsError {
    /// The HTTP call never produced a response body.
    #[error("request to {target} failed: {source}")]
    Transport {
        target: String,
        #[source]
        source: reqwest::Error,
    },

    /// A subscriber entry could not be mapped onto the typed record.
    #[error("subscriber record #{index} could not be decoded: {reason}")]
    Decode { index: usize, reason: String },

    /// The upstream answered but reported an application error.
    #[error("{operation} rejected by upstream: {message}")]
    Upstream { operation: String, message: String },

    /// The proxy endpoint answered with a non-OK status or an error payload.
    #[error("{0}")]
    Proxy(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, OcsError>;

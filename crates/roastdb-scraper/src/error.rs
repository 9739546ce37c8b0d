use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    /// Timeout or connection failure that outlived every retry.
    #[error("transport error for {url} after {attempts} attempt(s): {source}")]
    Transport {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request gate closed for {url}")]
    GateClosed { url: String },
}

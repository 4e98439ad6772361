use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("provider {provider} unavailable: {reason}")]
    Provider { provider: String, reason: String },

    #[error("cache write failed: {0}")]
    CacheWrite(String),

    #[error("document sink error: {0}")]
    Sink(String),

    #[error("capture error: {0}")]
    Capture(#[from] pcap::Error),

    #[error("no capture device available")]
    NoDevice,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

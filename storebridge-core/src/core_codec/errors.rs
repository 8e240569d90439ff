use thiserror::Error;

/// Errors raised while validating a payload at the trust boundary
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload does not have the expected shape
    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// A JSON (de)serialization step failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CodecResult<T> = Result<T, CodecError>;

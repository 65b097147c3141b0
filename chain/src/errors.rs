use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api error: status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid response from explorer: {0}")]
    InvalidResponse(String),

    #[error("malformed swap log: {0}")]
    MalformedLog(String),

    #[error("numeric parse error: {0}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
}

impl ChainError {
    /// Transient failures are retried with backoff; everything else is not.
    pub fn is_transient(&self) -> bool {
        match self {
            ChainError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ChainError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BackendError>;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The request did not finish within its deadline
    #[error("request to {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    /// Connection or protocol failure
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    /// Non-success status without a usable error message
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The service answered with an explicit error
    #[error("server error: {0}")]
    Server(String),

    /// The response body did not have the expected shape
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Reading the upload from disk failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

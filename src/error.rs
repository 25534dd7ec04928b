//! Error types for the screenshot service

use thiserror::Error;

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while handling a screenshot request
#[derive(Error, Debug)]
pub enum Error {
    /// The HTTP method is neither `POST` nor `OPTIONS`
    #[error("Method not allowed. Use POST.")]
    MethodNotAllowed,

    /// The request path does not match the configured route
    #[error("Not found")]
    NotFound,

    /// The request body exceeded the configured limit
    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    /// Missing, empty or non-string HTML content
    #[error("Missing or empty HTML content")]
    BadInput,

    /// Failed to launch the browser or open a page
    #[error("Engine initialization failed: {0}")]
    InitializationError(String),

    /// Failed to load the HTML content
    #[error("Failed to load content: {0}")]
    LoadError(String),

    /// Failed to capture the page
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// Failed to execute JavaScript in the page
    #[error("Script execution failed: {0}")]
    ScriptError(String),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Network error (executable download, socket binding)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// HTTP status code reported to the client for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::MethodNotAllowed => 405,
            Error::NotFound => 404,
            Error::PayloadTooLarge(_) => 413,
            Error::BadInput => 400,
            _ => 500,
        }
    }

    /// Whether the error is a render timeout (navigation or execution budget).
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Other(err.to_string())
    }
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}

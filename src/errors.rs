use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("JavaScript execution failed: {0}")]
    JavaScriptFailed(String),

    #[error("HTTP session error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    ArchiveError(#[from] zip::result::ZipError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Anyhow error: {0}")]
    AnyhowError(String),
}

pub type Result<T> = std::result::Result<T, ScrapeError>;

impl From<anyhow::Error> for ScrapeError {
    fn from(err: anyhow::Error) -> Self {
        ScrapeError::AnyhowError(err.to_string())
    }
}

use std::path::PathBuf;

use thiserror::Error;

pub type ScrapeResult<T> = Result<T, ScrapeError>;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("chromium launch failed: {0}")]
    Launch(String),
    #[error("cdp error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("timeout waiting for {0}")]
    Timeout(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("challenge still present after {attempts} attempts")]
    ChallengePersisted {
        attempts: usize,
        diagnostic: Option<PathBuf>,
    },
    #[error("failed to write {path}: {source}")]
    Artifact {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<tokio::task::JoinError> for ScrapeError {
    fn from(err: tokio::task::JoinError) -> Self {
        ScrapeError::Unexpected(err.to_string())
    }
}

use std::fs::{create_dir_all, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use super::error::ScrapeError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ScrapeErrorCategory {
    LaunchFailure,
    NavigationTimeout,
    NavigationOther,
    BotChallenge,
    ArtifactIo,
    Unexpected,
}

pub struct ErrorCategorizer;

impl ErrorCategorizer {
    pub fn categorize(error: &ScrapeError) -> ScrapeErrorCategory {
        match error {
            ScrapeError::Launch(_) => ScrapeErrorCategory::LaunchFailure,
            ScrapeError::Timeout(_) => ScrapeErrorCategory::NavigationTimeout,
            ScrapeError::Navigation(message) => {
                if message.to_lowercase().contains("timeout") {
                    ScrapeErrorCategory::NavigationTimeout
                } else {
                    ScrapeErrorCategory::NavigationOther
                }
            }
            ScrapeError::ChallengePersisted { .. } => ScrapeErrorCategory::BotChallenge,
            ScrapeError::Artifact { .. } | ScrapeError::Io(_) => ScrapeErrorCategory::ArtifactIo,
            ScrapeError::Cdp(err) => {
                if err.to_string().to_lowercase().contains("timeout") {
                    ScrapeErrorCategory::NavigationTimeout
                } else {
                    ScrapeErrorCategory::Unexpected
                }
            }
            ScrapeError::Configuration(_) | ScrapeError::Unexpected(_) => {
                ScrapeErrorCategory::Unexpected
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum RemediationAction {
    RetryScheduled { delay_seconds: u64, renavigate: bool },
    Abort,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureContext {
    pub timestamp: DateTime<Utc>,
    pub sport: String,
    pub url: String,
    pub category: ScrapeErrorCategory,
    pub error_message: String,
    pub attempt: usize,
    pub action: RemediationAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunContext {
    pub timestamp: DateTime<Utc>,
    pub sport: String,
    pub url: String,
    pub success: bool,
    pub soft: bool,
    pub label: Option<String>,
    pub attempts: usize,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryRecord {
    Failure(FailureContext),
    Run(RunContext),
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<TelemetryError> for ScrapeError {
    fn from(error: TelemetryError) -> Self {
        ScrapeError::Unexpected(error.to_string())
    }
}

#[derive(Debug)]
pub struct RunTelemetry {
    log: Mutex<File>,
}

impl RunTelemetry {
    pub fn new(log_path: impl AsRef<Path>) -> Result<Self, TelemetryError> {
        let log_path = log_path.as_ref().to_path_buf();
        if let Some(parent) = log_path.parent() {
            create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;
        Ok(Self {
            log: Mutex::new(file),
        })
    }

    pub fn record_failure(&self, failure: &FailureContext) -> Result<(), TelemetryError> {
        self.append(&TelemetryRecord::Failure(failure.clone()))
    }

    pub fn record_run(&self, run: &RunContext) -> Result<(), TelemetryError> {
        self.append(&TelemetryRecord::Run(run.clone()))
    }

    fn append(&self, record: &TelemetryRecord) -> Result<(), TelemetryError> {
        let json = serde_json::to_string(record)?;
        if let Ok(mut guard) = self.log.lock() {
            writeln!(guard, "{json}")?;
            guard.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn categorize_challenge_and_launch() {
        let challenge = ScrapeError::ChallengePersisted {
            attempts: 3,
            diagnostic: None,
        };
        assert_eq!(
            ErrorCategorizer::categorize(&challenge),
            ScrapeErrorCategory::BotChallenge
        );
        let launch = ScrapeError::Launch("chromium binary missing".into());
        assert_eq!(
            ErrorCategorizer::categorize(&launch),
            ScrapeErrorCategory::LaunchFailure
        );
    }

    #[test]
    fn categorize_timeout_text_inside_navigation() {
        let err = ScrapeError::Navigation("https://example.com: request timeout".into());
        assert_eq!(
            ErrorCategorizer::categorize(&err),
            ScrapeErrorCategory::NavigationTimeout
        );
    }

    #[test]
    fn telemetry_appends_parseable_lines() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("scrape.log");
        let telemetry = RunTelemetry::new(&log_path).unwrap();

        telemetry
            .record_failure(&FailureContext {
                timestamp: Utc::now(),
                sport: "football".into(),
                url: "https://example.com".into(),
                category: ScrapeErrorCategory::BotChallenge,
                error_message: "challenge still present after 3 attempts".into(),
                attempt: 3,
                action: RemediationAction::Abort,
            })
            .unwrap();
        telemetry
            .record_run(&RunContext {
                timestamp: Utc::now(),
                sport: "football".into(),
                url: "https://example.com".into(),
                success: false,
                soft: false,
                label: Some("challenge".into()),
                attempts: 3,
                duration_ms: 96_000,
            })
            .unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("kind").is_some());
        }
        assert!(contents.contains("\"kind\":\"failure\""));
        assert!(contents.contains("\"kind\":\"run\""));
    }
}

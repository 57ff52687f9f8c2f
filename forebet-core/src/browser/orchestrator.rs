use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{ObservabilitySection, RetrySection};
use crate::target::ScrapeTarget;

use super::classify::{ContentClassifier, PageClass};
use super::consent::ConsentResolver;
use super::error::{ScrapeError, ScrapeResult};
use super::human::HumanSimulator;
use super::navigation::NavigationController;
use super::page::{PageDriver, PageSource};
use super::telemetry::{
    ErrorCategorizer, FailureContext, RemediationAction, RunContext, RunTelemetry,
};

const DEFAULT_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Classified(PageClass),
    NavigationFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrapeAttempt {
    pub index: usize,
    pub wait_before_ms: u64,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub html: String,
    pub label: PageClass,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrapeReport {
    pub sport: String,
    pub url: String,
    pub label: PageClass,
    pub soft: bool,
    pub attempts: Vec<ScrapeAttempt>,
    pub output_path: PathBuf,
    pub bytes_written: u64,
    pub sha256: String,
    pub captured_at: DateTime<Utc>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScrapePhase {
    Init,
    Launched,
    Navigated {
        attempt: usize,
        elapsed_ms: u64,
    },
    Settled {
        attempt: usize,
    },
    Classified {
        attempt: usize,
        label: PageClass,
    },
    Retrying {
        next_attempt: usize,
        wait: Duration,
        renavigate: bool,
    },
    Success {
        soft: bool,
    },
    Failed {
        reason: String,
    },
}

impl ScrapePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScrapePhase::Success { .. } | ScrapePhase::Failed { .. })
    }
}

impl fmt::Display for ScrapePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrapePhase::Init => write!(f, "init"),
            ScrapePhase::Launched => write!(f, "launched"),
            ScrapePhase::Navigated { attempt, .. } => write!(f, "navigated(attempt {attempt})"),
            ScrapePhase::Settled { attempt } => write!(f, "settled(attempt {attempt})"),
            ScrapePhase::Classified { label, .. } => write!(f, "classified({label})"),
            ScrapePhase::Retrying { next_attempt, .. } => write!(f, "retrying(next {next_attempt})"),
            ScrapePhase::Success { soft: false } => write!(f, "success"),
            ScrapePhase::Success { soft: true } => write!(f, "success(soft)"),
            ScrapePhase::Failed { .. } => write!(f, "failed"),
        }
    }
}

#[derive(Default)]
struct RunState {
    driver: Option<Box<dyn PageDriver>>,
    attempts: Vec<ScrapeAttempt>,
    snapshot: Option<PageSnapshot>,
    pending_wait_ms: u64,
    failure: Option<ScrapeError>,
}

pub struct RetryOrchestrator {
    source: Arc<dyn PageSource>,
    navigator: NavigationController,
    human: HumanSimulator,
    consent: ConsentResolver,
    classifier: ContentClassifier,
    max_attempts: usize,
    schedule: Vec<Duration>,
    observability: ObservabilitySection,
    telemetry: Option<Arc<RunTelemetry>>,
}

impl RetryOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn PageSource>,
        navigator: NavigationController,
        human: HumanSimulator,
        consent: ConsentResolver,
        classifier: ContentClassifier,
        retry: RetrySection,
        observability: ObservabilitySection,
    ) -> Self {
        let mut schedule = retry
            .backoff_seconds
            .iter()
            .map(|seconds| Duration::from_secs(*seconds))
            .collect::<Vec<_>>();
        if schedule.is_empty() {
            schedule.push(DEFAULT_BACKOFF);
            schedule.push(Duration::from_secs(30));
        }
        Self {
            source,
            navigator,
            human,
            consent,
            classifier,
            max_attempts: retry.max_attempts.max(1),
            schedule,
            observability,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<RunTelemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub async fn run(
        &mut self,
        target: &ScrapeTarget,
        output: &Path,
    ) -> ScrapeResult<ScrapeReport> {
        let started = Instant::now();
        let mut state = RunState::default();
        let mut phase = ScrapePhase::Init;
        info!(sport = %target.sport, url = %target.url, "starting scrape run");

        while !phase.is_terminal() {
            phase = self.advance(phase, &mut state, target, output).await;
            debug!(phase = %phase, "scrape phase transition");
        }

        if let Some(driver) = state.driver.take() {
            if let Err(err) = driver.close().await {
                warn!(error = %err, "browser teardown failed");
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        match phase {
            ScrapePhase::Success { soft } => {
                let snapshot = state.snapshot.take().ok_or_else(|| {
                    ScrapeError::Unexpected("run succeeded without a page snapshot".into())
                })?;
                let report = ScrapeReport {
                    sport: target.sport.clone(),
                    url: target.url.clone(),
                    label: snapshot.label,
                    soft,
                    attempts: state.attempts.clone(),
                    output_path: output.to_path_buf(),
                    bytes_written: snapshot.html.len() as u64,
                    sha256: sha256_hex(snapshot.html.as_bytes()),
                    captured_at: snapshot.captured_at,
                    duration_ms,
                };
                self.record_run(
                    target,
                    true,
                    soft,
                    Some(snapshot.label),
                    report.attempts.len(),
                    duration_ms,
                );
                info!(
                    label = %report.label,
                    attempts = report.attempts.len(),
                    duration_ms,
                    "scrape run finished"
                );
                Ok(report)
            }
            ScrapePhase::Failed { reason } => {
                let error = state
                    .failure
                    .take()
                    .unwrap_or_else(|| ScrapeError::Unexpected(reason));
                self.record_run(
                    target,
                    false,
                    false,
                    state.snapshot.as_ref().map(|snapshot| snapshot.label),
                    state.attempts.len(),
                    duration_ms,
                );
                warn!(
                    error = %error,
                    attempts = state.attempts.len(),
                    duration_ms,
                    "scrape run failed"
                );
                Err(error)
            }
            other => Err(ScrapeError::Unexpected(format!(
                "run loop stopped in non-terminal phase {other}"
            ))),
        }
    }

    async fn advance(
        &mut self,
        phase: ScrapePhase,
        state: &mut RunState,
        target: &ScrapeTarget,
        output: &Path,
    ) -> ScrapePhase {
        match phase {
            ScrapePhase::Init => match self.source.open().await {
                Ok(driver) => {
                    state.driver = Some(driver);
                    ScrapePhase::Launched
                }
                Err(err) => {
                    let error = match err {
                        ScrapeError::Launch(_) => err,
                        other => ScrapeError::Launch(other.to_string()),
                    };
                    self.fail(state, target, error)
                }
            },
            ScrapePhase::Launched => self.navigate_step(state, target).await,
            ScrapePhase::Navigated {
                attempt,
                elapsed_ms,
            } => {
                let settle = self.navigator.settle_wait();
                debug!(
                    attempt,
                    elapsed_ms,
                    settle_secs = settle.as_secs(),
                    "letting the page settle"
                );
                sleep(settle).await;
                ScrapePhase::Settled { attempt }
            }
            ScrapePhase::Settled { attempt } => self.capture_step(state, target, attempt).await,
            ScrapePhase::Classified { attempt, label } => match label {
                PageClass::Content => match self.persist(output, state).await {
                    Ok(()) => ScrapePhase::Success { soft: false },
                    Err(err) => self.fail(state, target, err),
                },
                PageClass::Unknown => {
                    warn!(attempt, "page class unresolved, keeping capture anyway");
                    match self.persist(output, state).await {
                        Ok(()) => ScrapePhase::Success { soft: true },
                        Err(err) => self.fail(state, target, err),
                    }
                }
                PageClass::Challenge => {
                    if state.attempts.len() >= self.max_attempts {
                        let diagnostic = self.dump_diagnostic(state).await;
                        self.fail(
                            state,
                            target,
                            ScrapeError::ChallengePersisted {
                                attempts: state.attempts.len(),
                                diagnostic,
                            },
                        )
                    } else {
                        let error = ScrapeError::ChallengePersisted {
                            attempts: state.attempts.len(),
                            diagnostic: None,
                        };
                        self.schedule_retry(state, target, error, false)
                    }
                }
            },
            ScrapePhase::Retrying {
                next_attempt,
                wait,
                renavigate,
            } => {
                info!(
                    next_attempt,
                    wait_secs = wait.as_secs(),
                    renavigate,
                    "waiting before retry"
                );
                sleep(wait).await;
                state.pending_wait_ms = wait.as_millis() as u64;
                if renavigate {
                    ScrapePhase::Launched
                } else {
                    ScrapePhase::Settled {
                        attempt: next_attempt,
                    }
                }
            }
            ScrapePhase::Success { soft } => ScrapePhase::Success { soft },
            ScrapePhase::Failed { reason } => ScrapePhase::Failed { reason },
        }
    }

    async fn navigate_step(&mut self, state: &mut RunState, target: &ScrapeTarget) -> ScrapePhase {
        let attempt = state.attempts.len() + 1;
        let Some(driver) = state.driver.as_mut() else {
            return self.fail(
                state,
                target,
                ScrapeError::Unexpected("no page driver for navigation".into()),
            );
        };
        match self.navigator.navigate(driver.as_mut(), &target.url).await {
            Ok(elapsed_ms) => ScrapePhase::Navigated {
                attempt,
                elapsed_ms,
            },
            Err(err) => {
                state.attempts.push(ScrapeAttempt {
                    index: attempt,
                    wait_before_ms: state.pending_wait_ms,
                    outcome: AttemptOutcome::NavigationFailed,
                });
                state.pending_wait_ms = 0;
                warn!(attempt, error = %err, "navigation attempt failed");
                if state.attempts.len() >= self.max_attempts {
                    self.fail(state, target, err)
                } else {
                    self.schedule_retry(state, target, err, true)
                }
            }
        }
    }

    async fn capture_step(
        &mut self,
        state: &mut RunState,
        target: &ScrapeTarget,
        attempt: usize,
    ) -> ScrapePhase {
        let Some(driver) = state.driver.as_mut() else {
            return self.fail(
                state,
                target,
                ScrapeError::Unexpected("no page driver for capture".into()),
            );
        };
        self.human.simulate(driver.as_mut()).await;
        if self.consent.resolve(driver.as_mut()).await {
            debug!(attempt, "consent overlay cleared");
        }
        match driver.content().await {
            Ok(html) => {
                let label = self.classifier.classify(&html);
                info!(attempt, label = %label, bytes = html.len(), "page capture classified");
                state.snapshot = Some(PageSnapshot {
                    html,
                    label,
                    captured_at: Utc::now(),
                });
                state.attempts.push(ScrapeAttempt {
                    index: attempt,
                    wait_before_ms: state.pending_wait_ms,
                    outcome: AttemptOutcome::Classified(label),
                });
                state.pending_wait_ms = 0;
                ScrapePhase::Classified { attempt, label }
            }
            Err(err) => {
                state.attempts.push(ScrapeAttempt {
                    index: attempt,
                    wait_before_ms: state.pending_wait_ms,
                    outcome: AttemptOutcome::NavigationFailed,
                });
                state.pending_wait_ms = 0;
                warn!(attempt, error = %err, "page capture failed");
                let error = ScrapeError::Navigation(format!("content capture: {err}"));
                if state.attempts.len() >= self.max_attempts {
                    self.fail(state, target, error)
                } else {
                    self.schedule_retry(state, target, error, true)
                }
            }
        }
    }

    fn schedule_retry(
        &self,
        state: &mut RunState,
        target: &ScrapeTarget,
        error: ScrapeError,
        renavigate: bool,
    ) -> ScrapePhase {
        let retry = state.attempts.len();
        let wait = self.delay_for_retry(retry);
        self.record_failure(
            target,
            &error,
            retry,
            RemediationAction::RetryScheduled {
                delay_seconds: wait.as_secs(),
                renavigate,
            },
        );
        ScrapePhase::Retrying {
            next_attempt: retry + 1,
            wait,
            renavigate,
        }
    }

    fn fail(&self, state: &mut RunState, target: &ScrapeTarget, error: ScrapeError) -> ScrapePhase {
        self.record_failure(
            target,
            &error,
            state.attempts.len().max(1),
            RemediationAction::Abort,
        );
        let reason = error.to_string();
        state.failure = Some(error);
        ScrapePhase::Failed { reason }
    }

    fn delay_for_retry(&self, retry: usize) -> Duration {
        let index = retry
            .saturating_sub(1)
            .min(self.schedule.len().saturating_sub(1));
        self.schedule.get(index).copied().unwrap_or(DEFAULT_BACKOFF)
    }

    async fn persist(&self, output: &Path, state: &mut RunState) -> ScrapeResult<()> {
        let Some(snapshot) = state.snapshot.as_ref() else {
            return Err(ScrapeError::Unexpected("no snapshot to persist".into()));
        };
        write_artifact(output, &snapshot.html).await?;
        info!(
            path = %output.display(),
            bytes = snapshot.html.len(),
            label = %snapshot.label,
            "saved page capture"
        );
        Ok(())
    }

    async fn dump_diagnostic(&self, state: &RunState) -> Option<PathBuf> {
        let snapshot = state.snapshot.as_ref()?;
        let path = PathBuf::from(&self.observability.challenge_dump);
        match write_artifact(&path, &snapshot.html).await {
            Ok(()) => {
                info!(path = %path.display(), "challenge page dumped for inspection");
                Some(path)
            }
            Err(err) => {
                warn!(error = %err, "failed to dump challenge page");
                None
            }
        }
    }

    fn record_failure(
        &self,
        target: &ScrapeTarget,
        error: &ScrapeError,
        attempt: usize,
        action: RemediationAction,
    ) {
        let Some(telemetry) = &self.telemetry else {
            return;
        };
        let entry = FailureContext {
            timestamp: Utc::now(),
            sport: target.sport.clone(),
            url: target.url.clone(),
            category: ErrorCategorizer::categorize(error),
            error_message: error.to_string(),
            attempt,
            action,
        };
        if let Err(err) = telemetry.record_failure(&entry) {
            debug!(error = %err, "failed to append failure record");
        }
    }

    fn record_run(
        &self,
        target: &ScrapeTarget,
        success: bool,
        soft: bool,
        label: Option<PageClass>,
        attempts: usize,
        duration_ms: u64,
    ) {
        let Some(telemetry) = &self.telemetry else {
            return;
        };
        let record = RunContext {
            timestamp: Utc::now(),
            sport: target.sport.clone(),
            url: target.url.clone(),
            success,
            soft,
            label: label.map(|label| label.to_string()),
            attempts,
            duration_ms: duration_ms as i64,
        };
        if let Err(err) = telemetry.record_run(&record) {
            debug!(error = %err, "failed to append run record");
        }
    }
}

async fn write_artifact(path: &Path, html: &str) -> ScrapeResult<()> {
    tokio::fs::write(path, html)
        .await
        .map_err(|source| ScrapeError::Artifact {
            source,
            path: path.to_path_buf(),
        })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use tempfile::tempdir;

    use crate::config::{ConsentSection, HumanSection, MarkerSection, NavigationSection};

    struct NoopSource;

    #[async_trait(?Send)]
    impl PageSource for NoopSource {
        async fn open(&self) -> ScrapeResult<Box<dyn PageDriver>> {
            Err(ScrapeError::Launch("no browser in unit tests".into()))
        }
    }

    fn orchestrator() -> RetryOrchestrator {
        RetryOrchestrator::new(
            Arc::new(NoopSource),
            NavigationController::new(NavigationSection::default()),
            HumanSimulator::with_seed(HumanSection::default(), 1),
            ConsentResolver::new(ConsentSection::default()),
            ContentClassifier::new(MarkerSection::default()),
            RetrySection::default(),
            ObservabilitySection::default(),
        )
    }

    fn target() -> ScrapeTarget {
        ScrapeTarget {
            sport: "football".into(),
            url: "https://www.forebet.com/en/football-tips-and-predictions-for-today".into(),
        }
    }

    #[test]
    fn backoff_escalates_then_clamps_to_last_entry() {
        let orchestrator = orchestrator();
        assert_eq!(orchestrator.delay_for_retry(1), Duration::from_secs(10));
        assert_eq!(orchestrator.delay_for_retry(2), Duration::from_secs(30));
        assert_eq!(orchestrator.delay_for_retry(7), Duration::from_secs(30));
    }

    #[test]
    fn empty_backoff_config_gets_a_schedule() {
        let mut retry = RetrySection::default();
        retry.backoff_seconds.clear();
        let orchestrator = RetryOrchestrator::new(
            Arc::new(NoopSource),
            NavigationController::new(NavigationSection::default()),
            HumanSimulator::with_seed(HumanSection::default(), 1),
            ConsentResolver::new(ConsentSection::default()),
            ContentClassifier::new(MarkerSection::default()),
            retry,
            ObservabilitySection::default(),
        );
        assert_eq!(orchestrator.delay_for_retry(1), Duration::from_secs(10));
        assert_eq!(orchestrator.delay_for_retry(2), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn terminal_phases_are_fixed_points() {
        let mut orchestrator = orchestrator();
        let mut state = RunState::default();
        let target = target();
        let phase = orchestrator
            .advance(
                ScrapePhase::Success { soft: true },
                &mut state,
                &target,
                Path::new("out.html"),
            )
            .await;
        assert_eq!(phase, ScrapePhase::Success { soft: true });
        let phase = orchestrator
            .advance(
                ScrapePhase::Failed {
                    reason: "done".into(),
                },
                &mut state,
                &target,
                Path::new("out.html"),
            )
            .await;
        assert_eq!(
            phase,
            ScrapePhase::Failed {
                reason: "done".into()
            }
        );
    }

    #[tokio::test]
    async fn launch_failure_is_fatal_and_leaves_no_artifact() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("capture.html");
        let mut orchestrator = orchestrator();
        let err = orchestrator
            .run(&target(), &output)
            .await
            .expect_err("launch should fail");
        assert!(matches!(err, ScrapeError::Launch(_)));
        assert!(!output.exists());
    }

    #[test]
    fn phase_labels_are_stable() {
        assert_eq!(ScrapePhase::Init.to_string(), "init");
        assert_eq!(
            ScrapePhase::Retrying {
                next_attempt: 2,
                wait: Duration::from_secs(10),
                renavigate: false,
            }
            .to_string(),
            "retrying(next 2)"
        );
        assert_eq!(ScrapePhase::Success { soft: true }.to_string(), "success(soft)");
    }
}

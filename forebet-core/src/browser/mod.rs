mod classify;
mod consent;
mod error;
mod human;
mod navigation;
mod orchestrator;
mod page;
mod session;
mod telemetry;

pub use classify::{ContentClassifier, PageClass};
pub use consent::ConsentResolver;
pub use error::{ScrapeError, ScrapeResult};
pub use human::HumanSimulator;
pub use navigation::NavigationController;
pub use orchestrator::{
    AttemptOutcome, PageSnapshot, RetryOrchestrator, ScrapeAttempt, ScrapePhase, ScrapeReport,
};
pub use page::{CdpPage, CdpPageSource, PageDriver, PageSource};
pub use session::{BrowserLauncher, BrowserSession, LaunchOverrides};
pub use telemetry::{
    ErrorCategorizer, FailureContext, RemediationAction, RunContext, RunTelemetry,
    ScrapeErrorCategory, TelemetryError, TelemetryRecord,
};

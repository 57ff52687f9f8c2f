use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use forebet_core::browser::{
    AttemptOutcome, CdpPageSource, ConsentResolver, ContentClassifier, HumanSimulator,
    LaunchOverrides, NavigationController, RetryOrchestrator, RunTelemetry, ScrapeError,
    ScrapeReport, TelemetryError,
};
use forebet_core::{load_scraper_config, ScrapeTarget, ScraperConfig, SportCatalog};

const DEFAULT_PROFILE: &str = "configs/forebet.toml";

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] forebet_core::ConfigError),
    #[error("scrape error: {0}")]
    Scrape(#[from] ScrapeError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Forebet prediction page capture tool", long_about = None)]
pub struct Cli {
    /// Sport section to capture
    #[arg(default_value = "football")]
    pub sport: String,
    /// File the captured page is written to
    #[arg(default_value = "forebet_output.html")]
    pub output: PathBuf,
    /// Alternative scraper profile (defaults to configs/forebet.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Run Chromium with a visible window
    #[arg(long)]
    pub headful: bool,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Enable debug-level logs
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub fn run(cli: Cli) -> Result<()> {
    init_tracing(cli.verbose);

    let config = load_profile(cli.config.as_deref())?;
    config.validate()?;
    let config = Arc::new(config);

    let catalog = SportCatalog::new(&config.targets)?;
    let target = catalog.resolve(&cli.sport);

    let report = execute(&cli, config, &target)?;
    render(&report, cli.format)?;
    Ok(())
}

fn execute(cli: &Cli, config: Arc<ScraperConfig>, target: &ScrapeTarget) -> Result<ScrapeReport> {
    let overrides = LaunchOverrides {
        headless: if cli.headful { Some(false) } else { None },
    };
    let source = Arc::new(CdpPageSource::with_overrides(Arc::clone(&config), overrides));
    let mut orchestrator = RetryOrchestrator::new(
        source,
        NavigationController::new(config.navigation.clone()),
        HumanSimulator::new(config.human.clone()),
        ConsentResolver::new(config.consent.clone()),
        ContentClassifier::new(config.markers.clone()),
        config.retry.clone(),
        config.observability.clone(),
    );
    if let Some(path) = &config.observability.failure_log {
        let telemetry = RunTelemetry::new(path)?;
        orchestrator = orchestrator.with_telemetry(Arc::new(telemetry));
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(orchestrator.run(target, &cli.output))?;
    Ok(report)
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "forebet_core=debug,forebetctl=debug"
    } else {
        "forebet_core=info,forebetctl=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_profile(path: Option<&Path>) -> Result<ScraperConfig> {
    match path {
        Some(path) => Ok(load_scraper_config(path)?),
        None => {
            let default = Path::new(DEFAULT_PROFILE);
            if default.exists() {
                Ok(load_scraper_config(default)?)
            } else {
                Ok(ScraperConfig::default())
            }
        }
    }
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

impl DisplayFallback for ScrapeReport {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "Capture: {sport} ({label}) -> {path}",
            sport = self.sport,
            label = self.label,
            path = self.output_path.display()
        )];
        lines.push(format!("  - url: {}", self.url));
        lines.push(format!("  - bytes: {}", self.bytes_written));
        lines.push(format!("  - sha256: {}", self.sha256));
        lines.push(format!(
            "  - captured: {}",
            self.captured_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        lines.push(format!("  - duration: {} ms", self.duration_ms));
        for attempt in &self.attempts {
            let outcome = match attempt.outcome {
                AttemptOutcome::Classified(label) => label.to_string(),
                AttemptOutcome::NavigationFailed => "navigation failed".to_string(),
            };
            if attempt.wait_before_ms > 0 {
                lines.push(format!(
                    "  - attempt {}: {outcome} (waited {} ms)",
                    attempt.index, attempt.wait_before_ms
                ));
            } else {
                lines.push(format!("  - attempt {}: {outcome}", attempt.index));
            }
        }
        if self.soft {
            lines.push("  - warning: page markers unresolved, inspect the capture".to_string());
        }
        lines.join("\n")
    }
}

use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::info;

use crate::config::NavigationSection;

use super::error::{ScrapeError, ScrapeResult};
use super::page::PageDriver;

#[derive(Debug, Clone)]
pub struct NavigationController {
    config: NavigationSection,
}

impl NavigationController {
    pub fn new(config: NavigationSection) -> Self {
        Self { config }
    }

    pub fn settle_wait(&self) -> Duration {
        Duration::from_secs(self.config.settle_seconds)
    }

    pub async fn navigate(&self, driver: &mut dyn PageDriver, url: &str) -> ScrapeResult<u64> {
        let budget = Duration::from_secs(self.config.timeout_seconds);
        let started = Instant::now();
        match timeout(budget, driver.navigate(url)).await {
            Ok(Ok(())) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                info!(url = %url, elapsed_ms, "page loaded");
                Ok(elapsed_ms)
            }
            Ok(Err(err)) => Err(ScrapeError::Navigation(format!("{url}: {err}"))),
            Err(_) => Err(ScrapeError::Timeout(format!(
                "navigation to {url} after {}s",
                self.config.timeout_seconds
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use serde_json::Value;

    struct InstantDriver;

    #[async_trait(?Send)]
    impl PageDriver for InstantDriver {
        async fn navigate(&mut self, _url: &str) -> ScrapeResult<()> {
            Ok(())
        }

        async fn evaluate(&mut self, _script: &str) -> ScrapeResult<Value> {
            Ok(Value::Null)
        }

        async fn click_visible(&mut self, _selector: &str) -> ScrapeResult<bool> {
            Ok(false)
        }

        async fn content(&mut self) -> ScrapeResult<String> {
            Ok(String::new())
        }

        async fn close(self: Box<Self>) -> ScrapeResult<()> {
            Ok(())
        }
    }

    struct StalledDriver;

    #[async_trait(?Send)]
    impl PageDriver for StalledDriver {
        async fn navigate(&mut self, _url: &str) -> ScrapeResult<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        async fn evaluate(&mut self, _script: &str) -> ScrapeResult<Value> {
            Ok(Value::Null)
        }

        async fn click_visible(&mut self, _selector: &str) -> ScrapeResult<bool> {
            Ok(false)
        }

        async fn content(&mut self) -> ScrapeResult<String> {
            Ok(String::new())
        }

        async fn close(self: Box<Self>) -> ScrapeResult<()> {
            Ok(())
        }
    }

    struct BrokenDriver;

    #[async_trait(?Send)]
    impl PageDriver for BrokenDriver {
        async fn navigate(&mut self, _url: &str) -> ScrapeResult<()> {
            Err(ScrapeError::Unexpected("connection reset".into()))
        }

        async fn evaluate(&mut self, _script: &str) -> ScrapeResult<Value> {
            Ok(Value::Null)
        }

        async fn click_visible(&mut self, _selector: &str) -> ScrapeResult<bool> {
            Ok(false)
        }

        async fn content(&mut self) -> ScrapeResult<String> {
            Ok(String::new())
        }

        async fn close(self: Box<Self>) -> ScrapeResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn success_reports_elapsed_time() {
        let controller = NavigationController::new(NavigationSection::default());
        let mut driver = InstantDriver;
        let elapsed = controller
            .navigate(&mut driver, "https://example.com/")
            .await
            .expect("navigation should succeed");
        assert!(elapsed < 60_000);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_navigation_times_out() {
        let controller = NavigationController::new(NavigationSection::default());
        let mut driver = StalledDriver;
        let err = controller
            .navigate(&mut driver, "https://example.com/")
            .await
            .expect_err("navigation should time out");
        assert!(matches!(err, ScrapeError::Timeout(_)));
    }

    #[tokio::test]
    async fn driver_failure_maps_to_navigation_error() {
        let controller = NavigationController::new(NavigationSection::default());
        let mut driver = BrokenDriver;
        let err = controller
            .navigate(&mut driver, "https://example.com/")
            .await
            .expect_err("navigation should fail");
        assert!(matches!(err, ScrapeError::Navigation(_)));
    }
}

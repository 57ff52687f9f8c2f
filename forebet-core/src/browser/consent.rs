use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::ConsentSection;

use super::error::{ScrapeError, ScrapeResult};
use super::page::PageDriver;

#[derive(Debug, Clone)]
pub struct ConsentResolver {
    config: ConsentSection,
}

impl ConsentResolver {
    pub fn new(config: ConsentSection) -> Self {
        Self { config }
    }

    pub async fn resolve(&self, driver: &mut dyn PageDriver) -> bool {
        for selector in &self.config.selectors {
            match driver.click_visible(selector).await {
                Ok(true) => {
                    info!(selector = %selector, "consent overlay dismissed");
                    self.settle().await;
                    return true;
                }
                Ok(false) => {}
                Err(err) => {
                    debug!(selector = %selector, error = %err, "consent candidate failed");
                }
            }
        }

        match self.click_by_text(driver).await {
            Ok(true) => {
                info!("consent overlay dismissed via text scan");
                self.settle().await;
                true
            }
            Ok(false) => {
                debug!("no consent overlay found");
                false
            }
            Err(err) => {
                debug!(error = %err, "consent text scan failed");
                false
            }
        }
    }

    async fn settle(&self) {
        sleep(Duration::from_millis(self.config.post_click_wait_ms)).await;
    }

    async fn click_by_text(&self, driver: &mut dyn PageDriver) -> ScrapeResult<bool> {
        let pattern = serde_json::to_string(&self.config.text_pattern).map_err(|err| {
            ScrapeError::Unexpected(format!("failed to encode consent pattern: {err}"))
        })?;
        let script = format!(
            r#"(() => {{
    const pattern = new RegExp({pattern}, 'i');
    const buttons = document.querySelectorAll('button');
    for (const button of buttons) {{
        const text = (button.innerText || button.textContent || '').trim();
        if (text && pattern.test(text)) {{
            button.click();
            return true;
        }}
    }}
    return false;
}})()"#
        );
        let value = driver.evaluate(&script).await?;
        Ok(value.as_bool().unwrap_or(false))
    }
}

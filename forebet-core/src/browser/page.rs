use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::page::Page;
use serde_json::Value;

use crate::config::ScraperConfig;

use super::error::{ScrapeError, ScrapeResult};
use super::session::{BrowserLauncher, BrowserSession, LaunchOverrides};

#[async_trait(?Send)]
pub trait PageDriver {
    async fn navigate(&mut self, url: &str) -> ScrapeResult<()>;
    async fn evaluate(&mut self, script: &str) -> ScrapeResult<Value>;
    async fn click_visible(&mut self, selector: &str) -> ScrapeResult<bool>;
    async fn content(&mut self) -> ScrapeResult<String>;
    async fn close(self: Box<Self>) -> ScrapeResult<()>;
}

#[async_trait(?Send)]
pub trait PageSource: Send + Sync {
    async fn open(&self) -> ScrapeResult<Box<dyn PageDriver>>;
}

pub struct CdpPage {
    session: BrowserSession,
    page: Page,
}

#[async_trait(?Send)]
impl PageDriver for CdpPage {
    async fn navigate(&mut self, url: &str) -> ScrapeResult<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(ScrapeError::Configuration)?;
        self.page.goto(params).await?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> ScrapeResult<Value> {
        let result = self.page.evaluate(script).await?;
        Ok(result.into_value::<Value>().unwrap_or(Value::Null))
    }

    async fn click_visible(&mut self, selector: &str) -> ScrapeResult<bool> {
        let element = match self.page.find_element(selector).await {
            Ok(element) => element,
            Err(_) => return Ok(false),
        };
        let bbox = match element.bounding_box().await {
            Ok(bbox) => bbox,
            Err(_) => return Ok(false),
        };
        let viewport = self.session.viewport();
        let intersects = bbox.width > 0.0
            && bbox.height > 0.0
            && bbox.x + bbox.width > 0.0
            && bbox.y + bbox.height > 0.0
            && bbox.x < viewport.width as f64
            && bbox.y < viewport.height as f64;
        if !intersects {
            return Ok(false);
        }
        element.click().await?;
        Ok(true)
    }

    async fn content(&mut self) -> ScrapeResult<String> {
        Ok(self.page.content().await?)
    }

    async fn close(self: Box<Self>) -> ScrapeResult<()> {
        self.session.shutdown().await
    }
}

pub struct CdpPageSource {
    launcher: BrowserLauncher,
}

impl CdpPageSource {
    pub fn new(config: Arc<ScraperConfig>) -> Self {
        Self {
            launcher: BrowserLauncher::new(config),
        }
    }

    pub fn with_overrides(config: Arc<ScraperConfig>, overrides: LaunchOverrides) -> Self {
        Self {
            launcher: BrowserLauncher::with_overrides(config, overrides),
        }
    }
}

#[async_trait(?Send)]
impl PageSource for CdpPageSource {
    async fn open(&self) -> ScrapeResult<Box<dyn PageDriver>> {
        let session = self.launcher.launch().await?;
        let page = session.new_page().await?;
        Ok(Box::new(CdpPage { session, page }))
    }
}

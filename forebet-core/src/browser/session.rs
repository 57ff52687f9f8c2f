use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::network::{self, SetUserAgentOverrideParams};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ScraperConfig, ViewportSection};

use super::error::{ScrapeError, ScrapeResult};

#[derive(Debug, Clone, Default)]
pub struct LaunchOverrides {
    pub headless: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct BrowserLauncher {
    config: Arc<ScraperConfig>,
    overrides: LaunchOverrides,
}

impl BrowserLauncher {
    pub fn new(config: Arc<ScraperConfig>) -> Self {
        Self {
            config,
            overrides: LaunchOverrides::default(),
        }
    }

    pub fn with_overrides(config: Arc<ScraperConfig>, overrides: LaunchOverrides) -> Self {
        Self { config, overrides }
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    pub async fn launch(&self) -> ScrapeResult<BrowserSession> {
        let user_data = TempDir::new()?;
        let headless = self.overrides.headless.unwrap_or(self.config.chromium.headless);
        let chromium_config = self.build_chromium_config(user_data.path(), headless)?;
        info!(
            ua = %self.config.flags.user_agent,
            width = self.config.viewport.width,
            height = self.config.viewport.height,
            headless,
            "Launching Chromium instance"
        );

        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| ScrapeError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "Chromium handler reported error");
                }
            }
        });

        Ok(BrowserSession {
            browser,
            handler_task: Some(handler_task),
            config: Arc::clone(&self.config),
            user_data: Some(user_data),
        })
    }

    fn build_chromium_config(
        &self,
        user_data: &Path,
        headless: bool,
    ) -> ScrapeResult<ChromiumConfig> {
        let viewport = &self.config.viewport;
        let mut builder = ChromiumConfig::builder()
            .user_data_dir(user_data)
            .viewport(ChromiumViewport {
                width: viewport.width,
                height: viewport.height,
                device_scale_factor: Some(viewport.device_scale_factor),
                emulating_mobile: false,
                is_landscape: viewport.width >= viewport.height,
                has_touch: false,
            })
            .request_timeout(Duration::from_secs(
                self.config.chromium.command_timeout_seconds,
            ));

        if let Some(path) = &self.config.chromium.executable_path {
            builder = builder.chrome_executable(path);
        }
        if !headless {
            builder = builder.with_head();
        }
        if !self.config.chromium.sandbox {
            builder = builder.no_sandbox();
        }

        builder = builder.args(build_launch_args(&self.config));
        builder.build().map_err(ScrapeError::Configuration)
    }
}

fn build_launch_args(config: &ScraperConfig) -> Vec<String> {
    let flags = &config.flags;
    let mut args = vec![
        format!("--user-agent={}", flags.user_agent),
        format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        ),
    ];

    if !config.chromium.sandbox {
        args.push("--disable-setuid-sandbox".into());
    }
    if config.chromium.disable_dev_shm {
        args.push("--disable-dev-shm-usage".into());
    }
    if config.chromium.disable_gpu {
        args.push("--disable-gpu".into());
    }
    if flags.disable_accelerated_2d_canvas {
        args.push("--disable-accelerated-2d-canvas".into());
    }
    if flags.no_first_run {
        args.push("--no-first-run".into());
    }
    if flags.no_zygote {
        args.push("--no-zygote".into());
    }
    for feature in &flags.disable_blink_features {
        args.push(format!("--disable-blink-features={feature}"));
    }
    if !flags.disable_features.is_empty() {
        args.push(format!(
            "--disable-features={}",
            flags.disable_features.join(",")
        ));
    }
    args.push(format!("--accept-lang={}", flags.accept_language));
    args
}

#[derive(Debug)]
pub struct BrowserSession {
    browser: Browser,
    handler_task: Option<JoinHandle<()>>,
    config: Arc<ScraperConfig>,
    user_data: Option<TempDir>,
}

impl BrowserSession {
    pub fn viewport(&self) -> &ViewportSection {
        &self.config.viewport
    }

    pub async fn new_page(&self) -> ScrapeResult<Page> {
        let params = CreateTargetParams::new("about:blank");
        let page = self.browser.new_page(params).await?;
        self.configure_page(&page).await?;
        Ok(page)
    }

    pub async fn shutdown(mut self) -> ScrapeResult<()> {
        info!("Shutting down Chromium instance");
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "Failed to close browser gracefully");
        }
        if let Some(handle) = self.handler_task.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "Browser handler join error");
            }
        }
        if let Some(dir) = self.user_data.take() {
            if let Err(err) = dir.close() {
                debug!(error = %err, "Failed to remove user data dir");
            }
        }
        Ok(())
    }

    async fn configure_page(&self, page: &Page) -> ScrapeResult<()> {
        let flags = &self.config.flags;
        page.enable_stealth_mode_with_agent(&flags.user_agent)
            .await?;

        let params = SetUserAgentOverrideParams::builder()
            .user_agent(flags.user_agent.clone())
            .accept_language(flags.accept_language.clone())
            .build()
            .map_err(ScrapeError::Configuration)?;
        page.set_user_agent(params).await?;

        if let Some(primary) = flags.languages.first() {
            let primary = encode_js(primary)?;
            let all = encode_js(&flags.languages)?;
            let languages_script = format!(
                "Object.defineProperty(navigator, 'language', {{ get: () => {primary} }});\nObject.defineProperty(navigator, 'languages', {{ get: () => {all} }});"
            );
            page.evaluate_on_new_document(
                AddScriptToEvaluateOnNewDocumentParams::builder()
                    .source(languages_script)
                    .build()
                    .map_err(ScrapeError::Configuration)?,
            )
            .await?;
        }

        let mut headers = serde_json::Map::new();
        headers.insert(
            "Accept-Language".to_string(),
            serde_json::Value::String(flags.accept_language.clone()),
        );
        if !flags.accept_header.is_empty() {
            headers.insert(
                "Accept".to_string(),
                serde_json::Value::String(flags.accept_header.clone()),
            );
        }
        let params = network::SetExtraHttpHeadersParams::builder()
            .headers(network::Headers::new(serde_json::Value::Object(headers)))
            .build()
            .map_err(ScrapeError::Configuration)?;
        page.execute(params).await?;

        Ok(())
    }
}

fn encode_js<T: serde::Serialize>(value: &T) -> ScrapeResult<String> {
    serde_json::to_string(value).map_err(|err| ScrapeError::Configuration(err.to_string()))
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Some(handle) = &self.handler_task {
            if !handle.is_finished() {
                warn!("BrowserSession dropped without explicit shutdown");
            }
        }
    }
}

use std::collections::BTreeMap;
use std::path::Path;

use regex::RegexBuilder;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScraperConfig {
    #[serde(default)]
    pub chromium: ChromiumSection,
    #[serde(default)]
    pub flags: FlagsSection,
    #[serde(default)]
    pub viewport: ViewportSection,
    #[serde(default)]
    pub navigation: NavigationSection,
    #[serde(default)]
    pub human: HumanSection,
    #[serde(default)]
    pub consent: ConsentSection,
    #[serde(default)]
    pub markers: MarkerSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub targets: TargetsSection,
    #[serde(default)]
    pub observability: ObservabilitySection,
}

impl ScraperConfig {
    pub fn validate(&self) -> Result<()> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(ConfigError::Invalid(
                "viewport dimensions must be non-zero".into(),
            ));
        }
        if self.navigation.timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "navigation.timeout_seconds must be non-zero".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.retry.backoff_seconds.is_empty() {
            return Err(ConfigError::Invalid(
                "retry.backoff_seconds must not be empty".into(),
            ));
        }
        RegexBuilder::new(&self.consent.text_pattern)
            .case_insensitive(true)
            .build()
            .map_err(|err| {
                ConfigError::Invalid(format!(
                    "consent.text_pattern is not a valid regex: {err}"
                ))
            })?;
        if !self.targets.urls.contains_key(&self.targets.fallback) {
            return Err(ConfigError::Invalid(format!(
                "targets.fallback {:?} has no url entry",
                self.targets.fallback
            )));
        }
        for (sport, url) in &self.targets.urls {
            Url::parse(url).map_err(|err| {
                ConfigError::Invalid(format!("targets.urls.{sport} is not a valid url: {err}"))
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChromiumSection {
    pub executable_path: Option<String>,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub disable_dev_shm: bool,
    pub command_timeout_seconds: u64,
}

impl Default for ChromiumSection {
    fn default() -> Self {
        Self {
            executable_path: None,
            headless: true,
            sandbox: false,
            disable_gpu: true,
            disable_dev_shm: true,
            command_timeout_seconds: 90,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlagsSection {
    pub user_agent: String,
    pub accept_language: String,
    pub accept_header: String,
    pub languages: Vec<String>,
    pub no_first_run: bool,
    pub no_zygote: bool,
    pub disable_accelerated_2d_canvas: bool,
    pub disable_blink_features: Vec<String>,
    pub disable_features: Vec<String>,
}

impl Default for FlagsSection {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".into(),
            accept_language: "en-US,en;q=0.9".into(),
            accept_header: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8".into(),
            languages: vec!["en-US".into(), "en".into()],
            no_first_run: true,
            no_zygote: true,
            disable_accelerated_2d_canvas: true,
            disable_blink_features: vec!["AutomationControlled".into()],
            disable_features: vec!["IsolateOrigins".into(), "site-per-process".into()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewportSection {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
}

impl Default for ViewportSection {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            device_scale_factor: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NavigationSection {
    pub timeout_seconds: u64,
    pub settle_seconds: u64,
}

impl Default for NavigationSection {
    fn default() -> Self {
        Self {
            timeout_seconds: 60,
            settle_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HumanSection {
    pub scroll_steps_px: Vec<i64>,
    pub step_delay_ms: [u64; 2],
    pub return_pause_ms: [u64; 2],
}

impl Default for HumanSection {
    fn default() -> Self {
        Self {
            scroll_steps_px: vec![300, 500],
            step_delay_ms: [500, 2000],
            return_pause_ms: [1000, 2000],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsentSection {
    pub selectors: Vec<String>,
    pub text_pattern: String,
    pub post_click_wait_ms: u64,
}

impl Default for ConsentSection {
    fn default() -> Self {
        Self {
            selectors: vec![
                "button.fc-cta-consent".into(),
                ".fc-cta-consent".into(),
                "button[data-cookiefirst-action=\"accept\"]".into(),
                "#onetrust-accept-btn-handler".into(),
            ],
            text_pattern: "accept|agree|zgadzam|consent".into(),
            post_click_wait_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkerSection {
    pub content: Vec<String>,
    pub challenge: Vec<String>,
}

impl Default for MarkerSection {
    fn default() -> Self {
        Self {
            content: vec!["rcnt".into(), "forepr".into(), "tr_0".into()],
            challenge: vec![
                "loading-verifying".into(),
                "lds-ring".into(),
                "Checking your browser".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    pub max_attempts: usize,
    pub backoff_seconds: Vec<u64>,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_seconds: vec![10, 30],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetsSection {
    pub fallback: String,
    pub urls: BTreeMap<String, String>,
}

impl Default for TargetsSection {
    fn default() -> Self {
        let mut urls = BTreeMap::new();
        let football = "https://www.forebet.com/en/football-tips-and-predictions-for-today";
        let hockey = "https://www.forebet.com/en/hockey/predictions-today";
        urls.insert("football".to_string(), football.to_string());
        urls.insert("soccer".to_string(), football.to_string());
        urls.insert(
            "basketball".to_string(),
            "https://www.forebet.com/en/basketball/predictions-today".to_string(),
        );
        urls.insert(
            "tennis".to_string(),
            "https://www.forebet.com/en/tennis/predictions-today".to_string(),
        );
        urls.insert(
            "volleyball".to_string(),
            "https://www.forebet.com/en/volleyball/predictions-today".to_string(),
        );
        urls.insert(
            "handball".to_string(),
            "https://www.forebet.com/en/handball/predictions-today".to_string(),
        );
        urls.insert("hockey".to_string(), hockey.to_string());
        urls.insert("ice-hockey".to_string(), hockey.to_string());
        Self {
            fallback: "football".to_string(),
            urls,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilitySection {
    pub failure_log: Option<String>,
    pub challenge_dump: String,
}

impl Default for ObservabilitySection {
    fn default() -> Self {
        Self {
            failure_log: None,
            challenge_dump: "forebet_challenge_debug.html".into(),
        }
    }
}

pub fn load_scraper_config<P: AsRef<Path>>(path: P) -> Result<ScraperConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

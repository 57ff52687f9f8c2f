pub mod browser;
pub mod config;
pub mod error;
pub mod target;

pub use config::{load_scraper_config, ScraperConfig};
pub use error::{ConfigError, Result};
pub use target::{ScrapeTarget, SportCatalog};

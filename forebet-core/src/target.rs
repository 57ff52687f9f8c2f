use std::collections::BTreeMap;

use tracing::warn;

use crate::config::TargetsSection;
use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeTarget {
    pub sport: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct SportCatalog {
    urls: BTreeMap<String, String>,
    fallback: String,
    fallback_url: String,
}

impl SportCatalog {
    pub fn new(section: &TargetsSection) -> Result<Self> {
        let fallback_url = section
            .urls
            .get(&section.fallback)
            .cloned()
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "targets.fallback {:?} has no url entry",
                    section.fallback
                ))
            })?;
        Ok(Self {
            urls: section.urls.clone(),
            fallback: section.fallback.clone(),
            fallback_url,
        })
    }

    pub fn resolve(&self, sport: &str) -> ScrapeTarget {
        let normalized = sport.trim().to_lowercase();
        match self.urls.get(&normalized) {
            Some(url) => ScrapeTarget {
                sport: normalized,
                url: url.clone(),
            },
            None => {
                warn!(
                    sport = %normalized,
                    fallback = %self.fallback,
                    "no target url for sport, falling back"
                );
                ScrapeTarget {
                    sport: normalized,
                    url: self.fallback_url.clone(),
                }
            }
        }
    }

    pub fn sports(&self) -> impl Iterator<Item = &str> {
        self.urls.keys().map(String::as_str)
    }
}

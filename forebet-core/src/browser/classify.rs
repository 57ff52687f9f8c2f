use std::fmt;

use serde::Serialize;

use crate::config::MarkerSection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageClass {
    Content,
    Challenge,
    Unknown,
}

impl fmt::Display for PageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PageClass::Content => "content",
            PageClass::Challenge => "challenge",
            PageClass::Unknown => "unknown",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone)]
pub struct ContentClassifier {
    config: MarkerSection,
}

impl ContentClassifier {
    pub fn new(config: MarkerSection) -> Self {
        Self { config }
    }

    pub fn classify(&self, html: &str) -> PageClass {
        if matches_any(html, &self.config.content) {
            return PageClass::Content;
        }
        if matches_any(html, &self.config.challenge) {
            return PageClass::Challenge;
        }
        PageClass::Unknown
    }
}

fn matches_any(html: &str, markers: &[String]) -> bool {
    markers.iter().any(|marker| html.contains(marker.as_str()))
}

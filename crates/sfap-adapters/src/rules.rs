//! Ordered keyword tables driving event, theme and platform inference.
//!
//! Table order is significant: the first matching entry wins.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use sfap_core::Platform;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeywordRule {
    pub keyword: String,
    pub label: String,
}

impl KeywordRule {
    pub fn new(keyword: &str, label: &str) -> Self {
        Self {
            keyword: keyword.to_lowercase(),
            label: label.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformVocabulary {
    pub platform: Platform,
    /// Exact filename tokens.
    pub filename_tokens: Vec<String>,
    /// Substrings looked for in link-bearing cells.
    pub link_domains: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordTables {
    events: Vec<KeywordRule>,
    themes: Vec<KeywordRule>,
    platforms: Vec<PlatformVocabulary>,
}

impl Default for KeywordTables {
    fn default() -> Self {
        Self {
            events: vec![
                KeywordRule::new("korea", "Rizin South Korea"),
                KeywordRule::new("ws_korea", "Rizin South Korea"),
                KeywordRule::new("landmark", "Rizin Landmark"),
                KeywordRule::new("rizin 4", "Rizin 4"),
                KeywordRule::new("rizin4", "Rizin 4"),
            ],
            themes: vec![
                KeywordRule::new("fightorder", "FightOrder"),
                KeywordRule::new("behindthescenes", "BehindTheScenes"),
            ],
            platforms: vec![
                PlatformVocabulary {
                    platform: Platform::FB,
                    filename_tokens: strings(&["facebook", "fb"]),
                    link_domains: strings(&["facebook.com", "fb.com", "fb.watch"]),
                },
                PlatformVocabulary {
                    platform: Platform::IG,
                    filename_tokens: strings(&["instagram", "ig", "insta"]),
                    link_domains: strings(&["instagram.com", "instagr.am"]),
                },
                PlatformVocabulary {
                    platform: Platform::X,
                    filename_tokens: strings(&["twitter", "x", "tw", "tweets"]),
                    link_domains: strings(&["twitter.com", "t.co/", "x.com"]),
                },
            ],
        }
    }
}

#[derive(Debug, Deserialize)]
struct KeywordRulesFile {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    rules: Vec<KeywordRule>,
}

impl KeywordTables {
    pub fn new(
        events: Vec<KeywordRule>,
        themes: Vec<KeywordRule>,
        platforms: Vec<PlatformVocabulary>,
    ) -> Self {
        Self {
            events: lowercase_keywords(events),
            themes: lowercase_keywords(themes),
            platforms,
        }
    }

    /// Defaults, with `events.yaml` / `themes.yaml` from `rules_dir` replacing
    /// the matching table when present.
    pub fn from_rules_dir(rules_dir: &Path) -> Result<Self> {
        let mut tables = Self::default();
        if let Some(events) = read_rules_file(&rules_dir.join("events.yaml"))? {
            tables.events = lowercase_keywords(events);
        }
        if let Some(themes) = read_rules_file(&rules_dir.join("themes.yaml"))? {
            tables.themes = lowercase_keywords(themes);
        }
        Ok(tables)
    }

    pub fn events(&self) -> &[KeywordRule] {
        &self.events
    }

    pub fn themes(&self) -> &[KeywordRule] {
        &self.themes
    }

    pub fn platforms(&self) -> &[PlatformVocabulary] {
        &self.platforms
    }

    /// First event whose keyword occurs in `haystack` (already lowercased).
    pub fn match_event(&self, haystack: &str) -> Option<&str> {
        first_match(&self.events, haystack)
    }

    pub fn match_theme(&self, haystack: &str) -> Option<&str> {
        first_match(&self.themes, haystack)
    }
}

fn first_match<'a>(rules: &'a [KeywordRule], haystack: &str) -> Option<&'a str> {
    rules
        .iter()
        .find(|rule| !rule.keyword.is_empty() && haystack.contains(&rule.keyword))
        .map(|rule| rule.label.as_str())
}

fn lowercase_keywords(rules: Vec<KeywordRule>) -> Vec<KeywordRule> {
    rules
        .into_iter()
        .map(|rule| KeywordRule {
            keyword: rule.keyword.to_lowercase(),
            label: rule.label,
        })
        .collect()
}

fn read_rules_file(path: &Path) -> Result<Option<Vec<KeywordRule>>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let file: KeywordRulesFile =
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    info!(path = %path.display(), rules = file.rules.len(), "loaded keyword rules");
    Ok(Some(file.rules))
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

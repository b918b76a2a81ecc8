//! Platform and event attribution for a source file.

use std::sync::Arc;

use sfap_core::{Platform, UNKNOWN_EVENT};

use crate::rules::KeywordTables;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceClassification {
    pub platform: Platform,
    pub event: String,
}

/// Cells sampled from a file's body, used when the name says nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentSample<'a> {
    pub link_cells: &'a [&'a str],
    pub text_cells: &'a [&'a str],
}

#[derive(Debug, Clone)]
pub struct SourceClassifier {
    tables: Arc<KeywordTables>,
}

impl SourceClassifier {
    pub fn new(tables: Arc<KeywordTables>) -> Self {
        Self { tables }
    }

    /// `folder` is the directory of the file relative to the input root.
    pub fn classify(&self, file_name: &str, folder: &str, sample: ContentSample<'_>) -> SourceClassification {
        let platform = self
            .platform_from_filename(file_name)
            .or_else(|| self.platform_from_links(sample.link_cells))
            .unwrap_or(Platform::Unknown);
        let event = self
            .event_from(folder, file_name, sample.text_cells)
            .unwrap_or(UNKNOWN_EVENT)
            .to_string();
        SourceClassification { platform, event }
    }

    /// Exact token match on the file stem split at non-alphanumerics.
    pub fn platform_from_filename(&self, file_name: &str) -> Option<Platform> {
        let stem = file_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(file_name)
            .to_lowercase();
        let tokens: Vec<&str> = stem
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        self.tables
            .platforms()
            .iter()
            .find(|vocab| {
                vocab
                    .filename_tokens
                    .iter()
                    .any(|token| tokens.contains(&token.as_str()))
            })
            .map(|vocab| vocab.platform)
    }

    /// Domain match on the first link cell that names a known platform.
    pub fn platform_from_links(&self, link_cells: &[&str]) -> Option<Platform> {
        link_cells
            .iter()
            .map(|cell| cell.trim().to_lowercase())
            .filter(|cell| !cell.is_empty())
            .find_map(|cell| {
                self.tables
                    .platforms()
                    .iter()
                    .find(|vocab| vocab.link_domains.iter().any(|d| cell.contains(d.as_str())))
                    .map(|vocab| vocab.platform)
            })
    }

    /// Folder first, then file name, then body text in row order.
    pub fn event_from<'t>(&'t self, folder: &str, file_name: &str, text_cells: &[&str]) -> Option<&'t str> {
        self.tables
            .match_event(&folder.to_lowercase())
            .or_else(|| self.tables.match_event(&file_name.to_lowercase()))
            .or_else(|| {
                text_cells
                    .iter()
                    .find_map(|cell| self.tables.match_event(&cell.to_lowercase()))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> SourceClassifier {
        SourceClassifier::new(Arc::new(KeywordTables::default()))
    }

    #[test]
    fn platform_comes_from_filename_tokens() {
        let c = classifier();
        assert_eq!(c.platform_from_filename("IG_posts_korea.csv"), Some(Platform::IG));
        assert_eq!(c.platform_from_filename("facebook-export.csv"), Some(Platform::FB));
        assert_eq!(c.platform_from_filename("x_posts.csv"), Some(Platform::X));
        assert_eq!(c.platform_from_filename("export.csv"), None);
        // "x" inside a word is not a token
        assert_eq!(c.platform_from_filename("export_xyz.csv"), None);
    }

    #[test]
    fn link_domains_are_the_fallback() {
        let c = classifier();
        let sample = ContentSample {
            link_cells: &["", "https://www.instagram.com/p/abc/"],
            text_cells: &[],
        };
        let result = c.classify("export.csv", "", sample);
        assert_eq!(result.platform, Platform::IG);
        assert_eq!(result.event, UNKNOWN_EVENT);

        let unknown = c.classify("export.csv", "", ContentSample::default());
        assert_eq!(unknown.platform, Platform::Unknown);
    }

    #[test]
    fn event_prefers_folder_then_name_then_content() {
        let c = classifier();
        let texts = ["Fight week! #rizin4"];
        let sample = ContentSample {
            link_cells: &[],
            text_cells: &texts,
        };
        assert_eq!(
            c.classify("fb_landmark.csv", "Korea/exports", sample).event,
            "Rizin South Korea"
        );
        assert_eq!(c.classify("fb_landmark.csv", "exports", sample).event, "Rizin Landmark");
        assert_eq!(c.classify("fb.csv", "exports", sample).event, "Rizin 4");
    }
}

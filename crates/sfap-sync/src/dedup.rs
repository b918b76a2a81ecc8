//! Collapse duplicate posts pulled from overlapping exports.

use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sfap_core::PostRecord;
use strsim::jaro_winkler;

use crate::DedupHook;

pub const DEFAULT_HASHTAG_PREFIX: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Url(String),
    /// `platform|date|hour|hashtag prefix`. Distinct URL-less posts from the
    /// same hour with similar captions collide on this key.
    Fallback(String),
}

impl DedupKey {
    pub fn for_post(post: &PostRecord, hashtag_prefix: usize) -> Self {
        let url = post.post_url.trim();
        if !url.is_empty() {
            return DedupKey::Url(url.to_string());
        }
        let prefix: String = post.hashtags_joined().chars().take(hashtag_prefix).collect();
        DedupKey::Fallback(format!(
            "{}|{}|{}|{}",
            post.platform,
            post.post_time.date(),
            post.post_time.hour(),
            prefix
        ))
    }
}

/// A collapse made through the fallback key, kept for manual review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupReviewItem {
    pub kept_key: String,
    pub kept_source_file: String,
    pub dropped_source_file: String,
    pub hashtag_similarity: f64,
}

#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    pub records: Vec<PostRecord>,
    pub dropped: usize,
    pub review: Vec<DedupReviewItem>,
}

#[derive(Debug, Clone, Copy)]
pub struct PostDeduplicator {
    hashtag_prefix: usize,
}

impl Default for PostDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_HASHTAG_PREFIX)
    }
}

impl PostDeduplicator {
    pub fn new(hashtag_prefix: usize) -> Self {
        Self { hashtag_prefix }
    }

    /// First record per key wins; input order is preserved.
    pub fn collapse(&self, posts: Vec<PostRecord>) -> DedupOutcome {
        let mut kept_at: HashMap<DedupKey, usize> = HashMap::new();
        let mut outcome = DedupOutcome::default();

        for post in posts {
            let key = DedupKey::for_post(&post, self.hashtag_prefix);
            match kept_at.get(&key).copied() {
                Some(index) => {
                    outcome.dropped += 1;
                    if let DedupKey::Fallback(kept_key) = &key {
                        let kept = &outcome.records[index];
                        outcome.review.push(DedupReviewItem {
                            kept_key: kept_key.clone(),
                            kept_source_file: kept.source_file.clone(),
                            dropped_source_file: post.source_file.clone(),
                            hashtag_similarity: jaro_winkler(&kept.hashtags_joined(), &post.hashtags_joined()),
                        });
                    }
                }
                None => {
                    kept_at.insert(key, outcome.records.len());
                    outcome.records.push(post);
                }
            }
        }
        outcome
    }
}

impl DedupHook for PostDeduplicator {
    fn apply(&self, items: Vec<PostRecord>) -> Result<DedupOutcome> {
        Ok(self.collapse(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sfap_core::{Platform, PostFormat, PostTime};

    fn post(url: &str, hour: u32, hashtags: &[&str], source_file: &str) -> PostRecord {
        PostRecord {
            event: "Rizin 4".to_string(),
            platform: Platform::X,
            post_time: PostTime::from_local(
                NaiveDate::from_ymd_opt(2025, 6, 1)
                    .unwrap()
                    .and_hms_opt(hour, 15, 0)
                    .unwrap(),
            ),
            post_url: url.to_string(),
            format: PostFormat::Text,
            hashtags: hashtags.iter().map(|t| t.to_string()).collect(),
            content_theme: None,
            impressions: Some(100),
            reach: None,
            engagements: 4,
            engagement_rate: Some(4.0),
            link_clicks: None,
            follows_gained_estimated: 0,
            source_file: source_file.to_string(),
        }
    }

    #[test]
    fn identical_urls_keep_the_first_record() {
        let outcome = PostDeduplicator::default().collapse(vec![
            post("https://x.com/a/status/1", 9, &[], "first.csv"),
            post(" https://x.com/a/status/1 ", 10, &["#rizin"], "second.csv"),
            post("https://x.com/a/status/2", 9, &[], "first.csv"),
        ]);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].source_file, "first.csv");
        assert_eq!(outcome.records[1].post_url, "https://x.com/a/status/2");
        assert_eq!(outcome.dropped, 1);
        assert!(outcome.review.is_empty());
    }

    #[test]
    fn url_less_posts_collapse_on_the_fallback_key() {
        let outcome = PostDeduplicator::default().collapse(vec![
            post("", 9, &["#rizin", "#fightorder"], "a.csv"),
            post("", 9, &["#rizin", "#fightorder"], "b.csv"),
            post("", 10, &["#rizin", "#fightorder"], "b.csv"),
        ]);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.review.len(), 1);
        let item = &outcome.review[0];
        assert_eq!(item.kept_key, "X|2025-06-01|9|#rizin #fightorder");
        assert_eq!(item.kept_source_file, "a.csv");
        assert_eq!(item.dropped_source_file, "b.csv");
        assert!((item.hashtag_similarity - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn fallback_key_uses_a_fixed_length_prefix() {
        let outcome = PostDeduplicator::new(6).collapse(vec![
            post("", 9, &["#rizin", "#korea"], "a.csv"),
            post("", 9, &["#rizin", "#landmark"], "b.csv"),
        ]);
        assert_eq!(outcome.records.len(), 1);
        assert!(outcome.review[0].hashtag_similarity < 1.0);
    }
}

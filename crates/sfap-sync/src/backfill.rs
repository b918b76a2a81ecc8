//! Fill gaps in post metrics from PDF report tables.

use std::collections::HashMap;

use anyhow::Result;
use sfap_core::{observed, PdfMetricRow, PostRecord};
use tracing::debug;

use crate::EnrichmentHook;

/// Merge-only: matches by exact post URL, fills absent impressions and reach,
/// never creates records and never overwrites an observed value.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfBackfill;

impl PdfBackfill {
    /// Returns how many records gained at least one value.
    pub fn fill(&self, posts: &mut [PostRecord], pdf_rows: &[PdfMetricRow]) -> usize {
        let mut by_url: HashMap<&str, Vec<&PdfMetricRow>> = HashMap::new();
        for row in pdf_rows {
            if let Some(url) = row.post_url.as_deref().filter(|u| !u.is_empty()) {
                by_url.entry(url).or_default().push(row);
            }
        }

        let mut filled = 0;
        for post in posts.iter_mut() {
            let Some(rows) = by_url.get(post.post_url.as_str()) else {
                continue;
            };
            let mut changed = false;
            for row in rows {
                if post.impressions.is_none() {
                    if let Some(value) = row.impressions.and_then(observed) {
                        post.impressions = Some(value);
                        changed = true;
                    }
                }
                if post.reach.is_none() {
                    if let Some(value) = row.reach.and_then(observed) {
                        post.reach = Some(value);
                        changed = true;
                    }
                }
            }
            if changed {
                if post.engagement_rate.is_none() {
                    post.refresh_engagement_rate();
                }
                debug!(url = %post.post_url, "backfilled metrics from pdf");
                filled += 1;
            }
        }
        filled
    }
}

impl EnrichmentHook for PdfBackfill {
    fn apply(&self, mut items: Vec<PostRecord>, pdf_rows: &[PdfMetricRow]) -> Result<Vec<PostRecord>> {
        self.fill(&mut items, pdf_rows);
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sfap_core::{Platform, PostFormat, PostTime};

    fn post(url: &str, impressions: Option<u64>, reach: Option<u64>) -> PostRecord {
        PostRecord {
            event: "Rizin South Korea".to_string(),
            platform: Platform::IG,
            post_time: PostTime::from_local(
                NaiveDate::from_ymd_opt(2025, 6, 1)
                    .unwrap()
                    .and_hms_opt(9, 0, 0)
                    .unwrap(),
            ),
            post_url: url.to_string(),
            format: PostFormat::Static,
            hashtags: Vec::new(),
            content_theme: None,
            impressions,
            reach,
            engagements: 30,
            engagement_rate: sfap_core::engagement_rate(30, impressions),
            link_clicks: None,
            follows_gained_estimated: 0,
            source_file: "IG_posts.csv".to_string(),
        }
    }

    fn row(url: Option<&str>, impressions: Option<u64>, reach: Option<u64>) -> PdfMetricRow {
        PdfMetricRow {
            post_url: url.map(str::to_string),
            impressions,
            reach,
            source_document: "report.pdf".to_string(),
        }
    }

    #[test]
    fn fills_only_absent_values_and_refreshes_rate() {
        let rows = vec![
            row(Some("https://instagram.com/p/a/"), Some(600), Some(500)),
            row(Some("https://instagram.com/p/b/"), Some(999), Some(999)),
            row(None, Some(1), Some(1)),
        ];
        let mut posts = vec![
            post("https://instagram.com/p/a/", None, None),
            post("https://instagram.com/p/b/", Some(300), None),
            post("https://instagram.com/p/c/", None, None),
        ];
        let filled = PdfBackfill.fill(&mut posts, &rows);

        assert_eq!(filled, 2);
        assert_eq!(posts[0].impressions, Some(600));
        assert_eq!(posts[0].reach, Some(500));
        assert_eq!(posts[0].engagement_rate, Some(5.0));
        assert_eq!(posts[1].impressions, Some(300));
        assert_eq!(posts[1].reach, Some(999));
        assert_eq!(posts[1].engagement_rate, Some(10.0));
        assert_eq!(posts[2].impressions, None);
    }

    #[test]
    fn never_creates_records() {
        let rows = [row(Some("https://x.com/a/status/9"), Some(10), None)];
        let posts = PdfBackfill.apply(Vec::new(), &rows).unwrap();
        assert!(posts.is_empty());
    }
}

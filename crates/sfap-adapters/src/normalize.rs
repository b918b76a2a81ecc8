//! Row-level normalization into [`PostRecord`].

use std::sync::{Arc, LazyLock};

use csv::StringRecord;
use regex::Regex;
use sfap_core::{engagement_rate, observed, Platform, PostFormat, PostRecord, PostTime};

use crate::columns::{count_or_default, parse_count, PostField, ResolvedColumns};
use crate::rules::KeywordTables;

static HASHTAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#\w+").expect("valid hashtag regex"));

const VIDEO_EXTENSIONS: [&str; 4] = [".mp4", ".mov", ".m4v", ".webm"];

/// Per-file facts shared by every row.
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    pub platform: Platform,
    pub event: &'a str,
    pub source_file: &'a str,
}

/// Interaction counts read from one row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InteractionCounts {
    pub likes: u64,
    /// Only set when a reactions column exists and the cell is filled.
    pub reactions: Option<u64>,
    pub comments: u64,
    pub shares: u64,
    pub saves: u64,
}

impl InteractionCounts {
    pub fn from_row(columns: &ResolvedColumns, row: &StringRecord) -> Self {
        let count = |fields: &[PostField]| count_or_default(columns.first_non_empty(row, fields));
        Self {
            likes: count(&[PostField::Likes]),
            reactions: columns
                .non_empty(row, PostField::Reactions)
                .map(|cell| count_or_default(Some(cell))),
            comments: count(&[PostField::Comments, PostField::Replies]),
            shares: count(&[PostField::Shares, PostField::Retweets]),
            saves: count(&[PostField::Saves]),
        }
    }

    /// Platform-specific total, saturating. Facebook reactions replace likes.
    pub fn engagements(&self, platform: Platform) -> u64 {
        let terms: &[u64] = match platform {
            Platform::FB => &[self.reactions.unwrap_or(self.likes), self.comments, self.shares],
            Platform::IG | Platform::Unknown => &[self.likes, self.comments, self.shares, self.saves],
            Platform::X => &[self.likes, self.comments, self.shares],
        };
        terms.iter().fold(0, |sum, term| sum.saturating_add(*term))
    }
}

#[derive(Debug, Clone)]
pub struct RowNormalizer {
    tables: Arc<KeywordTables>,
}

impl RowNormalizer {
    pub fn new(tables: Arc<KeywordTables>) -> Self {
        Self { tables }
    }

    pub fn normalize(
        &self,
        columns: &ResolvedColumns,
        row: &StringRecord,
        ctx: RowContext<'_>,
        post_time: PostTime,
    ) -> PostRecord {
        let post_url = post_url(ctx.platform, columns, row);
        let format = classify_format(
            ctx.platform,
            columns.get(row, PostField::Type),
            &post_url,
            columns.get(row, PostField::Media),
        );
        let hashtags = extract_hashtags(columns.get(row, PostField::Text).unwrap_or(""));
        let content_theme = self.theme_for(&hashtags);

        let engagements = InteractionCounts::from_row(columns, row).engagements(ctx.platform);
        let impressions = observed(columns.count(row, PostField::Impressions));
        let link_clicks = columns
            .first_non_empty(row, &[PostField::Clicks, PostField::LinkClicks])
            .and_then(parse_count)
            .and_then(observed);

        PostRecord {
            event: ctx.event.to_string(),
            platform: ctx.platform,
            post_time,
            post_url,
            format,
            hashtags,
            content_theme,
            impressions,
            reach: observed(columns.count(row, PostField::Reach)),
            engagements,
            engagement_rate: engagement_rate(engagements, impressions),
            link_clicks,
            follows_gained_estimated: 0,
            source_file: ctx.source_file.to_string(),
        }
    }

    /// First hashtag containing a theme keyword decides the theme.
    pub fn theme_for(&self, hashtags: &[String]) -> Option<String> {
        hashtags.iter().find_map(|tag| {
            let key = tag.trim_matches('#').to_lowercase();
            self.tables.match_theme(&key).map(str::to_string)
        })
    }
}

/// The link cell when a link column exists; otherwise a Facebook URL built
/// from a `<page>_<post>` id.
pub fn post_url(platform: Platform, columns: &ResolvedColumns, row: &StringRecord) -> String {
    if let Some(link) = columns.get(row, PostField::Url) {
        return link.to_string();
    }
    match (platform, columns.non_empty(row, PostField::Id)) {
        (Platform::FB, Some(id)) if id.contains('_') => format!("https://facebook.com/{id}"),
        _ => String::new(),
    }
}

/// Type tags match on substrings, checked in a fixed order per platform;
/// anything unmatched keeps its capitalized tag.
pub fn classify_format(
    platform: Platform,
    type_tag: Option<&str>,
    url: &str,
    media: Option<&str>,
) -> PostFormat {
    let tag = type_tag.map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty());
    let url = url.to_lowercase();
    let media_items = media_items(platform, media.unwrap_or(""));

    let Some(tag) = tag else {
        return match platform {
            Platform::IG if url.contains("/reel/") => PostFormat::Reel,
            Platform::IG | Platform::FB => PostFormat::Static,
            Platform::X => format_from_media(&media_items),
            Platform::Unknown => PostFormat::Unclassified,
        };
    };

    let has = |needles: &[&str]| needles.iter().any(|n| tag.contains(*n));
    match platform {
        Platform::IG if has(&["video"]) => {
            if url.contains("/tv/") && !url.contains("/reel/") {
                PostFormat::Video
            } else {
                PostFormat::Reel
            }
        }
        Platform::IG if has(&["carousel", "album"]) => PostFormat::Carousel,
        Platform::IG if has(&["image", "photo"]) => PostFormat::Static,
        Platform::FB | Platform::X if has(&["video"]) => PostFormat::Video,
        Platform::FB | Platform::X if has(&["image", "photo"]) => {
            if media_items.len() > 1 {
                PostFormat::Carousel
            } else {
                PostFormat::Static
            }
        }
        Platform::FB if has(&["link"]) => PostFormat::Link,
        Platform::X if has(&["text", "tweet"]) => PostFormat::Text,
        _ => capitalized(&tag),
    }
}

fn media_items(platform: Platform, media: &str) -> Vec<String> {
    let separators: &[char] = match platform {
        Platform::FB => &['|', ';'],
        _ => &[',', '|'],
    };
    media
        .split(separators)
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

fn format_from_media(items: &[String]) -> PostFormat {
    let has_video = items
        .iter()
        .any(|item| VIDEO_EXTENSIONS.iter().any(|ext| item.contains(ext)));
    match items.len() {
        _ if has_video => PostFormat::Video,
        0 => PostFormat::Text,
        1 => PostFormat::Static,
        _ => PostFormat::Carousel,
    }
}

fn capitalized(tag: &str) -> PostFormat {
    let mut chars = tag.chars();
    match chars.next() {
        Some(first) => PostFormat::from(first.to_uppercase().chain(chars).collect::<String>()),
        None => PostFormat::Unclassified,
    }
}

/// `#word` tokens in text order, duplicates kept.
pub fn extract_hashtags(text: &str) -> Vec<String> {
    HASHTAG_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(cells: &[&str]) -> StringRecord {
        StringRecord::from(cells.to_vec())
    }

    fn slot() -> PostTime {
        PostTime::from_local(
            NaiveDate::from_ymd_opt(2025, 6, 1)
                .unwrap()
                .and_hms_opt(0, 7, 0)
                .unwrap(),
        )
    }

    fn normalize(platform: Platform, headers: &[&str], row: &[&str]) -> PostRecord {
        let normalizer = RowNormalizer::new(Arc::new(KeywordTables::default()));
        let columns = ResolvedColumns::resolve(&record(headers));
        let ctx = RowContext {
            platform,
            event: "Rizin South Korea",
            source_file: "posts.csv",
        };
        normalizer.normalize(&columns, &record(row), ctx, slot())
    }

    #[test]
    fn facebook_reactions_replace_likes() {
        let post = normalize(
            Platform::FB,
            &["date", "reactions", "likes", "comments", "shares", "impressions"],
            &["2025-06-01", "10", "99", "3", "2", "300"],
        );
        assert_eq!(post.engagements, 15);
        assert_eq!(post.engagement_rate, Some(5.0));
    }

    #[test]
    fn instagram_counts_saves() {
        let post = normalize(
            Platform::IG,
            &["date", "likes", "comments", "shares", "saves"],
            &["2025-06-01", "5", "1", "", "2"],
        );
        assert_eq!(post.engagements, 8);
        assert_eq!(post.impressions, None);
        assert_eq!(post.engagement_rate, None);
    }

    #[test]
    fn oversized_counts_saturate() {
        let post = normalize(
            Platform::IG,
            &["date", "likes", "comments", "shares", "saves", "impressions"],
            &["2025-06-01", "1e20", "1", "9223372036854775807", "1e30", "1e25"],
        );
        assert_eq!(post.engagements, u64::MAX);
        assert_eq!(post.impressions, Some(i64::MAX as u64));
        assert!(post.engagement_rate.is_some());
    }

    #[test]
    fn x_uses_replies_and_retweets_aliases() {
        let post = normalize(
            Platform::X,
            &["created_at", "favorites", "replies", "retweets", "impressions", "clicks"],
            &["2025-06-01", "4", "1", "2", "0", "0"],
        );
        assert_eq!(post.engagements, 7);
        assert_eq!(post.impressions, None);
        assert_eq!(post.engagement_rate, None);
        assert_eq!(post.link_clicks, None);
    }

    #[test]
    fn hashtags_and_theme_come_from_text() {
        let post = normalize(
            Platform::IG,
            &["date", "caption", "link"],
            &["2025-06-01", "Go #Rizin #FightOrder_Reveal #rizin", "https://instagram.com/p/x/"],
        );
        assert_eq!(post.hashtags, vec!["#Rizin", "#FightOrder_Reveal", "#rizin"]);
        assert_eq!(post.hashtags_joined(), "#Rizin #FightOrder_Reveal #rizin");
        assert_eq!(post.content_theme.as_deref(), Some("FightOrder"));
        assert_eq!(post.post_url, "https://instagram.com/p/x/");
        assert_eq!(post.format, PostFormat::Static);
    }

    #[test]
    fn facebook_url_is_built_from_compound_id() {
        let post = normalize(Platform::FB, &["date", "id"], &["2025-06-01", "123_456"]);
        assert_eq!(post.post_url, "https://facebook.com/123_456");
        let post = normalize(Platform::FB, &["date", "id"], &["2025-06-01", "123456"]);
        assert_eq!(post.post_url, "");
    }

    #[test]
    fn instagram_video_splits_reel_and_tv() {
        let reel = classify_format(Platform::IG, Some("VIDEO"), "https://instagram.com/reel/abc", None);
        let tv = classify_format(Platform::IG, Some("video"), "https://instagram.com/tv/abc", None);
        assert_eq!(reel, PostFormat::Reel);
        assert_eq!(tv, PostFormat::Video);
        assert_eq!(
            classify_format(Platform::IG, None, "https://instagram.com/reel/abc", None),
            PostFormat::Reel
        );
        assert_eq!(
            classify_format(Platform::IG, Some("carousel_album"), "", None),
            PostFormat::Carousel
        );
    }

    #[test]
    fn facebook_and_x_formats_follow_media_counts() {
        assert_eq!(
            classify_format(Platform::FB, Some("Photo"), "", Some("a.jpg|b.jpg")),
            PostFormat::Carousel
        );
        assert_eq!(
            classify_format(Platform::FB, Some("photo"), "", Some("a.jpg")),
            PostFormat::Static
        );
        assert_eq!(classify_format(Platform::FB, Some("link"), "", None), PostFormat::Link);
        assert_eq!(
            classify_format(Platform::X, None, "", Some("clip.mp4")),
            PostFormat::Video
        );
        assert_eq!(
            classify_format(Platform::X, None, "", Some("a.jpg, b.jpg")),
            PostFormat::Carousel
        );
        assert_eq!(classify_format(Platform::X, None, "", None), PostFormat::Text);
    }

    #[test]
    fn compound_type_tags_match_on_substrings() {
        assert_eq!(classify_format(Platform::FB, Some("added_video"), "", None), PostFormat::Video);
        assert_eq!(
            classify_format(Platform::FB, Some("added_photos"), "", None),
            PostFormat::Static
        );
        assert_eq!(
            classify_format(Platform::IG, Some("FEED_VIDEO"), "https://instagram.com/p/a/", None),
            PostFormat::Reel
        );
        assert_eq!(
            classify_format(Platform::X, Some("photo_tweet"), "", None),
            PostFormat::Static
        );
        assert_eq!(classify_format(Platform::FB, Some("shared_links"), "", None), PostFormat::Link);
        assert_eq!(classify_format(Platform::FB, Some("reel"), "", None), PostFormat::Reel);
        assert_eq!(
            classify_format(Platform::FB, Some("status"), "", None),
            PostFormat::Other("Status".to_string())
        );
    }

    #[test]
    fn unmatched_tags_are_capitalized_and_unknown_stays_empty() {
        assert_eq!(
            classify_format(Platform::IG, Some("story"), "", None),
            PostFormat::Other("Story".to_string())
        );
        assert_eq!(
            classify_format(Platform::Unknown, Some("poll"), "", None),
            PostFormat::Other("Poll".to_string())
        );
        assert_eq!(classify_format(Platform::Unknown, None, "", None), PostFormat::Unclassified);
    }
}

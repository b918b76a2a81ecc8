//! Header resolution and numeric coercion for tool-specific CSV exports.
//!
//! Each canonical field lists candidate header names in priority order. The
//! candidates are resolved once against a file's header row and the resulting
//! index map is reused for every row of that file.

use std::collections::HashMap;

use csv::StringRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostField {
    Timestamp,
    Url,
    Id,
    Type,
    Text,
    Media,
    Impressions,
    Reach,
    Likes,
    Reactions,
    Comments,
    Replies,
    Shares,
    Retweets,
    Saves,
    Clicks,
    LinkClicks,
}

impl PostField {
    pub const ALL: [PostField; 17] = [
        PostField::Timestamp,
        PostField::Url,
        PostField::Id,
        PostField::Type,
        PostField::Text,
        PostField::Media,
        PostField::Impressions,
        PostField::Reach,
        PostField::Likes,
        PostField::Reactions,
        PostField::Comments,
        PostField::Replies,
        PostField::Shares,
        PostField::Retweets,
        PostField::Saves,
        PostField::Clicks,
        PostField::LinkClicks,
    ];

    /// Header names in priority order, in normalized form.
    pub fn candidates(&self) -> &'static [&'static str] {
        match self {
            PostField::Timestamp => &[
                "date",
                "datetime",
                "published at",
                "publish time",
                "post date",
                "created at",
                "created time",
                "timestamp",
                "time",
            ],
            PostField::Url => &["servicelink", "link", "permalink", "post url", "url"],
            PostField::Id => &["id", "post id"],
            PostField::Type => &["type", "post type", "media type", "format"],
            PostField::Text => &["text", "caption", "message", "content", "description"],
            PostField::Media => &["media", "media url", "media urls", "attachments"],
            PostField::Impressions => &["impressions", "impression count"],
            PostField::Reach => &["reach"],
            PostField::Likes => &["likes", "like count", "favorites"],
            PostField::Reactions => &["reactions", "total reactions"],
            PostField::Comments => &["comments", "comment count"],
            PostField::Replies => &["replies", "reply count"],
            PostField::Shares => &["shares", "share count"],
            PostField::Retweets => &["retweets", "reposts", "retweet count"],
            PostField::Saves => &["saves", "saved"],
            PostField::Clicks => &["clicks"],
            PostField::LinkClicks => &["link clicks"],
        }
    }
}

/// Lowercase, trim, drop a BOM and treat `_`/`-` as spaces.
pub fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Field -> column index map for one file.
#[derive(Debug, Clone, Default)]
pub struct ResolvedColumns {
    indices: HashMap<PostField, usize>,
}

impl ResolvedColumns {
    pub fn resolve(headers: &StringRecord) -> Self {
        let normalized: Vec<String> = headers.iter().map(normalize_header).collect();
        let mut indices = HashMap::new();
        for field in PostField::ALL {
            let hit = field
                .candidates()
                .iter()
                .find_map(|candidate| normalized.iter().position(|h| h == candidate));
            if let Some(index) = hit {
                indices.insert(field, index);
            }
        }
        Self { indices }
    }

    pub fn has(&self, field: PostField) -> bool {
        self.indices.contains_key(&field)
    }

    /// Trimmed cell for `field`; `None` when the column is absent.
    pub fn get<'r>(&self, row: &'r StringRecord, field: PostField) -> Option<&'r str> {
        let index = *self.indices.get(&field)?;
        Some(row.get(index).unwrap_or("").trim())
    }

    /// Like [`Self::get`] but empty cells count as absent.
    pub fn non_empty<'r>(&self, row: &'r StringRecord, field: PostField) -> Option<&'r str> {
        self.get(row, field).filter(|cell| !cell.is_empty())
    }

    pub fn first_non_empty<'r>(&self, row: &'r StringRecord, fields: &[PostField]) -> Option<&'r str> {
        fields.iter().find_map(|field| self.non_empty(row, *field))
    }

    pub fn count(&self, row: &StringRecord, field: PostField) -> u64 {
        count_or_default(self.get(row, field))
    }
}

/// Largest count kept; follower arithmetic happens in `i64`.
pub const MAX_COUNT: u64 = i64::MAX as u64;

/// Parse a count: integer first, then float truncated toward zero.
///
/// Thousands separators and surrounding whitespace are ignored; values clamp
/// to `0..=i64::MAX`. `None` when nothing numeric is present.
pub fn parse_count(raw: &str) -> Option<u64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    if let Ok(value) = cleaned.parse::<i64>() {
        return Some(value.max(0) as u64);
    }
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => Some((value.trunc().max(0.0) as u64).min(MAX_COUNT)),
        _ => None,
    }
}

/// The single parse-or-default rule for metric cells: failures become 0.
pub fn count_or_default(raw: Option<&str>) -> u64 {
    raw.and_then(parse_count).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(cells: &[&str]) -> StringRecord {
        StringRecord::from(cells.to_vec())
    }

    #[test]
    fn counts_follow_int_then_float_then_zero() {
        assert_eq!(parse_count("42"), Some(42));
        assert_eq!(parse_count(" 12.9 "), Some(12));
        assert_eq!(parse_count("1,234"), Some(1234));
        assert_eq!(parse_count("1e3"), Some(1000));
        assert_eq!(parse_count("-5"), Some(0));
        assert_eq!(parse_count("-2.5"), Some(0));
        assert_eq!(parse_count("1e20"), Some(MAX_COUNT));
        assert_eq!(parse_count("-1e20"), Some(0));
        assert_eq!(parse_count("n/a"), None);
        assert_eq!(parse_count("NaN"), None);
        assert_eq!(parse_count(""), None);
        assert_eq!(count_or_default(Some("abc")), 0);
        assert_eq!(count_or_default(None), 0);
    }

    #[test]
    fn headers_resolve_case_insensitively_in_priority_order() {
        let headers = record(&["\u{feff}Date", "Link", " ServiceLink ", "Text", "Link_Clicks", "Retweets"]);
        let columns = ResolvedColumns::resolve(&headers);
        let row = record(&["05/31/2025", "https://b", "https://a", "hi", "7", "3"]);

        assert_eq!(columns.get(&row, PostField::Timestamp), Some("05/31/2025"));
        assert_eq!(columns.get(&row, PostField::Url), Some("https://a"));
        assert_eq!(columns.get(&row, PostField::LinkClicks), Some("7"));
        assert!(!columns.has(PostField::Shares));
        assert_eq!(columns.get(&row, PostField::Shares), None);
        assert_eq!(
            columns.first_non_empty(&row, &[PostField::Shares, PostField::Retweets]),
            Some("3")
        );
    }

    #[test]
    fn short_rows_read_as_empty_cells() {
        let columns = ResolvedColumns::resolve(&record(&["date", "likes", "comments"]));
        let row = record(&["2025-06-01"]);
        assert_eq!(columns.get(&row, PostField::Likes), Some(""));
        assert_eq!(columns.non_empty(&row, PostField::Likes), None);
        assert_eq!(columns.count(&row, PostField::Comments), 0);
    }
}

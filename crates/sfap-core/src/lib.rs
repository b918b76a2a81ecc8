//! Core domain model for SFAP: canonical post records and follower snapshots.

use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "sfap-core";

/// Event label used when no keyword matches a source.
pub const UNKNOWN_EVENT: &str = "Unknown Event";

/// Column order of the unified post table handed to reporting.
pub const UNIFIED_COLUMNS: [&str; 16] = [
    "Event",
    "Platform",
    "Post Date (JST)",
    "Time of Day (hour)",
    "Day of Week",
    "Post URL",
    "Format",
    "Hashtags",
    "Content Theme",
    "Impressions",
    "Reach",
    "Engagements",
    "Engagement Rate",
    "Link Clicks",
    "Follows Gained (estimated)",
    "Notes / Source file",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    FB,
    IG,
    X,
    Unknown,
}

impl Platform {
    pub const ALL: [Platform; 4] = [Platform::FB, Platform::IG, Platform::X, Platform::Unknown];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::FB => "FB",
            Platform::IG => "IG",
            Platform::X => "X",
            Platform::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical content type of a post.
///
/// `Other` carries a capitalized raw type tag that matched no canonical
/// value; `Unclassified` renders as an empty cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PostFormat {
    Static,
    Carousel,
    Reel,
    Video,
    Link,
    Text,
    Other(String),
    Unclassified,
}

impl PostFormat {
    pub fn as_str(&self) -> &str {
        match self {
            PostFormat::Static => "Static",
            PostFormat::Carousel => "Carousel",
            PostFormat::Reel => "Reel",
            PostFormat::Video => "Video",
            PostFormat::Link => "Link",
            PostFormat::Text => "Text",
            PostFormat::Other(raw) => raw,
            PostFormat::Unclassified => "",
        }
    }
}

impl From<String> for PostFormat {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Static" => PostFormat::Static,
            "Carousel" => PostFormat::Carousel,
            "Reel" => PostFormat::Reel,
            "Video" => PostFormat::Video,
            "Link" => PostFormat::Link,
            "Text" => PostFormat::Text,
            "" => PostFormat::Unclassified,
            _ => PostFormat::Other(value),
        }
    }
}

impl From<PostFormat> for String {
    fn from(value: PostFormat) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for PostFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calendar slot of a post in the target zone.
///
/// Date, hour and weekday always come from the same local instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostTime {
    date: NaiveDate,
    hour: u32,
    weekday: Weekday,
}

impl PostTime {
    pub fn from_local(local: NaiveDateTime) -> Self {
        Self {
            date: local.date(),
            hour: local.hour(),
            weekday: local.weekday(),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn weekday(&self) -> Weekday {
        self.weekday
    }

    pub fn weekday_name(&self) -> &'static str {
        weekday_name(self.weekday)
    }
}

/// Weekdays in report order.
pub const WEEK_ORDER: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Canonical post-level record produced by normalization.
///
/// `impressions`, `reach` and `link_clicks` are `None` when the count is zero
/// or was never observed; `engagements` keeps an observed zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub event: String,
    pub platform: Platform,
    pub post_time: PostTime,
    pub post_url: String,
    pub format: PostFormat,
    pub hashtags: Vec<String>,
    pub content_theme: Option<String>,
    pub impressions: Option<u64>,
    pub reach: Option<u64>,
    pub engagements: u64,
    pub engagement_rate: Option<f64>,
    pub link_clicks: Option<u64>,
    pub follows_gained_estimated: u64,
    pub source_file: String,
}

impl PostRecord {
    /// Hashtags as stored in the unified table: space separated, source order.
    pub fn hashtags_joined(&self) -> String {
        self.hashtags.join(" ")
    }

    /// Recompute the engagement rate from the current counts.
    pub fn refresh_engagement_rate(&mut self) {
        self.engagement_rate = engagement_rate(self.engagements, self.impressions);
    }
}

/// Zero counts are indistinguishable from unobserved ones in the exports.
pub fn observed(count: u64) -> Option<u64> {
    (count != 0).then_some(count)
}

/// `engagements / impressions * 100` rounded to two decimals (ties to even),
/// absent when impressions are absent or zero.
pub fn engagement_rate(engagements: u64, impressions: Option<u64>) -> Option<f64> {
    let impressions = impressions.filter(|v| *v > 0)?;
    let rate = engagements as f64 * 100.0 / impressions as f64;
    Some((rate * 100.0).round_ties_even() / 100.0)
}

/// Total follower count observed for one platform-day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyFollowerSnapshot {
    pub platform: Platform,
    pub date: NaiveDate,
    pub total_followers: u64,
}

/// Metric row recovered from a table embedded in a PDF report. Only the
/// columns backfill can use are kept; engagements always come from row counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfMetricRow {
    pub post_url: Option<String>,
    pub impressions: Option<u64>,
    pub reach: Option<u64>,
    pub source_document: String,
}

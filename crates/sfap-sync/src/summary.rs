//! Aggregate and best-time tables over the attributed post set.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::Weekday;
use serde::Serialize;
use sfap_core::{weekday_name, Platform, PostRecord, WEEK_ORDER};

/// Running mean that ignores absent values.
#[derive(Debug, Clone, Copy, Default)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    fn push(&mut self, value: Option<f64>) {
        if let Some(value) = value {
            self.sum += value;
            self.count += 1;
        }
    }

    fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct GroupMetrics {
    posts: usize,
    impressions: Mean,
    reach: Mean,
    engagements: Mean,
    engagement_rate: Mean,
    link_clicks: Mean,
    follows: Mean,
    follows_total: u64,
}

impl GroupMetrics {
    fn push(&mut self, post: &PostRecord) {
        self.posts += 1;
        self.impressions.push(post.impressions.map(|v| v as f64));
        self.reach.push(post.reach.map(|v| v as f64));
        self.engagements.push(Some(post.engagements as f64));
        self.engagement_rate.push(post.engagement_rate);
        self.link_clicks.push(post.link_clicks.map(|v| v as f64));
        self.follows.push(Some(post.follows_gained_estimated as f64));
        self.follows_total = self.follows_total.saturating_add(post.follows_gained_estimated);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryDimension {
    Format,
    DayOfWeek,
    Theme,
}

impl SummaryDimension {
    pub const ALL: [SummaryDimension; 3] = [
        SummaryDimension::Format,
        SummaryDimension::DayOfWeek,
        SummaryDimension::Theme,
    ];

    pub fn header(&self) -> &'static str {
        match self {
            SummaryDimension::Format => "Format",
            SummaryDimension::DayOfWeek => "Day of Week",
            SummaryDimension::Theme => "Content Theme",
        }
    }

    /// Suffix used in report file names.
    pub fn slug(&self) -> &'static str {
        match self {
            SummaryDimension::Format => "format",
            SummaryDimension::DayOfWeek => "dayofweek",
            SummaryDimension::Theme => "theme",
        }
    }

    /// Posts without a theme are left out of the theme summary.
    fn key_for(&self, post: &PostRecord) -> Option<(usize, String)> {
        match self {
            SummaryDimension::Format => Some((0, post.format.to_string())),
            SummaryDimension::DayOfWeek => {
                let weekday = post.post_time.weekday();
                Some((week_position(weekday), weekday_name(weekday).to_string()))
            }
            SummaryDimension::Theme => post.content_theme.clone().map(|theme| (0, theme)),
        }
    }
}

fn week_position(weekday: Weekday) -> usize {
    weekday.num_days_from_monday() as usize
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub platform: Option<Platform>,
    pub key: String,
    pub posts: usize,
    pub avg_impressions: Option<f64>,
    pub avg_reach: Option<f64>,
    pub avg_engagements: Option<f64>,
    pub avg_engagement_rate: Option<f64>,
    pub avg_link_clicks: Option<f64>,
    pub avg_follows_gained: Option<f64>,
}

fn summary_row(platform: Option<Platform>, key: String, metrics: &GroupMetrics) -> SummaryRow {
    SummaryRow {
        platform,
        key,
        posts: metrics.posts,
        avg_impressions: metrics.impressions.value(),
        avg_reach: metrics.reach.value(),
        avg_engagements: metrics.engagements.value(),
        avg_engagement_rate: metrics.engagement_rate.value(),
        avg_link_clicks: metrics.link_clicks.value(),
        avg_follows_gained: metrics.follows.value(),
    }
}

/// Means per dimension value; with `per_platform` the platform leads the key.
pub fn summarize(posts: &[PostRecord], dimension: SummaryDimension, per_platform: bool) -> Vec<SummaryRow> {
    let mut groups: BTreeMap<(Option<Platform>, usize, String), GroupMetrics> = BTreeMap::new();
    for post in posts {
        let Some((position, key)) = dimension.key_for(post) else {
            continue;
        };
        let platform = per_platform.then_some(post.platform);
        groups.entry((platform, position, key)).or_default().push(post);
    }
    groups
        .into_iter()
        .map(|((platform, _, key), metrics)| summary_row(platform, key, &metrics))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestTimeRow {
    pub platform: Platform,
    pub weekday: Option<Weekday>,
    pub hour: u32,
    pub posts: usize,
    pub avg_impressions: Option<f64>,
    pub avg_engagement_rate: Option<f64>,
    pub avg_engagements: Option<f64>,
    pub follows_gained: u64,
}

fn best_time_rows(posts: &[PostRecord], with_weekday: bool) -> Vec<BestTimeRow> {
    let mut groups: BTreeMap<(Platform, Option<usize>, u32), (Option<Weekday>, GroupMetrics)> = BTreeMap::new();
    for post in posts {
        let weekday = with_weekday.then(|| post.post_time.weekday());
        let slot = (post.platform, weekday.map(week_position), post.post_time.hour());
        groups.entry(slot).or_insert((weekday, GroupMetrics::default())).1.push(post);
    }

    let mut rows: Vec<BestTimeRow> = groups
        .into_iter()
        .map(|((platform, _, hour), (weekday, metrics))| BestTimeRow {
            platform,
            weekday,
            hour,
            posts: metrics.posts,
            avg_impressions: metrics.impressions.value(),
            avg_engagement_rate: metrics.engagement_rate.value(),
            avg_engagements: metrics.engagements.value(),
            follows_gained: metrics.follows_total,
        })
        .collect();
    // stable sort keeps the (weekday, hour) order among equal rates
    rows.sort_by(|a, b| {
        a.platform
            .cmp(&b.platform)
            .then_with(|| descending_rate(a.avg_engagement_rate, b.avg_engagement_rate))
    });
    rows
}

fn descending_rate(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Per (platform, hour), best engagement rate first.
pub fn best_hours(posts: &[PostRecord]) -> Vec<BestTimeRow> {
    best_time_rows(posts, false)
}

/// Per (platform, weekday, hour), best engagement rate first.
pub fn best_day_hours(posts: &[PostRecord]) -> Vec<BestTimeRow> {
    best_time_rows(posts, true)
}

/// Average engagement rate per weekday (Monday first) and hour.
#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
    pub platform: Platform,
    pub cells: [[Option<f64>; 24]; 7],
}

pub fn heatmaps(posts: &[PostRecord]) -> Vec<Heatmap> {
    let mut grids: BTreeMap<Platform, [[Mean; 24]; 7]> = BTreeMap::new();
    for post in posts {
        let grid = grids.entry(post.platform).or_insert([[Mean::default(); 24]; 7]);
        let row = week_position(post.post_time.weekday());
        let hour = post.post_time.hour() as usize;
        if hour < 24 {
            grid[row][hour].push(post.engagement_rate);
        }
    }
    grids
        .into_iter()
        .map(|(platform, grid)| Heatmap {
            platform,
            cells: grid.map(|row| row.map(|mean| mean.value())),
        })
        .collect()
}

/// Weekday labels in heatmap row order.
pub fn heatmap_row_labels() -> [&'static str; 7] {
    WEEK_ORDER.map(weekday_name)
}

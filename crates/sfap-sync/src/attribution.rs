//! Follower attribution: daily follower deltas spread over that day's posts.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use sfap_core::{DailyFollowerSnapshot, Platform, PostRecord};
use tracing::debug;

/// A drop larger than this share of the previous total is treated as a glitch.
pub const ANOMALY_DROP_RATIO: f64 = 0.9;

/// Per-platform follower totals keyed by calendar date.
#[derive(Debug, Clone, Default)]
pub struct FollowerSeries {
    totals: BTreeMap<Platform, BTreeMap<NaiveDate, u64>>,
}

impl FollowerSeries {
    /// Later readings for the same platform-day overwrite earlier ones.
    pub fn from_snapshots<'a>(snapshots: impl IntoIterator<Item = &'a DailyFollowerSnapshot>) -> Self {
        let mut totals: BTreeMap<Platform, BTreeMap<NaiveDate, u64>> = BTreeMap::new();
        for snapshot in snapshots {
            totals
                .entry(snapshot.platform)
                .or_default()
                .insert(snapshot.date, snapshot.total_followers);
        }
        Self { totals }
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    /// Clamped deltas between consecutive observations, keyed by the later day.
    pub fn daily_deltas(&self) -> BTreeMap<(Platform, NaiveDate), i64> {
        let mut deltas = BTreeMap::new();
        for (platform, series) in &self.totals {
            let mut previous: Option<u64> = None;
            for (date, total) in series {
                if let Some(prev) = previous {
                    let delta = *total as i64 - prev as i64;
                    deltas.insert((*platform, *date), clamp_delta(prev, delta));
                }
                previous = Some(*total);
            }
        }
        deltas
    }
}

/// Zero out implausible drops; everything else passes through.
pub fn clamp_delta(previous_total: u64, delta: i64) -> i64 {
    if delta < 0 && (delta.unsigned_abs() as f64) > ANOMALY_DROP_RATIO * previous_total as f64 {
        0
    } else {
        delta
    }
}

/// Split `delta` over `engagements`, each share rounded to nearest, ties to even.
pub fn allocate(delta: i64, engagements: &[u64]) -> Vec<u64> {
    let total = engagements.iter().fold(0u64, |sum, e| sum.saturating_add(*e));
    if delta <= 0 || total == 0 {
        return vec![0; engagements.len()];
    }
    engagements
        .iter()
        .map(|e| (delta as f64 * *e as f64 / total as f64).round_ties_even() as u64)
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttributionStats {
    pub platform_days: usize,
    pub platform_days_with_gain: usize,
    pub posts_credited: usize,
    pub follows_attributed: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FollowerAttributionEngine;

impl FollowerAttributionEngine {
    /// Resets every post's estimate, then credits positive platform-day deltas.
    ///
    /// Must run on the deduplicated set.
    pub fn attribute(&self, posts: &mut [PostRecord], snapshots: &[DailyFollowerSnapshot]) -> AttributionStats {
        for post in posts.iter_mut() {
            post.follows_gained_estimated = 0;
        }

        let deltas = FollowerSeries::from_snapshots(snapshots).daily_deltas();
        let mut stats = AttributionStats {
            platform_days: deltas.len(),
            ..AttributionStats::default()
        };

        let mut by_day: BTreeMap<(Platform, NaiveDate), Vec<usize>> = BTreeMap::new();
        for (index, post) in posts.iter().enumerate() {
            by_day
                .entry((post.platform, post.post_time.date()))
                .or_default()
                .push(index);
        }

        for (key, delta) in deltas {
            if delta <= 0 {
                continue;
            }
            stats.platform_days_with_gain += 1;
            let Some(indices) = by_day.get(&key) else {
                debug!(platform = %key.0, date = %key.1, delta, "follower gain on a day without posts");
                continue;
            };
            let engagements: Vec<u64> = indices.iter().map(|i| posts[*i].engagements).collect();
            for (index, share) in indices.iter().zip(allocate(delta, &engagements)) {
                posts[*index].follows_gained_estimated = share;
                if share > 0 {
                    stats.posts_credited += 1;
                    stats.follows_attributed = stats.follows_attributed.saturating_add(share);
                }
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sfap_core::{PostFormat, PostTime};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn snapshot(platform: Platform, d: u32, total: u64) -> DailyFollowerSnapshot {
        DailyFollowerSnapshot {
            platform,
            date: day(d),
            total_followers: total,
        }
    }

    fn post(platform: Platform, d: u32, engagements: u64) -> PostRecord {
        PostRecord {
            event: "Rizin Landmark".to_string(),
            platform,
            post_time: PostTime::from_local(day(d).and_hms_opt(12, 0, 0).unwrap()),
            post_url: format!("https://example.com/{d}/{engagements}"),
            format: PostFormat::Static,
            hashtags: Vec::new(),
            content_theme: None,
            impressions: None,
            reach: None,
            engagements,
            engagement_rate: None,
            link_clicks: None,
            follows_gained_estimated: 99,
            source_file: "posts.csv".to_string(),
        }
    }

    #[test]
    fn equal_shares_split_evenly() {
        assert_eq!(allocate(100, &[10, 10]), vec![50, 50]);
    }

    #[test]
    fn thirds_round_independently() {
        let shares = allocate(100, &[1, 2]);
        assert_eq!(shares, vec![33, 67]);
        let sum: u64 = shares.iter().sum();
        assert!(sum.abs_diff(100) <= 1);
    }

    #[test]
    fn half_shares_round_to_even() {
        assert_eq!(allocate(5, &[1, 1]), vec![2, 2]);
        assert_eq!(allocate(7, &[1, 1]), vec![4, 4]);
        assert_eq!(allocate(3, &[1, 5]), vec![0, 2]);
    }

    #[test]
    fn saturated_engagements_do_not_overflow() {
        let shares = allocate(10, &[u64::MAX, u64::MAX]);
        assert_eq!(shares.len(), 2);
        assert!(shares.iter().all(|s| *s <= 10));
    }

    #[test]
    fn no_engagement_or_no_gain_allocates_nothing() {
        assert_eq!(allocate(50, &[0, 0]), vec![0, 0]);
        assert_eq!(allocate(0, &[3, 4]), vec![0, 0]);
        assert_eq!(allocate(-7, &[3, 4]), vec![0, 0]);
    }

    #[test]
    fn implausible_drop_is_clamped() {
        assert_eq!(clamp_delta(1000, -950), 0);
        assert_eq!(clamp_delta(1000, -900), -900);
        assert_eq!(clamp_delta(1000, 25), 25);
    }

    #[test]
    fn first_observation_has_no_delta_and_later_readings_overwrite() {
        let series = FollowerSeries::from_snapshots(&[
            snapshot(Platform::IG, 1, 1000),
            snapshot(Platform::IG, 3, 1010),
            snapshot(Platform::IG, 3, 1030),
            snapshot(Platform::FB, 2, 500),
        ]);
        let deltas = series.daily_deltas();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas.get(&(Platform::IG, day(3))), Some(&30));
    }

    #[test]
    fn engine_credits_only_matching_platform_days() {
        let mut posts = vec![
            post(Platform::IG, 2, 10),
            post(Platform::IG, 2, 30),
            post(Platform::FB, 2, 50),
            post(Platform::IG, 3, 5),
        ];
        let snapshots = [
            snapshot(Platform::IG, 1, 1000),
            snapshot(Platform::IG, 2, 1040),
            snapshot(Platform::IG, 3, 60),
        ];
        let stats = FollowerAttributionEngine.attribute(&mut posts, &snapshots);

        let follows: Vec<u64> = posts.iter().map(|p| p.follows_gained_estimated).collect();
        assert_eq!(follows, vec![10, 30, 0, 0]);
        assert_eq!(stats.platform_days, 2);
        assert_eq!(stats.platform_days_with_gain, 1);
        assert_eq!(stats.posts_credited, 2);
        assert_eq!(stats.follows_attributed, 40);
    }
}

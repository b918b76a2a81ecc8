//! Rendering of run outputs: CSV tables, the Parquet snapshot and the brief.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use arrow_array::{Float64Array, RecordBatch, StringArray, UInt32Array, UInt64Array};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use sfap_core::{weekday_name, PostRecord, UNIFIED_COLUMNS};

use crate::summary::{heatmap_row_labels, BestTimeRow, Heatmap, SummaryDimension, SummaryRow};
use crate::SyncRunSummary;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportManifest {
    pub schema_version: u32,
    pub files: Vec<ReportManifestFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

fn csv_bytes(header: &[&str], rows: impl IntoIterator<Item = Vec<String>>) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header).context("writing csv header")?;
    for row in rows {
        writer.write_record(&row).context("writing csv row")?;
    }
    writer
        .into_inner()
        .map_err(|err| anyhow!("flushing csv buffer: {}", err.error()))
}

fn count_cell(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn float_cell(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.2}")).unwrap_or_default()
}

/// The unified post table, columns in [`UNIFIED_COLUMNS`] order.
pub fn unified_csv(posts: &[PostRecord]) -> Result<Vec<u8>> {
    csv_bytes(
        &UNIFIED_COLUMNS,
        posts.iter().map(|post| {
            vec![
                post.event.clone(),
                post.platform.to_string(),
                post.post_time.date().to_string(),
                post.post_time.hour().to_string(),
                post.post_time.weekday_name().to_string(),
                post.post_url.clone(),
                post.format.to_string(),
                post.hashtags_joined(),
                post.content_theme.clone().unwrap_or_default(),
                count_cell(post.impressions),
                count_cell(post.reach),
                post.engagements.to_string(),
                float_cell(post.engagement_rate),
                count_cell(post.link_clicks),
                post.follows_gained_estimated.to_string(),
                post.source_file.clone(),
            ]
        }),
    )
}

const SUMMARY_METRICS: [&str; 7] = [
    "Posts Count",
    "Avg Impressions",
    "Avg Reach",
    "Avg Engagements",
    "Avg Engagement Rate",
    "Avg Link Clicks",
    "Avg Follows Gained",
];

pub fn summary_csv(rows: &[SummaryRow], dimension: SummaryDimension, per_platform: bool) -> Result<Vec<u8>> {
    let mut header = Vec::new();
    if per_platform {
        header.push("Platform");
    }
    header.push(dimension.header());
    header.extend(SUMMARY_METRICS);

    csv_bytes(
        &header,
        rows.iter().map(|row| {
            let mut cells = Vec::with_capacity(header.len());
            if per_platform {
                cells.push(row.platform.map(|p| p.to_string()).unwrap_or_default());
            }
            cells.extend([
                row.key.clone(),
                row.posts.to_string(),
                float_cell(row.avg_impressions),
                float_cell(row.avg_reach),
                float_cell(row.avg_engagements),
                float_cell(row.avg_engagement_rate),
                float_cell(row.avg_link_clicks),
                float_cell(row.avg_follows_gained),
            ]);
            cells
        }),
    )
}

pub fn best_times_csv(rows: &[BestTimeRow], with_weekday: bool) -> Result<Vec<u8>> {
    let mut header = vec!["Platform"];
    if with_weekday {
        header.push("Day of Week");
    }
    header.extend([
        "Time of Day (hour)",
        "Posts",
        "Avg Impressions",
        "Avg Engagement Rate",
        "Avg Engagements",
        "Follows Gained (estimated)",
    ]);

    csv_bytes(
        &header,
        rows.iter().map(|row| {
            let mut cells = vec![row.platform.to_string()];
            if with_weekday {
                cells.push(row.weekday.map(weekday_name).unwrap_or_default().to_string());
            }
            cells.extend([
                row.hour.to_string(),
                row.posts.to_string(),
                float_cell(row.avg_impressions),
                float_cell(row.avg_engagement_rate),
                float_cell(row.avg_engagements),
                row.follows_gained.to_string(),
            ]);
            cells
        }),
    )
}

/// Weekday rows by hour columns 0..23; cells without posts stay empty.
pub fn heatmap_csv(map: &Heatmap) -> Result<Vec<u8>> {
    let hours: Vec<String> = (0..24).map(|h| h.to_string()).collect();
    let mut header = vec!["Day of Week"];
    header.extend(hours.iter().map(String::as_str));

    csv_bytes(
        &header,
        heatmap_row_labels()
            .iter()
            .zip(map.cells.iter())
            .map(|(label, cells)| {
                std::iter::once(label.to_string())
                    .chain(cells.iter().map(|cell| float_cell(*cell)))
                    .collect()
            }),
    )
}

pub fn unified_parquet(posts: &[PostRecord]) -> Result<Vec<u8>> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("event", DataType::Utf8, false),
        ArrowField::new("platform", DataType::Utf8, false),
        ArrowField::new("post_date_jst", DataType::Utf8, false),
        ArrowField::new("post_hour_jst", DataType::UInt32, false),
        ArrowField::new("day_of_week_jst", DataType::Utf8, false),
        ArrowField::new("post_url", DataType::Utf8, false),
        ArrowField::new("format", DataType::Utf8, false),
        ArrowField::new("hashtags", DataType::Utf8, false),
        ArrowField::new("content_theme", DataType::Utf8, true),
        ArrowField::new("impressions", DataType::UInt64, true),
        ArrowField::new("reach", DataType::UInt64, true),
        ArrowField::new("engagements", DataType::UInt64, false),
        ArrowField::new("engagement_rate", DataType::Float64, true),
        ArrowField::new("link_clicks", DataType::UInt64, true),
        ArrowField::new("follows_gained_estimated", DataType::UInt64, false),
        ArrowField::new("source_file", DataType::Utf8, false),
    ]));

    let strings = |f: &dyn Fn(&PostRecord) -> String| StringArray::from(posts.iter().map(f).collect::<Vec<_>>());
    let counts = |f: &dyn Fn(&PostRecord) -> Option<u64>| UInt64Array::from(posts.iter().map(f).collect::<Vec<_>>());

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(strings(&|p| p.event.clone())),
            Arc::new(strings(&|p| p.platform.to_string())),
            Arc::new(strings(&|p| p.post_time.date().to_string())),
            Arc::new(UInt32Array::from(
                posts.iter().map(|p| p.post_time.hour()).collect::<Vec<_>>(),
            )),
            Arc::new(strings(&|p| p.post_time.weekday_name().to_string())),
            Arc::new(strings(&|p| p.post_url.clone())),
            Arc::new(strings(&|p| p.format.to_string())),
            Arc::new(strings(&|p| p.hashtags_joined())),
            Arc::new(StringArray::from(
                posts
                    .iter()
                    .map(|p| p.content_theme.as_deref())
                    .collect::<Vec<_>>(),
            )),
            Arc::new(counts(&|p| p.impressions)),
            Arc::new(counts(&|p| p.reach)),
            Arc::new(counts(&|p| Some(p.engagements))),
            Arc::new(Float64Array::from(
                posts.iter().map(|p| p.engagement_rate).collect::<Vec<_>>(),
            )),
            Arc::new(counts(&|p| p.link_clicks)),
            Arc::new(counts(&|p| Some(p.follows_gained_estimated))),
            Arc::new(strings(&|p| p.source_file.clone())),
        ],
    )
    .context("building unified posts record batch")?;

    let mut buffer = Vec::new();
    let mut writer =
        ArrowWriter::try_new(&mut buffer, schema, None).context("opening parquet writer")?;
    writer.write(&batch).context("writing unified posts record batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(buffer)
}

pub fn ingest_brief_markdown(summary: &SyncRunSummary) -> String {
    let skipped = if summary.skipped_files.is_empty() {
        "- none".to_string()
    } else {
        summary
            .skipped_files
            .iter()
            .map(|s| format!("- `{}`: {}", s.file, s.reason))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "# SFAP Ingest Brief\n\n- Run ID: `{}`\n- Started: {}\n- Finished: {}\n- Post exports: {}\n- Insights exports: {}\n- PDF reports: {}\n- Rows skipped: {}\n- Posts normalized: {}\n- Duplicates dropped: {}\n- Posts in unified table: {}\n- Follows attributed: {}\n\n## Skipped Files\n{}\n",
        summary.run_id,
        summary.started_at,
        summary.finished_at,
        summary.sources.posts_csv,
        summary.sources.insights_csv,
        summary.sources.pdf_reports,
        summary.skipped_rows,
        summary.raw_posts,
        summary.duplicates_dropped,
        summary.unified_posts,
        summary.attribution.follows_attributed,
        skipped
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sfap_core::{Platform, PostFormat, PostTime};

    fn post() -> PostRecord {
        PostRecord {
            event: "Rizin 4".to_string(),
            platform: Platform::X,
            post_time: PostTime::from_local(
                NaiveDate::from_ymd_opt(2025, 6, 2)
                    .unwrap()
                    .and_hms_opt(19, 30, 0)
                    .unwrap(),
            ),
            post_url: "https://x.com/rizin/status/1".to_string(),
            format: PostFormat::Text,
            hashtags: vec!["#rizin".to_string(), "#FightOrder".to_string()],
            content_theme: Some("FightOrder".to_string()),
            impressions: Some(400),
            reach: None,
            engagements: 30,
            engagement_rate: Some(7.5),
            link_clicks: None,
            follows_gained_estimated: 3,
            source_file: "x_posts.csv".to_string(),
        }
    }

    #[test]
    fn unified_csv_keeps_column_order_and_empty_absent_cells() {
        let text = String::from_utf8(unified_csv(&[post()]).unwrap()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), UNIFIED_COLUMNS.join(","));
        assert_eq!(
            lines.next().unwrap(),
            "Rizin 4,X,2025-06-02,19,Monday,https://x.com/rizin/status/1,Text,#rizin #FightOrder,FightOrder,400,,30,7.50,,3,x_posts.csv"
        );
    }

    #[test]
    fn heatmap_has_a_row_per_weekday() {
        let mut cells = [[None; 24]; 7];
        cells[0][19] = Some(7.5);
        let text = String::from_utf8(
            heatmap_csv(&Heatmap {
                platform: Platform::X,
                cells,
            })
            .unwrap(),
        )
        .unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 8);
        assert!(lines[1].starts_with("Monday,"));
        assert!(lines[1].ends_with(",7.50,,,,"));
        assert!(lines[7].starts_with("Sunday,"));
    }

    #[test]
    fn parquet_snapshot_is_written() {
        let bytes = unified_parquet(&[post(), post()]).unwrap();
        assert!(bytes.starts_with(b"PAR1"));
        assert!(bytes.ends_with(b"PAR1"));
    }
}

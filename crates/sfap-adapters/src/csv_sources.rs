//! Post export and follower insights CSV adapters.

use async_trait::async_trait;
use csv::{ReaderBuilder, StringRecord};
use sfap_core::DailyFollowerSnapshot;
use sfap_storage::{SourceBytes, SourceKind};
use tracing::{debug, warn};

use crate::classify::{ContentSample, SourceClassifier};
use crate::columns::{parse_count, PostField, ResolvedColumns};
use crate::normalize::{RowContext, RowNormalizer};
use crate::timestamp::{parse_calendar_date, TimestampNormalizer};
use crate::{AdapterContext, AdapterError, ParsedSource, SourceAdapter};

/// Headers and rows of one CSV file. Any malformed record fails the file.
pub(crate) fn read_table(source: &SourceBytes) -> Result<(StringRecord, Vec<StringRecord>), AdapterError> {
    let csv_error = |err: csv::Error| AdapterError::Csv {
        file: source.file.file_name.clone(),
        source: err,
    };
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(source.bytes.as_slice());
    let headers = reader.headers().map_err(csv_error)?.clone();
    let rows = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(csv_error)?;
    Ok((headers, rows))
}

pub struct PostsCsvAdapter {
    classifier: SourceClassifier,
    normalizer: RowNormalizer,
    timestamps: TimestampNormalizer,
}

impl PostsCsvAdapter {
    pub fn new(ctx: &AdapterContext) -> Self {
        Self {
            classifier: SourceClassifier::new(ctx.tables.clone()),
            normalizer: RowNormalizer::new(ctx.tables.clone()),
            timestamps: ctx.timestamps,
        }
    }
}

#[async_trait]
impl SourceAdapter for PostsCsvAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::PostsCsv
    }

    fn parse(&self, source: &SourceBytes) -> Result<ParsedSource, AdapterError> {
        let file = &source.file;
        let (headers, rows) = read_table(source)?;
        let columns = ResolvedColumns::resolve(&headers);
        if !columns.has(PostField::Timestamp) {
            return Err(AdapterError::MissingColumn {
                file: file.file_name.clone(),
                column: "timestamp",
            });
        }

        let link_cells: Vec<&str> = rows
            .iter()
            .filter_map(|row| columns.get(row, PostField::Url))
            .collect();
        let text_cells: Vec<&str> = rows
            .iter()
            .filter_map(|row| columns.get(row, PostField::Text))
            .collect();
        let classification = self.classifier.classify(
            &file.file_name,
            &file.folder,
            ContentSample {
                link_cells: &link_cells,
                text_cells: &text_cells,
            },
        );
        debug!(
            file = %file.file_name,
            platform = %classification.platform,
            event = %classification.event,
            "classified post export"
        );

        let ctx = RowContext {
            platform: classification.platform,
            event: &classification.event,
            source_file: &file.file_name,
        };
        let mut records = Vec::with_capacity(rows.len());
        let mut skipped_rows = 0;
        for (index, row) in rows.iter().enumerate() {
            let raw = columns.get(row, PostField::Timestamp).unwrap_or("");
            let Some(post_time) = self.timestamps.normalize_cell(raw) else {
                warn!(
                    file = %file.file_name,
                    row = index + 2,
                    value = raw,
                    "skipping row with unparseable timestamp"
                );
                skipped_rows += 1;
                continue;
            };
            records.push(self.normalizer.normalize(&columns, row, ctx, post_time));
        }

        Ok(ParsedSource::Posts {
            records,
            skipped_rows,
        })
    }
}

pub struct InsightsCsvAdapter {
    classifier: SourceClassifier,
}

impl InsightsCsvAdapter {
    pub fn new(ctx: &AdapterContext) -> Self {
        Self {
            classifier: SourceClassifier::new(ctx.tables.clone()),
        }
    }
}

fn is_follower_header(header: &str) -> bool {
    let lower = header.to_lowercase();
    (lower.contains("total") && lower.contains("fan")) || lower.contains("followers")
}

#[async_trait]
impl SourceAdapter for InsightsCsvAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::InsightsCsv
    }

    fn parse(&self, source: &SourceBytes) -> Result<ParsedSource, AdapterError> {
        let file = &source.file;
        let (headers, rows) = read_table(source)?;
        let date_col = headers.iter().position(|h| h.to_lowercase().contains("date"));
        let followers_col = headers.iter().position(is_follower_header);
        let (Some(date_col), Some(followers_col)) = (date_col, followers_col) else {
            debug!(file = %file.file_name, "insights export has no date/follower columns");
            return Ok(ParsedSource::Followers(Vec::new()));
        };

        let platform = self
            .classifier
            .classify(&file.file_name, &file.folder, ContentSample::default())
            .platform;

        let mut snapshots = Vec::new();
        for row in &rows {
            let date = row.get(date_col).and_then(parse_calendar_date);
            let total = row.get(followers_col).and_then(parse_count);
            match (date, total) {
                (Some(date), Some(total_followers)) => snapshots.push(DailyFollowerSnapshot {
                    platform,
                    date,
                    total_followers,
                }),
                _ => debug!(file = %file.file_name, "skipping insights row without date or total"),
            }
        }
        Ok(ParsedSource::Followers(snapshots))
    }
}

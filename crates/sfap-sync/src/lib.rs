//! Ingest pipeline orchestration: discovery, normalization, merge, dedup,
//! attribution and per-run reports.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use sfap_adapters::timestamp::{parse_utc_offset, utc_offset};
use sfap_adapters::{adapter_for_kind, AdapterContext, ParsedSource, TimestampNormalizer};
use sfap_core::{DailyFollowerSnapshot, PdfMetricRow, Platform, PostRecord};
use sfap_storage::{ReportStore, SourceKind, SourceStore};
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub mod attribution;
pub mod backfill;
pub mod dedup;
pub mod reports;
pub mod summary;

pub use attribution::{AttributionStats, FollowerAttributionEngine};
pub use backfill::PdfBackfill;
pub use dedup::{DedupOutcome, DedupReviewItem, PostDeduplicator, DEFAULT_HASHTAG_PREFIX};
use reports::{ReportManifest, ReportManifestFile};
use summary::SummaryDimension;

pub const CRATE_NAME: &str = "sfap-sync";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub input_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub source_utc_offset: FixedOffset,
    pub rules_dir: PathBuf,
    pub hashtag_key_prefix: usize,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let input_dir = std::env::var("SFAP_INPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        let source_utc_offset = match std::env::var("SFAP_SOURCE_UTC_OFFSET") {
            Ok(raw) => parse_utc_offset(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "invalid SFAP_SOURCE_UTC_OFFSET, assuming UTC");
                utc_offset()
            }),
            Err(_) => utc_offset(),
        };
        Self {
            reports_dir: std::env::var("SFAP_REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./reports")),
            rules_dir: std::env::var("SFAP_RULES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| input_dir.join("rules")),
            hashtag_key_prefix: std::env::var("SFAP_HASHTAG_KEY_PREFIX")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_HASHTAG_PREFIX),
            source_utc_offset,
            input_dir,
        }
    }

    /// Defaults rooted at `input_dir`: reports and rules live beneath it.
    pub fn for_input_dir(input_dir: impl Into<PathBuf>) -> Self {
        let input_dir = input_dir.into();
        Self {
            reports_dir: input_dir.join("reports"),
            rules_dir: input_dir.join("rules"),
            source_utc_offset: utc_offset(),
            hashtag_key_prefix: DEFAULT_HASHTAG_PREFIX,
            input_dir,
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no readable post export found under {input_dir}")]
    NoPostSources { input_dir: String },
}

pub trait EnrichmentHook: Send + Sync {
    fn apply(&self, items: Vec<PostRecord>, pdf_rows: &[PdfMetricRow]) -> Result<Vec<PostRecord>>;
}

pub trait DedupHook: Send + Sync {
    fn apply(&self, items: Vec<PostRecord>) -> Result<DedupOutcome>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCounts {
    pub posts_csv: usize,
    pub insights_csv: usize,
    pub pdf_reports: usize,
}

impl SourceCounts {
    fn record(&mut self, kind: SourceKind) {
        match kind {
            SourceKind::PostsCsv => self.posts_csv += 1,
            SourceKind::InsightsCsv => self.insights_csv += 1,
            SourceKind::PdfReport => self.pdf_reports += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub file: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: SourceCounts,
    pub skipped_files: Vec<SkippedFile>,
    pub skipped_rows: usize,
    pub raw_posts: usize,
    pub pdf_rows: usize,
    pub follower_snapshots: usize,
    pub backfilled_posts: usize,
    pub duplicates_dropped: usize,
    pub dedup_review_items: usize,
    pub unified_posts: usize,
    pub attribution: AttributionStats,
    pub reports_dir: String,
    pub manifest: String,
}

/// Everything read from the input tree, in discovery order.
#[derive(Debug, Default)]
struct CollectedSources {
    counts: SourceCounts,
    posts: Vec<PostRecord>,
    snapshots: Vec<DailyFollowerSnapshot>,
    pdf_rows: Vec<PdfMetricRow>,
    skipped_files: Vec<SkippedFile>,
    skipped_rows: usize,
    post_files_read: usize,
}

pub struct SyncPipeline {
    config: SyncConfig,
    adapters: AdapterContext,
    enrichment: Box<dyn EnrichmentHook>,
    dedup: Box<dyn DedupHook>,
    attribution: FollowerAttributionEngine,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig) -> Result<Self> {
        let adapters = AdapterContext::from_rules_dir(
            &config.rules_dir,
            TimestampNormalizer::new(config.source_utc_offset),
        )
        .with_context(|| format!("loading keyword rules from {}", config.rules_dir.display()))?;
        let dedup = PostDeduplicator::new(config.hashtag_key_prefix);
        Ok(Self {
            config,
            adapters,
            enrichment: Box::new(PdfBackfill),
            dedup: Box::new(dedup),
            attribution: FollowerAttributionEngine,
        })
    }

    pub fn with_hooks(mut self, dedup: Box<dyn DedupHook>, enrichment: Box<dyn EnrichmentHook>) -> Self {
        self.dedup = dedup;
        self.enrichment = enrichment;
        self
    }

    pub async fn run_once(&self) -> Result<SyncRunSummary> {
        let run_id = Uuid::new_v4();
        self.run(run_id)
            .instrument(info_span!("ingest_run", %run_id))
            .await
    }

    async fn run(&self, run_id: Uuid) -> Result<SyncRunSummary> {
        let started_at = Utc::now();
        info!(input = %self.config.input_dir.display(), "starting ingest run");

        let collected = self.collect_sources().await?;
        let raw_posts = collected.posts.len();

        let mut posts = collected.posts;
        let before_backfill: Vec<(Option<u64>, Option<u64>)> =
            posts.iter().map(|p| (p.impressions, p.reach)).collect();
        posts = self.enrichment.apply(posts, &collected.pdf_rows)?;
        let backfilled_posts = posts
            .iter()
            .zip(&before_backfill)
            .filter(|(p, before)| (p.impressions, p.reach) != **before)
            .count();

        let outcome = self.dedup.apply(posts)?;
        let mut posts = outcome.records;
        let stats = self.attribution.attribute(&mut posts, &collected.snapshots);
        info!(
            raw = raw_posts,
            unified = posts.len(),
            dropped = outcome.dropped,
            follows = stats.follows_attributed,
            "posts merged and attributed"
        );

        let run_dir = self.config.reports_dir.join(run_id.to_string());
        let mut summary = SyncRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            sources: collected.counts,
            skipped_files: collected.skipped_files,
            skipped_rows: collected.skipped_rows,
            raw_posts,
            pdf_rows: collected.pdf_rows.len(),
            follower_snapshots: collected.snapshots.len(),
            backfilled_posts,
            duplicates_dropped: outcome.dropped,
            dedup_review_items: outcome.review.len(),
            unified_posts: posts.len(),
            attribution: stats,
            reports_dir: run_dir.display().to_string(),
            manifest: run_dir.join("snapshots").join("manifest.json").display().to_string(),
        };
        self.write_reports(&run_dir, &posts, &outcome.review, &mut summary)
            .await?;
        info!(reports = %summary.reports_dir, "ingest run complete");
        Ok(summary)
    }

    async fn collect_sources(&self) -> Result<CollectedSources> {
        let store = SourceStore::new(&self.config.input_dir).exclude(&self.config.reports_dir);
        let files = store.discover().await?;
        let no_posts = || IngestError::NoPostSources {
            input_dir: self.config.input_dir.display().to_string(),
        };

        let mut collected = CollectedSources::default();
        for file in &files {
            collected.counts.record(file.kind);
        }
        if collected.counts.posts_csv == 0 {
            return Err(no_posts().into());
        }

        for file in &files {
            let adapter = adapter_for_kind(file.kind, &self.adapters);
            let parsed = match adapter.fetch(&store, file).await {
                Ok(bytes) => adapter.parse(&bytes),
                Err(err) => Err(err),
            };
            match parsed {
                Ok(ParsedSource::Posts {
                    records,
                    skipped_rows,
                }) => {
                    info!(file = %file.file_name, posts = records.len(), skipped_rows, "read post export");
                    collected.post_files_read += 1;
                    collected.skipped_rows += skipped_rows;
                    collected.posts.extend(records);
                }
                Ok(ParsedSource::Followers(snapshots)) => {
                    info!(file = %file.file_name, days = snapshots.len(), "read follower insights");
                    collected.snapshots.extend(snapshots);
                }
                Ok(ParsedSource::PdfRows(rows)) => {
                    info!(file = %file.file_name, rows = rows.len(), "read pdf report");
                    collected.pdf_rows.extend(rows);
                }
                Err(err) => {
                    warn!(file = %file.path.display(), error = %err, "skipping unreadable source");
                    collected.skipped_files.push(SkippedFile {
                        file: file.path.display().to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        if collected.post_files_read == 0 {
            return Err(no_posts().into());
        }
        Ok(collected)
    }

    async fn write_reports(
        &self,
        run_dir: &Path,
        posts: &[PostRecord],
        review: &[DedupReviewItem],
        summary: &mut SyncRunSummary,
    ) -> Result<()> {
        let mut outputs: Vec<(String, Vec<u8>)> = vec![("unified_post_data.csv".to_string(), reports::unified_csv(posts)?)];

        let platforms: Vec<Platform> = Platform::ALL
            .into_iter()
            .filter(|platform| posts.iter().any(|p| p.platform == *platform))
            .collect();
        for platform in &platforms {
            let subset: Vec<PostRecord> = posts.iter().filter(|p| p.platform == *platform).cloned().collect();
            outputs.push((format!("unified_post_data_{platform}.csv"), reports::unified_csv(&subset)?));
        }

        for dimension in SummaryDimension::ALL {
            for per_platform in [false, true] {
                let rows = summary::summarize(posts, dimension, per_platform);
                let suffix = if per_platform { "_by_platform" } else { "" };
                outputs.push((
                    format!("summary_by_{}{suffix}.csv", dimension.slug()),
                    reports::summary_csv(&rows, dimension, per_platform)?,
                ));
            }
        }

        outputs.push((
            "best_hours_by_platform.csv".to_string(),
            reports::best_times_csv(&summary::best_hours(posts), false)?,
        ));
        outputs.push((
            "best_day_hour_by_platform.csv".to_string(),
            reports::best_times_csv(&summary::best_day_hours(posts), true)?,
        ));
        for map in summary::heatmaps(posts) {
            outputs.push((
                format!("best_times_heatmap_{}.csv", map.platform),
                reports::heatmap_csv(&map)?,
            ));
        }

        outputs.push((
            "dedup_review.json".to_string(),
            serde_json::to_vec_pretty(review).context("serializing dedup review queue")?,
        ));
        outputs.push((
            "snapshots/unified_posts.parquet".to_string(),
            reports::unified_parquet(posts)?,
        ));

        summary.finished_at = Utc::now();
        outputs.push((
            "run_summary.json".to_string(),
            serde_json::to_vec_pretty(&summary).context("serializing run summary")?,
        ));
        outputs.push((
            "ingest_brief.md".to_string(),
            reports::ingest_brief_markdown(summary).into_bytes(),
        ));

        let store = ReportStore::new(run_dir);
        let mut files = Vec::with_capacity(outputs.len());
        for (relative_path, bytes) in outputs {
            let stored = store.store_bytes(&relative_path, &bytes).await?;
            files.push(ReportManifestFile {
                name: relative_path
                    .rsplit('/')
                    .next()
                    .unwrap_or(&relative_path)
                    .to_string(),
                path: relative_path.clone(),
                sha256: stored.content_hash,
                bytes: stored.byte_size as u64,
            });
        }

        let manifest = ReportManifest {
            schema_version: 1,
            files,
        };
        let bytes = serde_json::to_vec_pretty(&manifest).context("serializing report manifest")?;
        store
            .store_bytes("snapshots/manifest.json", &bytes)
            .await?;
        Ok(())
    }
}

pub async fn run_ingest_once_from_env() -> Result<SyncRunSummary> {
    let config = SyncConfig::from_env();
    SyncPipeline::new(config)?.run_once().await
}

/// Markdown index of the most recent `runs` run directories.
pub fn report_runs_markdown(runs: usize, reports_dir: &Path) -> Result<String> {
    let mut dirs = std::fs::read_dir(reports_dir)
        .with_context(|| format!("reading {}", reports_dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .filter(|entry| entry.path().join("run_summary.json").exists())
        .collect::<Vec<_>>();
    dirs.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
    dirs.reverse();

    let mut lines = vec!["# SFAP Ingest Runs".to_string(), String::new()];
    for dir in dirs.into_iter().take(runs.max(1)) {
        let run_id = dir.file_name().to_string_lossy().to_string();
        let summary_path = dir.path().join("run_summary.json");
        let summary: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(&summary_path)
                .with_context(|| format!("reading {}", summary_path.display()))?,
        )
        .with_context(|| format!("parsing {}", summary_path.display()))?;
        let field = |name: &str| summary.get(name).and_then(|v| v.as_u64()).unwrap_or(0);
        let follows = summary
            .get("attribution")
            .and_then(|a| a.get("follows_attributed"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        lines.push(format!("## Run `{run_id}`"));
        lines.push(format!("- unified posts: {}", field("unified_posts")));
        lines.push(format!("- duplicates dropped: {}", field("duplicates_dropped")));
        lines.push(format!("- rows skipped: {}", field("skipped_rows")));
        lines.push(format!("- follows attributed: {follows}"));
        lines.push(format!("- summary: `{}`", summary_path.display()));
        let brief_path = dir.path().join("ingest_brief.md");
        if brief_path.exists() {
            lines.push(format!("- brief: `{}`", brief_path.display()));
        }
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}

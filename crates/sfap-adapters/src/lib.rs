//! Source adapter contracts + adapters for post exports, insights and PDF reports.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use sfap_core::{DailyFollowerSnapshot, PdfMetricRow, PostRecord};
use sfap_storage::{SourceBytes, SourceFile, SourceKind, SourceStore, StorageError};
use thiserror::Error;

pub mod classify;
pub mod columns;
pub mod csv_sources;
pub mod normalize;
pub mod pdf;
pub mod rules;
pub mod timestamp;

pub use classify::{ContentSample, SourceClassification, SourceClassifier};
pub use csv_sources::{InsightsCsvAdapter, PostsCsvAdapter};
pub use normalize::RowNormalizer;
pub use pdf::PdfReportAdapter;
pub use rules::KeywordTables;
pub use timestamp::{RawTimestamp, TimestampNormalizer};

pub const CRATE_NAME: &str = "sfap-adapters";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("parsing csv {file}: {source}")]
    Csv {
        file: String,
        #[source]
        source: csv::Error,
    },
    #[error("{file} has no {column} column")]
    MissingColumn { file: String, column: &'static str },
    #[error("extracting text from {file}: {message}")]
    Pdf { file: String, message: String },
}

/// What one source file contributed.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedSource {
    Posts {
        records: Vec<PostRecord>,
        skipped_rows: usize,
    },
    Followers(Vec<DailyFollowerSnapshot>),
    PdfRows(Vec<PdfMetricRow>),
}

/// Shared inputs for every adapter of a run.
#[derive(Debug, Clone)]
pub struct AdapterContext {
    pub tables: Arc<KeywordTables>,
    pub timestamps: TimestampNormalizer,
}

impl AdapterContext {
    pub fn new(tables: Arc<KeywordTables>, timestamps: TimestampNormalizer) -> Self {
        Self { tables, timestamps }
    }

    /// Keyword tables from `rules_dir` (defaults where files are missing).
    pub fn from_rules_dir(rules_dir: &Path, timestamps: TimestampNormalizer) -> Result<Self> {
        Ok(Self::new(Arc::new(KeywordTables::from_rules_dir(rules_dir)?), timestamps))
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn fetch(&self, store: &SourceStore, file: &SourceFile) -> Result<SourceBytes, AdapterError> {
        Ok(store.read_source(file).await?)
    }

    fn parse(&self, source: &SourceBytes) -> Result<ParsedSource, AdapterError>;
}

pub fn adapter_for_kind(kind: SourceKind, ctx: &AdapterContext) -> Box<dyn SourceAdapter> {
    match kind {
        SourceKind::PostsCsv => Box::new(PostsCsvAdapter::new(ctx)),
        SourceKind::InsightsCsv => Box::new(InsightsCsvAdapter::new(ctx)),
        SourceKind::PdfReport => Box::new(PdfReportAdapter),
    }
}

//! Metric tables recovered from exported PDF reports.
//!
//! Extraction is text based: a table starts at a line whose cells include an
//! impressions header and runs until a blank or single-cell line or the end of
//! the page. Reports without such a table contribute nothing.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use sfap_core::PdfMetricRow;
use sfap_storage::{SourceBytes, SourceKind};
use tracing::debug;

use crate::columns::parse_count;
use crate::{AdapterError, ParsedSource, SourceAdapter};

static CELL_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\t+|\s{2,}").expect("valid cell regex"));

const URL_HEADERS: [&str; 5] = ["post url", "url", "link", "permalink", "post link"];

#[derive(Debug, Default)]
pub struct PdfReportAdapter;

#[async_trait]
impl SourceAdapter for PdfReportAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::PdfReport
    }

    fn parse(&self, source: &SourceBytes) -> Result<ParsedSource, AdapterError> {
        let file_name = &source.file.file_name;
        let pages = extract_pages(&source.bytes).map_err(|message| AdapterError::Pdf {
            file: file_name.clone(),
            message,
        })?;
        let rows: Vec<PdfMetricRow> = pages
            .iter()
            .flat_map(|page| extract_metric_tables(page, file_name))
            .collect();
        debug!(file = %file_name, pages = pages.len(), rows = rows.len(), "extracted pdf metric rows");
        Ok(ParsedSource::PdfRows(rows))
    }
}

/// Text of each page. pdf-extract panics on some malformed documents (for
/// example a font missing from the page resources); those become errors.
fn extract_pages(bytes: &[u8]) -> Result<Vec<String>, String> {
    match panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    })) {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => Err(format!("pdf parser panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[derive(Debug)]
struct TableLayout {
    url: Option<usize>,
    impressions: usize,
    reach: Option<usize>,
}

impl TableLayout {
    fn from_header(cells: &[&str]) -> Option<Self> {
        let lower: Vec<String> = cells.iter().map(|c| c.to_lowercase()).collect();
        let find = |pred: &dyn Fn(&str) -> bool| lower.iter().position(|c| pred(c.as_str()));
        Some(Self {
            impressions: find(&|c| c.starts_with("impression"))?,
            url: find(&|c| URL_HEADERS.contains(&c)),
            reach: find(&|c| c.starts_with("reach")),
        })
    }

    fn row(&self, cells: &[&str], source_document: &str) -> PdfMetricRow {
        let count = |index: Option<usize>| index.and_then(|i| cells.get(i)).and_then(|c| parse_count(c));
        let post_url = self
            .url
            .and_then(|i| cells.get(i))
            .filter(|c| !c.is_empty())
            .or_else(|| cells.iter().find(|c| c.starts_with("http")))
            .map(|c| c.to_string());
        PdfMetricRow {
            post_url,
            impressions: count(Some(self.impressions)),
            reach: count(self.reach),
            source_document: source_document.to_string(),
        }
    }
}

fn split_cells(line: &str) -> Vec<&str> {
    CELL_SPLIT_RE
        .split(line.trim())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect()
}

/// Recognize metric tables in one page of extracted text.
pub fn extract_metric_tables(page: &str, source_document: &str) -> Vec<PdfMetricRow> {
    let mut rows = Vec::new();
    let mut layout: Option<TableLayout> = None;
    for line in page.lines() {
        let cells = split_cells(line);
        if cells.len() < 2 {
            layout = None;
            continue;
        }
        if let Some(header) = TableLayout::from_header(&cells) {
            layout = Some(header);
            continue;
        }
        if let Some(current) = &layout {
            rows.push(current.row(&cells, source_document));
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_rows_follow_an_impressions_header() {
        let page = "Monthly report\n\
            \n\
            Post URL\tImpressions\tReach\tEngagements\tEngagement Rate\n\
            https://instagram.com/p/a1/\t1,200\t900\t60\t5%\n\
            https://instagram.com/p/b2/    300    250    9    3%\n\
            \n\
            Page 1 of 2\n";
        let rows = extract_metric_tables(page, "report.pdf");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].post_url.as_deref(), Some("https://instagram.com/p/a1/"));
        assert_eq!(rows[0].impressions, Some(1200));
        assert_eq!(rows[0].reach, Some(900));
        assert_eq!(rows[1].impressions, Some(300));
        assert_eq!(rows[1].source_document, "report.pdf");
    }

    #[test]
    fn url_cell_is_found_without_a_url_header() {
        let page = "Post  Impressions\nhttps://x.com/a/status/1  42\n";
        let rows = extract_metric_tables(page, "x.pdf");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].post_url.as_deref(), Some("https://x.com/a/status/1"));
        assert_eq!(rows[0].reach, None);
    }

    #[test]
    fn pages_without_tables_yield_nothing() {
        assert!(extract_metric_tables("Summary\nFollowers grew 10%\n", "a.pdf").is_empty());
        assert!(extract_metric_tables("", "a.pdf").is_empty());
    }

    fn pdf_source(file_name: &str, bytes: Vec<u8>) -> SourceBytes {
        use sfap_storage::SourceFile;
        SourceBytes {
            file: SourceFile {
                kind: SourceKind::PdfReport,
                path: file_name.into(),
                file_name: file_name.to_string(),
                folder: String::new(),
            },
            bytes,
            content_hash: String::new(),
        }
    }

    #[test]
    fn unreadable_pdf_is_an_error() {
        let source = pdf_source("broken.pdf", b"not a pdf".to_vec());
        assert!(matches!(
            PdfReportAdapter.parse(&source),
            Err(AdapterError::Pdf { .. })
        ));
    }

    #[test]
    fn font_missing_from_resources_is_an_error() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../fixtures/pdf-missing-font/sample/missing_font.pdf");
        let source = pdf_source("missing_font.pdf", std::fs::read(path).unwrap());
        match PdfReportAdapter.parse(&source) {
            Err(AdapterError::Pdf { file, .. }) => assert_eq!(file, "missing_font.pdf"),
            other => panic!("expected a pdf error, got {other:?}"),
        }
    }

    #[test]
    fn tables_do_not_run_across_pages() {
        let pages = [
            "Post URL\tImpressions\nhttps://instagram.com/p/a1/\t1,200\n",
            "https://instagram.com/p/b2/\t300\n",
        ];
        let rows: Vec<PdfMetricRow> = pages
            .iter()
            .flat_map(|page| extract_metric_tables(page, "report.pdf"))
            .collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].post_url.as_deref(), Some("https://instagram.com/p/a1/"));
    }
}

//! Source discovery, fail-soft source reads and atomic report storage for SFAP.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

pub const CRATE_NAME: &str = "sfap-storage";

/// Filename fragments that mark a CSV as something other than a post export.
const NON_POST_MARKERS: [&str; 5] = ["summary", "hashtags", "insights", "statistics", "demographic"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SourceKind {
    PostsCsv,
    InsightsCsv,
    PdfReport,
}

/// Decide what a discovered file is from its name alone.
pub fn classify_source_kind(file_name: &str) -> Option<SourceKind> {
    let lower = file_name.to_lowercase();
    if lower.ends_with(".pdf") {
        return Some(SourceKind::PdfReport);
    }
    if !lower.ends_with(".csv") {
        return None;
    }
    if lower.contains("insights") {
        return Some(SourceKind::InsightsCsv);
    }
    if lower.contains("posts") && !NON_POST_MARKERS.iter().any(|m| lower.contains(m)) {
        return Some(SourceKind::PostsCsv);
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub kind: SourceKind,
    pub path: PathBuf,
    pub file_name: String,
    /// Directory of the file relative to the discovery root.
    pub folder: String,
}

#[derive(Debug, Clone)]
pub struct SourceBytes {
    pub file: SourceFile,
    pub bytes: Vec<u8>,
    pub content_hash: String,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("reading {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Walks an input directory for export files.
///
/// Traversal is depth-first with entries sorted by name, files of a directory
/// before its subdirectories, so the discovery order is stable across runs.
#[derive(Debug, Clone)]
pub struct SourceStore {
    root: PathBuf,
    excluded: Vec<PathBuf>,
}

impl SourceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            excluded: Vec::new(),
        }
    }

    /// Skip a directory (typically the reports output) during discovery.
    pub fn exclude(mut self, dir: impl AsRef<Path>) -> Self {
        self.excluded.push(comparable(dir.as_ref()));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn discover(&self) -> anyhow::Result<Vec<SourceFile>> {
        let mut found = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir)
                .await
                .with_context(|| format!("listing {}", dir.display()))?;
            let mut files = Vec::new();
            let mut subdirs = Vec::new();
            while let Some(entry) = entries
                .next_entry()
                .await
                .with_context(|| format!("listing {}", dir.display()))?
            {
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with('.') {
                    continue;
                }
                let file_type = entry
                    .file_type()
                    .await
                    .with_context(|| format!("inspecting {}", entry.path().display()))?;
                if file_type.is_dir() {
                    let path = entry.path();
                    if !self.excluded.contains(&comparable(&path)) {
                        subdirs.push(path);
                    }
                } else if file_type.is_file() {
                    files.push((name, entry.path()));
                }
            }

            files.sort();
            subdirs.sort();

            let folder = dir
                .strip_prefix(&self.root)
                .unwrap_or(&dir)
                .display()
                .to_string();
            for (file_name, path) in files {
                match classify_source_kind(&file_name) {
                    Some(kind) => found.push(SourceFile {
                        kind,
                        path,
                        file_name,
                        folder: folder.clone(),
                    }),
                    None => debug!(file = %path.display(), "ignoring non-source file"),
                }
            }
            pending.extend(subdirs.into_iter().rev());
        }

        Ok(found)
    }

    pub async fn read_source(&self, file: &SourceFile) -> Result<SourceBytes, StorageError> {
        let bytes = fs::read(&file.path).await.map_err(|source| StorageError::Read {
            path: file.path.display().to_string(),
            source,
        })?;
        Ok(SourceBytes {
            file: file.clone(),
            content_hash: sha256_hex(&bytes),
            bytes,
        })
    }
}

fn comparable(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredArtifact {
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    pub deduplicated: bool,
}

/// Writes report files under one run directory.
#[derive(Debug, Clone)]
pub struct ReportStore {
    root: PathBuf,
}

impl ReportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store bytes at `relative_path` via temp file and atomic rename.
    ///
    /// An existing file with identical content is left untouched.
    pub async fn store_bytes(
        &self,
        relative_path: impl AsRef<Path>,
        bytes: &[u8],
    ) -> anyhow::Result<StoredArtifact> {
        let relative_path = relative_path.as_ref().to_path_buf();
        let absolute_path = self.root.join(&relative_path);
        let content_hash = sha256_hex(bytes);

        let parent = absolute_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("creating report directory {}", parent.display()))?;

        if fs::try_exists(&absolute_path)
            .await
            .with_context(|| format!("checking report path {}", absolute_path.display()))?
        {
            let existing = fs::read(&absolute_path)
                .await
                .with_context(|| format!("reading existing report {}", absolute_path.display()))?;
            if sha256_hex(&existing) == content_hash {
                return Ok(StoredArtifact {
                    content_hash,
                    relative_path,
                    absolute_path,
                    byte_size: bytes.len(),
                    deduplicated: true,
                });
            }
        }

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp report file {}", temp_path.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("writing temp report file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp report file {}", temp_path.display()))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &absolute_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "atomically renaming temp report {} -> {}",
                    temp_path.display(),
                    absolute_path.display()
                )
            });
        }

        Ok(StoredArtifact {
            content_hash,
            relative_path,
            absolute_path,
            byte_size: bytes.len(),
            deduplicated: false,
        })
    }
}

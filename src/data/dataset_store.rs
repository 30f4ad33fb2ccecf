/// Append-only JSON dataset of daily volume rows.
///
/// Layout on disk is a JSON array with one compact row per line. Rows already
/// on disk are kept as their original text and written back verbatim; every
/// write goes to a sibling temp file that is renamed over the store.
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde_json::value::RawValue;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{Result, VolumeError};
use crate::types::{KeyIndex, VolumeRow};

/// A persisted row: its original text plus the parsed view
#[derive(Debug)]
pub struct StoredRow {
    raw: Box<RawValue>,
    row: VolumeRow,
}

impl StoredRow {
    pub fn row(&self) -> &VolumeRow {
        &self.row
    }

    pub fn raw(&self) -> &str {
        self.raw.get()
    }
}

/// In-memory snapshot of the store
#[derive(Debug, Default)]
pub struct Dataset {
    rows: Vec<StoredRow>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &VolumeRow> {
        self.rows.iter().map(|r| &r.row)
    }

    pub fn stored_rows(&self) -> &[StoredRow] {
        &self.rows
    }

    /// Existing (date, exchange) keys
    pub fn keys(&self) -> KeyIndex {
        self.rows.iter().map(|r| r.row.key()).collect()
    }

    pub fn dates(&self) -> BTreeSet<NaiveDate> {
        self.rows.iter().map(|r| r.row.date).collect()
    }

    pub fn exchanges(&self) -> BTreeSet<String> {
        self.rows.iter().map(|r| r.row.exchange.clone()).collect()
    }
}

/// What a merge did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    pub appended: usize,
    pub skipped_duplicates: usize,
    pub total_rows: usize,
}

pub struct DatasetStore {
    path: PathBuf,
}

impl DatasetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DatasetStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate the dataset. A missing file is an empty dataset;
    /// anything unparseable is `CorruptStore`.
    pub async fn load(&self) -> Result<Dataset> {
        if !tokio::fs::try_exists(&self.path).await? {
            debug!("No dataset at {}, starting empty", self.path.display());
            return Ok(Dataset::default());
        }

        let text = tokio::fs::read_to_string(&self.path).await?;
        let raw_rows: Vec<Box<RawValue>> =
            serde_json::from_str(&text).map_err(|e| self.corrupt(format!("not a JSON array of rows: {}", e)))?;

        let mut rows = Vec::with_capacity(raw_rows.len());
        let mut seen = HashSet::new();
        for (idx, raw) in raw_rows.into_iter().enumerate() {
            let row: VolumeRow = serde_json::from_str(raw.get())
                .map_err(|e| self.corrupt(format!("row {}: {}", idx, e)))?;

            if !seen.insert(row.key()) {
                warn!("⚠️  Dataset already holds a duplicate row for {}", row.key());
            }
            rows.push(StoredRow { raw, row });
        }

        debug!("Loaded {} rows from {}", rows.len(), self.path.display());
        Ok(Dataset { rows })
    }

    pub async fn existing_keys(&self) -> Result<KeyIndex> {
        Ok(self.load().await?.keys())
    }

    /// Append `new_rows` after every existing row and atomically replace the file.
    ///
    /// Rows whose (date, exchange) already exists, on disk or earlier in
    /// `new_rows`, are dropped. Existing rows are never touched.
    pub async fn merge(&self, new_rows: &[VolumeRow]) -> Result<MergeOutcome> {
        let dataset = self.load().await?;
        let mut keys = dataset.keys();

        let mut appended = Vec::with_capacity(new_rows.len());
        let mut skipped_duplicates = 0;
        for row in new_rows {
            if keys.insert(row.key()) {
                appended.push(serde_json::to_string(row)?);
            } else {
                warn!("⚠️  Row for {} already stored, not appending", row.key());
                skipped_duplicates += 1;
            }
        }

        let outcome = MergeOutcome {
            appended: appended.len(),
            skipped_duplicates,
            total_rows: dataset.len() + appended.len(),
        };

        let exists = tokio::fs::try_exists(&self.path).await?;
        if appended.is_empty() && exists {
            debug!("Nothing new to write to {}", self.path.display());
            return Ok(outcome);
        }

        let lines: Vec<&str> = dataset
            .stored_rows()
            .iter()
            .map(|r| r.raw())
            .chain(appended.iter().map(|s| s.as_str()))
            .collect();

        self.write_atomic(&render(&lines)).await?;

        info!(
            "💾 Appended {} rows to {} ({} total)",
            outcome.appended,
            self.path.display(),
            outcome.total_rows
        );
        Ok(outcome)
    }

    async fn write_atomic(&self, contents: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = self.temp_path()?;
        if let Err(e) = write_synced(&tmp_path, contents).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e);
        }
        tokio::fs::rename(&tmp_path, &self.path).await?;

        Ok(())
    }

    fn temp_path(&self) -> Result<PathBuf> {
        let file_name = self.path.file_name().ok_or_else(|| {
            VolumeError::InvalidParameter(format!("store path has no file name: {}", self.path.display()))
        })?;
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(".tmp");
        Ok(self.path.with_file_name(tmp_name))
    }

    fn corrupt(&self, reason: String) -> VolumeError {
        VolumeError::CorruptStore {
            path: self.path.display().to_string(),
            reason,
        }
    }
}

async fn write_synced(path: &Path, contents: &str) -> Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(contents.as_bytes()).await?;
    file.sync_all().await?;
    Ok(())
}

fn render(lines: &[&str]) -> String {
    if lines.is_empty() {
        return "[]".to_string();
    }
    format!("[\n{}\n]", lines.join(",\n"))
}

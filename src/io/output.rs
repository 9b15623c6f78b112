use anyhow::{Context, Result};
use csv::{ReaderBuilder, Writer};
use log::{debug, info, warn};

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::process;
use std::path::{Path, PathBuf};

use crate::error::AnalysisError;
use crate::processing::endpoints::EndpointRecord;
use crate::processing::peaks::Extrema;

pub const FILE_PATH_COLUMN: &str = "File Path";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Updated,
    Appended,
}

/// In-memory image of the summary file: one row per analysed source path.
///
/// The first column is always [`FILE_PATH_COLUMN`]. Columns are only ever
/// appended, never removed.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Default for SummaryTable {
    fn default() -> Self {
        SummaryTable {
            columns: vec![FILE_PATH_COLUMN.to_string()],
            rows: Vec::new(),
        }
    }
}

impl SummaryTable {
    /// Reads the table from disk, `None` if the file does not exist yet.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Option<SummaryTable>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }

        let file =
            File::open(path).with_context(|| format!("failed to open summary {:?}", path))?;
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let columns: Vec<String> = rdr
            .headers()
            .with_context(|| format!("failed to read summary header of {:?}", path))?
            .iter()
            .map(str::to_string)
            .collect();
        if columns.first().map(String::as_str) != Some(FILE_PATH_COLUMN) {
            return Err(AnalysisError::SchemaMismatch(format!(
                "summary {:?} does not start with a '{}' column",
                path, FILE_PATH_COLUMN
            ))
            .into());
        }

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.with_context(|| format!("failed to read summary row of {:?}", path))?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(columns.len(), String::new());
            rows.push(row);
        }

        Ok(Some(SummaryTable { columns, rows }))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell lookup by source path and column name.
    pub fn get(&self, file_path: &str, column: &str) -> Option<&str> {
        let col = self.columns.iter().position(|c| c == column)?;
        self.rows
            .iter()
            .find(|row| row[0] == file_path)
            .map(|row| row[col].as_str())
    }

    /// Appends any column in `names` the table does not have yet.
    ///
    /// Returns the names of the added columns.
    pub fn migrate_schema<'a, I>(&mut self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut added = Vec::new();
        for name in names {
            if !self.columns.iter().any(|c| c == name) {
                self.columns.push(name.to_string());
                added.push(name.to_string());
            }
        }
        if !added.is_empty() {
            for row in &mut self.rows {
                row.resize(self.columns.len(), String::new());
            }
            debug!("summary schema extended with {:?}", added);
        }
        added
    }

    /// Writes `values` into the row of `file_path`, creating the row if needed.
    ///
    /// Columns not named in `values` keep their previous content.
    pub fn upsert(&mut self, file_path: &str, values: &[(&str, f64)]) -> UpsertOutcome {
        self.migrate_schema(values.iter().map(|(name, _)| *name));

        let (row_idx, outcome) = match self.rows.iter().position(|row| row[0] == file_path) {
            Some(idx) => (idx, UpsertOutcome::Updated),
            None => {
                let mut row = vec![String::new(); self.columns.len()];
                row[0] = file_path.to_string();
                self.rows.push(row);
                (self.rows.len() - 1, UpsertOutcome::Appended)
            }
        };

        for (name, value) in values {
            if let Some(col) = self.columns.iter().position(|c| c == name) {
                self.rows[row_idx][col] = value.to_string();
            }
        }
        outcome
    }

    /// Rewrites the whole table through a temporary file and a rename, so a
    /// failed write leaves the previous file in place.
    pub fn write_atomic<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {:?}", parent))?;
        }

        let tmp = sibling_with_suffix(path, ".tmp");
        let written = self.write_csv(&tmp).and_then(|_| {
            fs::rename(&tmp, path).with_context(|| format!("failed to replace summary {:?}", path))
        });
        if written.is_err() && tmp.exists() {
            if let Err(e) = fs::remove_file(&tmp) {
                warn!("failed to remove temporary summary {:?}: {}", tmp, e);
            }
        }
        written
    }

    fn write_csv(&self, path: &Path) -> Result<()> {
        let mut wtr =
            Writer::from_path(path).with_context(|| format!("failed to create {:?}", path))?;
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Advisory lock held while the summary file is rewritten.
///
/// The lock file holds the id of the owning process. A lock left behind by a
/// crashed run has to be deleted by hand; the error names the file.
#[derive(Debug)]
pub struct SummaryLock {
    path: PathBuf,
}

impl SummaryLock {
    pub fn acquire<P: AsRef<Path>>(summary_path: P) -> Result<SummaryLock> {
        let summary_path = summary_path.as_ref();
        let path = sibling_with_suffix(summary_path, ".lock");
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let lock = SummaryLock { path };
                write!(file, "{}", process::id())
                    .with_context(|| format!("failed to write lock {:?}", lock.path))?;
                Ok(lock)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = match fs::read_to_string(&path) {
                    Ok(pid) if !pid.trim().is_empty() => format!("process {}", pid.trim()),
                    _ => "an unknown process".to_string(),
                };
                Err(AnalysisError::SummaryLocked {
                    summary: summary_path.to_path_buf(),
                    lock: path,
                    holder,
                }
                .into())
            }
            Err(e) => Err(e).with_context(|| format!("failed to create lock {:?}", path)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SummaryLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("failed to remove summary lock {:?}: {}", self.path, e);
        }
    }
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Upserts the endpoints of `source` into the summary file at `summary_path`.
///
/// The file is re-read on every call; nothing is cached between updates.
pub fn update_summary<P: AsRef<Path>, Q: AsRef<Path>>(
    summary_path: P,
    source: Q,
    record: &EndpointRecord,
) -> Result<UpsertOutcome> {
    let summary_path = summary_path.as_ref();
    if let Some(parent) = summary_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {:?}", parent))?;
    }
    let _lock = SummaryLock::acquire(summary_path)?;

    let mut table = SummaryTable::read(summary_path)?.unwrap_or_default();
    let key = source.as_ref().display().to_string();
    let outcome = table.upsert(&key, &record.entries());
    table.write_atomic(summary_path)?;

    match outcome {
        UpsertOutcome::Updated => info!("summary row of {} updated in {:?}", key, summary_path),
        UpsertOutcome::Appended => info!("summary row of {} added to {:?}", key, summary_path),
    }
    Ok(outcome)
}

/// Receives the detected extrema of each analysed recording.
#[cfg_attr(test, mockall::automock)]
pub trait PeakSink {
    fn emit(&self, name: &str, series: &[f64], extrema: &Extrema) -> Result<()>;
}

/// Saves the volume series with its extrema marked as `<dir>/<name>_peaks.csv`.
#[derive(Debug, Clone)]
pub struct CsvPeakWriter {
    pub dir: PathBuf,
}

impl CsvPeakWriter {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        CsvPeakWriter { dir: dir.into() }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}_peaks.csv", name))
    }
}

impl PeakSink for CsvPeakWriter {
    fn emit(&self, name: &str, series: &[f64], extrema: &Extrema) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create directory {:?}", self.dir))?;
        let path = self.path_for(name);
        let mut wtr =
            Writer::from_path(&path).with_context(|| format!("failed to create {:?}", path))?;

        wtr.write_record(["frame", "volume", "extremum"])?;
        for (frame, value) in series.iter().enumerate() {
            let kind = if extrema.maxima.iter().any(|p| p.frame == frame) {
                "max"
            } else if extrema.minima.iter().any(|p| p.frame == frame) {
                "min"
            } else {
                ""
            };
            wtr.write_record([frame.to_string(), value.to_string(), kind.to_string()])?;
        }
        wtr.flush()?;
        debug!("peaks of '{}' written to {:?}", name, path);
        Ok(())
    }
}

use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook_auto, Reader};
use csv::ReaderBuilder;
use log::{debug, info, warn};

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::config::IngestConfig;
use crate::error::AnalysisError;

/// Whether an export went through the tracking tool's filtering step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceStatus {
    Raw,
    Filtered,
}

/// Logical identity of one export file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceName {
    pub core: String,
    pub status: SourceStatus,
}

impl SourceName {
    /// Derives the core name and status from the file stem.
    ///
    /// Tool generated names look like `<session> <recording>DLC_<model>...`;
    /// only the last two space separated tokens before the tool marker are
    /// kept, so raw and filtered exports of one recording share a core name.
    pub fn from_path(path: &Path, markers: &IngestConfig) -> SourceName {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let status = if stem.contains(&markers.filtered_marker) {
            SourceStatus::Filtered
        } else {
            SourceStatus::Raw
        };

        let core = match stem.split_once(&markers.tool_marker) {
            Some((before, _)) => {
                let tokens: Vec<&str> = before.split(' ').collect();
                let start = tokens.len().saturating_sub(2);
                tokens[start..].join(" ")
            }
            None => stem,
        };

        SourceName { core, status }
    }
}

/// Outcome of grouping the given paths by recording.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedSources {
    /// One file per core name, filtered exports taking precedence.
    pub files: BTreeMap<String, PathBuf>,
    /// True when some recording was supplied both raw and filtered.
    pub has_duplication: bool,
}

pub fn resolve_sources<P: AsRef<Path>>(paths: &[P], markers: &IngestConfig) -> ResolvedSources {
    let mut raw: BTreeMap<String, PathBuf> = BTreeMap::new();
    let mut filtered: BTreeMap<String, PathBuf> = BTreeMap::new();

    for path in paths {
        let path = path.as_ref();
        let name = SourceName::from_path(path, markers);
        match name.status {
            SourceStatus::Raw => raw.insert(name.core, path.to_path_buf()),
            SourceStatus::Filtered => filtered.insert(name.core, path.to_path_buf()),
        };
    }

    let duplicated: Vec<&String> = raw
        .keys()
        .filter(|core| filtered.contains_key(*core))
        .collect();
    let has_duplication = !duplicated.is_empty();
    if has_duplication {
        warn!("raw and filtered exports given for {:?}", duplicated);
    }

    let mut files = filtered;
    for (core, path) in raw {
        files.entry(core).or_insert(path);
    }
    debug!("resolved sources: {:?}", files);

    ResolvedSources {
        files,
        has_duplication,
    }
}

/// A sheet of untyped cells exactly as found in the export, headers included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn from_rows<R, C>(rows: R) -> RawTable
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        RawTable {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
        }
    }

    /// Reads a `.csv` or spreadsheet export without interpreting any header.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<RawTable> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "xlsx" | "xlsm" | "xls" | "ods" => read_spreadsheet(path),
            _ => read_delimited(path),
        }
    }
}

/// Utility: detect whether the file uses comma or tab as delimiter.
fn detect_delimiter<P: AsRef<Path>>(path: P) -> Result<u8> {
    let file = File::open(&path).with_context(|| {
        format!(
            "failed to open file for delimiter sniffing: {:?}",
            path.as_ref()
        )
    })?;
    let mut reader = BufReader::new(file);
    let mut first_line = String::new();
    reader
        .read_line(&mut first_line)
        .with_context(|| "failed to read first line for delimiter detection")?;

    let tabs = first_line.matches('\t').count();
    let commas = first_line.matches(',').count();

    if tabs > commas {
        Ok(b'\t')
    } else {
        Ok(b',')
    }
}

fn read_delimited(path: &Path) -> Result<RawTable> {
    let delim = detect_delimiter(path)?;
    let file = File::open(path).with_context(|| format!("failed to open {:?}", path))?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delim)
        .from_reader(file);

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.with_context(|| format!("failed to read a row of {:?}", path))?;
        rows.push(record.iter().map(|cell| cell.trim().to_string()).collect());
    }
    Ok(RawTable { rows })
}

/// Picks the first sheet whose name does not mention "summary".
pub fn select_sheet<S: AsRef<str>>(names: &[S]) -> Option<&str> {
    names
        .iter()
        .map(AsRef::as_ref)
        .find(|name| !name.to_lowercase().contains("summary"))
}

fn read_spreadsheet(path: &Path) -> Result<RawTable> {
    let mut workbook =
        open_workbook_auto(path).with_context(|| format!("failed to open workbook {:?}", path))?;
    let names = workbook.sheet_names();
    let sheet = select_sheet(&names)
        .ok_or_else(|| AnalysisError::NoUsableSheet(path.to_path_buf()))?
        .to_string();
    info!("reading sheet '{}' of {:?}", sheet, path);

    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| anyhow!("failed to read sheet '{}' of {:?}: {}", sheet, path, e))?;

    let rows = range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string().trim().to_string()).collect())
        .collect();
    Ok(RawTable { rows })
}

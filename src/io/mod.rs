pub mod input;
pub mod output;
pub mod table;
pub mod track;

use anyhow::{Context, Result};
use log::info;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::IngestConfig;
use crate::error::AnalysisError;
use input::{resolve_sources, RawTable};
use table::Table;
use track::CleanedTrack;

/// A cleaned recording together with the file it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub core_name: String,
    pub path: PathBuf,
    pub track: CleanedTrack,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ingested {
    pub recordings: BTreeMap<String, Recording>,
    pub has_duplication: bool,
}

/// Reads one export file into a cleaned track.
pub fn load_track<P: AsRef<Path>>(path: P, config: &IngestConfig) -> Result<CleanedTrack> {
    let path = path.as_ref();
    let raw = RawTable::read(path)?;
    let table = Table::from_raw(raw);
    CleanedTrack::from_table(table, &config.landmark_prefix)
        .with_context(|| format!("cleaning {}", path.display()))
}

/// Resolves the given paths to one file per recording and cleans each of them.
pub fn ingest<P: AsRef<Path>>(paths: &[P], config: &IngestConfig) -> Result<Ingested> {
    let resolved = resolve_sources(paths, config);
    if resolved.files.is_empty() {
        return Err(AnalysisError::NoRecordingFound(paths.len()).into());
    }
    if resolved.has_duplication {
        info!("using the filtered export where both versions were given");
    }

    let mut recordings = BTreeMap::new();
    for (core_name, path) in resolved.files {
        let track = load_track(&path, config)?;
        info!(
            "loaded '{}' from {} ({} frames)",
            core_name,
            path.display(),
            track.len()
        );
        recordings.insert(
            core_name.clone(),
            Recording {
                core_name,
                path,
                track,
            },
        );
    }

    Ok(Ingested {
        recordings,
        has_duplication: resolved.has_duplication,
    })
}

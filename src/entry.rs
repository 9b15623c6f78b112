use anyhow::{anyhow, Context, Result};
use crossbeam::channel::Sender;
use log::{info, warn};
use std::path::{Path, PathBuf};

use crate::config::AnalysisConfig;
use crate::io::ingest;
use crate::io::input::{resolve_sources, SourceName, SourceStatus};
use crate::io::output::{update_summary, CsvPeakWriter, PeakSink, UpsertOutcome};
use crate::processing::metrics::derive_series;
use crate::processing::peaks::{ExtremumDetector, ToleranceDetector};
use crate::processing::poincare::{PoincareCalculator, StandardPoincare};
use crate::processing::{analyze_track, RecordingAnalysis};

/// Result of analysing one source file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub core_name: String,
    pub path: PathBuf,
    pub analysis: RecordingAnalysis,
    pub summary: UpsertOutcome,
}

/// Sent after each file of a batch, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchProgress {
    pub done: usize,
    pub total: usize,
    pub path: PathBuf,
    pub ok: bool,
}

impl BatchProgress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        (self.done * 100 / self.total) as u8
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// Skip a failing file instead of aborting the batch.
    pub keep_going: bool,
    /// Also analyse raw exports whose filtered version is part of the batch.
    pub keep_duplicates: bool,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<FileReport>,
    pub failed: Vec<(PathBuf, anyhow::Error)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToleranceSuggestion {
    pub core_name: String,
    pub path: PathBuf,
    pub tolerance: f64,
}

/// The full per-file pipeline with its external collaborators.
pub struct Pipeline {
    config: AnalysisConfig,
    detector: Box<dyn ExtremumDetector>,
    poincare: Box<dyn PoincareCalculator>,
    peak_sink: Option<Box<dyn PeakSink>>,
}

impl Pipeline {
    /// Pipeline with the bundled detector and Poincaré calculator, saving
    /// peaks under `config.peaks_dir`.
    pub fn new(config: AnalysisConfig) -> Pipeline {
        let peak_sink: Box<dyn PeakSink> = Box::new(CsvPeakWriter::new(&config.peaks_dir));
        Pipeline {
            config,
            detector: Box::new(ToleranceDetector),
            poincare: Box::new(StandardPoincare),
            peak_sink: Some(peak_sink),
        }
    }

    pub fn with_detector<D: ExtremumDetector + 'static>(mut self, detector: D) -> Pipeline {
        self.detector = Box::new(detector);
        self
    }

    pub fn with_poincare<C: PoincareCalculator + 'static>(mut self, poincare: C) -> Pipeline {
        self.poincare = Box::new(poincare);
        self
    }

    pub fn with_peak_sink(mut self, peak_sink: Option<Box<dyn PeakSink>>) -> Pipeline {
        self.peak_sink = peak_sink;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Ingests, analyses and records one source file in the summary table.
    pub fn analyze_file<P: AsRef<Path>>(&self, path: P) -> Result<FileReport> {
        self.analyze_source(path.as_ref(), None)
    }

    fn analyze_source(&self, path: &Path, peak_name: Option<&str>) -> Result<FileReport> {
        let ingested = ingest(&[path], &self.config.ingest)?;
        let recording = ingested
            .recordings
            .into_values()
            .next()
            .ok_or_else(|| anyhow!("no recording read from {}", path.display()))?;

        let analysis = analyze_track(
            &recording.core_name,
            &recording.track,
            &self.config,
            self.detector.as_ref(),
            self.poincare.as_ref(),
        )?;

        if let Some(sink) = &self.peak_sink {
            let name = peak_name.unwrap_or(recording.core_name.as_str());
            sink.emit(name, &analysis.metrics.series.volume, &analysis.extrema)
                .with_context(|| format!("saving peaks of '{}' failed", name))?;
        }

        let summary = update_summary(&self.config.summary_path, &recording.path, &analysis.endpoints)?;

        Ok(FileReport {
            core_name: recording.core_name,
            path: recording.path,
            analysis,
            summary,
        })
    }

    /// Files a batch analyses, with the name their peaks are saved under.
    ///
    /// One file per recording, the filtered export winning over the raw one,
    /// ordered by recording name. With `keep_duplicates` every given file is
    /// kept in the given order and superseded raw exports save their peaks as
    /// `<core>_raw`.
    pub fn plan_batch<P: AsRef<Path>>(
        &self,
        paths: &[P],
        keep_duplicates: bool,
    ) -> Vec<(PathBuf, Option<String>)> {
        let resolved = resolve_sources(paths, &self.config.ingest);
        if !keep_duplicates {
            if resolved.has_duplication {
                warn!("skipping raw exports whose filtered version is in the batch");
            }
            return resolved
                .files
                .into_values()
                .map(|path| (path, None))
                .collect();
        }

        paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                let name = SourceName::from_path(path, &self.config.ingest);
                let superseded = name.status == SourceStatus::Raw
                    && resolved
                        .files
                        .get(&name.core)
                        .is_some_and(|chosen| chosen != path);
                let peak_name = superseded.then(|| format!("{}_raw", name.core));
                (path.to_path_buf(), peak_name)
            })
            .collect()
    }

    /// Analyses the files of [`Pipeline::plan_batch`] one after the other.
    ///
    /// With `keep_going` a failing file is logged and skipped, otherwise the
    /// first failure aborts the batch. Progress messages are best effort.
    pub fn run_batch<P: AsRef<Path>>(
        &self,
        paths: &[P],
        progress: Option<&Sender<BatchProgress>>,
        options: BatchOptions,
    ) -> Result<BatchReport> {
        let sources = self.plan_batch(paths, options.keep_duplicates);
        let total = sources.len();
        let mut report = BatchReport::default();

        for (i, (path, peak_name)) in sources.iter().enumerate() {
            let path = path.as_path();
            let result = self.analyze_source(path, peak_name.as_deref());

            if let Some(tx) = progress {
                let message = BatchProgress {
                    done: i + 1,
                    total,
                    path: path.to_path_buf(),
                    ok: result.is_ok(),
                };
                if tx.send(message).is_err() {
                    warn!("progress receiver dropped");
                }
            }

            match result {
                Ok(file_report) => report.succeeded.push(file_report),
                Err(e) if options.keep_going => {
                    warn!("skipping {}: {:#}", path.display(), e);
                    report.failed.push((path.to_path_buf(), e));
                }
                Err(e) => return Err(e.context(format!("batch aborted at {}", path.display()))),
            }
        }

        info!(
            "batch finished: {} analysed, {} failed",
            report.succeeded.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

/// Volume standard deviation of each recording, the tolerance used when
/// none is supplied.
pub fn suggest_tolerances<P: AsRef<Path>>(
    paths: &[P],
    config: &AnalysisConfig,
) -> Result<Vec<ToleranceSuggestion>> {
    let conversion_rate = config.conversion_rate()?;
    let ingested = ingest(paths, &config.ingest)?;

    Ok(ingested
        .recordings
        .into_values()
        .map(|recording| {
            let tolerance = derive_series(&recording.track, conversion_rate).volume_std();
            info!("suggested tolerance for '{}': {}", recording.core_name, tolerance);
            ToleranceSuggestion {
                core_name: recording.core_name,
                path: recording.path,
                tolerance,
            }
        })
        .collect())
}

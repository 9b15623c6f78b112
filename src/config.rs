//! Analysis parameters.
//!
//! Everything the pipeline needs is carried by an explicit [`AnalysisConfig`]
//! value. It can be loaded from a TOML file and then overridden field by field
//! by the CLI. Conversion rate and frame rate have no default;
//! asking for them while unset yields [`AnalysisError::MissingParameter`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::AnalysisError;

pub const DEFAULT_EDGE_MARGIN: usize = 10;
pub const DEFAULT_SUMMARY_PATH: &str = "Output/SDSummary.csv";
pub const DEFAULT_PEAKS_DIR: &str = "Output/Peaks";

/// Which extremum sequence the beat intervals are measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Basis {
    #[default]
    Maxima,
    Minima,
}

impl FromStr for Basis {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "maxima" => Ok(Basis::Maxima),
            "minima" => Ok(Basis::Minima),
            other => Err(AnalysisError::InvalidBasis(other.to_string())),
        }
    }
}

impl TryFrom<String> for Basis {
    type Error = AnalysisError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Basis> for String {
    fn from(value: Basis) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Basis::Maxima => write!(f, "maxima"),
            Basis::Minima => write!(f, "minima"),
        }
    }
}

/// Axis series sampled for the shortening fraction.
///
/// `Long` reproduces the numbers of the tracking tool this pipeline replaces,
/// which sampled the long-axis distance there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    #[default]
    Long,
    Short,
}

/// Optional refinements applied to detected extrema before edge exclusion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakOptions {
    pub min_peak_distance: Option<usize>,
    pub min_maxima_value: Option<f64>,
    pub max_maxima_value: Option<f64>,
}

/// File naming and column conventions of the tracking exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Substring marking a filtered export.
    pub filtered_marker: String,
    /// Substring the tracking tool inserts before its model suffix.
    pub tool_marker: String,
    /// Body-part prefix of the landmark columns, e.g. `heart` in `heart5_x`.
    pub landmark_prefix: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            filtered_marker: "_filtered".to_string(),
            tool_marker: "DLC".to_string(),
            landmark_prefix: "heart".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Pixels per millimetre.
    pub conversion_rate: Option<f64>,
    /// Frames per second.
    pub frame_rate: Option<f64>,
    /// Peak detection tolerance; `None` selects the bootstrap tolerance.
    pub tolerance: Option<f64>,
    pub edge_margin: usize,
    pub basis: Basis,
    pub shortening_axis: Axis,
    pub peaks: PeakOptions,
    pub ingest: IngestConfig,
    pub summary_path: PathBuf,
    pub peaks_dir: PathBuf,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            conversion_rate: None,
            frame_rate: None,
            tolerance: None,
            edge_margin: DEFAULT_EDGE_MARGIN,
            basis: Basis::default(),
            shortening_axis: Axis::default(),
            peaks: PeakOptions::default(),
            ingest: IngestConfig::default(),
            summary_path: PathBuf::from(DEFAULT_SUMMARY_PATH),
            peaks_dir: PathBuf::from(DEFAULT_PEAKS_DIR),
        }
    }
}

impl AnalysisConfig {
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {:?}", path.as_ref()))?;
        let config: AnalysisConfig = toml::from_str(&text)
            .with_context(|| format!("failed to parse config file {:?}", path.as_ref()))?;
        Ok(config)
    }

    pub fn conversion_rate(&self) -> Result<f64, AnalysisError> {
        require_positive("conversion_rate", self.conversion_rate)
    }

    pub fn frame_rate(&self) -> Result<f64, AnalysisError> {
        require_positive("frame_rate", self.frame_rate)
    }

    /// The user supplied tolerance, validated. `Ok(None)` means bootstrap mode.
    pub fn tolerance(&self) -> Result<Option<f64>, AnalysisError> {
        match self.tolerance {
            Some(t) => require_positive("tolerance", Some(t)).map(Some),
            None => Ok(None),
        }
    }
}

fn require_positive(name: &'static str, value: Option<f64>) -> Result<f64, AnalysisError> {
    let value = value.ok_or(AnalysisError::MissingParameter(name))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(AnalysisError::InvalidParameter { name, value });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basis_parsing() {
        assert_eq!("maxima".parse::<Basis>().unwrap(), Basis::Maxima);
        assert_eq!("minima".parse::<Basis>().unwrap(), Basis::Minima);
        assert_eq!(
            "peaks".parse::<Basis>().unwrap_err(),
            AnalysisError::InvalidBasis("peaks".to_string())
        );
    }

    #[test]
    fn test_missing_rates_are_reported() {
        let config = AnalysisConfig::default();
        assert_eq!(
            config.conversion_rate().unwrap_err(),
            AnalysisError::MissingParameter("conversion_rate")
        );
        assert_eq!(
            config.frame_rate().unwrap_err(),
            AnalysisError::MissingParameter("frame_rate")
        );
        assert_eq!(config.tolerance().unwrap(), None);
    }

    #[test]
    fn test_non_positive_rate_rejected() {
        let config = AnalysisConfig {
            frame_rate: Some(0.0),
            ..Default::default()
        };
        assert!(matches!(
            config.frame_rate(),
            Err(AnalysisError::InvalidParameter { name: "frame_rate", .. })
        ));
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let text = r#"
            conversion_rate = 2200.0
            frame_rate = 30.0
            basis = "minima"
            shortening_axis = "short"

            [peaks]
            min_peak_distance = 5

            [ingest]
            landmark_prefix = "ventricle"
        "#;
        let config: AnalysisConfig = toml::from_str(text).unwrap();
        assert_eq!(config.conversion_rate, Some(2200.0));
        assert_eq!(config.basis, Basis::Minima);
        assert_eq!(config.shortening_axis, Axis::Short);
        assert_eq!(config.peaks.min_peak_distance, Some(5));
        assert_eq!(config.ingest.landmark_prefix, "ventricle");
        assert_eq!(config.ingest.tool_marker, "DLC");
        assert_eq!(config.edge_margin, DEFAULT_EDGE_MARGIN);
        assert_eq!(config.tolerance, None);
    }

    #[test]
    fn test_toml_rejects_unknown_basis() {
        let result: Result<AnalysisConfig, _> = toml::from_str("basis = \"both\"");
        assert!(result.is_err());
    }
}

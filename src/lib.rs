//! Cardiac functional endpoints from pose-tracking exports.
//!
//! Four tracked landmarks on the ventricle outline give a long and a short
//! axis per frame. The chamber volume is modelled as a prolate ellipsoid,
//! beats are found as extrema of the volume series, and heart rate, stroke
//! volume, cardiac output, ejection fraction, shortening fraction and the
//! Poincaré descriptors of beat-interval variability are derived from them.
//! Each analysed file becomes one row of a persistent summary table.

pub mod config;
pub mod entry;
pub mod error;
pub mod io;
pub mod processing;
pub mod utils;

pub use config::{AnalysisConfig, Axis, Basis};
pub use entry::{
    suggest_tolerances, BatchOptions, BatchProgress, BatchReport, FileReport, Pipeline,
};
pub use error::AnalysisError;
pub use io::{ingest, Ingested, Recording};
pub use io::output::{update_summary, SummaryTable};
pub use processing::endpoints::{compute_endpoints, EndpointRecord};
pub use processing::{analyze_track, RecordingAnalysis};

use anyhow::Result;
use log::info;
use nalgebra::{distance, DVector};
use rayon::prelude::*;
use std::f64::consts::PI;

use crate::config::{AnalysisConfig, Axis};
use crate::io::track::{CleanedTrack, FrameLandmarks, Landmark};

/// Cubic millimetres to picolitres.
pub const VOLUME_SCALE: f64 = 1e6;

/// Per-frame chamber geometry in physical units.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSeries {
    /// Distance landmark 1 to landmark 5, mm.
    pub long_axis: Vec<f64>,
    /// Distance landmark 3 to landmark 7, mm.
    pub short_axis: Vec<f64>,
    /// Prolate ellipsoid volume, pL.
    pub volume: Vec<f64>,
}

impl MetricSeries {
    pub fn len(&self) -> usize {
        self.volume.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volume.is_empty()
    }

    pub fn axis(&self, axis: Axis) -> &[f64] {
        match axis {
            Axis::Long => &self.long_axis,
            Axis::Short => &self.short_axis,
        }
    }

    /// Population standard deviation of the volume series.
    pub fn volume_std(&self) -> f64 {
        if self.volume.is_empty() {
            return 0.0;
        }
        DVector::from_row_slice(&self.volume).variance().sqrt()
    }
}

/// Axis lengths and volume of a single frame.
pub fn frame_metrics(frame: &FrameLandmarks, conversion_rate: f64) -> (f64, f64, f64) {
    let long_axis = distance(&frame.get(Landmark::L5), &frame.get(Landmark::L1)) / conversion_rate;
    let short_axis = distance(&frame.get(Landmark::L7), &frame.get(Landmark::L3)) / conversion_rate;
    let volume = PI / 6.0 * long_axis * short_axis.powi(2) * VOLUME_SCALE;
    (long_axis, short_axis, volume)
}

/// Converts landmark positions into the physical series, frame by frame.
pub fn derive_series(track: &CleanedTrack, conversion_rate: f64) -> MetricSeries {
    let per_frame: Vec<(f64, f64, f64)> = track
        .frames
        .par_iter()
        .map(|frame| frame_metrics(frame, conversion_rate))
        .collect();

    let mut series = MetricSeries {
        long_axis: Vec::with_capacity(per_frame.len()),
        short_axis: Vec::with_capacity(per_frame.len()),
        volume: Vec::with_capacity(per_frame.len()),
    };
    for (long_axis, short_axis, volume) in per_frame {
        series.long_axis.push(long_axis);
        series.short_axis.push(short_axis);
        series.volume.push(volume);
    }
    series
}

/// Where the peak detection tolerance came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tolerance {
    Supplied(f64),
    /// Standard deviation of the volume series, used when none was given.
    Bootstrapped(f64),
}

impl Tolerance {
    pub fn value(self) -> f64 {
        match self {
            Tolerance::Supplied(t) | Tolerance::Bootstrapped(t) => t,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedMetrics {
    pub series: MetricSeries,
    pub tolerance: Tolerance,
}

/// Derives the metric series using the conversion rate and tolerance of
/// `config`, bootstrapping the tolerance when it is unset.
pub fn derive_metrics(track: &CleanedTrack, config: &AnalysisConfig) -> Result<DerivedMetrics> {
    let conversion_rate = config.conversion_rate()?;
    let series = derive_series(track, conversion_rate);

    let tolerance = match config.tolerance()? {
        Some(t) => Tolerance::Supplied(t),
        None => {
            let t = series.volume_std();
            info!("no tolerance given, using volume standard deviation {}", t);
            Tolerance::Bootstrapped(t)
        }
    };

    Ok(DerivedMetrics { series, tolerance })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;
    use approx::assert_relative_eq;
    use nalgebra::Point2;

    fn reference_frame() -> FrameLandmarks {
        FrameLandmarks::new(
            Point2::new(0.0, 0.0),
            Point2::new(0.0, 0.0),
            Point2::new(3.0, 4.0),
            Point2::new(0.0, 2.0),
        )
    }

    #[test]
    fn test_volume_formula() {
        let (long_axis, short_axis, volume) = frame_metrics(&reference_frame(), 1.0);
        assert_relative_eq!(long_axis, 5.0);
        assert_relative_eq!(short_axis, 2.0);
        assert_relative_eq!(volume, PI / 6.0 * 5.0 * 4.0 * 1e6, epsilon = 1e-6);
        assert_relative_eq!(volume / 1e6, 10.472, epsilon = 1e-3);
    }

    #[test]
    fn test_conversion_rate_scales_axes() {
        let (long_axis, short_axis, volume) = frame_metrics(&reference_frame(), 2.0);
        assert_relative_eq!(long_axis, 2.5);
        assert_relative_eq!(short_axis, 1.0);
        assert_relative_eq!(volume, PI / 6.0 * 2.5 * 1e6, epsilon = 1e-6);
    }

    #[test]
    fn test_series_keeps_frame_order() {
        let mut frames = vec![reference_frame(); 4];
        frames[2] = FrameLandmarks::new(
            Point2::new(0.0, 0.0),
            Point2::new(0.0, 0.0),
            Point2::new(6.0, 8.0),
            Point2::new(0.0, 2.0),
        );
        let series = derive_series(&CleanedTrack { frames }, 1.0);
        assert_eq!(series.len(), 4);
        assert_relative_eq!(series.long_axis[2], 10.0);
        assert_relative_eq!(series.long_axis[3], 5.0);
        assert_eq!(series.axis(Axis::Short), series.short_axis.as_slice());
    }

    #[test]
    fn test_bootstrap_tolerance_is_volume_std() {
        let config = AnalysisConfig {
            conversion_rate: Some(1.0),
            ..Default::default()
        };
        let track = CleanedTrack {
            frames: vec![reference_frame(); 3],
        };
        let derived = derive_metrics(&track, &config).unwrap();
        assert!(matches!(derived.tolerance, Tolerance::Bootstrapped(t) if t < 1e-6));

        let config = AnalysisConfig {
            tolerance: Some(0.5),
            ..config
        };
        let derived = derive_metrics(&track, &config).unwrap();
        assert_eq!(derived.tolerance, Tolerance::Supplied(0.5));
    }

    #[test]
    fn test_volume_std_matches_population_formula() {
        let series = MetricSeries {
            volume: vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0],
            ..Default::default()
        };
        assert_relative_eq!(series.volume_std(), 2.0);
    }

    #[test]
    fn test_missing_conversion_rate() {
        let err = derive_metrics(&CleanedTrack::default(), &AnalysisConfig::default()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<AnalysisError>(),
            Some(&AnalysisError::MissingParameter("conversion_rate"))
        );
    }
}

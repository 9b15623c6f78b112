//! Poincaré plot dispersion of beat-to-beat intervals.

use anyhow::Result;
use log::trace;
use nalgebra::DVector;
use std::f64::consts::SQRT_2;

use crate::error::AnalysisError;

/// Results of Poincare plot metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoincareResult {
    /// Short-term variability, perpendicular to the identity line.
    pub sd1: f64,
    /// Long-term variability, along the identity line.
    pub sd2: f64,
}

#[cfg_attr(test, mockall::automock)]
pub trait PoincareCalculator {
    fn compute(&self, intervals: &[f64]) -> Result<PoincareResult>;
}

/// SD1/SD2 as sample standard deviations of the Poincaré points rotated by 45°.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardPoincare;

impl PoincareCalculator for StandardPoincare {
    fn compute(&self, intervals: &[f64]) -> Result<PoincareResult> {
        if intervals.len() < 3 {
            return Err(AnalysisError::InsufficientExtrema {
                endpoint: "SD1/SD2",
                detail: format!(
                    "at least 3 beat intervals are needed, got {}",
                    intervals.len()
                ),
            }
            .into());
        }

        let rr_points_a = DVector::from_row_slice(&intervals[0..intervals.len() - 1]);
        let rr_points_b = DVector::from_row_slice(&intervals[1..]);

        let across = (&rr_points_b - &rr_points_a) / SQRT_2;
        let along = (&rr_points_b + &rr_points_a) / SQRT_2;
        trace!("Poincare axes: across {:?}, along {:?}", across, along);

        Ok(PoincareResult {
            sd1: sample_std(&across),
            sd2: sample_std(&along),
        })
    }
}

fn sample_std(values: &DVector<f64>) -> f64 {
    let n = values.len() as f64;
    let mean = values.mean();
    let squares: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (squares / (n - 1.0)).sqrt()
}

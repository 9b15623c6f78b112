use anyhow::{anyhow, Result};
use log::{debug, info};
use serde::Serialize;

use crate::config::{Axis, Basis};
use crate::error::AnalysisError;
use crate::processing::metrics::MetricSeries;
use crate::processing::peaks::{Extrema, Extremum};
use crate::processing::poincare::PoincareCalculator;
use crate::utils::utils::{mean, round_to, ALLOWED_DECIMALS, PERCENT_DECIMALS};

/// Clinical endpoints of one recording.
///
/// Volume maxima are read as end-diastolic, minima as end-systolic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EndpointRecord {
    #[serde(rename = "Heart Rate (BPM)")]
    pub heart_rate: f64,
    #[serde(rename = "Stroke Volume")]
    pub stroke_volume: f64,
    #[serde(rename = "Cardiac Output")]
    pub cardiac_output: f64,
    #[serde(rename = "Ejection Fraction (%)")]
    pub ejection_fraction: f64,
    #[serde(rename = "Shortening Fraction (%)")]
    pub shortening_fraction: f64,
    #[serde(rename = "Average EDV")]
    pub average_edv: f64,
    #[serde(rename = "Average ESV")]
    pub average_esv: f64,
    #[serde(rename = "SD1")]
    pub sd1: f64,
    #[serde(rename = "SD2")]
    pub sd2: f64,
}

impl EndpointRecord {
    /// Endpoint names and values in summary column order.
    pub fn entries(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("Heart Rate (BPM)", self.heart_rate),
            ("Stroke Volume", self.stroke_volume),
            ("Cardiac Output", self.cardiac_output),
            ("Ejection Fraction (%)", self.ejection_fraction),
            ("Shortening Fraction (%)", self.shortening_fraction),
            ("Average EDV", self.average_edv),
            ("Average ESV", self.average_esv),
            ("SD1", self.sd1),
            ("SD2", self.sd2),
        ]
    }
}

/// Successive frame differences of `points`, in seconds.
pub fn beat_intervals(points: &[Extremum], frame_rate: f64) -> Vec<f64> {
    points
        .windows(2)
        .map(|w| (w[1].frame as f64 - w[0].frame as f64) / frame_rate)
        .collect()
}

/// True when the first minimum precedes the first maximum.
pub fn starts_in_systole(extrema: &Extrema) -> bool {
    match (extrema.maxima.first(), extrema.minima.first()) {
        (Some(max), Some(min)) => max.frame > min.frame,
        _ => false,
    }
}

/// Pairs each maximum with the minimum that follows it and returns the
/// volume differences.
///
/// A recording that starts in systole has its leading minimum dropped; any
/// surplus at the end of the longer list is ignored.
pub fn pair_strokes(extrema: &Extrema) -> Vec<f64> {
    let skip = usize::from(starts_in_systole(extrema));
    extrema
        .maxima
        .iter()
        .zip(extrema.minima.iter().skip(skip))
        .map(|(max, min)| max.value - min.value)
        .collect()
}

fn values_at(series: &[f64], points: &[Extremum]) -> Result<Vec<f64>> {
    points
        .iter()
        .map(|p| {
            series.get(p.frame).copied().ok_or_else(|| {
                anyhow!(
                    "extremum at frame {} lies outside the series of {} frames",
                    p.frame,
                    series.len()
                )
            })
        })
        .collect()
}

fn insufficient(endpoint: &'static str, detail: String) -> anyhow::Error {
    AnalysisError::InsufficientExtrema { endpoint, detail }.into()
}

/// Derives the endpoint set from edge-filtered extrema of the volume series.
///
/// `basis` selects which extremum list the beat intervals are measured on;
/// `shortening_axis` selects the axis series sampled for the shortening
/// fraction.
pub fn compute_endpoints<C: PoincareCalculator + ?Sized>(
    extrema: &Extrema,
    series: &MetricSeries,
    frame_rate: f64,
    basis: Basis,
    shortening_axis: Axis,
    poincare: &C,
) -> Result<EndpointRecord> {
    if extrema.maxima.is_empty() || extrema.minima.is_empty() {
        return Err(insufficient(
            "Stroke Volume",
            format!(
                "{} maxima and {} minima after edge exclusion",
                extrema.maxima.len(),
                extrema.minima.len()
            ),
        ));
    }

    let basis_points = match basis {
        Basis::Maxima => &extrema.maxima,
        Basis::Minima => &extrema.minima,
    };
    let intervals = beat_intervals(basis_points, frame_rate);
    debug!("{} beat intervals on {}: {:?}", intervals.len(), basis, intervals);

    let maxima_values: Vec<f64> = extrema.maxima.iter().map(|p| p.value).collect();
    let minima_values: Vec<f64> = extrema.minima.iter().map(|p| p.value).collect();
    let average_edv = mean(&maxima_values).unwrap_or_default();
    let average_esv = mean(&minima_values).unwrap_or_default();

    if starts_in_systole(extrema) {
        debug!("recording starts in systole, leading minimum left unpaired");
    }
    let strokes = pair_strokes(extrema);
    let stroke_volume = mean(&strokes).ok_or_else(|| {
        insufficient(
            "Stroke Volume",
            "no maximum is followed by a minimum".to_string(),
        )
    })?;

    let mean_interval = mean(&intervals).ok_or_else(|| {
        insufficient(
            "Heart Rate (BPM)",
            format!("only {} {} found", basis_points.len(), basis),
        )
    })?;
    let heart_rate = 60.0 / mean_interval;
    let cardiac_output = stroke_volume * heart_rate;
    let ejection_fraction = stroke_volume / average_edv * 100.0;

    let axis = series.axis(shortening_axis);
    let at_maxima = mean(&values_at(axis, &extrema.maxima)?).unwrap_or_default();
    let at_minima = mean(&values_at(axis, &extrema.minima)?).unwrap_or_default();
    let shortening_fraction = (at_maxima - at_minima) / at_maxima * 100.0;

    let poincare = poincare.compute(&intervals)?;

    let record = EndpointRecord {
        heart_rate: round_to(heart_rate, ALLOWED_DECIMALS),
        stroke_volume: round_to(stroke_volume, ALLOWED_DECIMALS),
        cardiac_output: round_to(cardiac_output, ALLOWED_DECIMALS),
        ejection_fraction: round_to(ejection_fraction, PERCENT_DECIMALS),
        shortening_fraction: round_to(shortening_fraction, PERCENT_DECIMALS),
        average_edv: round_to(average_edv, ALLOWED_DECIMALS),
        average_esv: round_to(average_esv, ALLOWED_DECIMALS),
        sd1: round_to(poincare.sd1, ALLOWED_DECIMALS),
        sd2: round_to(poincare.sd2, ALLOWED_DECIMALS),
    };
    info!("endpoints: {:?}", record);
    Ok(record)
}

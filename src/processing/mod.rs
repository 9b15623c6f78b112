use anyhow::Context;

pub mod endpoints;
pub mod metrics;
pub mod peaks;
pub mod poincare;

use crate::config::AnalysisConfig;
use crate::io::track::CleanedTrack;
use crate::processing::endpoints::{compute_endpoints, EndpointRecord};
use crate::processing::metrics::{derive_metrics, DerivedMetrics};
use crate::processing::peaks::{find_peaks, Extrema, ExtremumDetector};
use crate::processing::poincare::PoincareCalculator;

/// Everything derived from one recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingAnalysis {
    pub metrics: DerivedMetrics,
    pub extrema: Extrema,
    pub endpoints: EndpointRecord,
}

/// Runs metric derivation, peak alignment and the endpoint engine on a
/// cleaned track.
pub fn analyze_track<D, C>(
    case_name: &str,
    track: &CleanedTrack,
    config: &AnalysisConfig,
    detector: &D,
    poincare: &C,
) -> anyhow::Result<RecordingAnalysis>
where
    D: ExtremumDetector + ?Sized,
    C: PoincareCalculator + ?Sized,
{
    let frame_rate = config.frame_rate()?;

    let metrics = derive_metrics(track, config)
        .with_context(|| format!("deriving metrics of '{}' failed", case_name))?;

    let extrema = find_peaks(
        detector,
        &metrics.series.volume,
        metrics.tolerance.value(),
        &config.peaks,
        config.edge_margin,
    );

    let endpoints = compute_endpoints(
        &extrema,
        &metrics.series,
        frame_rate,
        config.basis,
        config.shortening_axis,
        poincare,
    )
    .with_context(|| format!("computing endpoints of '{}' failed", case_name))?;

    Ok(RecordingAnalysis {
        metrics,
        extrema,
        endpoints,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;
    use crate::io::track::FrameLandmarks;
    use crate::processing::peaks::ToleranceDetector;
    use crate::processing::poincare::StandardPoincare;
    use crate::utils::test_utils::beating_frames;
    use approx::assert_relative_eq;
    use nalgebra::Point2;

    fn beating_track(frames: usize, period: f64) -> CleanedTrack {
        CleanedTrack {
            frames: beating_frames(frames, period)
                .into_iter()
                .map(|f| {
                    FrameLandmarks::new(
                        Point2::new(f[0], f[1]),
                        Point2::new(f[2], f[3]),
                        Point2::new(f[4], f[5]),
                        Point2::new(f[6], f[7]),
                    )
                })
                .collect(),
        }
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            conversion_rate: Some(2200.0),
            frame_rate: Some(30.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_regular_beat_with_bootstrap_tolerance() {
        // 15 frame period at 30 fps: 120 beats per minute
        let track = beating_track(150, 15.0);
        let analysis =
            analyze_track("fish", &track, &config(), &ToleranceDetector, &StandardPoincare)
                .unwrap();

        assert_eq!(analysis.metrics.series.len(), 150);
        assert!(analysis
            .extrema
            .maxima
            .iter()
            .chain(analysis.extrema.minima.iter())
            .all(|p| p.frame >= 10 && p.frame <= 140));
        assert_relative_eq!(analysis.endpoints.heart_rate, 120.0, epsilon = 1.0);
        assert!(analysis.endpoints.stroke_volume > 0.0);
        assert!(analysis.endpoints.ejection_fraction > 0.0);
        assert!(analysis.endpoints.ejection_fraction < 100.0);
        assert!(analysis.endpoints.shortening_fraction > 0.0);
    }

    #[test]
    fn test_missing_frame_rate() {
        let config = AnalysisConfig {
            frame_rate: None,
            ..config()
        };
        let err = analyze_track(
            "fish",
            &beating_track(60, 15.0),
            &config,
            &ToleranceDetector,
            &StandardPoincare,
        )
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<AnalysisError>(),
            Some(&AnalysisError::MissingParameter("frame_rate"))
        );
    }
}

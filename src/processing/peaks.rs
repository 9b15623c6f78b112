use log::{debug, info};

use crate::config::PeakOptions;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extremum {
    pub frame: usize,
    pub value: f64,
}

/// Maxima and minima of a series, each ordered by frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extrema {
    pub maxima: Vec<Extremum>,
    pub minima: Vec<Extremum>,
}

/// Finds local maxima and minima of a series.
///
/// A larger tolerance yields fewer, more significant extrema.
#[cfg_attr(test, mockall::automock)]
pub trait ExtremumDetector {
    fn detect(&self, series: &[f64], tolerance: f64) -> Extrema;
}

/// Delta peak detector.
///
/// A maximum is confirmed once the series has fallen more than `tolerance`
/// below it, a minimum once the series has risen more than `tolerance` above
/// it. Detection starts by looking for a maximum.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToleranceDetector;

impl ExtremumDetector for ToleranceDetector {
    fn detect(&self, series: &[f64], tolerance: f64) -> Extrema {
        let mut extrema = Extrema::default();
        let mut max = Extremum {
            frame: 0,
            value: f64::NEG_INFINITY,
        };
        let mut min = Extremum {
            frame: 0,
            value: f64::INFINITY,
        };
        let mut look_for_max = true;

        for (frame, &value) in series.iter().enumerate() {
            if value > max.value {
                max = Extremum { frame, value };
            }
            if value < min.value {
                min = Extremum { frame, value };
            }

            if look_for_max {
                if value < max.value - tolerance {
                    extrema.maxima.push(max);
                    min = Extremum { frame, value };
                    look_for_max = false;
                }
            } else if value > min.value + tolerance {
                extrema.minima.push(min);
                max = Extremum { frame, value };
                look_for_max = true;
            }
        }
        extrema
    }
}

impl Extrema {
    /// Applies the optional value window on maxima and the minimum spacing
    /// between extrema of the same kind.
    pub fn refine(self, options: &PeakOptions) -> Extrema {
        let mut maxima = self.maxima;
        let mut minima = self.minima;

        if let Some(low) = options.min_maxima_value {
            maxima.retain(|p| p.value >= low);
        }
        if let Some(high) = options.max_maxima_value {
            maxima.retain(|p| p.value <= high);
        }
        if let Some(distance) = options.min_peak_distance {
            maxima = enforce_spacing(maxima, distance, |a, b| a.value > b.value);
            minima = enforce_spacing(minima, distance, |a, b| a.value < b.value);
        }

        Extrema { maxima, minima }
    }

    /// Drops extrema closer than `margin` frames to either end of a series of
    /// `frames` samples. Kept frames lie in `[margin, frames - margin]`.
    pub fn exclude_edges(self, frames: usize, margin: usize) -> Extrema {
        let last = frames.saturating_sub(margin);
        let inside = |p: &Extremum| p.frame >= margin && p.frame <= last;
        Extrema {
            maxima: self.maxima.into_iter().filter(inside).collect(),
            minima: self.minima.into_iter().filter(inside).collect(),
        }
    }
}

/// Keeps the more prominent of two extrema closer than `distance` frames.
fn enforce_spacing<F>(points: Vec<Extremum>, distance: usize, more_prominent: F) -> Vec<Extremum>
where
    F: Fn(&Extremum, &Extremum) -> bool,
{
    let mut kept: Vec<Extremum> = Vec::with_capacity(points.len());
    for point in points {
        match kept.last_mut() {
            Some(last) if point.frame.saturating_sub(last.frame) < distance => {
                if more_prominent(&point, last) {
                    *last = point;
                }
            }
            _ => kept.push(point),
        }
    }
    kept
}

/// Detects, refines and edge-filters the extrema of `series`.
pub fn find_peaks<D: ExtremumDetector + ?Sized>(
    detector: &D,
    series: &[f64],
    tolerance: f64,
    options: &PeakOptions,
    edge_margin: usize,
) -> Extrema {
    let detected = detector.detect(series, tolerance);
    debug!(
        "detected {} maxima and {} minima with tolerance {}",
        detected.maxima.len(),
        detected.minima.len(),
        tolerance
    );

    let extrema = detected
        .refine(options)
        .exclude_edges(series.len(), edge_margin);
    info!(
        "{} maxima and {} minima kept after excluding {} edge frames",
        extrema.maxima.len(),
        extrema.minima.len(),
        edge_margin
    );
    extrema
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::sine_series;

    fn at(frames: &[usize]) -> Vec<Extremum> {
        frames
            .iter()
            .map(|&frame| Extremum {
                frame,
                value: frame as f64,
            })
            .collect()
    }

    #[test]
    fn test_edge_exclusion() {
        let extrema = Extrema {
            maxima: at(&[5, 50, 95]),
            minima: at(&[9, 10, 90, 91]),
        }
        .exclude_edges(100, 10);
        assert_eq!(extrema.maxima, at(&[50]));
        assert_eq!(extrema.minima, at(&[10, 90]));
    }

    #[test]
    fn test_edge_exclusion_on_short_series() {
        let extrema = Extrema {
            maxima: at(&[3, 8]),
            minima: at(&[5]),
        }
        .exclude_edges(12, 10);
        assert!(extrema.maxima.is_empty());
        assert!(extrema.minima.is_empty());
    }

    #[test]
    fn test_detector_finds_sine_extrema() {
        // period of 20 frames: maxima at 5, 25, 45, ...; minima at 15, 35, ...
        let series = sine_series(100, 20.0, 10.0, 1.0);
        let extrema = ToleranceDetector.detect(&series, 0.5);
        let maxima: Vec<usize> = extrema.maxima.iter().map(|p| p.frame).collect();
        let minima: Vec<usize> = extrema.minima.iter().map(|p| p.frame).collect();
        assert_eq!(maxima, vec![5, 25, 45, 65, 85]);
        assert_eq!(minima, vec![15, 35, 55, 75, 95]);
    }

    #[test]
    fn test_large_tolerance_suppresses_extrema() {
        let series = sine_series(100, 20.0, 10.0, 1.0);
        let extrema = ToleranceDetector.detect(&series, 5.0);
        assert!(extrema.maxima.is_empty());
        assert!(extrema.minima.is_empty());
    }

    #[test]
    fn test_refine_value_window_and_spacing() {
        let extrema = Extrema {
            maxima: vec![
                Extremum { frame: 10, value: 5.0 },
                Extremum { frame: 12, value: 6.0 },
                Extremum { frame: 30, value: 50.0 },
                Extremum { frame: 40, value: 4.0 },
            ],
            minima: vec![
                Extremum { frame: 20, value: 1.0 },
                Extremum { frame: 22, value: 2.0 },
            ],
        };
        let options = PeakOptions {
            min_peak_distance: Some(5),
            min_maxima_value: Some(4.5),
            max_maxima_value: Some(10.0),
        };
        let refined = extrema.refine(&options);
        assert_eq!(refined.maxima, vec![Extremum { frame: 12, value: 6.0 }]);
        assert_eq!(refined.minima, vec![Extremum { frame: 20, value: 1.0 }]);
    }

    #[test]
    fn test_find_peaks_uses_detector_output() {
        let mut detector = MockExtremumDetector::new();
        detector
            .expect_detect()
            .withf(|series, tolerance| series.len() == 100 && *tolerance == 2.0)
            .times(1)
            .returning(|_, _| Extrema {
                maxima: at(&[2, 40, 80]),
                minima: at(&[20, 60, 98]),
            });

        let series = vec![0.0; 100];
        let extrema = find_peaks(&detector, &series, 2.0, &PeakOptions::default(), 10);
        assert_eq!(extrema.maxima, at(&[40, 80]));
        assert_eq!(extrema.minima, at(&[20, 60]));
    }
}

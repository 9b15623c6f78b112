use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};

/// Writes `content` to `dir/name` and returns the path.
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

/// `mean + amplitude * sin(2π i / period)` for `frames` samples.
pub fn sine_series(frames: usize, period: f64, mean: f64, amplitude: f64) -> Vec<f64> {
    (0..frames)
        .map(|i| mean + amplitude * (2.0 * PI * i as f64 / period).sin())
        .collect()
}

/// Rows of a pose-tracking export: scorer row, two header rows, then one row
/// per frame. Each frame gives `[l1x, l1y, l3x, l3y, l5x, l5y, l7x, l7y]`;
/// the export also carries the odd landmarks 2, 4, 6, 8 and a likelihood per
/// landmark, like the real tool does.
pub fn dlc_export_rows(frames: &[[f64; 8]]) -> Vec<Vec<String>> {
    let scorer = "DLC_resnet50_heartJan1shuffle1_100000";
    let mut scorer_row = vec!["scorer".to_string()];
    let mut parts_row = vec!["bodyparts".to_string()];
    let mut coords_row = vec!["coords".to_string()];
    for landmark in 1..=8 {
        for coord in ["x", "y", "likelihood"] {
            scorer_row.push(scorer.to_string());
            parts_row.push(format!("heart{}", landmark));
            coords_row.push(coord.to_string());
        }
    }

    let mut rows = vec![scorer_row, parts_row, coords_row];
    for (i, frame) in frames.iter().enumerate() {
        let mut row = vec![i.to_string()];
        for landmark in 1..=8 {
            let (x, y) = match landmark {
                1 => (frame[0], frame[1]),
                3 => (frame[2], frame[3]),
                5 => (frame[4], frame[5]),
                7 => (frame[6], frame[7]),
                other => (100.0 + other as f64, 200.0),
            };
            row.push(x.to_string());
            row.push(y.to_string());
            row.push("0.99".to_string());
        }
        rows.push(row);
    }
    rows
}

pub fn dlc_export_csv(frames: &[[f64; 8]]) -> String {
    dlc_export_rows(frames)
        .iter()
        .map(|row| row.join(","))
        .collect::<Vec<_>>()
        .join("\n")
        + "\n"
}

/// Landmarks of a chamber whose long and short axes pulse in phase with the
/// given period, in pixels.
pub fn beating_frames(frames: usize, period: f64) -> Vec<[f64; 8]> {
    (0..frames)
        .map(|i| {
            let phase = (2.0 * PI * i as f64 / period).sin();
            let long_axis = 100.0 + 10.0 * phase;
            let half_short = 20.0 + 4.0 * phase;
            [
                50.0,
                50.0,
                50.0 - half_short,
                50.0 + long_axis / 2.0,
                50.0,
                50.0 + long_axis,
                50.0 + half_short,
                50.0 + long_axis / 2.0,
            ]
        })
        .collect()
}

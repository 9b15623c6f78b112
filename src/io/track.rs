use anyhow::Result;
use nalgebra::Point2;

use super::table::Table;
use crate::error::AnalysisError;

/// The four tracked points used for the chamber axes.
///
/// 1 and 5 span the long axis, 3 and 7 the short axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Landmark {
    L1,
    L3,
    L5,
    L7,
}

impl Landmark {
    pub const ALL: [Landmark; 4] = [Landmark::L1, Landmark::L3, Landmark::L5, Landmark::L7];

    pub fn number(self) -> u8 {
        match self {
            Landmark::L1 => 1,
            Landmark::L3 => 3,
            Landmark::L5 => 5,
            Landmark::L7 => 7,
        }
    }

    pub fn token(self, prefix: &str) -> String {
        format!("{}{}", prefix.to_lowercase(), self.number())
    }

    fn slot(self) -> usize {
        match self {
            Landmark::L1 => 0,
            Landmark::L3 => 1,
            Landmark::L5 => 2,
            Landmark::L7 => 3,
        }
    }
}

/// Landmark coordinates of one frame, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameLandmarks {
    points: [Point2<f64>; 4],
}

impl FrameLandmarks {
    pub fn new(l1: Point2<f64>, l3: Point2<f64>, l5: Point2<f64>, l7: Point2<f64>) -> Self {
        FrameLandmarks {
            points: [l1, l3, l5, l7],
        }
    }

    pub fn get(&self, landmark: Landmark) -> Point2<f64> {
        self.points[landmark.slot()]
    }
}

/// Per-frame landmark positions of one recording.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanedTrack {
    pub frames: Vec<FrameLandmarks>,
}

impl CleanedTrack {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Builds the track from a reconstructed table, keeping only the
    /// designated landmark columns.
    pub fn from_table(table: Table, prefix: &str) -> Result<CleanedTrack> {
        let table = filter_landmark_columns(table, prefix);

        let mut columns = [[0usize; 2]; 4];
        for landmark in Landmark::ALL {
            for (axis_idx, axis) in ["x", "y"].iter().enumerate() {
                let name = format!("{}_{}", landmark.token(prefix), axis);
                columns[landmark.slot()][axis_idx] =
                    table.column_index(&name).ok_or_else(|| {
                        AnalysisError::SchemaMismatch(format!(
                            "required column '{}' not found, available: {:?}",
                            name, table.headers
                        ))
                    })?;
            }
        }

        let mut frames = Vec::with_capacity(table.n_rows());
        for (row_idx, row) in table.rows.iter().enumerate() {
            let mut points = [Point2::origin(); 4];
            for landmark in Landmark::ALL {
                let [cx, cy] = columns[landmark.slot()];
                points[landmark.slot()] = Point2::new(
                    parse_cell(row, cx, row_idx, &table.headers)?,
                    parse_cell(row, cy, row_idx, &table.headers)?,
                );
            }
            frames.push(FrameLandmarks { points });
        }

        Ok(CleanedTrack { frames })
    }
}

/// Keeps the columns naming one of the designated landmarks.
pub fn filter_landmark_columns(table: Table, prefix: &str) -> Table {
    let tokens: Vec<String> = Landmark::ALL.iter().map(|l| l.token(prefix)).collect();
    table.retain_columns(|header| {
        let header = header.to_lowercase();
        tokens.iter().any(|t| header.contains(t.as_str()))
    })
}

fn parse_cell(row: &[String], col: usize, row_idx: usize, headers: &[String]) -> Result<f64> {
    let cell = row.get(col).map(String::as_str).unwrap_or("");
    cell.parse::<f64>().map_err(|_| {
        AnalysisError::SchemaMismatch(format!(
            "non-numeric value '{}' in column '{}' at frame {}",
            cell, headers[col], row_idx
        ))
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::input::RawTable;
    use crate::utils::test_utils::dlc_export_rows;

    fn table_with_extras() -> Table {
        Table::from_raw(RawTable::from_rows(dlc_export_rows(&[
            [0.0, 0.0, 0.0, 0.0, 3.0, 4.0, 0.0, 2.0],
            [1.0, 1.0, 0.0, 0.0, 4.0, 5.0, 0.0, 3.0],
        ])))
    }

    #[test]
    fn test_filter_keeps_exactly_the_landmark_axes() {
        let table = filter_landmark_columns(table_with_extras(), "heart");
        let mut headers = table.headers.clone();
        headers.sort();
        assert_eq!(
            headers,
            vec![
                "heart1_x", "heart1_y", "heart3_x", "heart3_y", "heart5_x", "heart5_y",
                "heart7_x", "heart7_y"
            ]
        );
    }

    #[test]
    fn test_track_from_table() {
        let track = CleanedTrack::from_table(table_with_extras(), "heart").unwrap();
        assert_eq!(track.len(), 2);
        assert_eq!(track.frames[0].get(Landmark::L5), Point2::new(3.0, 4.0));
        assert_eq!(track.frames[1].get(Landmark::L1), Point2::new(1.0, 1.0));
        assert_eq!(track.frames[1].get(Landmark::L7), Point2::new(0.0, 3.0));
    }

    #[test]
    fn test_missing_landmark_is_schema_mismatch() {
        let table = Table {
            headers: vec!["heart1_x".into(), "heart1_y".into()],
            rows: vec![vec!["1".into(), "2".into()]],
        };
        let err = CleanedTrack::from_table(table, "heart").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_non_numeric_cell_is_schema_mismatch() {
        let mut table = table_with_extras();
        let col = table.column_index("heart3_y").unwrap();
        table.rows[1][col] = "n/a".to_string();
        let err = CleanedTrack::from_table(table, "heart").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::SchemaMismatch(msg)) if msg.contains("heart3_y")
        ));
    }
}

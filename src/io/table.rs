//! Header reconstruction for pose-tracking exports.
//!
//! Exports carry an optional `scorer` row followed by two header rows, body
//! part and coordinate, e.g.
//!
//! ```text
//! scorer,     DLC_resnet50, DLC_resnet50, DLC_resnet50
//! bodyparts,  heart1,       heart1,       heart1
//! coords,     x,            y,            likelihood
//! 0,          101.2,        55.0,         0.99
//! ```
//!
//! which becomes a single header `bodyparts_coords, heart1_x, heart1_y` once
//! likelihood columns are dropped.

use log::debug;

use super::input::RawTable;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Builds a single-header table from raw export rows.
    ///
    /// The second physical row is only merged into the header when it holds
    /// a non-numeric label, so a table that already has one header row comes
    /// back unchanged.
    pub fn from_raw(raw: RawTable) -> Table {
        let mut rows = raw.rows.into_iter().peekable();

        if let Some(first) = rows.peek() {
            if first.iter().any(|cell| cell.to_lowercase().contains("scorer")) {
                rows.next();
            }
        }

        let Some(top) = rows.next() else {
            return Table::default();
        };

        let two_header_rows = rows.peek().is_some_and(|row| is_label_row(row));
        let headers = if two_header_rows {
            let second = rows.next().unwrap_or_default();
            (0..top.len().max(second.len()))
                .map(|i| {
                    let above = top.get(i).map(String::as_str).unwrap_or("");
                    match second.get(i).map(String::as_str) {
                        Some(below) if !below.is_empty() => format!("{}_{}", above, below),
                        _ => above.to_string(),
                    }
                })
                .collect()
        } else {
            top
        };

        let table = Table {
            headers,
            rows: rows.collect(),
        }
        .drop_likelihood();
        debug!("reconstructed columns: {:?}", table.headers);
        table
    }

    /// Removes every column whose header mentions "likelihood".
    pub fn drop_likelihood(self) -> Table {
        self.retain_columns(|header| !header.to_lowercase().contains("likelihood"))
    }

    pub fn retain_columns<F>(self, keep: F) -> Table
    where
        F: Fn(&str) -> bool,
    {
        let kept: Vec<usize> = self
            .headers
            .iter()
            .enumerate()
            .filter(|(_, h)| keep(h))
            .map(|(i, _)| i)
            .collect();

        let pick = |row: &Vec<String>| -> Vec<String> {
            kept.iter()
                .map(|&i| row.get(i).cloned().unwrap_or_default())
                .collect()
        };

        Table {
            headers: pick(&self.headers),
            rows: self.rows.iter().map(pick).collect(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        let name = name.to_lowercase();
        self.headers.iter().position(|h| h.to_lowercase() == name)
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }
}

fn is_label_row(row: &[String]) -> bool {
    row.iter()
        .any(|cell| !cell.is_empty() && cell.parse::<f64>().is_err())
}

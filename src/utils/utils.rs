/// Decimals kept for most endpoints.
pub const ALLOWED_DECIMALS: i32 = 4;
/// Decimals kept for percentages.
pub const PERCENT_DECIMALS: i32 = 2;

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(72.123456, 4), 72.1235);
        assert_eq!(round_to(66.666666, 2), 66.67);
        assert_eq!(round_to(-0.00004, 4), -0.0);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[1.0, 2.0, 6.0]), Some(3.0));
    }
}

//! Pure calculations over records already fetched from the store.

pub mod aggregate;
pub mod composite;
pub mod eligibility;
pub mod rank;

/// Half-up rounding to one decimal: `Int(10*x + 0.5) / 10`.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

/// Half-up rounding to two decimals, used for composite scores.
pub fn round_off_2_decimals(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

/// Ratio as a percentage, with the denominator floored at 1.
pub fn percent_of(numerator: f64, denominator: f64) -> f64 {
    100.0 * numerator / denominator.max(1.0)
}

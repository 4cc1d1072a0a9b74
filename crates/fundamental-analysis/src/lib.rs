pub mod derived;
pub mod normalizer;
pub mod ratios;
pub mod valuation;

pub use derived::{combine, ebitda, enterprise_value, free_cash_flow, PeriodValues};
pub use normalizer::{is_annual_form, FactNormalizer};
pub use ratios::{guarded_ratio, RatioCalculator, RatioInputs};
pub use valuation::ValuationModel;


/// Rounds to two decimal places, the precision of every reported figure.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

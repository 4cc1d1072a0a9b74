//! Two-stage discounted cash flow.
//!
//! A Gordon-growth terminal value on next year's cash flow, added to the
//! base cash flow and discounted back over the projection horizon.

use analysis_core::{AnalysisError, ValuationInputs, ValuationResult};

pub const MIN_GROWTH_RATE: f64 = 0.0;
pub const MAX_GROWTH_RATE: f64 = 0.05;
pub const MIN_DISCOUNT_RATE: f64 = 0.05;
pub const MAX_DISCOUNT_RATE: f64 = 0.15;

#[derive(Debug, Clone, Copy, Default)]
pub struct ValuationModel;

impl ValuationModel {
    pub fn new() -> Self {
        Self
    }

    pub fn project(&self, inputs: &ValuationInputs) -> Result<ValuationResult, AnalysisError> {
        self.validate(inputs)?;

        let ValuationInputs {
            base_cash_flow,
            growth_rate,
            discount_rate,
            shares_outstanding,
            projection_years,
            current_price,
        } = *inputs;

        let terminal_value = base_cash_flow * (1.0 + growth_rate) / (discount_rate - growth_rate);
        let discount_factor = (1.0 + discount_rate).powi(projection_years as i32);
        let intrinsic_value = (base_cash_flow + terminal_value) / discount_factor;
        let fair_value_per_share = intrinsic_value / shares_outstanding;

        let upside_pct = current_price
            .filter(|price| price.is_finite() && *price > 0.0)
            .map(|price| (fair_value_per_share / price - 1.0) * 100.0);

        tracing::debug!(
            "DCF: tv={:.0} intrinsic={:.0} fair/share={:.2}",
            terminal_value,
            intrinsic_value,
            fair_value_per_share
        );

        Ok(ValuationResult {
            terminal_value,
            intrinsic_value,
            fair_value_per_share,
            upside_pct,
        })
    }

    fn validate(&self, inputs: &ValuationInputs) -> Result<(), AnalysisError> {
        let scalars = [
            inputs.base_cash_flow,
            inputs.growth_rate,
            inputs.discount_rate,
            inputs.shares_outstanding,
        ];
        if scalars.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::domain("non-finite valuation input"));
        }
        if inputs.discount_rate <= inputs.growth_rate {
            return Err(AnalysisError::domain("invalid growth/discount spread"));
        }
        if inputs.base_cash_flow <= 0.0 {
            return Err(AnalysisError::domain("non-positive cash flow base"));
        }
        if inputs.shares_outstanding <= 0.0 {
            return Err(AnalysisError::domain("non-positive shares outstanding"));
        }
        if !(MIN_GROWTH_RATE..=MAX_GROWTH_RATE).contains(&inputs.growth_rate) {
            return Err(AnalysisError::domain("growth rate out of range"));
        }
        if !(MIN_DISCOUNT_RATE..=MAX_DISCOUNT_RATE).contains(&inputs.discount_rate) {
            return Err(AnalysisError::domain("discount rate out of range"));
        }
        if inputs.projection_years != ValuationInputs::PROJECTION_YEARS {
            return Err(AnalysisError::domain(format!(
                "projection horizon must be {} years",
                ValuationInputs::PROJECTION_YEARS
            )));
        }
        Ok(())
    }
}

use analysis_core::{GapReason, NormalizedSeries, PeriodKey, RatioKind, RatioSet, RatioValue};
use std::collections::HashMap;

use crate::derived::PeriodValues;
use crate::round2;

/// Operands for [`RatioCalculator::compute`]. Series hold raw (unscaled)
/// values so ratios never mix display units.
#[derive(Debug, Clone, Default)]
pub struct RatioInputs {
    pub revenue: PeriodValues,
    pub net_income: PeriodValues,
    pub stockholders_equity: PeriodValues,
    pub total_assets: PeriodValues,
    pub ebitda: PeriodValues,
    /// Point-in-time scalar; `None` when no market price is available.
    pub enterprise_value: Option<f64>,
}

impl RatioInputs {
    pub fn from_series(
        revenue: &NormalizedSeries,
        net_income: &NormalizedSeries,
        stockholders_equity: &NormalizedSeries,
        total_assets: &NormalizedSeries,
    ) -> Self {
        Self {
            revenue: revenue.values(),
            net_income: net_income.values(),
            stockholders_equity: stockholders_equity.values(),
            total_assets: total_assets.values(),
            ..Self::default()
        }
    }

    pub fn with_ebitda(mut self, ebitda: PeriodValues) -> Self {
        self.ebitda = ebitda;
        self
    }

    pub fn with_enterprise_value(mut self, enterprise_value: Option<f64>) -> Self {
        self.enterprise_value = enterprise_value;
        self
    }
}

/// Divides with the gap rules applied: non-finite operands or results and
/// zero denominators become explicit markers, never NaN.
pub fn guarded_ratio(kind: RatioKind, numerator: f64, denominator: f64) -> RatioValue {
    if !numerator.is_finite() || !denominator.is_finite() {
        return RatioValue::NotComputable(GapReason::NonFinite);
    }
    if denominator == 0.0 {
        return RatioValue::NotComputable(GapReason::ZeroDenominator);
    }

    let mut value = numerator / denominator;
    if kind.is_percentage() {
        value *= 100.0;
    }
    if value.is_finite() {
        RatioValue::Computed(round2(value))
    } else {
        RatioValue::NotComputable(GapReason::NonFinite)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RatioCalculator;

impl RatioCalculator {
    pub fn new() -> Self {
        Self
    }

    pub fn compute(&self, inputs: &RatioInputs) -> RatioSet {
        let mut set = RatioSet::default();

        self.per_period(&mut set, RatioKind::NetMargin, &inputs.net_income, &inputs.revenue);
        self.per_period(
            &mut set,
            RatioKind::ReturnOnEquity,
            &inputs.net_income,
            &inputs.stockholders_equity,
        );
        self.per_period(&mut set, RatioKind::ReturnOnAssets, &inputs.net_income, &inputs.total_assets);
        self.per_period(&mut set, RatioKind::AssetTurnover, &inputs.revenue, &inputs.total_assets);

        // EV is a current scalar, so only the latest EBITDA period pairs with it.
        if let Some((period, ebitda)) = inputs.ebitda.iter().max_by_key(|(p, _)| *p) {
            let value = match inputs.enterprise_value {
                Some(ev) => guarded_ratio(RatioKind::EvToEbitda, ev, *ebitda),
                None => RatioValue::NotComputable(GapReason::MissingInput),
            };
            set.insert(RatioKind::EvToEbitda, *period, value);
        }

        set.sort();
        set
    }

    /// Inner join on period: a period absent from either side gets no entry.
    fn per_period(
        &self,
        set: &mut RatioSet,
        kind: RatioKind,
        numerator: &[(PeriodKey, f64)],
        denominator: &[(PeriodKey, f64)],
    ) {
        let denominators: HashMap<PeriodKey, f64> = denominator.iter().copied().collect();
        for (period, num) in numerator {
            if let Some(den) = denominators.get(period) {
                set.insert(kind, *period, guarded_ratio(kind, *num, *den));
            }
        }
    }
}

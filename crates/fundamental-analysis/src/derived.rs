//! Series combinators for metrics no filer reports directly.

use analysis_core::PeriodKey;
use std::collections::HashMap;

/// Raw values keyed by period, ascending.
pub type PeriodValues = Vec<(PeriodKey, f64)>;

/// Inner join of two series by period. Order follows `left`.
pub fn combine<F>(left: &[(PeriodKey, f64)], right: &[(PeriodKey, f64)], op: F) -> PeriodValues
where
    F: Fn(f64, f64) -> f64,
{
    let right: HashMap<PeriodKey, f64> = right.iter().copied().collect();
    left.iter()
        .filter_map(|(period, l)| right.get(period).map(|r| (*period, op(*l, *r))))
        .collect()
}

pub fn ebitda(operating_income: &[(PeriodKey, f64)], depreciation: &[(PeriodKey, f64)]) -> PeriodValues {
    combine(operating_income, depreciation, |oi, da| oi + da)
}

/// Operating cash flow less capital expenditure. Filers that report no
/// capex series get operating cash flow unchanged.
pub fn free_cash_flow(
    operating_cash_flow: &[(PeriodKey, f64)],
    capital_expenditure: &[(PeriodKey, f64)],
) -> PeriodValues {
    if capital_expenditure.is_empty() {
        return operating_cash_flow.to_vec();
    }
    combine(operating_cash_flow, capital_expenditure, |ocf, capex| ocf - capex.abs())
}

/// Market capitalisation plus long-term debt less cash. Requires a price;
/// absent debt or cash count as zero.
pub fn enterprise_value(
    price: Option<f64>,
    shares_outstanding: f64,
    long_term_debt: Option<f64>,
    cash: Option<f64>,
) -> Option<f64> {
    let price = price.filter(|p| p.is_finite() && *p > 0.0)?;
    let ev = price * shares_outstanding + long_term_debt.unwrap_or(0.0) - cash.unwrap_or(0.0);
    ev.is_finite().then_some(ev)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fy(year: i32, value: f64) -> (PeriodKey, f64) {
        (PeriodKey::FiscalYear(year), value)
    }

    #[test]
    fn test_ebitda_joins_on_common_years() {
        let operating = vec![fy(2021, 100.0), fy(2022, 120.0), fy(2023, 130.0)];
        let depreciation = vec![fy(2022, 10.0), fy(2023, 12.0)];

        let result = ebitda(&operating, &depreciation);
        assert_eq!(result, vec![fy(2022, 130.0), fy(2023, 142.0)]);
    }

    #[test]
    fn test_free_cash_flow_subtracts_capex() {
        let ocf = vec![fy(2022, 110.0), fy(2023, 120.0)];
        let capex = vec![fy(2022, 10.0), fy(2023, 11.0)];
        assert_eq!(free_cash_flow(&ocf, &capex), vec![fy(2022, 100.0), fy(2023, 109.0)]);
    }

    #[test]
    fn test_free_cash_flow_treats_signed_capex_as_outflow() {
        let ocf = vec![fy(2023, 120.0)];
        let capex = vec![fy(2023, -11.0)];
        assert_eq!(free_cash_flow(&ocf, &capex), vec![fy(2023, 109.0)]);
    }

    #[test]
    fn test_free_cash_flow_without_capex_is_operating_cash_flow() {
        let ocf = vec![fy(2022, 110.0), fy(2023, 120.0)];
        assert_eq!(free_cash_flow(&ocf, &[]), ocf);
    }

    #[test]
    fn test_enterprise_value() {
        assert_eq!(
            enterprise_value(Some(10.0), 1_000.0, Some(500.0), Some(200.0)),
            Some(10_300.0)
        );
        assert_eq!(enterprise_value(Some(10.0), 1_000.0, None, None), Some(10_000.0));
        assert_eq!(enterprise_value(None, 1_000.0, Some(500.0), None), None);
        assert_eq!(enterprise_value(Some(0.0), 1_000.0, None, None), None);
    }
}

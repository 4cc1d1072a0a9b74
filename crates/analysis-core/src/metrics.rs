use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Provider;

/// Standard metrics with their tag candidates per provider, highest priority
/// first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Revenue,
    NetIncome,
    OperatingIncome,
    StockholdersEquity,
    TotalAssets,
    TotalLiabilities,
    OperatingCashFlow,
    CapitalExpenditure,
    DepreciationAmortization,
    Cash,
    LongTermDebt,
    SharesOutstanding,
}

impl Metric {
    pub const ALL: [Metric; 12] = [
        Metric::Revenue,
        Metric::NetIncome,
        Metric::OperatingIncome,
        Metric::StockholdersEquity,
        Metric::TotalAssets,
        Metric::TotalLiabilities,
        Metric::OperatingCashFlow,
        Metric::CapitalExpenditure,
        Metric::DepreciationAmortization,
        Metric::Cash,
        Metric::LongTermDebt,
        Metric::SharesOutstanding,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Revenue => "revenue",
            Metric::NetIncome => "net_income",
            Metric::OperatingIncome => "operating_income",
            Metric::StockholdersEquity => "stockholders_equity",
            Metric::TotalAssets => "total_assets",
            Metric::TotalLiabilities => "total_liabilities",
            Metric::OperatingCashFlow => "operating_cash_flow",
            Metric::CapitalExpenditure => "capital_expenditure",
            Metric::DepreciationAmortization => "depreciation_amortization",
            Metric::Cash => "cash",
            Metric::LongTermDebt => "long_term_debt",
            Metric::SharesOutstanding => "shares_outstanding",
        }
    }

    pub fn tag_candidates(&self, provider: Provider) -> &'static [&'static str] {
        match provider {
            Provider::Sec => self.sec_tags(),
            Provider::Polygon => self.polygon_fields(),
        }
    }

    fn sec_tags(&self) -> &'static [&'static str] {
        match self {
            Metric::Revenue => &[
                "Revenues",
                "RevenueFromContractWithCustomerExcludingAssessedTax",
                "SalesRevenueNet",
                "RevenueFromContractWithCustomerIncludingAssessedTax",
            ],
            Metric::NetIncome => &[
                "NetIncomeLoss",
                "ProfitLoss",
                "NetIncomeLossAvailableToCommonStockholdersBasic",
            ],
            Metric::OperatingIncome => &["OperatingIncomeLoss"],
            Metric::StockholdersEquity => &[
                "StockholdersEquity",
                "StockholdersEquityIncludingPortionAttributableToNoncontrollingInterest",
            ],
            Metric::TotalAssets => &["Assets"],
            Metric::TotalLiabilities => &["Liabilities"],
            Metric::OperatingCashFlow => &[
                "NetCashProvidedByUsedInOperatingActivities",
                "NetCashProvidedByUsedInOperatingActivitiesContinuingOperations",
            ],
            Metric::CapitalExpenditure => &[
                "PaymentsToAcquirePropertyPlantAndEquipment",
                "PaymentsToAcquireProductiveAssets",
            ],
            Metric::DepreciationAmortization => &[
                "DepreciationDepletionAndAmortization",
                "DepreciationAndAmortization",
                "Depreciation",
            ],
            Metric::Cash => &[
                "CashAndCashEquivalentsAtCarryingValue",
                "CashCashEquivalentsRestrictedCashAndRestrictedCashEquivalents",
            ],
            Metric::LongTermDebt => &["LongTermDebt", "LongTermDebtNoncurrent"],
            Metric::SharesOutstanding => &[
                "EntityCommonStockSharesOutstanding",
                "CommonStockSharesOutstanding",
                "WeightedAverageNumberOfDilutedSharesOutstanding",
            ],
        }
    }

    fn polygon_fields(&self) -> &'static [&'static str] {
        match self {
            Metric::Revenue => &["revenues"],
            Metric::NetIncome => &["net_income_loss"],
            Metric::OperatingIncome => &["operating_income_loss"],
            Metric::StockholdersEquity => &["equity_attributable_to_parent", "equity"],
            Metric::TotalAssets => &["assets"],
            Metric::TotalLiabilities => &["liabilities"],
            Metric::OperatingCashFlow => &["net_cash_flow_from_operating_activities"],
            Metric::CapitalExpenditure => &[],
            Metric::DepreciationAmortization => &["depreciation_and_amortization"],
            Metric::Cash => &[],
            Metric::LongTermDebt => &["long_term_debt"],
            Metric::SharesOutstanding => &["diluted_average_shares"],
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Metric::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| format!("unknown metric '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_round_trips_through_name() {
        for metric in Metric::ALL {
            assert_eq!(metric.as_str().parse::<Metric>(), Ok(metric));
        }
        assert_eq!("Net-Income".parse::<Metric>(), Ok(Metric::NetIncome));
        assert!("ebitda_margin".parse::<Metric>().is_err());
    }

    #[test]
    fn test_revenue_candidates_prefer_revenues_tag() {
        assert_eq!(Metric::Revenue.tag_candidates(Provider::Sec)[0], "Revenues");
        assert_eq!(Metric::Revenue.tag_candidates(Provider::Polygon), &["revenues"]);
    }
}

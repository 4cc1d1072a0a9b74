//! Financial statement snapshots and the [`FactSource`] adapter over them.
//!
//! The provider returns one record per filing with three flat statement
//! maps (`field -> {value, unit, label}`), unlike the regulator's
//! taxonomy/tag/unit tree. The adapter pivots filings into per-field series.

use analysis_core::{fiscal_year_for, FactPoint, FactSource, Provider};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatementValue {
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinancialStatements {
    #[serde(default)]
    pub income_statement: HashMap<String, StatementValue>,
    #[serde(default)]
    pub balance_sheet: HashMap<String, StatementValue>,
    #[serde(default)]
    pub cash_flow_statement: HashMap<String, StatementValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementFiling {
    #[serde(default)]
    pub fiscal_period: String,
    #[serde(default)]
    pub fiscal_year: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub filing_date: Option<String>,
    #[serde(default)]
    pub financials: FinancialStatements,
}

fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

impl StatementFiling {
    /// Provider periods mapped onto regulator form names so both sources
    /// share one form filter. Trailing-twelve-month rows have no form.
    fn filing_form(&self) -> Option<&'static str> {
        match self.fiscal_period.to_ascii_uppercase().as_str() {
            "FY" => Some("10-K"),
            "Q1" | "Q2" | "Q3" | "Q4" => Some("10-Q"),
            _ => None,
        }
    }

    fn point(&self, field: &str) -> Option<Option<FactPoint>> {
        let statements = &self.financials;
        let (entry, is_instant) = if let Some(v) = statements.income_statement.get(field) {
            (v, false)
        } else if let Some(v) = statements.cash_flow_statement.get(field) {
            (v, false)
        } else {
            (statements.balance_sheet.get(field)?, true)
        };

        // Field exists; the point may still be unusable.
        let build = || {
            let form = self.filing_form()?;
            let period_end = parse_date(self.end_date.as_deref())?;
            let value = entry.value?;
            Some(FactPoint {
                period_end,
                period_start: if is_instant {
                    None
                } else {
                    parse_date(self.start_date.as_deref())
                },
                fiscal_year: fiscal_year_for(period_end),
                value,
                filing_form: form.to_string(),
                filed: parse_date(self.filing_date.as_deref()),
            })
        };
        Some(build())
    }
}

/// Statement snapshots for one ticker.
#[derive(Debug, Clone, Default)]
pub struct StatementFacts {
    filings: Vec<StatementFiling>,
}

impl StatementFacts {
    pub fn new(filings: Vec<StatementFiling>) -> Self {
        Self { filings }
    }

    pub fn filings(&self) -> &[StatementFiling] {
        &self.filings
    }

    pub fn is_empty(&self) -> bool {
        self.filings.is_empty()
    }
}

impl FactSource for StatementFacts {
    fn provider(&self) -> Provider {
        Provider::Polygon
    }

    fn series(&self, tag: &str) -> Option<Vec<FactPoint>> {
        let mut seen = false;
        let mut points = Vec::new();
        for filing in &self.filings {
            if let Some(point) = filing.point(tag) {
                seen = true;
                points.extend(point);
            }
        }
        seen.then_some(points)
    }
}

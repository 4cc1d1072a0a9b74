//! Typed schema for the regulator's `companyfacts` document and the
//! [`FactSource`] adapter over it.

use analysis_core::{fiscal_year_for, FactPoint, FactSource, Provider};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Taxonomies searched for an unqualified tag, in order.
const TAXONOMIES: [&str; 2] = ["us-gaap", "dei"];

/// Preferred unit keys. Anything else falls back to the alphabetically first.
const PREFERRED_UNITS: [&str; 3] = ["USD", "shares", "USD/shares"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyFactsDocument {
    #[serde(default)]
    pub cik: Option<u64>,
    #[serde(rename = "entityName", default)]
    pub entity_name: Option<String>,
    /// taxonomy -> tag -> concept
    #[serde(default)]
    pub facts: HashMap<String, HashMap<String, ConceptFacts>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptFacts {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// unit -> disclosed values
    #[serde(default)]
    pub units: HashMap<String, Vec<RawFact>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFact {
    #[serde(default)]
    pub start: Option<String>,
    pub end: String,
    pub val: f64,
    #[serde(default)]
    pub accn: Option<String>,
    #[serde(default)]
    pub fy: Option<i32>,
    #[serde(default)]
    pub fp: Option<String>,
    pub form: String,
    #[serde(default)]
    pub filed: Option<String>,
    #[serde(default)]
    pub frame: Option<String>,
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

impl RawFact {
    /// `fy` on the wire is the fiscal year of the filing, which also carries
    /// prior-year comparatives; the point's own year comes from `end`.
    fn to_point(&self) -> Option<FactPoint> {
        let period_end = parse_date(&self.end)?;
        Some(FactPoint {
            period_end,
            period_start: self.start.as_deref().and_then(parse_date),
            fiscal_year: fiscal_year_for(period_end),
            value: self.val,
            filing_form: self.form.clone(),
            filed: self.filed.as_deref().and_then(parse_date),
        })
    }
}

/// Company facts bundle for one entity.
#[derive(Debug, Clone)]
pub struct CompanyFacts {
    document: CompanyFactsDocument,
}

impl CompanyFacts {
    pub fn new(document: CompanyFactsDocument) -> Self {
        Self { document }
    }

    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body).map(Self::new)
    }

    pub fn entity_name(&self) -> Option<&str> {
        self.document.entity_name.as_deref()
    }

    pub fn document(&self) -> &CompanyFactsDocument {
        &self.document
    }

    /// Accepts `Tag` or `taxonomy:Tag`.
    fn concept(&self, tag: &str) -> Option<&ConceptFacts> {
        if let Some((taxonomy, name)) = tag.split_once(':') {
            return self.document.facts.get(taxonomy)?.get(name);
        }
        TAXONOMIES
            .iter()
            .find_map(|taxonomy| self.document.facts.get(*taxonomy)?.get(tag))
    }

    fn preferred_unit(concept: &ConceptFacts) -> Option<&Vec<RawFact>> {
        for unit in PREFERRED_UNITS {
            if let Some(values) = concept.units.get(unit) {
                return Some(values);
            }
        }
        let mut keys: Vec<&String> = concept.units.keys().collect();
        keys.sort();
        keys.first().and_then(|k| concept.units.get(*k))
    }
}

impl FactSource for CompanyFacts {
    fn provider(&self) -> Provider {
        Provider::Sec
    }

    fn series(&self, tag: &str) -> Option<Vec<FactPoint>> {
        let concept = self.concept(tag)?;
        let raw = Self::preferred_unit(concept)?;
        let points: Vec<FactPoint> = raw
            .iter()
            .filter_map(|fact| {
                let point = fact.to_point();
                if point.is_none() {
                    tracing::debug!("Skipping {} fact with unparseable end date '{}'", tag, fact.end);
                }
                point
            })
            .collect();
        Some(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> CompanyFacts {
        let body = json!({
            "cik": 320193,
            "entityName": "Apple Inc.",
            "facts": {
                "dei": {
                    "EntityCommonStockSharesOutstanding": {
                        "label": "Entity Common Stock, Shares Outstanding",
                        "units": {
                            "shares": [
                                {"end": "2023-10-20", "val": 15552752000.0, "fy": 2023, "fp": "FY", "form": "10-K", "filed": "2023-11-03"}
                            ]
                        }
                    }
                },
                "us-gaap": {
                    "Revenues": {
                        "label": "Revenues",
                        "units": {
                            "USD": [
                                {"start": "2021-09-26", "end": "2022-09-24", "val": 394328000000.0, "fy": 2023, "fp": "FY", "form": "10-K", "filed": "2023-11-03"},
                                {"start": "2022-09-25", "end": "2023-09-30", "val": 383285000000.0, "fy": 2023, "fp": "FY", "form": "10-K", "filed": "2023-11-03"},
                                {"end": "not-a-date", "val": 1.0, "form": "10-K"}
                            ]
                        }
                    },
                    "EarningsPerShareBasic": {
                        "units": {
                            "USD/shares": [
                                {"end": "2023-09-30", "val": 6.16, "form": "10-K", "filed": "2023-11-03"}
                            ]
                        }
                    }
                }
            }
        });
        CompanyFacts::from_json(&body.to_string()).unwrap()
    }

    #[test]
    fn test_series_uses_period_end_year_not_filing_year() {
        let facts = sample();
        let points = facts.series("Revenues").unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].fiscal_year, 2022);
        assert_eq!(points[1].fiscal_year, 2023);
        assert_eq!(points[0].duration_days(), Some(363));
        assert_eq!(points[1].filed, NaiveDate::from_ymd_opt(2023, 11, 3));
    }

    #[test]
    fn test_early_january_year_end_belongs_to_prior_year() {
        let facts = CompanyFacts::from_json(
            &json!({
                "cik": 55067,
                "entityName": "Kellogg Co",
                "facts": {"us-gaap": {"Revenues": {"units": {"USD": [
                    {"start": "2021-01-03", "end": "2022-01-01", "val": 14181000000.0, "form": "10-K", "filed": "2022-02-22"},
                    {"start": "2022-01-02", "end": "2022-12-31", "val": 15315000000.0, "form": "10-K", "filed": "2023-02-21"}
                ]}}}}
            })
            .to_string(),
        )
        .unwrap();
        let years: Vec<i32> = facts
            .series("Revenues")
            .unwrap()
            .iter()
            .map(|p| p.fiscal_year)
            .collect();
        assert_eq!(years, vec![2021, 2022]);
    }

    #[test]
    fn test_dei_tags_resolve_without_prefix() {
        let facts = sample();
        let shares = facts.series("EntityCommonStockSharesOutstanding").unwrap();
        assert_eq!(shares.len(), 1);
        assert!(shares[0].period_start.is_none());
        assert!(facts.series("dei:EntityCommonStockSharesOutstanding").is_some());
        assert!(facts.series("us-gaap:EntityCommonStockSharesOutstanding").is_none());
    }

    #[test]
    fn test_absent_tag_is_none() {
        let facts = sample();
        assert!(facts.series("SalesRevenueNet").is_none());
        assert!(!facts.has_tag("SalesRevenueNet"));
        assert_eq!(facts.entity_name(), Some("Apple Inc."));
    }

    #[test]
    fn test_per_share_unit_is_picked_up() {
        let facts = sample();
        let eps = facts.series("EarningsPerShareBasic").unwrap();
        assert!((eps[0].value - 6.16).abs() < 1e-9);
    }
}

//! Fact reconciliation: tag fallback, form filtering, duplicate-filing
//! elimination and unit scaling.

use analysis_core::{
    FactPoint, FactSource, NormalizedPoint, NormalizedSeries, PeriodKey, PeriodKind, ScaleUnit,
};
use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::round2;

/// Annual report forms. Amendments (`/A`) of these are annual too.
const ANNUAL_FORMS: [&str; 5] = ["10-K", "10-K405", "10-KT", "20-F", "40-F"];

/// Duration facts shorter than this inside an annual filing are quarterly
/// values re-reported alongside the annual figure.
const MIN_ANNUAL_DURATION_DAYS: i64 = 300;

/// Year-to-date and annual cumulative values share period ends with the
/// three-month figures; quarterly series keep only the latter.
const MAX_QUARTER_DURATION_DAYS: i64 = 120;

pub fn is_annual_form(form: &str) -> bool {
    let base = form.trim().trim_end_matches("/A");
    ANNUAL_FORMS.iter().any(|f| f.eq_ignore_ascii_case(base))
}

/// Rank used to pick the surviving point for a period. Higher wins; on an
/// exact tie the point seen later upstream wins.
fn filing_rank(point: &FactPoint) -> (Option<NaiveDate>, bool) {
    (point.filed, point.is_amendment())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FactNormalizer;

impl FactNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// First candidate tag the bundle carries, with its raw points.
    pub fn select_tag(
        &self,
        source: &dyn FactSource,
        candidates: &[&str],
    ) -> Option<(String, Vec<FactPoint>)> {
        candidates.iter().find_map(|tag| {
            source
                .series(tag)
                .map(|points| (tag.to_string(), points))
        })
    }

    /// Raw points for the selected tag, sorted by period end, before any
    /// filtering or deduplication.
    pub fn raw(&self, source: &dyn FactSource, candidates: &[&str]) -> Vec<FactPoint> {
        let mut points = self
            .select_tag(source, candidates)
            .map(|(_, points)| points)
            .unwrap_or_default();
        points.sort_by_key(|p| p.period_end);
        points
    }

    pub fn normalize(
        &self,
        source: &dyn FactSource,
        candidates: &[&str],
        period: PeriodKind,
    ) -> NormalizedSeries {
        let Some((tag, points)) = self.select_tag(source, candidates) else {
            tracing::debug!("None of {:?} present in {} bundle", candidates, source.provider());
            return NormalizedSeries::missing(period);
        };

        let mut series = self.normalize_points(points, period);
        series.tag = Some(tag);
        series.provider = Some(source.provider());
        series
    }

    /// Filters, deduplicates, sorts and scales raw points.
    pub fn normalize_points(&self, points: Vec<FactPoint>, period: PeriodKind) -> NormalizedSeries {
        let kept = self.deduplicate(self.filter(points, period), period);

        let max_abs = kept
            .iter()
            .map(|(_, p)| p.value.abs())
            .fold(0.0_f64, f64::max);
        let unit = ScaleUnit::for_magnitude(max_abs);
        let divisor = unit.divisor();

        let points = kept
            .into_iter()
            .map(|(key, fact)| NormalizedPoint {
                period: key,
                scaled_value: round2(fact.value / divisor),
                fact,
            })
            .collect();

        NormalizedSeries {
            tag: None,
            provider: None,
            period_kind: period,
            unit,
            points,
        }
    }

    fn filter(&self, points: Vec<FactPoint>, period: PeriodKind) -> Vec<FactPoint> {
        points
            .into_iter()
            .filter(|p| p.value.is_finite())
            .filter(|p| match period {
                PeriodKind::Annual => {
                    is_annual_form(&p.filing_form)
                        && p.duration_days()
                            .map_or(true, |days| days >= MIN_ANNUAL_DURATION_DAYS)
                }
                PeriodKind::Quarterly => p
                    .duration_days()
                    .map_or(true, |days| days <= MAX_QUARTER_DURATION_DAYS),
            })
            .collect()
    }

    /// One point per period key, latest filing wins. Output is ascending by
    /// period end.
    pub fn deduplicate(
        &self,
        points: Vec<FactPoint>,
        period: PeriodKind,
    ) -> Vec<(PeriodKey, FactPoint)> {
        let mut groups: BTreeMap<PeriodKey, FactPoint> = BTreeMap::new();
        for point in points {
            let key = period.key_for(&point);
            match groups.get(&key) {
                Some(current) if filing_rank(&point) < filing_rank(current) => {}
                _ => {
                    groups.insert(key, point);
                }
            }
        }

        let mut kept: Vec<(PeriodKey, FactPoint)> = groups.into_iter().collect();
        kept.sort_by(|a, b| a.1.period_end.cmp(&b.1.period_end).then(a.0.cmp(&b.0)));
        kept
    }
}

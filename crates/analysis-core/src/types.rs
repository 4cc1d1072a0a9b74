use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Width of the regulator's zero-padded entity identifier (CIK).
pub const CANONICAL_ID_WIDTH: usize = 10;

/// A resolved security. Immutable once produced by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Security {
    pub ticker: String,
    pub canonical_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Security {
    pub fn new(ticker: &str, entity_number: u64, name: Option<String>) -> Self {
        Self {
            ticker: ticker.trim().to_uppercase(),
            canonical_id: format!("{:0width$}", entity_number, width = CANONICAL_ID_WIDTH),
            name,
        }
    }
}

/// Ticker reference dataset keyed by upper-cased ticker.
pub type TickerMap = HashMap<String, Security>;

/// Upstream that produced a fact bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Sec,
    Polygon,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Sec => "sec",
            Provider::Polygon => "polygon",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last day of January that still closes the prior fiscal year. Filers on
/// a 52/53-week calendar end their year on the Saturday nearest 31 December,
/// which lands in the first days of January in some years.
pub const FISCAL_YEAR_SPILLOVER_DAYS: u32 = 7;

/// Fiscal year a period ending on `period_end` belongs to.
pub fn fiscal_year_for(period_end: NaiveDate) -> i32 {
    if period_end.month() == 1 && period_end.day() <= FISCAL_YEAR_SPILLOVER_DAYS {
        period_end.year() - 1
    } else {
        period_end.year()
    }
}

/// One raw disclosed value. Unscaled; may be duplicated across filings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactPoint {
    pub period_end: NaiveDate,
    /// Present for duration facts (income / cash-flow), absent for instants.
    #[serde(default)]
    pub period_start: Option<NaiveDate>,
    pub fiscal_year: i32,
    pub value: f64,
    pub filing_form: String,
    #[serde(default)]
    pub filed: Option<NaiveDate>,
}

impl FactPoint {
    /// Builds a point whose fiscal year is taken from the period end.
    pub fn new(period_end: NaiveDate, value: f64, filing_form: impl Into<String>) -> Self {
        Self {
            period_end,
            period_start: None,
            fiscal_year: fiscal_year_for(period_end),
            value,
            filing_form: filing_form.into(),
            filed: None,
        }
    }

    pub fn with_filed(mut self, filed: NaiveDate) -> Self {
        self.filed = Some(filed);
        self
    }

    pub fn with_start(mut self, start: NaiveDate) -> Self {
        self.period_start = Some(start);
        self
    }

    pub fn duration_days(&self) -> Option<i64> {
        self.period_start
            .map(|start| (self.period_end - start).num_days())
    }

    pub fn is_amendment(&self) -> bool {
        self.filing_form.trim_end().ends_with("/A")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKind {
    #[default]
    Annual,
    Quarterly,
}

impl PeriodKind {
    pub fn annual_only(&self) -> bool {
        matches!(self, PeriodKind::Annual)
    }

    pub fn key_for(&self, point: &FactPoint) -> PeriodKey {
        match self {
            PeriodKind::Annual => PeriodKey::FiscalYear(point.fiscal_year),
            PeriodKind::Quarterly => PeriodKey::PeriodEnd(point.period_end),
        }
    }
}

impl std::str::FromStr for PeriodKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "annual" | "fy" | "yearly" => Ok(PeriodKind::Annual),
            "quarterly" | "q" | "quarter" => Ok(PeriodKind::Quarterly),
            other => Err(format!("unknown period '{}'", other)),
        }
    }
}

/// Grouping key after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKey {
    FiscalYear(i32),
    PeriodEnd(NaiveDate),
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodKey::FiscalYear(year) => write!(f, "FY{}", year),
            PeriodKey::PeriodEnd(date) => write!(f, "{}", date),
        }
    }
}

/// Display unit chosen once per series from its largest magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScaleUnit {
    #[default]
    Units,
    Millions,
    Billions,
}

impl ScaleUnit {
    pub fn for_magnitude(max_abs: f64) -> Self {
        if max_abs >= 1e9 {
            ScaleUnit::Billions
        } else if max_abs >= 1e6 {
            ScaleUnit::Millions
        } else {
            ScaleUnit::Units
        }
    }

    pub fn divisor(&self) -> f64 {
        match self {
            ScaleUnit::Units => 1.0,
            ScaleUnit::Millions => 1e6,
            ScaleUnit::Billions => 1e9,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScaleUnit::Units => "Units",
            ScaleUnit::Millions => "Millions",
            ScaleUnit::Billions => "Billions",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub period: PeriodKey,
    #[serde(flatten)]
    pub fact: FactPoint,
    pub scaled_value: f64,
}

/// Deduplicated, scaled series for one (entity, metric) pair.
///
/// An empty series with `tag: None` means none of the candidate tags were
/// disclosed; it is a valid state, not a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSeries {
    pub tag: Option<String>,
    pub provider: Option<Provider>,
    pub period_kind: PeriodKind,
    pub unit: ScaleUnit,
    pub points: Vec<NormalizedPoint>,
}

impl NormalizedSeries {
    pub fn missing(period_kind: PeriodKind) -> Self {
        Self {
            tag: None,
            provider: None,
            period_kind,
            unit: ScaleUnit::Units,
            points: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn get(&self, period: &PeriodKey) -> Option<&NormalizedPoint> {
        self.points.iter().find(|p| &p.period == period)
    }

    pub fn latest(&self) -> Option<&NormalizedPoint> {
        self.points.last()
    }

    /// Raw (unscaled) values keyed by period.
    pub fn values(&self) -> Vec<(PeriodKey, f64)> {
        self.points.iter().map(|p| (p.period, p.fact.value)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioKind {
    NetMargin,
    ReturnOnEquity,
    ReturnOnAssets,
    AssetTurnover,
    EvToEbitda,
}

impl RatioKind {
    pub const ALL: [RatioKind; 5] = [
        RatioKind::NetMargin,
        RatioKind::ReturnOnEquity,
        RatioKind::ReturnOnAssets,
        RatioKind::AssetTurnover,
        RatioKind::EvToEbitda,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            RatioKind::NetMargin => "Net Margin",
            RatioKind::ReturnOnEquity => "Return on Equity",
            RatioKind::ReturnOnAssets => "Return on Assets",
            RatioKind::AssetTurnover => "Asset Turnover",
            RatioKind::EvToEbitda => "EV/EBITDA",
        }
    }

    /// Percentage ratios are multiplied by 100 before rounding.
    pub fn is_percentage(&self) -> bool {
        matches!(
            self,
            RatioKind::NetMargin | RatioKind::ReturnOnEquity | RatioKind::ReturnOnAssets
        )
    }
}

/// Why a ratio could not be produced for a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapReason {
    ZeroDenominator,
    MissingInput,
    NonFinite,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum RatioValue {
    Computed(f64),
    NotComputable(GapReason),
}

impl RatioValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RatioValue::Computed(v) => Some(*v),
            RatioValue::NotComputable(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioPoint {
    pub ratio: RatioKind,
    pub period: PeriodKey,
    pub value: RatioValue,
}

/// Ratios keyed by (ratio, period). Periods missing from either input series
/// have no entry at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatioSet {
    pub entries: Vec<RatioPoint>,
}

impl RatioSet {
    pub fn insert(&mut self, ratio: RatioKind, period: PeriodKey, value: RatioValue) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.ratio == ratio && e.period == period)
        {
            Some(existing) => existing.value = value,
            None => self.entries.push(RatioPoint { ratio, period, value }),
        }
    }

    pub fn get(&self, ratio: RatioKind, period: PeriodKey) -> Option<RatioValue> {
        self.entries
            .iter()
            .find(|e| e.ratio == ratio && e.period == period)
            .map(|e| e.value)
    }

    pub fn series(&self, ratio: RatioKind) -> Vec<&RatioPoint> {
        self.entries.iter().filter(|e| e.ratio == ratio).collect()
    }

    pub fn periods(&self, ratio: RatioKind) -> Vec<PeriodKey> {
        self.series(ratio).into_iter().map(|e| e.period).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn sort(&mut self) {
        self.entries
            .sort_by(|a, b| a.ratio.cmp(&b.ratio).then(a.period.cmp(&b.period)));
    }
}

/// User-adjustable DCF assumptions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuationAssumptions {
    pub growth_rate: f64,
    pub discount_rate: f64,
}

impl Default for ValuationAssumptions {
    fn default() -> Self {
        Self {
            growth_rate: 0.025,
            discount_rate: 0.085,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationInputs {
    pub base_cash_flow: f64,
    pub growth_rate: f64,
    pub discount_rate: f64,
    pub shares_outstanding: f64,
    pub projection_years: u32,
    #[serde(default)]
    pub current_price: Option<f64>,
}

impl ValuationInputs {
    pub const PROJECTION_YEARS: u32 = 5;

    pub fn new(
        base_cash_flow: f64,
        assumptions: ValuationAssumptions,
        shares_outstanding: f64,
    ) -> Self {
        Self {
            base_cash_flow,
            growth_rate: assumptions.growth_rate,
            discount_rate: assumptions.discount_rate,
            shares_outstanding,
            projection_years: Self::PROJECTION_YEARS,
            current_price: None,
        }
    }

    pub fn with_current_price(mut self, price: f64) -> Self {
        self.current_price = Some(price);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
    pub terminal_value: f64,
    pub intrinsic_value: f64,
    pub fair_value_per_share: f64,
    /// Only present when a current price was supplied.
    pub upside_pct: Option<f64>,
}

/// Daily close from the market-data provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
    pub volume: f64,
}

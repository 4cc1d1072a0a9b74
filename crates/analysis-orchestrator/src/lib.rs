use analysis_core::{
    AnalysisError, FactPoint, Metric, NormalizedSeries, PeriodKind, PricePoint, Provider,
    RatioSet, Security, ValuationAssumptions, ValuationInputs, ValuationResult,
};
use fundamental_analysis::{
    ebitda, enterprise_value, free_cash_flow, FactNormalizer, RatioCalculator, RatioInputs,
    ValuationModel,
};
use polygon_client::{PolygonClient, StatementFacts};
use sec_client::{CompanyFacts, SecClient};
use std::sync::Arc;
use std::time::Duration;

pub mod cache;
pub mod config;
pub mod resolver;

pub use cache::{CacheKey, FetchCache, UNBOUNDED_TTL};
pub use config::EngineConfig;
pub use resolver::IdentifierResolver;

/// Read-only query surface: resolve, fetch through the cache, normalize,
/// compute.
#[derive(Clone)]
pub struct AnalysisOrchestrator {
    resolver: IdentifierResolver,
    sec_client: SecClient,
    polygon_client: Option<PolygonClient>,
    normalizer: FactNormalizer,
    ratio_calculator: RatioCalculator,
    valuation_model: ValuationModel,
    facts_cache: FetchCache<CacheKey, CompanyFacts>,
    statements_cache: FetchCache<CacheKey, StatementFacts>,
    quote_cache: FetchCache<CacheKey, Option<f64>>,
    prices_cache: FetchCache<CacheKey, Vec<PricePoint>>,
    facts_ttl: Duration,
    market_ttl: Duration,
}

impl AnalysisOrchestrator {
    pub fn new(config: EngineConfig) -> Result<Self, AnalysisError> {
        let sec_client = SecClient::new(config.sec.clone())?;
        let polygon_client = config.polygon.clone().map(PolygonClient::new).transpose()?;
        let timeout = config.load_timeout;

        if polygon_client.is_none() {
            tracing::info!("POLYGON_API_KEY not set, market data disabled");
        }

        Ok(Self {
            resolver: IdentifierResolver::new(Arc::new(sec_client.clone()), timeout),
            sec_client,
            polygon_client,
            normalizer: FactNormalizer::new(),
            ratio_calculator: RatioCalculator::new(),
            valuation_model: ValuationModel::new(),
            facts_cache: FetchCache::new(timeout),
            statements_cache: FetchCache::new(timeout),
            quote_cache: FetchCache::new(timeout),
            prices_cache: FetchCache::new(timeout),
            facts_ttl: config.facts_ttl,
            market_ttl: config.market_ttl,
        })
    }

    pub fn market_data_enabled(&self) -> bool {
        self.polygon_client.is_some()
    }

    pub async fn resolve(&self, ticker: &str) -> Result<Security, AnalysisError> {
        self.resolver.resolve(ticker).await
    }

    async fn company_facts(&self, security: &Security) -> Result<Arc<CompanyFacts>, AnalysisError> {
        let client = self.sec_client.clone();
        let cik = security.canonical_id.clone();
        let facts = self
            .facts_cache
            .fetch(
                CacheKey::new(Provider::Sec, &security.canonical_id, "companyfacts"),
                self.facts_ttl,
                move || async move { client.fetch_company_facts(&cik).await },
            )
            .await?;
        Ok(facts)
    }

    async fn statements(&self, security: &Security) -> Result<Option<Arc<StatementFacts>>, AnalysisError> {
        let Some(client) = self.polygon_client.clone() else {
            return Ok(None);
        };
        let ticker = security.ticker.clone();
        let statements = self
            .statements_cache
            .fetch(
                CacheKey::new(Provider::Polygon, &security.ticker, "financials"),
                self.facts_ttl,
                move || async move { client.get_financials(&ticker).await },
            )
            .await?;
        Ok(Some(statements))
    }

    /// Regulatory facts first; the market-data statements only when the
    /// regulatory bundle yields nothing for the metric.
    async fn metric_series(
        &self,
        security: &Security,
        metric: Metric,
        period: PeriodKind,
    ) -> Result<NormalizedSeries, AnalysisError> {
        let facts = self.company_facts(security).await?;
        let series = self
            .normalizer
            .normalize(&*facts, metric.tag_candidates(Provider::Sec), period);
        if !series.is_empty() || metric.tag_candidates(Provider::Polygon).is_empty() {
            return Ok(series);
        }

        let Some(statements) = self.statements(security).await? else {
            return Ok(series);
        };
        let fallback = self.normalizer.normalize(
            &*statements,
            metric.tag_candidates(Provider::Polygon),
            period,
        );
        if fallback.is_empty() {
            Ok(series)
        } else {
            tracing::debug!("{} for {} served from market-data statements", metric, security.ticker);
            Ok(fallback)
        }
    }

    pub async fn get_normalized_metric(
        &self,
        ticker: &str,
        metric: Metric,
        period: PeriodKind,
    ) -> Result<NormalizedSeries, AnalysisError> {
        let security = self.resolve(ticker).await?;
        self.metric_series(&security, metric, period).await
    }

    /// Points of the selected tag before filtering and deduplication.
    pub async fn get_raw_facts(&self, ticker: &str, metric: Metric) -> Result<Vec<FactPoint>, AnalysisError> {
        let security = self.resolve(ticker).await?;
        let facts = self.company_facts(&security).await?;
        let points = self.normalizer.raw(&*facts, metric.tag_candidates(Provider::Sec));
        if !points.is_empty() {
            return Ok(points);
        }

        match self.statements(&security).await? {
            Some(statements) => Ok(self.normalizer.raw(
                &*statements,
                metric.tag_candidates(Provider::Polygon),
            )),
            None => Ok(points),
        }
    }

    /// Current price, or `None` without market data. A failed quote is an
    /// error here and in every query that prices a figure with it.
    pub async fn get_quote(&self, ticker: &str) -> Result<Option<f64>, AnalysisError> {
        let security = self.resolve(ticker).await?;
        self.quote(&security).await
    }

    async fn quote(&self, security: &Security) -> Result<Option<f64>, AnalysisError> {
        let Some(client) = self.polygon_client.clone() else {
            return Ok(None);
        };
        let ticker = security.ticker.clone();
        let price = self
            .quote_cache
            .fetch(
                CacheKey::new(Provider::Polygon, &security.ticker, "quote"),
                self.market_ttl,
                move || async move { client.get_current_price(&ticker).await },
            )
            .await?;
        Ok(*price)
    }

    pub async fn get_price_history(&self, ticker: &str, days: i64) -> Result<Vec<PricePoint>, AnalysisError> {
        let security = self.resolve(ticker).await?;
        let Some(client) = self.polygon_client.clone() else {
            return Err(AnalysisError::InvalidData(
                "market data is not configured".to_string(),
            ));
        };
        let symbol = security.ticker.clone();
        let prices = self
            .prices_cache
            .fetch(
                CacheKey::new(Provider::Polygon, &security.ticker, format!("prices:{}", days)),
                self.market_ttl,
                move || async move { client.get_daily_prices(&symbol, days).await },
            )
            .await?;
        Ok(prices.to_vec())
    }

    pub async fn get_ratios(&self, ticker: &str) -> Result<RatioSet, AnalysisError> {
        let security = self.resolve(ticker).await?;
        let annual = PeriodKind::Annual;

        let (revenue, net_income, equity, assets, operating_income, depreciation) = tokio::try_join!(
            self.metric_series(&security, Metric::Revenue, annual),
            self.metric_series(&security, Metric::NetIncome, annual),
            self.metric_series(&security, Metric::StockholdersEquity, annual),
            self.metric_series(&security, Metric::TotalAssets, annual),
            self.metric_series(&security, Metric::OperatingIncome, annual),
            self.metric_series(&security, Metric::DepreciationAmortization, annual),
        )?;

        let (shares, debt, cash) = tokio::try_join!(
            self.metric_series(&security, Metric::SharesOutstanding, annual),
            self.metric_series(&security, Metric::LongTermDebt, annual),
            self.metric_series(&security, Metric::Cash, annual),
        )?;
        let price = self.quote(&security).await?;

        let ev = shares.latest().and_then(|s| {
            enterprise_value(
                price,
                s.fact.value,
                debt.latest().map(|p| p.fact.value),
                cash.latest().map(|p| p.fact.value),
            )
        });

        let inputs = RatioInputs::from_series(&revenue, &net_income, &equity, &assets)
            .with_ebitda(ebitda(&operating_income.values(), &depreciation.values()))
            .with_enterprise_value(ev);
        Ok(self.ratio_calculator.compute(&inputs))
    }

    /// DCF from the latest annual free cash flow and share count, with the
    /// market price for upside when available.
    pub async fn get_valuation(
        &self,
        ticker: &str,
        assumptions: ValuationAssumptions,
    ) -> Result<ValuationResult, AnalysisError> {
        let security = self.resolve(ticker).await?;
        let annual = PeriodKind::Annual;

        let (operating_cash_flow, capex, shares) = tokio::try_join!(
            self.metric_series(&security, Metric::OperatingCashFlow, annual),
            self.metric_series(&security, Metric::CapitalExpenditure, annual),
            self.metric_series(&security, Metric::SharesOutstanding, annual),
        )?;

        let fcf = free_cash_flow(&operating_cash_flow.values(), &capex.values());
        let Some((_, base_cash_flow)) = fcf.last().copied() else {
            return Err(AnalysisError::InvalidData(format!(
                "no free cash flow history for {}",
                security.ticker
            )));
        };
        let Some(shares_outstanding) = shares.latest().map(|p| p.fact.value) else {
            return Err(AnalysisError::InvalidData(format!(
                "no shares outstanding reported for {}",
                security.ticker
            )));
        };

        let mut inputs = ValuationInputs::new(base_cash_flow, assumptions, shares_outstanding);
        if let Some(price) = self.quote(&security).await? {
            inputs = inputs.with_current_price(price);
        }
        self.valuation_model.project(&inputs)
    }
}

//! Security API Routes
//!
//! Read-only endpoints over the analysis engine: resolution, normalized
//! metrics, raw filings, ratios, valuation and price history.

use analysis_core::{
    FactPoint, Metric, NormalizedSeries, PeriodKind, PricePoint, RatioSet, Security,
    ValuationAssumptions, ValuationResult,
};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{ApiResponse, AppError, AppState};

const DEFAULT_PRICE_DAYS: i64 = 365;
const MAX_PRICE_DAYS: i64 = 3650;

#[derive(Deserialize)]
pub struct MetricQuery {
    #[serde(default)]
    pub period: Option<String>,
}

#[derive(Deserialize)]
pub struct ValuationQuery {
    #[serde(default)]
    pub growth: Option<f64>,
    #[serde(default)]
    pub discount: Option<f64>,
}

#[derive(Deserialize)]
pub struct PricesQuery {
    #[serde(default)]
    pub days: Option<i64>,
}

#[derive(Serialize)]
pub struct SecurityDetail {
    #[serde(flatten)]
    pub security: Security,
    pub current_price: Option<f64>,
}

#[derive(Serialize)]
pub struct ValuationResponse {
    pub assumptions: ValuationAssumptions,
    #[serde(flatten)]
    pub result: ValuationResult,
}

pub fn security_routes() -> Router<AppState> {
    Router::new()
        .route("/api/securities/:ticker", get(get_security))
        .route("/api/securities/:ticker/metrics/:metric", get(get_metric))
        .route("/api/securities/:ticker/facts/:metric", get(get_facts))
        .route("/api/securities/:ticker/ratios", get(get_ratios))
        .route("/api/securities/:ticker/valuation", get(get_valuation))
        .route("/api/securities/:ticker/prices", get(get_prices))
}

fn parse_metric(raw: &str) -> Result<Metric, AppError> {
    raw.parse::<Metric>().map_err(AppError::bad_request)
}

async fn get_security(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<ApiResponse<SecurityDetail>>, AppError> {
    let security = state.orchestrator.resolve(&ticker).await?;
    let current_price = state.orchestrator.get_quote(&security.ticker).await?;
    Ok(Json(ApiResponse::success(SecurityDetail {
        security,
        current_price,
    })))
}

async fn get_metric(
    State(state): State<AppState>,
    Path((ticker, metric)): Path<(String, String)>,
    Query(query): Query<MetricQuery>,
) -> Result<Json<ApiResponse<NormalizedSeries>>, AppError> {
    let metric = parse_metric(&metric)?;
    let period = match query.period.as_deref() {
        Some(raw) => raw.parse::<PeriodKind>().map_err(AppError::bad_request)?,
        None => PeriodKind::Annual,
    };

    let series = state
        .orchestrator
        .get_normalized_metric(&ticker, metric, period)
        .await?;
    Ok(Json(ApiResponse::success(series)))
}

async fn get_facts(
    State(state): State<AppState>,
    Path((ticker, metric)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Vec<FactPoint>>>, AppError> {
    let metric = parse_metric(&metric)?;
    let facts = state.orchestrator.get_raw_facts(&ticker, metric).await?;
    Ok(Json(ApiResponse::success(facts)))
}

async fn get_ratios(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<ApiResponse<RatioSet>>, AppError> {
    let ratios = state.orchestrator.get_ratios(&ticker).await?;
    Ok(Json(ApiResponse::success(ratios)))
}

async fn get_valuation(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(query): Query<ValuationQuery>,
) -> Result<Json<ApiResponse<ValuationResponse>>, AppError> {
    let defaults = ValuationAssumptions::default();
    let assumptions = ValuationAssumptions {
        growth_rate: query.growth.unwrap_or(defaults.growth_rate),
        discount_rate: query.discount.unwrap_or(defaults.discount_rate),
    };

    let result = state.orchestrator.get_valuation(&ticker, assumptions).await?;
    Ok(Json(ApiResponse::success(ValuationResponse {
        assumptions,
        result,
    })))
}

async fn get_prices(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(query): Query<PricesQuery>,
) -> Result<Json<ApiResponse<Vec<PricePoint>>>, AppError> {
    let days = query.days.unwrap_or(DEFAULT_PRICE_DAYS).clamp(1, MAX_PRICE_DAYS);
    let prices = state.orchestrator.get_price_history(&ticker, days).await?;
    Ok(Json(ApiResponse::success(prices)))
}

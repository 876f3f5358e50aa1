use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::{
    models::{
        Alert, AlertUpdate, CoinId, CoinListing, HistoryRange, Holding, HoldingUpdate, MarketData,
        NewAlert, NewHolding, PriceHistory, PriceSnapshot, UserId,
    },
    valuation::{ChartSeries, PortfolioValuation},
    Error as CommonError,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::service::AppState;

const USER_HEADER: &str = "x-user-id";

// Create a wrapper for our common::Error type
pub struct ApiError(CommonError);

impl From<CommonError> for ApiError {
    fn from(err: CommonError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            CommonError::ValidationError(_) | CommonError::ParseError(_) => StatusCode::BAD_REQUEST,
            CommonError::NotFound(_) => StatusCode::NOT_FOUND,
            CommonError::Conflict(_) => StatusCode::CONFLICT,
            CommonError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            CommonError::HttpError(_) | CommonError::UpstreamError(_) => StatusCode::BAD_GATEWAY,
            CommonError::PersistenceError(_)
            | CommonError::ConfigError(_)
            | CommonError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Convert our API error wrapper to an Axum response
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            debug!("Request rejected: {}", self.0);
        }

        let message = match self.0 {
            CommonError::HttpError(e) => format!("External API request failed: {}", e),
            CommonError::ValidationError(msg)
            | CommonError::ParseError(msg)
            | CommonError::NotFound(msg)
            | CommonError::Conflict(msg)
            | CommonError::Unauthorized(msg)
            | CommonError::UpstreamError(msg)
            | CommonError::PersistenceError(msg)
            | CommonError::ConfigError(msg)
            | CommonError::InternalError(msg) => msg,
        };

        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
        }

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Caller identity taken from the `x-user-id` header
pub struct CurrentUser(pub UserId);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| CurrentUser(v.to_string()))
            .ok_or_else(|| {
                CommonError::Unauthorized(format!("Missing {} header", USER_HEADER)).into()
            })
    }
}

fn parse_range(days: Option<&str>) -> Result<HistoryRange, ApiError> {
    match days {
        Some(days) => Ok(days.parse()?),
        None => Ok(HistoryRange::default()),
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct PricesQuery {
    pub coins: Option<String>,
}

fn split_coins(coins: Option<&str>) -> Vec<CoinId> {
    coins
        .unwrap_or_default()
        .split(',')
        .map(str::to_string)
        .collect()
}

// Get current prices for a comma-separated list of coins
pub async fn get_prices(
    State(state): State<AppState>,
    Query(query): Query<PricesQuery>,
) -> Result<Json<Vec<PriceSnapshot>>, ApiError> {
    let coin_ids = split_coins(query.coins.as_deref());
    let prices = state.coins.get_prices(&coin_ids).await?;
    Ok(Json(prices))
}

#[derive(Debug, Deserialize)]
pub struct MarketQuery {
    pub coins: Option<String>,
    pub currency: Option<String>,
}

pub async fn get_market_data(
    State(state): State<AppState>,
    Query(query): Query<MarketQuery>,
) -> Result<Json<Vec<MarketData>>, ApiError> {
    let coin_ids = split_coins(query.coins.as_deref());
    let currency = query.currency.unwrap_or_else(|| "usd".to_string());
    Ok(Json(state.coins.market_data(&coin_ids, &currency).await?))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub days: Option<String>,
    pub currency: Option<String>,
}

pub async fn get_price_history(
    State(state): State<AppState>,
    Path(coin_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<PriceHistory>, ApiError> {
    let range = parse_range(query.days.as_deref())?;
    // Default to USD if no currency specified
    let currency = query.currency.unwrap_or_else(|| "usd".to_string());

    let history = state.coins.price_history(&coin_id, range, &currency).await?;
    Ok(Json(history))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
}

pub async fn search_coins(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<CoinListing>>, ApiError> {
    let results = state
        .coins
        .search(query.query.as_deref().unwrap_or_default())
        .await?;
    Ok(Json(results))
}

pub async fn trending_coins(
    State(state): State<AppState>,
) -> Result<Json<Vec<CoinListing>>, ApiError> {
    Ok(Json(state.coins.trending().await?))
}

pub async fn get_portfolio(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<PortfolioValuation>, ApiError> {
    Ok(Json(state.portfolio.portfolio(&user_id).await?))
}

pub async fn add_holding(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(body): Json<NewHolding>,
) -> Result<(StatusCode, Json<Holding>), ApiError> {
    let holding = state.portfolio.add_holding(&user_id, body).await?;
    Ok((StatusCode::CREATED, Json(holding)))
}

pub async fn update_holding(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<HoldingUpdate>,
) -> Result<Json<Holding>, ApiError> {
    Ok(Json(state.portfolio.update_holding(&user_id, &id, body).await?))
}

pub async fn delete_holding(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.portfolio.delete_holding(&user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ChartQuery {
    pub days: Option<String>,
}

pub async fn get_portfolio_chart(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<ChartQuery>,
) -> Result<Json<ChartSeries>, ApiError> {
    let range = parse_range(query.days.as_deref())?;
    Ok(Json(state.portfolio.chart(&user_id, range).await?))
}

pub async fn list_alerts(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<Vec<Alert>>, ApiError> {
    Ok(Json(state.alerts.list_alerts(&user_id).await?))
}

pub async fn create_alert(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(body): Json<NewAlert>,
) -> Result<(StatusCode, Json<Alert>), ApiError> {
    let alert = state.alerts.create_alert(&user_id, body).await?;
    Ok((StatusCode::CREATED, Json(alert)))
}

pub async fn update_alert(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<AlertUpdate>,
) -> Result<Json<Alert>, ApiError> {
    Ok(Json(state.alerts.update_alert(&user_id, &id, body).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleBody {
    pub is_active: bool,
}

pub async fn toggle_alert(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<ToggleBody>,
) -> Result<Json<Alert>, ApiError> {
    Ok(Json(state.alerts.toggle_alert(&user_id, &id, body.is_active).await?))
}

pub async fn delete_alert(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.alerts.delete_alert(&user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

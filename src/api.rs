use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use alloy::primitives::Address;
use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};
use thiserror::Error;
use tokio::task;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::aggregator::{self, ConsistencyReport};
use crate::config::Config;
use crate::db::{self, Period, TipFilter};
use crate::models::{
    address_id, Creator, PeriodStats, PlatformStats, Tip, Tipper, TokenStats, Withdrawal,
};
use crate::networks::{self, NetworkError, NetworkSummary, NETWORKS};
use crate::price::{format_usd, PriceClient, Quote, TokenPrices};
use crate::tip::{TipCall, TipError, TipRequest, TipToken};

const DEFAULT_LIMIT: u32 = 10;
const MAX_LIMIT: u32 = 1000;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::Database(msg) => {
                error!("Database error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(json!({ "error": msg }))).into_response()
    }
}

impl From<eyre::Report> for ApiError {
    fn from(err: eyre::Report) -> Self {
        ApiError::Database(format!("{:#}", err))
    }
}

impl From<NetworkError> for ApiError {
    fn from(err: NetworkError) -> Self {
        ApiError::NotFound(err.to_string())
    }
}

impl From<TipError> for ApiError {
    fn from(err: TipError) -> Self {
        match err {
            TipError::Network(e) => e.into(),
            not_deployed @ TipError::NotDeployed(_) => ApiError::NotFound(not_deployed.to_string()),
            other => ApiError::InvalidRequest(other.to_string()),
        }
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Clone)]
pub struct AppState {
    pub conn: Arc<Mutex<Connection>>,
    pub prices: PriceClient,
    pub chain_id: u64,
}

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>, // defaults to 10
}

#[derive(Deserialize)]
pub struct WithdrawalQuery {
    pub creator: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Deserialize)]
pub struct TipCallQuery {
    pub creator: String,
    pub token: String,
    pub amount: String,
    #[serde(default)]
    pub message: String,
    pub chain_id: Option<u64>,
}

fn limit(requested: Option<u32>) -> u32 {
    requested.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Addresses are accepted in any case and keyed lowercase.
fn parse_address(raw: &str) -> Result<Address, ApiError> {
    raw.trim()
        .parse::<Address>()
        .map_err(|_| ApiError::InvalidRequest(format!("invalid address: {}", raw)))
}

fn parse_token(raw: &str) -> Result<TipToken, ApiError> {
    match raw.to_ascii_uppercase().as_str() {
        "ETH" | "NATIVE" => Ok(TipToken::Eth),
        "USDC" => Ok(TipToken::Usdc),
        _ => Err(ApiError::InvalidRequest(format!("unsupported token: {}", raw))),
    }
}

// ---------- DB wrapper (spawn_blocking) ----------

async fn with_db<T, F>(conn: &Arc<Mutex<Connection>>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> eyre::Result<T> + Send + 'static,
{
    let conn = Arc::clone(conn);
    task::spawn_blocking(move || {
        let db = conn
            .lock()
            .map_err(|_| ApiError::Internal("database mutex poisoned".to_string()))?;
        f(&db).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "TipJar Indexer API running" }))
        .route("/creators/:address", get(get_creator))
        .route("/creators/:address/tips", get(get_creator_tips))
        .route("/tippers/:address", get(get_tipper))
        .route("/tips", get(get_tips))
        .route("/withdrawals", get(get_withdrawals))
        .route("/stats/platform", get(get_platform_stats))
        .route("/stats/daily", get(get_daily_stats))
        .route("/stats/monthly", get(get_monthly_stats))
        .route("/stats/consistency", get(get_consistency))
        .route("/tokens", get(get_tokens))
        .route("/prices", get(get_prices))
        .route("/networks", get(get_networks))
        .route("/networks/:chain_id", get(get_network))
        .route("/tip-call", get(get_tip_call))
        .layer(cors)
        .with_state(state)
}

pub async fn serve(cfg: Config, conn: Arc<Mutex<Connection>>) -> eyre::Result<()> {
    let state = AppState {
        conn,
        prices: PriceClient::new(&cfg.pyth_endpoint)?,
        chain_id: cfg.chain_id,
    };
    info!("Prices from Pyth Hermes at {}", state.prices.endpoint());
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], cfg.port));
    info!("API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

// ---------- handlers ----------

async fn get_creator(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Creator> {
    let id = address_id(&parse_address(&address)?);
    let creator = with_db(&state.conn, {
        let id = id.clone();
        move |db| db::load_creator(db, &id)
    })
    .await?;
    creator
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("creator {}", id)))
}

async fn get_creator_tips(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(q): Query<LimitQuery>,
) -> ApiResult<Vec<Tip>> {
    let filter = TipFilter {
        creator: Some(address_id(&parse_address(&address)?)),
        tipper: None,
    };
    let limit = limit(q.limit);
    with_db(&state.conn, move |db| db::list_tips(db, &filter, limit))
        .await
        .map(Json)
}

async fn get_tipper(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Tipper> {
    let id = address_id(&parse_address(&address)?);
    let tipper = with_db(&state.conn, {
        let id = id.clone();
        move |db| db::load_tipper(db, &id)
    })
    .await?;
    tipper
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("tipper {}", id)))
}

async fn get_tips(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> ApiResult<Vec<Tip>> {
    let limit = limit(q.limit);
    with_db(&state.conn, move |db| db::list_tips(db, &TipFilter::default(), limit))
        .await
        .map(Json)
}

async fn get_withdrawals(
    State(state): State<AppState>,
    Query(q): Query<WithdrawalQuery>,
) -> ApiResult<Vec<Withdrawal>> {
    let creator = match q.creator.as_deref() {
        Some(raw) => Some(address_id(&parse_address(raw)?)),
        None => None,
    };
    let limit = limit(q.limit);
    with_db(&state.conn, move |db| {
        db::list_withdrawals(db, creator.as_deref(), limit)
    })
    .await
    .map(Json)
}

async fn get_platform_stats(State(state): State<AppState>) -> ApiResult<PlatformStats> {
    with_db(&state.conn, |db| {
        Ok(db::load_platform_stats(db)?.unwrap_or_default())
    })
    .await
    .map(Json)
}

async fn get_daily_stats(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> ApiResult<Vec<PeriodStats>> {
    let limit = limit(q.limit);
    with_db(&state.conn, move |db| db::list_period_stats(db, Period::Day, limit))
        .await
        .map(Json)
}

async fn get_monthly_stats(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> ApiResult<Vec<PeriodStats>> {
    let limit = limit(q.limit);
    with_db(&state.conn, move |db| db::list_period_stats(db, Period::Month, limit))
        .await
        .map(Json)
}

async fn get_consistency(State(state): State<AppState>) -> ApiResult<ConsistencyReport> {
    with_db(&state.conn, aggregator::check_consistency)
        .await
        .map(Json)
}

async fn get_tokens(State(state): State<AppState>) -> ApiResult<Vec<TokenStats>> {
    with_db(&state.conn, db::list_token_stats).await.map(Json)
}

#[derive(Serialize)]
struct PricesResponse {
    #[serde(flatten)]
    prices: TokenPrices,
    formatted: FormattedPrices,
    /// Live feeds only; empty when Pyth is unreachable.
    quotes: Vec<Quote>,
}

#[derive(Serialize)]
struct FormattedPrices {
    #[serde(rename = "ETH")]
    eth: String,
    #[serde(rename = "USDC")]
    usdc: String,
}

async fn get_prices(State(state): State<AppState>) -> Json<PricesResponse> {
    let snapshot = state.prices.snapshot(Utc::now().timestamp()).await;
    let prices = snapshot.prices;
    Json(PricesResponse {
        formatted: FormattedPrices {
            eth: format_usd(prices.eth, 2),
            usdc: format_usd(prices.usdc, 4),
        },
        prices,
        quotes: snapshot.quotes,
    })
}

async fn get_networks() -> Json<Vec<NetworkSummary>> {
    Json(NETWORKS.iter().map(|n| n.summary()).collect())
}

async fn get_network(Path(chain_id): Path<u64>) -> ApiResult<NetworkSummary> {
    Ok(Json(networks::network_config(chain_id)?.summary()))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CallResponse {
    to: String,
    value: String,
    data: String,
}

impl From<TipCall> for CallResponse {
    fn from(call: TipCall) -> Self {
        Self {
            to: address_id(&call.to),
            value: call.value.to_string(),
            data: call.input.to_string(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TipCallResponse {
    chain_id: u64,
    token: TipToken,
    amount: String,
    approval: Option<CallResponse>,
    tip: CallResponse,
}

async fn get_tip_call(
    State(state): State<AppState>,
    Query(q): Query<TipCallQuery>,
) -> ApiResult<TipCallResponse> {
    let chain_id = q.chain_id.unwrap_or(state.chain_id);
    let request = TipRequest::parse(
        parse_address(&q.creator)?,
        parse_token(&q.token)?,
        &q.amount,
        q.message,
    )?;

    Ok(Json(TipCallResponse {
        chain_id,
        token: request.token,
        amount: request.amount.to_string(),
        approval: request.approval(chain_id)?.map(CallResponse::from),
        tip: request.call(chain_id)?.into(),
    }))
}

//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the node's HTTP interface. All
//! endpoints share application state through axum's `State` extractor and
//! call straight into [`ProtocolService`].
//!
//! Amounts cross the wire as decimal strings (`"1500.25"`), never floats.
//! Rates are integer basis points (`450` = 4.50%).
//!
//! ## Endpoints
//!
//! | Method | Path                                      | Description                        |
//! |--------|-------------------------------------------|------------------------------------|
//! | GET    | `/`                                       | Service banner                     |
//! | GET    | `/health`                                 | Liveness probe                     |
//! | GET    | `/status`                                 | Node status summary                |
//! | GET    | `/ws`                                     | WebSocket ledger event stream      |
//! | GET    | `/metrics`                                | Prometheus text format             |
//! | POST   | `/api/v1/wallet/:address`                 | Create or get a wallet             |
//! | GET    | `/api/v1/wallet/:address`                 | Wallet details                     |
//! | POST   | `/api/v1/wallet/:address/collateral`      | Set collateral ratio               |
//! | GET    | `/api/v1/wallet/:address/rebalance`       | Rebalance advice for its positions |
//! | GET    | `/api/v1/wallet/:address/portfolio`       | Yield summary for its positions    |
//! | POST   | `/api/v1/mint`                            | Mint against collateral            |
//! | POST   | `/api/v1/redeem`                          | Redeem for collateral              |
//! | POST   | `/api/v1/kyc/verify`                      | Verify a wallet at a tier          |
//! | POST   | `/api/v1/kyc/limit`                       | Check a transaction ceiling        |
//! | POST   | `/api/v1/yield/deposit`                   | Open a yield position              |
//! | GET    | `/api/v1/yield/positions?wallet_address=` | A wallet's positions               |
//! | GET    | `/api/v1/yield/positions/:id`             | One position                       |
//! | POST   | `/api/v1/yield/positions/:id/accrue`      | Accrue days of yield               |
//! | POST   | `/api/v1/yield/positions/:id/close`       | Close a position                   |
//! | GET    | `/api/v1/yield/best?token=&amount=`       | Rank protocols for a token         |
//! | POST   | `/api/v1/yield/rebalance`                 | Rebalance advice for holdings      |
//! | POST   | `/api/v1/yield/portfolio`                 | Yield summary for holdings         |
//! | GET    | `/api/v1/protocol/rates`                  | Supply and borrow rates            |
//! | POST   | `/api/v1/cross-chain/evaluate`            | Bridge or hold                     |
//! | POST   | `/api/v1/price/deviation`                 | Price deviation check              |

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use prometheus::HistogramTimer;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use harbor_protocol::compliance::{ComplianceDecision, KycTier, LimitCheck};
use harbor_protocol::error::{CoreError, ErrorKind};
use harbor_protocol::events::{EventSink, FanoutSink, LedgerEvent, SharedSink, TracingSink};
use harbor_protocol::ledger::{MintReceipt, PositionStatus, RedeemReceipt, Wallet, YieldPosition};
use harbor_protocol::market::{
    AssetClass, BestYield, BridgeAction, BridgeEvaluation, PortfolioYield, PriceDeviation,
    ProtocolQuote, RebalanceRecommendation, RiskTier, YieldOpportunity,
};
use harbor_protocol::units::{format_amount, format_signed, parse_amount, AmountParseError, Bps, Micros};
use harbor_protocol::ProtocolService;

use crate::metrics::{self, SharedMetrics};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone; everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Storage backend label for `/status`.
    pub storage: String,
    pub started_at: DateTime<Utc>,
    pub service: Arc<ProtocolService>,
    /// Ledger events, fanned out to WebSocket subscribers.
    pub event_tx: broadcast::Sender<LedgerEvent>,
    pub metrics: SharedMetrics,
}

impl AppState {
    fn timer(&self, route: &str) -> HistogramTimer {
        self.metrics
            .request_latency_seconds
            .with_label_values(&[route])
            .start_timer()
    }
}

/// Publishes ledger events on a tokio broadcast channel.
///
/// Sending never blocks; with no subscribers the event is simply dropped.
#[derive(Clone)]
pub struct BroadcastSink(pub broadcast::Sender<LedgerEvent>);

impl EventSink for BroadcastSink {
    fn emit(&self, event: &LedgerEvent) {
        let _ = self.0.send(event.clone());
    }
}

/// The sink the node builds its service with: tracing, metrics and the
/// WebSocket broadcast, in that order.
pub fn event_sink(metrics: &SharedMetrics, event_tx: &broadcast::Sender<LedgerEvent>) -> SharedSink {
    let metrics_sink: SharedSink = metrics.clone();
    Arc::new(
        FanoutSink::new()
            .with(Arc::new(TracingSink))
            .with(metrics_sink)
            .with(Arc::new(BroadcastSink(event_tx.clone()))),
    )
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let v1 = Router::new()
        .route("/wallet/:address", post(create_wallet_handler).get(wallet_handler))
        .route("/wallet/:address/collateral", post(collateral_handler))
        .route("/wallet/:address/rebalance", get(wallet_rebalance_handler))
        .route("/wallet/:address/portfolio", get(wallet_portfolio_handler))
        .route("/mint", post(mint_handler))
        .route("/redeem", post(redeem_handler))
        .route("/kyc/verify", post(kyc_verify_handler))
        .route("/kyc/limit", post(kyc_limit_handler))
        .route("/yield/deposit", post(deposit_handler))
        .route("/yield/positions", get(positions_handler))
        .route("/yield/positions/:id", get(position_handler))
        .route("/yield/positions/:id/accrue", post(accrue_handler))
        .route("/yield/positions/:id/close", post(close_handler))
        .route("/yield/best", get(best_yield_handler))
        .route("/yield/rebalance", post(rebalance_handler))
        .route("/yield/portfolio", post(portfolio_handler))
        .route("/protocol/rates", get(rates_handler))
        .route("/cross-chain/evaluate", post(cross_chain_handler))
        .route("/price/deviation", post(price_deviation_handler));

    let metrics_routes = Router::new()
        .route("/metrics", get(metrics::metrics_handler))
        .with_state(Arc::clone(&state.metrics));

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/ws", get(ws_handler))
        .nest("/api/v1", v1)
        .with_state(state)
        .merge(metrics_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable machine-readable label, e.g. `compliance_required`.
    pub code: String,
}

/// Handler failure, rendered as an [`ErrorResponse`].
#[derive(Debug)]
pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl From<AmountParseError> for ApiError {
    fn from(err: AmountParseError) -> Self {
        ApiError(CoreError::from(err))
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::Ledger => StatusCode::BAD_REQUEST,
        ErrorKind::Compliance => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Storage | ErrorKind::Invariant => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind());
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
            code: self.0.label().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn parse_amounts(raw: &BTreeMap<String, String>) -> Result<BTreeMap<String, Micros>, ApiError> {
    raw.iter()
        .map(|(key, value)| Ok((key.clone(), parse_amount(value)?)))
        .collect()
}

// ---------------------------------------------------------------------------
// Request Types
// ---------------------------------------------------------------------------

fn default_collateral_token() -> String {
    "ETH".into()
}

fn default_tier() -> String {
    "basic".into()
}

#[derive(Debug, Deserialize)]
pub struct MintRequest {
    pub wallet_address: String,
    pub amount: String,
    #[serde(default = "default_collateral_token")]
    pub collateral_token: String,
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub wallet_address: String,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct KycVerifyRequest {
    pub wallet_address: String,
    #[serde(default = "default_tier")]
    pub tier: String,
}

#[derive(Debug, Deserialize)]
pub struct KycLimitRequest {
    pub wallet_address: String,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct CollateralRequest {
    pub ratio_bps: Bps,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub wallet_address: String,
    pub protocol: String,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct AccrueRequest {
    pub days: u32,
}

#[derive(Debug, Deserialize)]
pub struct PositionsQuery {
    pub wallet_address: String,
}

#[derive(Debug, Deserialize)]
pub struct BestYieldQuery {
    /// Defaults to the configured reference token.
    pub token: Option<String>,
    pub amount: String,
}

/// Protocol id → amount held there.
#[derive(Debug, Deserialize)]
pub struct HoldingsRequest {
    pub holdings: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct CrossChainRequest {
    pub current_chain: String,
    pub amount: String,
    pub apy_by_chain: BTreeMap<String, Bps>,
    /// One-way bridge fee per chain.
    pub fee_by_chain: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct PriceDeviationRequest {
    pub token: String,
    pub reference_price: String,
    pub current_price: String,
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub storage: String,
    pub wallets: usize,
    pub positions: usize,
    pub protocols: usize,
    pub uptime_seconds: i64,
    /// RFC 3339 timestamp of the response.
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WalletView {
    pub address: String,
    pub balance: String,
    pub collateral_ratio_bps: Bps,
    pub kyc_verified: bool,
    pub kyc_tier: KycTier,
    pub kyc_provider: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Wallet> for WalletView {
    fn from(w: Wallet) -> Self {
        Self {
            address: w.address().to_string(),
            balance: format_amount(w.balance()),
            collateral_ratio_bps: w.collateral_ratio_bps(),
            kyc_verified: w.kyc_verified(),
            kyc_tier: w.kyc_tier(),
            kyc_provider: w.kyc_provider().map(str::to_string),
            created_at: w.created_at(),
            updated_at: w.updated_at(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PositionView {
    pub position_id: String,
    pub wallet_address: String,
    pub protocol: String,
    pub deposited_amount: String,
    pub apy_bps: Bps,
    pub earned_yield: String,
    pub status: PositionStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl From<YieldPosition> for PositionView {
    fn from(p: YieldPosition) -> Self {
        Self {
            position_id: p.position_id().to_string(),
            wallet_address: p.wallet().to_string(),
            protocol: p.protocol().to_string(),
            deposited_amount: format_amount(p.deposited_amount()),
            apy_bps: p.apy_bps(),
            earned_yield: format_amount(p.earned_yield()),
            status: p.status(),
            opened_at: p.opened_at(),
            closed_at: p.closed_at(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MintView {
    pub tx_hash: String,
    pub wallet: String,
    pub minted_amount: String,
    pub collateral_token: String,
    pub new_balance: String,
    pub timestamp: DateTime<Utc>,
}

impl From<MintReceipt> for MintView {
    fn from(r: MintReceipt) -> Self {
        Self {
            tx_hash: r.tx_id,
            wallet: r.wallet,
            minted_amount: format_amount(r.amount),
            collateral_token: r.collateral_token,
            new_balance: format_amount(r.new_balance),
            timestamp: r.timestamp,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RedeemView {
    pub tx_hash: String,
    pub wallet: String,
    pub redeemed_amount: String,
    pub collateral_received: String,
    pub new_balance: String,
    pub timestamp: DateTime<Utc>,
}

impl From<RedeemReceipt> for RedeemView {
    fn from(r: RedeemReceipt) -> Self {
        Self {
            tx_hash: r.tx_id,
            wallet: r.wallet,
            redeemed_amount: format_amount(r.amount),
            collateral_received: format_amount(r.collateral_returned),
            new_balance: format_amount(r.new_balance),
            timestamp: r.timestamp,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KycView {
    pub wallet_address: String,
    pub status: String,
    pub tier: KycTier,
    pub provider: String,
    pub max_transaction: String,
    pub checked_at: DateTime<Utc>,
}

impl From<ComplianceDecision> for KycView {
    fn from(d: ComplianceDecision) -> Self {
        Self {
            wallet_address: d.wallet,
            status: if d.verified { "verified" } else { "rejected" }.into(),
            tier: d.tier,
            provider: d.provider,
            max_transaction: format_amount(d.max_transaction),
            checked_at: d.timestamp,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LimitView {
    pub wallet_address: String,
    pub tier: KycTier,
    pub amount: String,
    pub limit: String,
    pub allowed: bool,
    pub remaining: String,
}

impl From<LimitCheck> for LimitView {
    fn from(c: LimitCheck) -> Self {
        Self {
            wallet_address: c.wallet,
            tier: c.tier,
            amount: format_amount(c.amount),
            limit: format_amount(c.limit),
            allowed: c.allowed,
            remaining: format_signed(c.remaining),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OpportunityView {
    pub protocol: String,
    pub name: String,
    pub apy_bps: Bps,
    pub annual_yield: String,
    pub risk: RiskTier,
}

impl From<YieldOpportunity> for OpportunityView {
    fn from(o: YieldOpportunity) -> Self {
        Self {
            protocol: o.protocol,
            name: o.name,
            apy_bps: o.apy_bps,
            annual_yield: format_amount(o.annual_yield),
            risk: o.risk,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BestYieldView {
    pub token: String,
    pub amount: String,
    pub best: Option<OpportunityView>,
    pub opportunities: Vec<OpportunityView>,
}

impl From<BestYield> for BestYieldView {
    fn from(b: BestYield) -> Self {
        Self {
            token: b.token,
            amount: format_amount(b.amount),
            best: b.best.map(OpportunityView::from),
            opportunities: b.opportunities.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RebalanceView {
    pub from_protocol: String,
    pub to_protocol: String,
    pub amount: String,
    pub current_apy_bps: Bps,
    pub new_apy_bps: Bps,
    pub additional_annual_yield: String,
}

impl From<RebalanceRecommendation> for RebalanceView {
    fn from(r: RebalanceRecommendation) -> Self {
        Self {
            from_protocol: r.from_protocol,
            to_protocol: r.to_protocol,
            amount: format_amount(r.amount),
            current_apy_bps: r.current_apy_bps,
            new_apy_bps: r.new_apy_bps,
            additional_annual_yield: format_amount(r.additional_annual_yield),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PortfolioView {
    pub total_value: String,
    pub weighted_apy_bps: Bps,
    pub annual_yield: String,
}

impl From<PortfolioYield> for PortfolioView {
    fn from(p: PortfolioYield) -> Self {
        Self {
            total_value: format_amount(p.total_value),
            weighted_apy_bps: p.weighted_apy_bps,
            annual_yield: format_amount(p.annual_yield),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RateView {
    pub protocol: String,
    pub name: String,
    pub supply_apy_bps: Bps,
    pub borrow_apy_bps: Option<Bps>,
    pub tokens: Vec<String>,
    pub risk: RiskTier,
}

impl From<ProtocolQuote> for RateView {
    fn from(q: ProtocolQuote) -> Self {
        Self {
            protocol: q.protocol,
            name: q.name,
            supply_apy_bps: q.supply_apy_bps,
            borrow_apy_bps: q.borrow_apy_bps,
            tokens: q.tokens,
            risk: q.risk,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CandidateView {
    pub chain: String,
    pub apy_bps: Bps,
    pub gross_profit: String,
    pub round_trip_fee: String,
    pub net_profit: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BridgeView {
    pub action: BridgeAction,
    pub source_chain: String,
    pub target_chain: Option<String>,
    pub amount: String,
    pub horizon_days: u32,
    pub current_profit: String,
    pub projected_net_profit: String,
    pub estimated_gas: String,
    pub candidates: Vec<CandidateView>,
}

impl From<BridgeEvaluation> for BridgeView {
    fn from(e: BridgeEvaluation) -> Self {
        Self {
            action: e.action,
            source_chain: e.source_chain,
            target_chain: e.target_chain,
            amount: format_amount(e.amount),
            horizon_days: e.horizon_days,
            current_profit: format_signed(e.current_profit),
            projected_net_profit: format_signed(e.projected_net_profit),
            estimated_gas: format_amount(e.estimated_gas),
            candidates: e
                .candidates
                .into_iter()
                .map(|c| CandidateView {
                    chain: c.chain,
                    apy_bps: c.apy_bps,
                    gross_profit: format_amount(c.gross_profit),
                    round_trip_fee: format_amount(c.round_trip_fee),
                    net_profit: format_signed(c.net_profit),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeviationView {
    pub token: String,
    pub class: AssetClass,
    pub reference_price: String,
    pub current_price: String,
    pub deviation_bps: Bps,
    pub threshold_bps: Bps,
    pub alert: bool,
}

impl From<PriceDeviation> for DeviationView {
    fn from(d: PriceDeviation) -> Self {
        Self {
            token: d.token,
            class: d.class,
            reference_price: format_amount(d.reference_price),
            current_price: format_amount(d.current_price),
            deviation_bps: d.deviation_bps,
            threshold_bps: d.threshold_bps,
            alert: d.alert,
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers: node
// ---------------------------------------------------------------------------

async fn root_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "Harbor",
        "version": state.version,
        "features": ["yield optimization", "cross-chain routing", "kyc gate", "mint / redeem ledger"],
    }))
}

/// `GET /health`: returns 200 while the process is up.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: counts come from the store, so they survive restarts on sled.
async fn status_handler(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    let ledger = state.service.ledger();
    let now = Utc::now();
    Ok(Json(StatusResponse {
        version: state.version.clone(),
        storage: state.storage.clone(),
        wallets: ledger.wallet_count()?,
        positions: ledger.position_count()?,
        protocols: state.service.registry().len(),
        uptime_seconds: (now - state.started_at).num_seconds(),
        timestamp: now.to_rfc3339(),
    }))
}

/// `GET /ws`: WebSocket upgrade for live ledger events.
///
/// Clients receive JSON-encoded [`LedgerEvent`]s. Client messages are
/// ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers: wallets and compliance
// ---------------------------------------------------------------------------

async fn create_wallet_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<WalletView> {
    let _timer = state.timer("wallet_create");
    Ok(Json(state.service.register_wallet(&address)?.into()))
}

async fn wallet_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<WalletView> {
    Ok(Json(state.service.wallet(&address)?.into()))
}

async fn collateral_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<CollateralRequest>,
) -> ApiResult<WalletView> {
    let _timer = state.timer("collateral");
    Ok(Json(
        state
            .service
            .update_collateral_ratio(&address, req.ratio_bps)?
            .into(),
    ))
}

async fn wallet_rebalance_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Vec<RebalanceView>> {
    let recs = state.service.rebalance_wallet(&address)?;
    Ok(Json(recs.into_iter().map(Into::into).collect()))
}

async fn wallet_portfolio_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<PortfolioView> {
    Ok(Json(state.service.wallet_portfolio(&address)?.into()))
}

async fn kyc_verify_handler(
    State(state): State<AppState>,
    Json(req): Json<KycVerifyRequest>,
) -> ApiResult<KycView> {
    let _timer = state.timer("kyc_verify");
    Ok(Json(state.service.verify(&req.wallet_address, &req.tier)?.into()))
}

async fn kyc_limit_handler(
    State(state): State<AppState>,
    Json(req): Json<KycLimitRequest>,
) -> ApiResult<LimitView> {
    let amount = parse_amount(&req.amount)?;
    Ok(Json(
        state
            .service
            .check_limit(&req.wallet_address, amount)?
            .into(),
    ))
}

// ---------------------------------------------------------------------------
// Handlers: mint and redeem
// ---------------------------------------------------------------------------

async fn mint_handler(
    State(state): State<AppState>,
    Json(req): Json<MintRequest>,
) -> ApiResult<MintView> {
    let _timer = state.timer("mint");
    let amount = parse_amount(&req.amount)?;
    let receipt = state
        .service
        .mint(&req.wallet_address, amount, &req.collateral_token)?;
    Ok(Json(receipt.into()))
}

async fn redeem_handler(
    State(state): State<AppState>,
    Json(req): Json<RedeemRequest>,
) -> ApiResult<RedeemView> {
    let _timer = state.timer("redeem");
    let amount = parse_amount(&req.amount)?;
    Ok(Json(state.service.redeem(&req.wallet_address, amount)?.into()))
}

// ---------------------------------------------------------------------------
// Handlers: yield
// ---------------------------------------------------------------------------

async fn deposit_handler(
    State(state): State<AppState>,
    Json(req): Json<DepositRequest>,
) -> ApiResult<PositionView> {
    let _timer = state.timer("yield_deposit");
    let amount = parse_amount(&req.amount)?;
    let position = state
        .service
        .open_position(&req.wallet_address, &req.protocol, amount)?;
    Ok(Json(position.into()))
}

async fn positions_handler(
    Query(query): Query<PositionsQuery>,
    State(state): State<AppState>,
) -> ApiResult<Vec<PositionView>> {
    let positions = state.service.positions(&query.wallet_address)?;
    Ok(Json(positions.into_iter().map(Into::into).collect()))
}

async fn position_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<PositionView> {
    Ok(Json(state.service.position(&id)?.into()))
}

async fn accrue_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<AccrueRequest>,
) -> ApiResult<PositionView> {
    let _timer = state.timer("yield_accrue");
    Ok(Json(state.service.accrue_yield(&id, req.days)?.into()))
}

async fn close_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<PositionView> {
    let _timer = state.timer("yield_close");
    Ok(Json(state.service.close_position(&id)?.into()))
}

async fn best_yield_handler(
    Query(query): Query<BestYieldQuery>,
    State(state): State<AppState>,
) -> ApiResult<BestYieldView> {
    let amount = parse_amount(&query.amount)?;
    let token = query
        .token
        .unwrap_or_else(|| state.service.config().optimizer.reference_token.clone());
    Ok(Json(state.service.best_yield(&token, amount).into()))
}

async fn rebalance_handler(
    State(state): State<AppState>,
    Json(req): Json<HoldingsRequest>,
) -> ApiResult<Vec<RebalanceView>> {
    let holdings = parse_amounts(&req.holdings)?;
    let recs = state.service.rebalance_recommendations(&holdings);
    Ok(Json(recs.into_iter().map(Into::into).collect()))
}

async fn portfolio_handler(
    State(state): State<AppState>,
    Json(req): Json<HoldingsRequest>,
) -> ApiResult<PortfolioView> {
    let holdings = parse_amounts(&req.holdings)?;
    Ok(Json(state.service.portfolio_yield(&holdings).into()))
}

/// `GET /api/v1/protocol/rates`: the whole catalog with borrow rates.
async fn rates_handler(State(state): State<AppState>) -> Json<Vec<RateView>> {
    Json(
        state
            .service
            .protocol_rates()
            .into_iter()
            .map(Into::into)
            .collect(),
    )
}

// ---------------------------------------------------------------------------
// Handlers: routing and monitoring
// ---------------------------------------------------------------------------

async fn cross_chain_handler(
    State(state): State<AppState>,
    Json(req): Json<CrossChainRequest>,
) -> ApiResult<BridgeView> {
    let amount = parse_amount(&req.amount)?;
    let fees = parse_amounts(&req.fee_by_chain)?;
    let eval = state
        .service
        .evaluate_cross_chain(&req.current_chain, amount, &req.apy_by_chain, &fees);
    Ok(Json(eval.into()))
}

async fn price_deviation_handler(
    State(state): State<AppState>,
    Json(req): Json<PriceDeviationRequest>,
) -> ApiResult<DeviationView> {
    let reference = parse_amount(&req.reference_price)?;
    let current = parse_amount(&req.current_price)?;
    let deviation = state.service.check_price(&req.token, reference, current)?;
    Ok(Json(deviation.into()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use harbor_protocol::compliance::FixedProvider;
    use harbor_protocol::config::CoreConfig;
    use harbor_protocol::ledger::SequentialIds;
    use harbor_protocol::service::ServiceParts;
    use harbor_protocol::storage::MemoryStore;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::metrics::NodeMetrics;

    /// Creates a test AppState over an in-memory store with deterministic
    /// ids and a fixed KYC provider.
    fn test_app_state() -> AppState {
        let (event_tx, _) = broadcast::channel(64);
        let metrics = Arc::new(NodeMetrics::new().unwrap());

        let mut parts = ServiceParts::new(Arc::new(MemoryStore::new()));
        parts.events = event_sink(&metrics, &event_tx);
        parts.ids = Arc::new(SequentialIds::new());
        parts.selector = Arc::new(FixedProvider("kyc_aml".into()));
        let service = ProtocolService::with_parts(CoreConfig::default(), parts).unwrap();

        AppState {
            version: "0.1.0-test".into(),
            storage: "memory".into(),
            started_at: Utc::now(),
            service: Arc::new(service),
            event_tx,
            metrics,
        }
    }

    /// Sends a GET request and returns the (status, body_bytes).
    async fn get(router: &Router, path: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        send(router, req).await
    }

    /// Sends a POST request with JSON body and returns (status, body_bytes).
    async fn post_json(
        router: &Router,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, Vec<u8>) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        send(router, req).await
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    /// Verifies `address` at `tier` and sets a healthy collateral ratio.
    async fn onboard(router: &Router, address: &str, tier: &str) {
        let (status, _) = post_json(
            router,
            "/api/v1/kyc/verify",
            serde_json::json!({ "wallet_address": address, "tier": tier }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = post_json(
            router,
            &format!("/api/v1/wallet/{address}/collateral"),
            serde_json::json!({ "ratio_bps": 17_500 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    fn error_code(body: &[u8]) -> String {
        serde_json::from_slice::<ErrorResponse>(body).unwrap().code
    }

    // -- Node ----------------------------------------------------------------

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let router = create_router(test_app_state());
        let (status, body) = get(&router, "/health").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn status_counts_wallets_and_protocols() {
        let router = create_router(test_app_state());
        post_json(&router, "/api/v1/wallet/0xaaa", serde_json::json!({})).await;
        post_json(&router, "/api/v1/wallet/0xbbb", serde_json::json!({})).await;

        let (status, body) = get(&router, "/status").await;
        assert_eq!(status, StatusCode::OK);
        let resp: StatusResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.wallets, 2);
        assert_eq!(resp.positions, 0);
        assert_eq!(resp.protocols, 4);
        assert_eq!(resp.storage, "memory");
    }

    #[tokio::test]
    async fn metrics_endpoint_counts_ledger_events() {
        let router = create_router(test_app_state());
        onboard(&router, "0xmeter", "basic").await;
        post_json(
            &router,
            "/api/v1/mint",
            serde_json::json!({ "wallet_address": "0xmeter", "amount": "10" }),
        )
        .await;
        post_json(
            &router,
            "/api/v1/redeem",
            serde_json::json!({ "wallet_address": "0xmeter", "amount": "99" }),
        )
        .await;

        let (status, body) = get(&router, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("harbor_mints_total 1"));
        assert!(text.contains("harbor_wallets 1"));
        assert!(text.contains(
            "harbor_rejections_total{operation=\"redeem\",reason=\"insufficient_balance\"} 1"
        ));
    }

    #[tokio::test]
    async fn ledger_events_reach_broadcast_subscribers() {
        let state = test_app_state();
        let mut rx = state.event_tx.subscribe();
        let router = create_router(state);

        post_json(&router, "/api/v1/wallet/0xlisten", serde_json::json!({})).await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), "wallet_registered");
    }

    // -- Wallets and compliance ----------------------------------------------

    #[tokio::test]
    async fn wallet_create_is_idempotent_and_unknown_is_404() {
        let router = create_router(test_app_state());

        let (status, body) = post_json(&router, "/api/v1/wallet/0xa11ce", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::OK);
        let wallet: WalletView = serde_json::from_slice(&body).unwrap();
        assert_eq!(wallet.balance, "0.00");
        assert!(!wallet.kyc_verified);
        assert_eq!(wallet.kyc_tier, KycTier::None);

        let (status, _) = post_json(&router, "/api/v1/wallet/0xa11ce", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = get(&router, "/api/v1/wallet/0xb0b").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error_code(&body), "wallet_not_found");
    }

    #[tokio::test]
    async fn kyc_verify_reports_tier_and_ceiling() {
        let router = create_router(test_app_state());
        let (status, body) = post_json(
            &router,
            "/api/v1/kyc/verify",
            serde_json::json!({ "wallet_address": "0xkyc" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let view: KycView = serde_json::from_slice(&body).unwrap();
        assert_eq!(view.status, "verified");
        assert_eq!(view.tier, KycTier::Basic);
        assert_eq!(view.provider, "kyc_aml");
        assert_eq!(view.max_transaction, "10000.00");
    }

    #[tokio::test]
    async fn kyc_verify_rejects_unknown_tier() {
        let router = create_router(test_app_state());
        let (status, body) = post_json(
            &router,
            "/api/v1/kyc/verify",
            serde_json::json!({ "wallet_address": "0xkyc", "tier": "platinum" }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&body), "invalid_tier");
    }

    #[tokio::test]
    async fn kyc_limit_reports_negative_remaining() {
        let router = create_router(test_app_state());
        onboard(&router, "0xlimit", "basic").await;

        let (status, body) = post_json(
            &router,
            "/api/v1/kyc/limit",
            serde_json::json!({ "wallet_address": "0xlimit", "amount": "12500" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let view: LimitView = serde_json::from_slice(&body).unwrap();
        assert!(!view.allowed);
        assert_eq!(view.remaining, "-2500.00");
    }

    // -- Mint and redeem -----------------------------------------------------

    #[tokio::test]
    async fn unverified_mint_is_forbidden() {
        let router = create_router(test_app_state());
        post_json(&router, "/api/v1/wallet/0xanon", serde_json::json!({})).await;

        let (status, body) = post_json(
            &router,
            "/api/v1/mint",
            serde_json::json!({ "wallet_address": "0xanon", "amount": "100" }),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(error_code(&body), "compliance_required");
    }

    #[tokio::test]
    async fn mint_to_unknown_wallet_is_404() {
        let router = create_router(test_app_state());
        let (status, _) = post_json(
            &router,
            "/api/v1/mint",
            serde_json::json!({ "wallet_address": "0xghost", "amount": "1" }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn mint_with_low_collateral_is_bad_request() {
        let router = create_router(test_app_state());
        onboard(&router, "0xthin", "full").await;
        post_json(
            &router,
            "/api/v1/wallet/0xthin/collateral",
            serde_json::json!({ "ratio_bps": 12_000 }),
        )
        .await;

        let (status, body) = post_json(
            &router,
            "/api/v1/mint",
            serde_json::json!({ "wallet_address": "0xthin", "amount": "1000" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&body), "insufficient_collateral");
    }

    #[tokio::test]
    async fn malformed_amount_is_bad_request() {
        let router = create_router(test_app_state());
        onboard(&router, "0xfussy", "basic").await;

        for amount in ["1.0000001", "abc", ""] {
            let (status, body) = post_json(
                &router,
                "/api/v1/mint",
                serde_json::json!({ "wallet_address": "0xfussy", "amount": amount }),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "amount {amount:?}");
            assert_eq!(error_code(&body), "malformed_amount");
        }
    }

    #[tokio::test]
    async fn mint_then_redeem_round_trip() {
        let router = create_router(test_app_state());
        onboard(&router, "0xcycle", "basic").await;

        let (status, body) = post_json(
            &router,
            "/api/v1/mint",
            serde_json::json!({
                "wallet_address": "0xcycle",
                "amount": "1500.50",
                "collateral_token": "WBTC"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let minted: MintView = serde_json::from_slice(&body).unwrap();
        assert_eq!(minted.tx_hash, "tx-000001");
        assert_eq!(minted.collateral_token, "WBTC");
        assert_eq!(minted.new_balance, "1500.50");

        let (status, body) = post_json(
            &router,
            "/api/v1/redeem",
            serde_json::json!({ "wallet_address": "0xcycle", "amount": "500.50" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let redeemed: RedeemView = serde_json::from_slice(&body).unwrap();
        assert_eq!(redeemed.new_balance, "1000.00");
        assert_eq!(redeemed.collateral_received, "750.75");

        let (status, body) = post_json(
            &router,
            "/api/v1/redeem",
            serde_json::json!({ "wallet_address": "0xcycle", "amount": "1000.01" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&body), "insufficient_balance");
    }

    // -- Yield ---------------------------------------------------------------

    #[tokio::test]
    async fn position_lifecycle_over_http() {
        let router = create_router(test_app_state());
        post_json(&router, "/api/v1/wallet/0xfarmer01", serde_json::json!({})).await;

        let (status, body) = post_json(
            &router,
            "/api/v1/yield/deposit",
            serde_json::json!({
                "wallet_address": "0xfarmer01",
                "protocol": "compound",
                "amount": "800"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let opened: PositionView = serde_json::from_slice(&body).unwrap();
        assert_eq!(opened.apy_bps, 380);
        assert!(opened.position_id.starts_with("0xfarmer"));

        let (_, body) = post_json(
            &router,
            &format!("/api/v1/yield/positions/{}/accrue", opened.position_id),
            serde_json::json!({ "days": 73 }),
        )
        .await;
        let accrued: PositionView = serde_json::from_slice(&body).unwrap();
        assert_eq!(accrued.earned_yield, "6.08");

        let (status, _) = post_json(
            &router,
            &format!("/api/v1/yield/positions/{}/close", opened.position_id),
            serde_json::json!({}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = post_json(
            &router,
            &format!("/api/v1/yield/positions/{}/close", opened.position_id),
            serde_json::json!({}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&body), "position_closed");

        let (status, body) = get(&router, "/api/v1/yield/positions?wallet_address=0xfarmer01").await;
        assert_eq!(status, StatusCode::OK);
        let listed: Vec<PositionView> = serde_json::from_slice(&body).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, PositionStatus::Closed);

        let (status, _) = get(&router, "/api/v1/yield/positions/0xnothing-00000000").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn best_yield_ranks_yearn_first_for_usdc() {
        let router = create_router(test_app_state());
        let (status, body) = get(&router, "/api/v1/yield/best?token=USDC&amount=10000").await;

        assert_eq!(status, StatusCode::OK);
        let view: BestYieldView = serde_json::from_slice(&body).unwrap();
        let best = view.best.unwrap();
        assert_eq!(best.protocol, "yearn");
        assert_eq!(best.annual_yield, "650.00");
        assert_eq!(view.opportunities.len(), 4);
    }

    #[tokio::test]
    async fn wallet_rebalance_advises_on_positions() {
        let router = create_router(test_app_state());
        post_json(&router, "/api/v1/wallet/0xmover", serde_json::json!({})).await;
        post_json(
            &router,
            "/api/v1/yield/deposit",
            serde_json::json!({ "wallet_address": "0xmover", "protocol": "curve", "amount": "1000" }),
        )
        .await;

        let (status, body) = get(&router, "/api/v1/wallet/0xmover/rebalance").await;
        assert_eq!(status, StatusCode::OK);
        let recs: Vec<RebalanceView> = serde_json::from_slice(&body).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].to_protocol, "yearn");
        assert_eq!(recs[0].additional_annual_yield, "40.00");

        let (_, body) = get(&router, "/api/v1/wallet/0xmover/portfolio").await;
        let portfolio: PortfolioView = serde_json::from_slice(&body).unwrap();
        assert_eq!(portfolio.total_value, "1000.00");
        assert_eq!(portfolio.weighted_apy_bps, 250);
    }

    #[tokio::test]
    async fn holdings_rebalance_and_portfolio() {
        let router = create_router(test_app_state());
        let holdings = serde_json::json!({ "holdings": { "aave": "1000", "compound": "1000" } });

        let (status, body) = post_json(&router, "/api/v1/yield/rebalance", holdings.clone()).await;
        assert_eq!(status, StatusCode::OK);
        let recs: Vec<RebalanceView> = serde_json::from_slice(&body).unwrap();
        assert_eq!(recs.len(), 2);

        let (_, body) = post_json(&router, "/api/v1/yield/portfolio", holdings).await;
        let portfolio: PortfolioView = serde_json::from_slice(&body).unwrap();
        assert_eq!(portfolio.total_value, "2000.00");
        assert_eq!(portfolio.weighted_apy_bps, 415);
        assert_eq!(portfolio.annual_yield, "83.00");
    }

    #[tokio::test]
    async fn protocol_rates_include_borrow_apy() {
        let router = create_router(test_app_state());
        let (status, body) = get(&router, "/api/v1/protocol/rates").await;

        assert_eq!(status, StatusCode::OK);
        let rates: Vec<RateView> = serde_json::from_slice(&body).unwrap();
        let aave = rates.iter().find(|r| r.protocol == "aave").unwrap();
        assert_eq!(aave.supply_apy_bps, 450);
        assert_eq!(aave.borrow_apy_bps, Some(820));
    }

    // -- Routing and monitoring ----------------------------------------------

    #[tokio::test]
    async fn cross_chain_bridges_to_base() {
        let router = create_router(test_app_state());
        let (status, body) = post_json(
            &router,
            "/api/v1/cross-chain/evaluate",
            serde_json::json!({
                "current_chain": "ethereum",
                "amount": "10000",
                "apy_by_chain": { "ethereum": 420, "base": 1210 },
                "fee_by_chain": { "ethereum": "12.50", "base": "0.15" }
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let view: BridgeView = serde_json::from_slice(&body).unwrap();
        assert_eq!(view.action, BridgeAction::Bridge);
        assert_eq!(view.target_chain.as_deref(), Some("base"));
        assert_eq!(view.projected_net_profit, "86.802054");
        assert_eq!(view.estimated_gas, "12.65");
    }

    #[tokio::test]
    async fn price_deviation_alerts_outside_band() {
        let router = create_router(test_app_state());
        let (status, body) = post_json(
            &router,
            "/api/v1/price/deviation",
            serde_json::json!({
                "token": "USDC",
                "reference_price": "1.00",
                "current_price": "0.99"
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let view: DeviationView = serde_json::from_slice(&body).unwrap();
        assert_eq!(view.class, AssetClass::Stable);
        assert_eq!(view.deviation_bps, 100);
        assert!(view.alert);

        let (status, body) = post_json(
            &router,
            "/api/v1/price/deviation",
            serde_json::json!({
                "token": "ETH",
                "reference_price": "0",
                "current_price": "2000"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&body), "zero_reference_price");
    }
}

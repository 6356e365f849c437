use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use statshub_metrics::{instrument, metrics_router, MetricsHub};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::common::HealthStatus;

#[derive(Clone)]
pub struct AppState {
    start_time: Instant,
    hub: Arc<MetricsHub>,
    orders: Arc<RwLock<Vec<Order>>>,
    order_counter: Arc<RwLock<u64>>,
}

impl AppState {
    pub fn new(hub: Arc<MetricsHub>) -> Self {
        Self {
            start_time: Instant::now(),
            hub,
            orders: Arc::new(RwLock::new(Vec::new())),
            order_counter: Arc::new(RwLock::new(1)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub symbol: String,
    pub side: OrderSide,
    pub price: f64,
    pub quantity: f64,
    pub status: OrderStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Cancelled,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub price: f64,
    pub quantity: f64,
}

#[derive(Debug, Serialize)]
pub struct MarketData {
    pub symbol: String,
    pub price: f64,
    pub volume: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Orders API, instrumented by the hub, with the hub's metrics routes merged
/// in uninstrumented.
pub fn app(hub: Arc<MetricsHub>) -> Router {
    let state = AppState::new(Arc::clone(&hub));

    let routes = Router::new()
        .route("/health", get(health_check))
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/:id", get(get_order).delete(cancel_order))
        .route("/market-data", get(market_data))
        .with_state(state);

    instrument(routes, Arc::clone(&hub))
        .merge(metrics_router(hub))
        .layer(TraceLayer::new_for_http())
}

async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus::healthy(
        state.hub.config().service_name.clone(),
        state.start_time.elapsed().as_secs(),
        state.hub.snapshots().len(),
    ))
}

async fn list_orders(State(state): State<AppState>) -> Json<Vec<Order>> {
    let orders = state.orders.read().await;
    Json(orders.clone())
}

async fn create_order(
    State(state): State<AppState>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), StatusCode> {
    if req.quantity <= 0.0 || req.price <= 0.0 {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let order_id = {
        let mut counter = state.order_counter.write().await;
        let id = *counter;
        *counter += 1;
        id
    };

    let order = Order {
        id: order_id,
        symbol: req.symbol,
        side: req.side,
        price: req.price,
        quantity: req.quantity,
        status: OrderStatus::Pending,
        created_at: chrono::Utc::now(),
    };

    state.orders.write().await.push(order.clone());
    info!("Created order: {:?}", order);

    Ok((StatusCode::CREATED, Json(order)))
}

async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<u64>,
) -> Result<Json<Order>, StatusCode> {
    let orders = state.orders.read().await;
    orders
        .iter()
        .find(|o| o.id == order_id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<u64>,
) -> Result<Json<Order>, StatusCode> {
    let mut orders = state.orders.write().await;
    let order = orders
        .iter_mut()
        .find(|o| o.id == order_id)
        .ok_or(StatusCode::NOT_FOUND)?;

    order.status = OrderStatus::Cancelled;
    info!("Cancelled order: {}", order_id);
    Ok(Json(order.clone()))
}

async fn market_data() -> Json<Vec<MarketData>> {
    // Simulated upstream lookup.
    let delay = rand::random::<u64>() % 25;
    tokio::time::sleep(Duration::from_millis(delay)).await;

    let data: Vec<MarketData> = ["BTC/USD", "ETH/USD", "SOL/USD"]
        .iter()
        .map(|symbol| MarketData {
            symbol: symbol.to_string(),
            price: 50000.0 + (rand::random::<f64>() * 1000.0),
            volume: 1000000.0 + (rand::random::<f64>() * 100000.0),
            timestamp: chrono::Utc::now(),
        })
        .collect();

    Json(data)
}

//! HTTP route layer: token auth, request logging, and the product endpoints
//!
//! Partial scraping failure is never an HTTP error here; degraded records go
//! out with a 200. Error statuses are reserved for bad request bodies, a
//! failed login on the single-SKU path, and the auth middleware's 401s.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::models::{
    LoginResponse, ProductsRequest, ProductsResponse, SingleProductResponse, UnauthorizedBody,
};
use crate::scraper::ProductSource;

/// Hard ceiling on per-batch concurrency, regardless of what the caller asks for
const MAX_WORKERS_CAP: usize = 100;
const DEFAULT_MAX_WORKERS: usize = 10;

static REQUEST_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn ProductSource>,
    pub api_token: String,
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/products", post(products))
        .route("/api/product/:sku", get(single_product))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/health", get(health))
        .route("/login", post(login))
        .merge(protected)
        .layer(middleware::from_fn(log_request))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Decides whether an `Authorization` header value grants access.
///
/// The expected value is a single pre-shared `Basic` token compared by exact
/// string match. An empty configured token locks the API rather than opening
/// it.
fn check_token(header: Option<&str>, expected: &str) -> Result<(), &'static str> {
    let Some(value) = header else {
        return Err("Authorization header is missing");
    };
    if !expected.is_empty() {
        if let Some(token) = value.strip_prefix("Basic ") {
            if token == expected {
                return Ok(());
            }
        }
    }
    Err("Invalid authorization")
}

async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match check_token(header, &state.api_token) {
        Ok(()) => next.run(request).await,
        Err(message) => {
            warn!("Rejected API request to {}: {}", request.uri().path(), message);
            (
                StatusCode::UNAUTHORIZED,
                Json(UnauthorizedBody {
                    message: message.to_string(),
                    error: "Unauthorized".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Request/response log line pair with a per-request id. The Authorization
/// header is deliberately never logged.
async fn log_request(request: Request, next: Next) -> Response {
    let request_id = format!(
        "{}-{:04}",
        Utc::now().format("%Y%m%d%H%M%S"),
        REQUEST_SEQ.fetch_add(1, Ordering::Relaxed) % 10_000
    );
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    info!("Request ID: {} | Method: {} | Path: {}", request_id, method, path);

    let started = Instant::now();
    let response = next.run(request).await;

    info!(
        "Request ID: {} | Status: {} | Processing time: {:.2} seconds",
        request_id,
        response.status(),
        started.elapsed().as_secs_f64()
    );
    response
}

/// Liveness only, no auth
async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn login(State(state): State<AppState>) -> Response {
    info!("Processing login request");
    if state.source.login().await {
        info!("Login successful");
        Json(LoginResponse {
            status: "success".to_string(),
            message: "Login successful".to_string(),
        })
        .into_response()
    } else {
        warn!("Login failed");
        (
            StatusCode::UNAUTHORIZED,
            Json(LoginResponse {
                status: "error".to_string(),
                message: "Login failed".to_string(),
            }),
        )
            .into_response()
    }
}

async fn products(
    State(state): State<AppState>,
    Json(request): Json<ProductsRequest>,
) -> Json<ProductsResponse> {
    let started = Instant::now();
    let max_workers = request
        .max_workers
        .unwrap_or(DEFAULT_MAX_WORKERS)
        .min(MAX_WORKERS_CAP);

    info!(
        "Processing request for {} SKUs with {} workers",
        request.sku_ids.len(),
        max_workers
    );

    let products = state.source.fetch_all(&request.sku_ids, max_workers).await;
    let processing_time = started.elapsed().as_secs_f64();
    info!(
        "Request processed in {:.2} seconds, found {} products",
        processing_time,
        products.len()
    );

    Json(ProductsResponse {
        count: products.len(),
        products,
        processing_time,
    })
}

async fn single_product(State(state): State<AppState>, Path(sku): Path<String>) -> Response {
    let started = Instant::now();
    info!("Processing request for SKU: {}", sku);

    match state.source.fetch_one(&sku).await {
        Some(product) => Json(SingleProductResponse {
            product,
            processing_time: started.elapsed().as_secs_f64(),
        })
        .into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Login failed"})),
        )
            .into_response(),
    }
}

//! HTTP API for the order broker.
//!
//! Every reply uses the same envelope: `{ code, message, data }` on success
//! and `{ code, message, error }` on failure, where `code` repeats the HTTP
//! status.

use axum::{
	extract::{rejection::JsonRejection, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
	Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use topup_core::OrderEngine;
use topup_types::{ErrorKind, OrderConfirmRequest, OrderError, OrderRequest, OrderUpdateRequest};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
	pub code: u16,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,
}

pub fn router(engine: Arc<OrderEngine>) -> Router {
	Router::new()
		.route("/health", get(health_check))
		.route("/v1/api/order/create", post(create_order))
		.route("/v1/api/order/confirm", post(confirm_order))
		// providers call back with either verb
		.route(
			"/v1/api/order/update-status",
			post(update_order_status).patch(update_order_status),
		)
		.with_state(engine)
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
}

pub async fn start_http_server(engine: Arc<OrderEngine>, host: &str, port: u16) -> anyhow::Result<()> {
	let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;
	info!("API server listening on {}:{}", host, port);

	axum::serve(listener, router(engine)).await?;
	Ok(())
}

fn status_for(kind: ErrorKind) -> StatusCode {
	match kind {
		ErrorKind::NotFound => StatusCode::NOT_FOUND,
		ErrorKind::ValidationMismatch => StatusCode::BAD_REQUEST,
		ErrorKind::InvalidTransition => StatusCode::CONFLICT,
		ErrorKind::LockTimeout | ErrorKind::NoProviderAvailable => StatusCode::SERVICE_UNAVAILABLE,
		ErrorKind::UnsupportedProviderType | ErrorKind::Infra => StatusCode::INTERNAL_SERVER_ERROR,
	}
}

fn success<T: Serialize>(data: Option<T>) -> Response {
	let body = ApiResponse {
		code: StatusCode::OK.as_u16(),
		message: "success".to_string(),
		error: None,
		data,
	};
	(StatusCode::OK, Json(body)).into_response()
}

fn failure(status: StatusCode, error: String) -> Response {
	let body = ApiResponse::<()> {
		code: status.as_u16(),
		message: status.canonical_reason().unwrap_or("Error").to_string(),
		error: Some(error),
		data: None,
	};
	(status, Json(body)).into_response()
}

fn order_failure(operation: &str, e: OrderError) -> Response {
	let status = status_for(e.kind());
	if status.is_server_error() {
		warn!(error = %e, "Failed to {}", operation);
	}
	failure(status, e.message().to_string())
}

fn bad_request(rejection: JsonRejection) -> Response {
	failure(StatusCode::BAD_REQUEST, rejection.body_text())
}

async fn health_check() -> StatusCode {
	StatusCode::OK
}

async fn create_order(
	State(engine): State<Arc<OrderEngine>>,
	payload: Result<Json<OrderRequest>, JsonRejection>,
) -> Response {
	let Json(request) = match payload {
		Ok(payload) => payload,
		Err(rejection) => return bad_request(rejection),
	};
	match engine.create_order(request).await {
		Ok(order) => success(Some(order)),
		Err(e) => order_failure("create order", e),
	}
}

async fn confirm_order(
	State(engine): State<Arc<OrderEngine>>,
	payload: Result<Json<OrderConfirmRequest>, JsonRejection>,
) -> Response {
	let Json(request) = match payload {
		Ok(payload) => payload,
		Err(rejection) => return bad_request(rejection),
	};
	match engine.confirm_order(request).await {
		Ok(()) => success::<()>(None),
		Err(e) => order_failure("confirm order", e),
	}
}

async fn update_order_status(
	State(engine): State<Arc<OrderEngine>>,
	payload: Result<Json<OrderUpdateRequest>, JsonRejection>,
) -> Response {
	let Json(request) = match payload {
		Ok(payload) => payload,
		Err(rejection) => return bad_request(rejection),
	};
	match engine.update_order_status(request).await {
		Ok(()) => success::<()>(None),
		Err(e) => order_failure("update order status", e),
	}
}

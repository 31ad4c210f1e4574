use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::Serialize;
use shared::readiness::{health_router, Readiness};

use crate::models::StockEntry;
use crate::repository::ProductRepository;

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn ProductRepository>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn create_router(state: AppState, checks: Vec<Readiness>) -> Router {
    Router::new()
        .route("/products", get(list_products))
        .with_state(state)
        .merge(health_router(checks))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn list_products(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, StockEntry>>, (StatusCode, Json<ErrorResponse>)> {
    match state.repository.list().await {
        Ok(products) => Ok(Json(
            products
                .into_iter()
                .map(|product| (product.id.clone(), StockEntry::from(product)))
                .collect(),
        )),
        Err(e) => {
            tracing::error!("DB error in /products: {:#}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to fetch products".to_string(),
                }),
            ))
        }
    }
}

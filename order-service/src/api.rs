use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use shared::{BroadcastMessage, Order};

use crate::publisher::OrderPublisher;

pub const ORDER_CREATED: &str = "Order created and message sent!";

#[derive(Clone)]
pub struct AppState {
    pub publisher: Arc<dyn OrderPublisher>,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/create_order", post(create_order))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

/// The request body is never read: every call places `Order::sample()`.
pub async fn create_order(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), (StatusCode, Json<ErrorResponse>)> {
    let order = Order::sample();
    let message = BroadcastMessage::for_order(&order);

    match state.publisher.publish(&message).await {
        Ok(()) => {
            tracing::info!(
                product_id = %order.product_id,
                quantity = order.quantity,
                message_id = message.message_id.as_deref().unwrap_or("-"),
                "Order created"
            );
            Ok((
                StatusCode::CREATED,
                Json(CreateOrderResponse {
                    message: ORDER_CREATED.to_string(),
                }),
            ))
        }
        Err(e) => {
            tracing::error!("Failed to publish order: {:#}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to publish order: {}", e),
                }),
            ))
        }
    }
}

pub async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct RecordingPublisher {
        sent: Mutex<Vec<BroadcastMessage>>,
    }

    #[async_trait]
    impl OrderPublisher for RecordingPublisher {
        async fn publish(&self, message: &BroadcastMessage) -> Result<()> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct UnreachableBroker;

    #[async_trait]
    impl OrderPublisher for UnreachableBroker {
        async fn publish(&self, _message: &BroadcastMessage) -> Result<()> {
            Err(anyhow!("connection refused"))
        }
    }

    async fn post_order(router: Router, body: Body) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/create_order")
                    .header("content-type", "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn create_order_publishes_and_returns_created() {
        let publisher = Arc::new(RecordingPublisher::default());
        let router = create_router(AppState {
            publisher: publisher.clone(),
        });

        let (status, json) = post_order(router, Body::empty()).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json, serde_json::json!({ "message": "Order created and message sent!" }));

        let sent = publisher.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].product_id, "123");
        assert!(sent[0].message_id.is_some());
    }

    #[tokio::test]
    async fn create_order_ignores_the_payload() {
        let publisher = Arc::new(RecordingPublisher::default());
        let router = create_router(AppState {
            publisher: publisher.clone(),
        });

        let body = Body::from(r#"{"product_id": "456", "quantity": 7}"#);
        let (status, json) = post_order(router, body).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["message"], ORDER_CREATED);
        assert_eq!(publisher.sent.lock().unwrap()[0].product_id, "123");
    }

    #[tokio::test]
    async fn create_order_reports_broker_failure() {
        let router = create_router(AppState {
            publisher: Arc::new(UnreachableBroker),
        });

        let (status, json) = post_order(router, Body::empty()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json["error"].as_str().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn create_order_rejects_get() {
        let router = create_router(AppState {
            publisher: Arc::new(RecordingPublisher::default()),
        });

        let response = router
            .oneshot(Request::builder().uri("/create_order").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}

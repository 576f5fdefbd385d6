use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::{ApiCfg, ReportCfg};
use crate::db::Store;
use crate::types::TokenStats;

pub const MAX_TOP_TOKENS: u32 = 1000;
pub const MAX_WINDOW_DAYS: u32 = 36_500;

#[derive(Debug, Deserialize)]
pub struct TopTokensQuery {
    pub limit: Option<u32>,
    pub days: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TopTokensResponse {
    pub limit: u32,
    pub window_days: u32,
    pub tokens: Vec<TokenStats>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub struct AppState<S> {
    pub store: Arc<S>,
    pub defaults: ReportCfg,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            defaults: self.defaults.clone(),
        }
    }
}

pub fn create_router<S: Store + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/tokens/top", get(get_top_tokens::<S>))
        .with_state(state)
}

pub async fn serve<S: Store + 'static>(cfg: &ApiCfg, state: AppState<S>) -> std::io::Result<()> {
    let bind_address = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Stats API listening on {}", bind_address);
    axum::serve(listener, create_router(state)).await
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

fn bad_request(message: String) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: "bad_request".to_string(),
            message,
        }),
    )
}

async fn get_top_tokens<S: Store>(
    Query(query): Query<TopTokensQuery>,
    State(state): State<AppState<S>>,
) -> Result<Json<TopTokensResponse>, (StatusCode, Json<ErrorResponse>)> {
    let limit = query.limit.unwrap_or(state.defaults.top_tokens_limit);
    let window_days = query.days.unwrap_or(state.defaults.window_days);

    if limit == 0 || limit > MAX_TOP_TOKENS {
        return Err(bad_request(format!("limit must be between 1 and {}", MAX_TOP_TOKENS)));
    }
    if window_days == 0 || window_days > MAX_WINDOW_DAYS {
        return Err(bad_request(format!("days must be between 1 and {}", MAX_WINDOW_DAYS)));
    }

    match state.store.top_tokens_by_volume(limit, window_days).await {
        Ok(tokens) => Ok(Json(TopTokensResponse { limit, window_days, tokens })),
        Err(e) => {
            error!("Top tokens query failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "database_error".to_string(),
                    message: e.to_string(),
                }),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::types::TokenTransferRow;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use tower::ServiceExt;

    async fn router_with_transfers() -> Router {
        let store = Arc::new(MemoryStore::new());
        for (i, (token, value)) in [("0xaa", "10"), ("0xaa", "20"), ("0xbb", "5")].iter().enumerate() {
            store
                .insert_token_transfer(&TokenTransferRow {
                    tx_hash: format!("0x{:02x}", i),
                    log_index: 0,
                    from_address: "0x01".to_string(),
                    to_address: "0x02".to_string(),
                    value: value.to_string(),
                    token_address: token.to_string(),
                    block_number: 1,
                    timestamp: Utc::now(),
                })
                .await
                .unwrap();
        }
        create_router(AppState {
            store,
            defaults: ReportCfg::default(),
        })
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, _) = get(router_with_transfers().await, "/health").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_top_tokens_defaults() {
        let (status, body) = get(router_with_transfers().await, "/api/v1/tokens/top").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["limit"], 10);
        assert_eq!(body["window_days"], 7);
        assert_eq!(body["tokens"][0]["token_address"], "0xaa");
        assert_eq!(body["tokens"][0]["total_volume"], "30");
        assert_eq!(body["tokens"][1]["token_address"], "0xbb");
    }

    #[tokio::test]
    async fn test_top_tokens_limit() {
        let (status, body) = get(router_with_transfers().await, "/api/v1/tokens/top?limit=1&days=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tokens"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_invalid_limit() {
        let (status, body) = get(router_with_transfers().await, "/api/v1/tokens/top?limit=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
    }

    #[tokio::test]
    async fn test_invalid_window() {
        let router = router_with_transfers().await;
        for uri in ["/api/v1/tokens/top?days=0", "/api/v1/tokens/top?days=4294967295"] {
            let (status, body) = get(router.clone(), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["message"], "days must be between 1 and 36500");
        }

        let (status, body) = get(router, "/api/v1/tokens/top?days=36500").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["window_days"], 36_500);
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Unauthenticated, unencrypted probe for the messaging provider
#[tracing::instrument]
pub async fn handler() -> Response {
    let msg = serde_json::json!({"status": "healthy"});
    (StatusCode::OK, Json(msg)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handler_direct() {
        let response = handler().await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

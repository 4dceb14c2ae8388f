//! Flow data-exchange routes.
//!
//! Each flow is addressable as `/flows/:flow_id`, or as `/flow?flow_id=...` for
//! providers that only let you configure a fixed path.

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde::Deserialize;

use common::auth::SIGNATURE_HEADER;

use crate::{EndpointResponse, ServiceState};

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/flows/:flow_id", any(by_path))
        .route("/flow", any(by_query))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct FlowQuery {
    pub flow_id: Option<String>,
}

#[tracing::instrument(skip(state, headers, body))]
pub async fn by_path(
    State(state): State<ServiceState>,
    Path(flow_id): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    exchange(&state, &flow_id, &method, &headers, body).await
}

#[tracing::instrument(skip(state, headers, body))]
pub async fn by_query(
    State(state): State<ServiceState>,
    Query(query): Query<FlowQuery>,
    method: Method,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    if method != Method::POST {
        return method_not_allowed();
    }
    match query.flow_id.as_deref() {
        Some(flow_id) if !flow_id.is_empty() => {
            exchange(&state, flow_id, &method, &headers, body).await
        }
        _ => EndpointResponse::error(StatusCode::BAD_REQUEST, "flow id not specified")
            .into_response(),
    }
}

async fn exchange(
    state: &ServiceState,
    flow_id: &str,
    method: &Method,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    if method != Method::POST {
        return method_not_allowed();
    }

    let Some(endpoint) = state.endpoints().get(flow_id) else {
        tracing::debug!(flow_id, "request for unknown flow");
        return EndpointResponse::error(StatusCode::NOT_FOUND, "flow not found").into_response();
    };

    // over the body limit, or the body stream failed
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::debug!(flow_id, error = %rejection, "unreadable request body");
            return EndpointResponse::error(rejection.status(), rejection.body_text())
                .into_response();
        }
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    endpoint.process(method, signature, &body).await.into_response()
}

fn method_not_allowed() -> Response {
    EndpointResponse::error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed").into_response()
}

impl IntoResponse for EndpointResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use carrera_realtime::{
    domain::StoreError,
    infrastructure::dto::http::{
        DeleteRequest, ErrorResponse, InsertRequest, SelectRequest, UpdateRequest,
    },
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

use crate::ui::state::AppState;

/// Health check endpoint
pub async fn health_check() -> Json<Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// `/rest/{table}/{operation}` の操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreOperation {
    Select,
    Insert,
    Update,
    Delete,
}

/// ストアのエラーを HTTP 応答に変換する
#[derive(Debug)]
pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::MultipleRows(_) => StatusCode::CONFLICT,
            StoreError::InvalidRecord(_) => StatusCode::BAD_REQUEST,
            StoreError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            StoreError::Transport(_) => StatusCode::BAD_GATEWAY,
        };
        tracing::warn!("Store request failed ({}): {}", status, self.0);
        (status, Json(ErrorResponse::from(&self.0))).into_response()
    }
}

fn parse_body<T: DeserializeOwned>(body: Value) -> Result<T, ApiError> {
    serde_json::from_value(body).map_err(|e| ApiError(StoreError::InvalidRecord(e.to_string())))
}

/// Run one record store operation
pub async fn store_operation(
    State(state): State<Arc<AppState>>,
    Path((table, operation)): Path<(String, StoreOperation)>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    tracing::debug!("{:?} on '{}'", operation, table);
    let gateway = &state.store_gateway;

    let response = match operation {
        StoreOperation::Select => {
            let request: SelectRequest = parse_body(body)?;
            Json(gateway.select(&table, request).await?).into_response()
        }
        StoreOperation::Insert => {
            let request: InsertRequest = parse_body(body)?;
            (StatusCode::CREATED, Json(gateway.insert(&table, request).await?)).into_response()
        }
        StoreOperation::Update => {
            let request: UpdateRequest = parse_body(body)?;
            Json(gateway.update(&table, request).await?).into_response()
        }
        StoreOperation::Delete => {
            let request: DeleteRequest = parse_body(body)?;
            Json(gateway.delete(&table, request).await?).into_response()
        }
    };
    Ok(response)
}

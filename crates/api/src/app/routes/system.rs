use axum::http::StatusCode;

/// Liveness only; says nothing about the broker or the store.
pub async fn health() -> StatusCode {
    StatusCode::OK
}

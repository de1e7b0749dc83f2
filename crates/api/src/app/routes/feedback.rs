use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::UserContext;

pub fn router() -> Router {
    Router::new()
        .route("/submit", post(submit_feedback))
        .route("/result/:job_id", get(get_feedback_result))
        .route("/history", get(get_feedback_history))
        .route("/stats", get(get_feedback_stats))
        .route("/clear", delete(clear_feedback_history))
        .route("/health", get(get_queue_health))
}

pub async fn submit_feedback(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    body: Result<Json<dto::SubmitRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_error(StatusCode::BAD_REQUEST, format!("Invalid request body: {rejection}"));
        }
    };

    let text = body.text().to_string();
    match services
        .pipeline
        .submit(user.user_id(), &text, body.metadata())
        .await
    {
        Ok(outcome) => Json(dto::ok_with_message("Feedback analyzed successfully", outcome)).into_response(),
        Err(e) => errors::pipeline_error_to_response(e),
    }
}

pub async fn get_feedback_result(
    Extension(services): Extension<Arc<AppServices>>,
    Path(job_id): Path<String>,
) -> axum::response::Response {
    match services.pipeline.status(&job_id).await {
        Ok(status) => Json(dto::ok(status)).into_response(),
        Err(e) => errors::pipeline_error_to_response(e),
    }
}

pub async fn get_feedback_history(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Query(query): Query<dto::HistoryQuery>,
) -> axum::response::Response {
    match services
        .pipeline
        .history(user.user_id(), query.page(), query.limit())
        .await
    {
        Ok(page) => Json(dto::ok(page)).into_response(),
        Err(e) => errors::pipeline_error_to_response(e),
    }
}

pub async fn get_feedback_stats(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
) -> axum::response::Response {
    match services.pipeline.stats(user.user_id()).await {
        Ok(stats) => Json(dto::ok(dto::StatsBody { stats })).into_response(),
        Err(e) => errors::pipeline_error_to_response(e),
    }
}

pub async fn clear_feedback_history(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
) -> axum::response::Response {
    match services.pipeline.clear(user.user_id()).await {
        Ok(deleted_count) => Json(dto::ok_with_message(
            format!("Cleared {deleted_count} feedback entries"),
            dto::ClearBody { deleted_count },
        ))
        .into_response(),
        Err(e) => errors::pipeline_error_to_response(e),
    }
}

pub async fn get_queue_health(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    Json(dto::ok(dto::HealthBody {
        queue: services.pipeline.health().await,
        outcomes: services.outcomes.snapshot(),
    }))
}

use axum::Router;

pub mod feedback;
pub mod system;

/// Router for all authenticated (user-scoped) endpoints.
pub fn router() -> Router {
    Router::new().nest("/api/feedback", feedback::router())
}

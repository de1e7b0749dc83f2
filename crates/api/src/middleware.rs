use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::{HeaderMap, HeaderName, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::info;

use feedlens_core::UserId;

use crate::app::errors;
use crate::context::UserContext;

/// Header carrying the caller id set by the upstream authentication layer.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Maps an incoming request to the authenticated user, if any.
///
/// Authentication itself happens upstream; this only reads what it left.
pub trait IdentityResolver: Send + Sync + 'static {
    fn resolve(&self, headers: &HeaderMap) -> Option<UserId>;
}

#[derive(Debug, Clone)]
pub struct HeaderIdentityResolver {
    header: HeaderName,
}

impl HeaderIdentityResolver {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }
}

impl Default for HeaderIdentityResolver {
    fn default() -> Self {
        Self::new(HeaderName::from_static(USER_ID_HEADER))
    }
}

impl IdentityResolver for HeaderIdentityResolver {
    fn resolve(&self, headers: &HeaderMap) -> Option<UserId> {
        let value = headers.get(&self.header)?.to_str().ok()?;
        UserId::new(value).ok()
    }
}

#[derive(Clone)]
pub struct IdentityState {
    pub resolver: Arc<dyn IdentityResolver>,
}

pub async fn identity_middleware(
    State(state): State<IdentityState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(user_id) = state.resolver.resolve(req.headers()) else {
        return errors::json_error(StatusCode::UNAUTHORIZED, "not authorized");
    };

    req.extensions_mut().insert(UserContext::new(user_id));
    next.run(req).await
}

/// One `info` line per request: method, path, status, latency.
pub async fn request_logging(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "request handled"
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn header_resolver_reads_and_trims_the_user_id() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("  user-42 "));
        let resolved = HeaderIdentityResolver::default().resolve(&headers);
        assert_eq!(resolved.unwrap().as_str(), "user-42");
    }

    #[test]
    fn missing_or_blank_identity_resolves_to_none() {
        let resolver = HeaderIdentityResolver::default();
        assert!(resolver.resolve(&HeaderMap::new()).is_none());

        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("   "));
        assert!(resolver.resolve(&headers).is_none());
    }
}

// routes.rs
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use http::{HeaderMap, HeaderValue, Method};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;

use crate::error::AppError;
use crate::handlers;
use crate::rate_limit::{
    RateLimitPolicy, RateLimiter, RATE_LIMIT_CREATE_POLL, RATE_LIMIT_READ, RATE_LIMIT_VOTE,
};
use crate::realtime::PollEvents;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub limiter: Arc<RateLimiter>,
    pub events: Arc<PollEvents>,
    pub base_url: String,
    pub secure_cookies: bool,
}

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/polls", post(handlers::create_poll))
        .route("/polls/{id}", get(handlers::get_poll))
        .route("/polls/{id}/vote", post(handlers::cast_vote))
        .route("/polls/{id}/events", get(handlers::poll_events))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_gate,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// The single admission boundary: every request is checked here before any
/// handler runs, and handlers never re-check limits. Admitted responses
/// carry the limit headers; rejections carry `Retry-After` as well.
async fn rate_limit_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let policy = policy_for(request.uri().path(), request.method());
    let source = client_ip(request.headers()).unwrap_or_else(|| "unknown".to_string());
    let key = format!("{}:{}", policy.name, source);

    let decision = state.limiter.admit(&key, &policy);
    if !decision.allowed {
        tracing::warn!(%key, "rate limit exceeded");
        return AppError::RateLimited {
            limit: policy.max_requests,
            retry_after: decision.retry_after_seconds.unwrap_or(policy.window.as_secs()),
        }
        .into_response();
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", number_header(policy.max_requests));
    headers.insert("X-RateLimit-Remaining", number_header(decision.remaining));
    response
}

/// Maps path + method to the action class being limited.
fn policy_for(path: &str, method: &Method) -> RateLimitPolicy {
    if path == "/polls" && method == Method::POST {
        RATE_LIMIT_CREATE_POLL
    } else if path.ends_with("/vote") && method == Method::POST {
        RATE_LIMIT_VOTE
    } else {
        RATE_LIMIT_READ
    }
}

/// First hop of `x-forwarded-for`, else `x-real-ip`. Used as the rate-limit
/// key and stored on votes as an advisory hint; never as voter identity.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        let first = forwarded.split(',').next().unwrap_or("").trim();
        if !first.is_empty() {
            return Some(first.to_string());
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn number_header(n: u32) -> HeaderValue {
    HeaderValue::from_str(&n.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

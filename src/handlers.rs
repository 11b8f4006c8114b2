// handlers.rs
use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

use crate::db;
use crate::error::AppError;
use crate::identity;
use crate::models::{
    CastVoteRequest, CastVoteResponse, CreatePollRequest, CreatePollResponse, PollResultsResponse,
};
use crate::poll;
use crate::routes::{client_ip, AppState};

/// POST /polls
pub async fn create_poll(
    State(state): State<AppState>,
    Json(body): Json<CreatePollRequest>,
) -> Result<(StatusCode, Json<CreatePollResponse>), AppError> {
    let response = poll::create_poll(&state.pool, &state.base_url, body).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /polls/{id}
pub async fn get_poll(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PollResultsResponse>, AppError> {
    let results = poll::tally(&state.pool, &id).await?;
    Ok(Json(results))
}

/// POST /polls/{id}/vote
///
/// Resolves the voter identity before the guard runs and writes the cookie
/// back only when it was freshly minted.
pub async fn cast_vote(
    State(state): State<AppState>,
    Path(id): Path<String>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(body): Json<CastVoteRequest>,
) -> Result<(StatusCode, CookieJar, Json<CastVoteResponse>), AppError> {
    let voter = identity::resolve(&jar);
    let voter_ip = client_ip(&headers);

    let response = poll::cast_vote(
        &state.pool,
        &state.events,
        &id,
        body.option_id.as_deref(),
        &voter,
        voter_ip.as_deref(),
    )
    .await?;

    let jar = identity::remember(jar, &voter, state.secure_cookies);
    Ok((StatusCode::CREATED, jar, Json(response)))
}

/// GET /polls/{id}/events
///
/// SSE stream of change triggers for one poll. Events are content-free; the
/// client re-fetches the results endpoint on each one. A lagged subscriber
/// still gets a trigger, which is all it ever needed.
pub async fn poll_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let poll_id = Uuid::parse_str(&id)
        .map_err(|_| AppError::Validation("Invalid poll ID format".to_string()))?;

    if db::fetch_poll(&state.pool, poll_id).await?.is_none() {
        return Err(AppError::NotFound("Poll not found"));
    }

    let changes = state.events.subscribe(poll_id);
    let stream = BroadcastStream::new(changes)
        .map(|_| Ok(Event::default().event("change").data("refetch")));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

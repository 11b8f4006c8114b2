// src/db.rs
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Pool, Postgres};
use std::env;
use uuid::Uuid;

use crate::models::{Poll, PollOption};

pub async fn create_pool() -> Result<Pool<Postgres>, sqlx::Error> {
    let database_url = env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set");

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
}

/// Outcome of a vote insert, with the uniqueness violation split out: the
/// store's UNIQUE (poll_id, voter_fingerprint) constraint is the arbiter of
/// "one vote per identity", and tripping it is an expected outcome, not a
/// storage failure.
pub enum VoteInsert {
    Recorded,
    DuplicateVoter,
}

/// Creates the poll and its options in one transaction; a poll never exists
/// without its options. Returns rows in submission order.
pub async fn insert_poll_with_options(
    pool: &PgPool,
    question: &str,
    options: &[String],
) -> Result<(Poll, Vec<PollOption>), sqlx::Error> {
    let mut tx = pool.begin().await?;

    let poll = sqlx::query_as::<_, Poll>(
        "INSERT INTO polls (question) VALUES ($1) RETURNING id, question, created_at",
    )
    .bind(question)
    .fetch_one(&mut *tx)
    .await?;

    let mut rows = Vec::with_capacity(options.len());
    for (position, text) in options.iter().enumerate() {
        let row = sqlx::query_as::<_, PollOption>(
            "INSERT INTO options (poll_id, text, position) VALUES ($1, $2, $3) \
             RETURNING id, poll_id, text",
        )
        .bind(poll.id)
        .bind(text)
        .bind(position as i32)
        .fetch_one(&mut *tx)
        .await?;
        rows.push(row);
    }

    tx.commit().await?;
    Ok((poll, rows))
}

pub async fn fetch_poll(pool: &PgPool, poll_id: Uuid) -> Result<Option<Poll>, sqlx::Error> {
    sqlx::query_as::<_, Poll>("SELECT id, question, created_at FROM polls WHERE id = $1")
        .bind(poll_id)
        .fetch_optional(pool)
        .await
}

pub async fn fetch_options(pool: &PgPool, poll_id: Uuid) -> Result<Vec<PollOption>, sqlx::Error> {
    sqlx::query_as::<_, PollOption>(
        "SELECT id, poll_id, text FROM options WHERE poll_id = $1 ORDER BY position",
    )
    .bind(poll_id)
    .fetch_all(pool)
    .await
}

pub async fn option_belongs_to_poll(
    pool: &PgPool,
    option_id: Uuid,
    poll_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let found: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM options WHERE id = $1 AND poll_id = $2")
            .bind(option_id)
            .bind(poll_id)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

/// Option id of every vote cast on the poll, one row per vote.
pub async fn fetch_vote_options(pool: &PgPool, poll_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar("SELECT option_id FROM votes WHERE poll_id = $1")
        .bind(poll_id)
        .fetch_all(pool)
        .await
}

/// Plain insert, no prior existence check: under concurrent requests from
/// the same identity only the store's constraint decides which one lands.
pub async fn insert_vote(
    pool: &PgPool,
    poll_id: Uuid,
    option_id: Uuid,
    voter_fingerprint: &str,
    voter_ip: Option<&str>,
) -> Result<VoteInsert, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO votes (poll_id, option_id, voter_fingerprint, voter_ip) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(poll_id)
    .bind(option_id)
    .bind(voter_fingerprint)
    .bind(voter_ip)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(VoteInsert::Recorded),
        Err(e) if is_unique_violation(&e) => Ok(VoteInsert::DuplicateVoter),
        Err(e) => Err(e),
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

// src/poll.rs
use std::collections::{HashMap, HashSet};

use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{self, VoteInsert};
use crate::error::AppError;
use crate::identity::VoterIdentity;
use crate::models::{
    CastVoteResponse, CreatePollRequest, CreatePollResponse, OptionOut, OptionWithVotes,
    PollOption, PollResultsResponse,
};
use crate::realtime::PollEvents;

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 8;
pub const MAX_QUESTION_LENGTH: usize = 500;
pub const MAX_OPTION_LENGTH: usize = 200;

pub async fn create_poll(
    pool: &PgPool,
    base_url: &str,
    request: CreatePollRequest,
) -> Result<CreatePollResponse, AppError> {
    let question = validate_question(request.question.as_deref())?;
    let options = validate_options(request.options.as_deref().unwrap_or_default())?;

    let (poll, option_rows) = db::insert_poll_with_options(pool, &question, &options).await?;

    tracing::info!(poll_id = %poll.id, options = option_rows.len(), "poll created");

    Ok(CreatePollResponse {
        id: poll.id,
        question: poll.question,
        options: option_rows
            .into_iter()
            .map(|o| OptionOut {
                id: o.id,
                text: o.text,
            })
            .collect(),
        share_url: format!("{base_url}/poll/{}", poll.id),
    })
}

/// The ingestion guard. Existence checks are ordinary reads, but the
/// one-vote-per-identity invariant is arbitrated by the store's uniqueness
/// constraint: a concurrent duplicate passes every read here and still loses
/// the insert. The network address is recorded as advisory metadata only,
/// never used for deduplication.
pub async fn cast_vote(
    pool: &PgPool,
    events: &PollEvents,
    poll_id: &str,
    option_id: Option<&str>,
    voter: &VoterIdentity,
    voter_ip: Option<&str>,
) -> Result<CastVoteResponse, AppError> {
    let option_id =
        option_id.ok_or_else(|| AppError::Validation("Option ID is required".to_string()))?;

    // A malformed poll id cannot name any poll.
    let poll_id = Uuid::parse_str(poll_id).map_err(|_| AppError::NotFound("Poll not found"))?;
    if db::fetch_poll(pool, poll_id).await?.is_none() {
        return Err(AppError::NotFound("Poll not found"));
    }

    // The option must belong to this poll; an option id lifted from another
    // poll is indistinguishable from an unknown one.
    let option_id = Uuid::parse_str(option_id)
        .map_err(|_| AppError::NotFound("Option not found for this poll"))?;
    if !db::option_belongs_to_poll(pool, option_id, poll_id).await? {
        return Err(AppError::NotFound("Option not found for this poll"));
    }

    match db::insert_vote(pool, poll_id, option_id, &voter.token, voter_ip).await? {
        VoteInsert::DuplicateVoter => Err(AppError::AlreadyVoted),
        VoteInsert::Recorded => {
            events.publish(poll_id);
            tracing::debug!(%poll_id, %option_id, "vote recorded");
            Ok(CastVoteResponse {
                success: true,
                message: "Vote recorded".to_string(),
            })
        }
    }
}

/// Recomputes the tally from the vote rows on every call. Exact as of the
/// read; a vote landing mid-computation shows up on the next one.
pub async fn tally(pool: &PgPool, poll_id: &str) -> Result<PollResultsResponse, AppError> {
    let poll_id = Uuid::parse_str(poll_id)
        .map_err(|_| AppError::Validation("Invalid poll ID format".to_string()))?;

    let poll = db::fetch_poll(pool, poll_id)
        .await?
        .ok_or(AppError::NotFound("Poll not found"))?;

    let options = db::fetch_options(pool, poll_id).await?;
    let votes = db::fetch_vote_options(pool, poll_id).await?;
    let (options, total_votes) = count_votes(options, &votes);

    Ok(PollResultsResponse {
        id: poll.id,
        question: poll.question,
        created_at: poll.created_at,
        options,
        total_votes,
    })
}

fn validate_question(question: Option<&str>) -> Result<String, AppError> {
    let trimmed = question.unwrap_or_default().trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("Question is required".to_string()));
    }
    if trimmed.chars().count() > MAX_QUESTION_LENGTH {
        return Err(AppError::Validation(format!(
            "Question must be at most {MAX_QUESTION_LENGTH} characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn validate_options(options: &[String]) -> Result<Vec<String>, AppError> {
    let trimmed: Vec<String> = options
        .iter()
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();

    if trimmed.len() < MIN_OPTIONS {
        return Err(AppError::Validation(format!(
            "At least {MIN_OPTIONS} options are required"
        )));
    }
    if trimmed.len() > MAX_OPTIONS {
        return Err(AppError::Validation(format!(
            "Maximum {MAX_OPTIONS} options allowed"
        )));
    }
    if trimmed
        .iter()
        .any(|o| o.chars().count() > MAX_OPTION_LENGTH)
    {
        return Err(AppError::Validation(format!(
            "Options must be at most {MAX_OPTION_LENGTH} characters"
        )));
    }

    let mut seen = HashSet::new();
    for option in &trimmed {
        if !seen.insert(option.to_lowercase()) {
            return Err(AppError::Validation(
                "Duplicate options are not allowed".to_string(),
            ));
        }
    }

    Ok(trimmed)
}

/// Group-counts votes by option, defaulting absent options to zero. The
/// total is the vote row count; equal to the per-option sum by construction.
fn count_votes(options: Vec<PollOption>, votes: &[Uuid]) -> (Vec<OptionWithVotes>, i64) {
    let mut counts: HashMap<Uuid, i64> = HashMap::new();
    for option_id in votes {
        *counts.entry(*option_id).or_insert(0) += 1;
    }

    let with_votes = options
        .into_iter()
        .map(|o| OptionWithVotes {
            votes: counts.get(&o.id).copied().unwrap_or(0),
            id: o.id,
            text: o.text,
        })
        .collect();

    (with_votes, votes.len() as i64)
}

// models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Row in the `polls` table. Immutable after creation.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Poll {
    pub id: Uuid,
    pub question: String,
    pub created_at: DateTime<Utc>,
}

/// Row in the `options` table. Created atomically with its poll.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct PollOption {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub text: String,
}

/// Row in the `votes` table. `voter_ip` is advisory metadata; the
/// fingerprint is what the uniqueness constraint keys on.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vote {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub option_id: Uuid,
    pub voter_fingerprint: String,
    pub voter_ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct CreatePollRequest {
    pub question: Option<String>,
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct OptionOut {
    pub id: Uuid,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct CreatePollResponse {
    pub id: Uuid,
    pub question: String,
    pub options: Vec<OptionOut>,
    #[serde(rename = "shareUrl")]
    pub share_url: String,
}

/// Option with its aggregated vote count.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OptionWithVotes {
    pub id: Uuid,
    pub text: String,
    pub votes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollResultsResponse {
    pub id: Uuid,
    pub question: String,
    pub created_at: DateTime<Utc>,
    pub options: Vec<OptionWithVotes>,
    #[serde(rename = "totalVotes")]
    pub total_votes: i64,
}

#[derive(Deserialize)]
pub struct CastVoteRequest {
    #[serde(rename = "optionId")]
    pub option_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CastVoteResponse {
    pub success: bool,
    pub message: String,
}

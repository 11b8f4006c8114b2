//! PollRoom backend: anonymous polls with one vote per browser identity and
//! live results.
//!
//! The interesting parts are vote ingestion ([`poll`]), where deduplication
//! is delegated to the store's uniqueness constraint rather than any
//! in-process lock, admission control ([`rate_limit`]), and the per-poll
//! change fan-out ([`realtime`]) with its polling fallback ([`viewer`]).
//! Everything reaches the outside world through the router in [`routes`].

pub mod db;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod poll;
pub mod rate_limit;
pub mod realtime;
pub mod routes;
pub mod viewer;

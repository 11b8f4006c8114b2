// src/main.rs
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use pollroom::db;
use pollroom::rate_limit::RateLimiter;
use pollroom::realtime::PollEvents;
use pollroom::routes::{self, AppState};

/// How often idle rate-limit buckets are swept, off the request path.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok(); // Load environment variables from .env file

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let port = port.parse::<u16>().expect("PORT must be a valid number");

    let base_url =
        std::env::var("BASE_URL").unwrap_or_else(|_| format!("http://localhost:{port}"));
    let secure_cookies = std::env::var("APP_ENV").as_deref() == Ok("production");

    let pool = db::create_pool()
        .await
        .expect("Failed to connect to the database");

    let limiter = Arc::new(RateLimiter::new());
    {
        let limiter = limiter.clone();
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticks.tick().await;
                limiter.sweep();
            }
        });
    }

    let state = AppState {
        pool,
        limiter,
        events: Arc::new(PollEvents::new()),
        base_url,
        secure_cookies,
    };
    let app = routes::create_routes(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "pollroom listening");

    axum_server::bind(addr)
        .serve(app.into_make_service())
        .await
        .expect("Server failed");
}

// viewer.rs
use std::future::Future;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::models::PollResultsResponse;
use crate::realtime::PollChanged;

/// Refetch cadence while the push channel is down. This bounds how stale a
/// degraded viewer's tally can get.
pub const FALLBACK_POLL_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Degraded,
}

/// One watcher of one poll's results.
///
/// The viewer only knows two verbs, "subscribe" and "re-fetch"; which
/// transport is active stays behind this type. While the push channel is up,
/// every change event triggers a re-fetch and periodic polling is suppressed.
/// When the channel cannot be established or drops, the viewer re-fetches on
/// a fixed interval and retries the connect each cycle, so its displayed
/// tally converges even if push delivery never succeeds.
pub struct Viewer {
    state: watch::Receiver<ConnectionState>,
    tally: watch::Receiver<Option<PollResultsResponse>>,
    task: JoinHandle<()>,
}

impl Viewer {
    /// `connect` makes one bounded attempt to establish the push channel;
    /// `fetch` re-derives the current tally (returning `None` on a transient
    /// fetch failure, retried on the next event or poll cycle).
    pub fn open<C, F, Fut>(connect: C, fetch: F) -> Self
    where
        C: FnMut() -> Option<broadcast::Receiver<PollChanged>> + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<PollResultsResponse>> + Send + 'static,
    {
        let (state_tx, state) = watch::channel(ConnectionState::Connecting);
        let (tally_tx, tally) = watch::channel(None);

        let task = tokio::spawn(run(connect, fetch, state_tx, tally_tx));

        Self { state, tally, task }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn tally(&self) -> watch::Receiver<Option<PollResultsResponse>> {
        self.tally.clone()
    }

    /// Leaving stops event delivery and the fallback refetch immediately.
    pub fn leave(self) {
        self.task.abort();
    }
}

async fn run<C, F, Fut>(
    mut connect: C,
    fetch: F,
    state_tx: watch::Sender<ConnectionState>,
    tally_tx: watch::Sender<Option<PollResultsResponse>>,
) where
    C: FnMut() -> Option<broadcast::Receiver<PollChanged>> + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<PollResultsResponse>> + Send + 'static,
{
    loop {
        match connect() {
            Some(mut changes) => {
                state_tx.send_replace(ConnectionState::Connected);
                // Subscribe-time catch-up: anything published before this
                // point is picked up here, not replayed.
                refetch(&fetch, &tally_tx).await;

                loop {
                    match changes.recv().await {
                        Ok(PollChanged) => refetch(&fetch, &tally_tx).await,
                        // A lagged receiver just re-fetches once and is
                        // current again; triggers carry no state to lose.
                        Err(broadcast::error::RecvError::Lagged(_)) => {
                            refetch(&fetch, &tally_tx).await
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }

                state_tx.send_replace(ConnectionState::Degraded);
            }
            None => {
                state_tx.send_replace(ConnectionState::Degraded);
                refetch(&fetch, &tally_tx).await;
                tokio::time::sleep(FALLBACK_POLL_INTERVAL).await;
            }
        }
    }
}

async fn refetch<F, Fut>(fetch: &F, tally_tx: &watch::Sender<Option<PollResultsResponse>>)
where
    F: Fn() -> Fut,
    Fut: Future<Output = Option<PollResultsResponse>>,
{
    if let Some(results) = fetch().await {
        tally_tx.send_replace(Some(results));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    use chrono::Utc;
    use tokio::time::{advance, timeout};
    use uuid::Uuid;

    use super::*;
    use crate::models::OptionWithVotes;
    use crate::realtime::PollEvents;

    fn results_with_total(poll_id: Uuid, option_id: Uuid, total: i64) -> PollResultsResponse {
        PollResultsResponse {
            id: poll_id,
            question: "A or B?".into(),
            created_at: Utc::now(),
            options: vec![OptionWithVotes {
                id: option_id,
                text: "A".into(),
                votes: total,
            }],
            total_votes: total,
        }
    }

    /// A tally source the tests can bump, standing in for the results
    /// endpoint.
    fn counting_fetch(
        poll_id: Uuid,
        option_id: Uuid,
        source: Arc<AtomicI64>,
        fetches: Arc<AtomicI64>,
    ) -> impl Fn() -> std::future::Ready<Option<PollResultsResponse>> + Send + Sync {
        move || {
            fetches.fetch_add(1, Ordering::SeqCst);
            let total = source.load(Ordering::SeqCst);
            std::future::ready(Some(results_with_total(poll_id, option_id, total)))
        }
    }

    async fn wait_for_total(
        tally: &mut watch::Receiver<Option<PollResultsResponse>>,
        expected: i64,
    ) {
        timeout(Duration::from_secs(30), async {
            loop {
                if let Some(results) = tally.borrow_and_update().as_ref() {
                    if results.total_votes == expected {
                        return;
                    }
                }
                tally.changed().await.expect("viewer task alive");
            }
        })
        .await
        .expect("viewer converged");
    }

    #[tokio::test(start_paused = true)]
    async fn connected_viewer_refetches_on_each_change_event() {
        let events = Arc::new(PollEvents::new());
        let poll_id = Uuid::new_v4();
        let option_id = Uuid::new_v4();
        let source = Arc::new(AtomicI64::new(0));
        let fetches = Arc::new(AtomicI64::new(0));

        let viewer = {
            let events = events.clone();
            Viewer::open(
                move || Some(events.subscribe(poll_id)),
                counting_fetch(poll_id, option_id, source.clone(), fetches.clone()),
            )
        };

        let mut tally = viewer.tally();
        wait_for_total(&mut tally, 0).await;
        assert_eq!(viewer.state(), ConnectionState::Connected);

        source.store(1, Ordering::SeqCst);
        events.publish(poll_id);
        wait_for_total(&mut tally, 1).await;

        viewer.leave();
    }

    #[tokio::test(start_paused = true)]
    async fn connected_viewer_does_not_poll_periodically() {
        let events = Arc::new(PollEvents::new());
        let poll_id = Uuid::new_v4();
        let source = Arc::new(AtomicI64::new(0));
        let fetches = Arc::new(AtomicI64::new(0));

        let viewer = {
            let events = events.clone();
            Viewer::open(
                move || Some(events.subscribe(poll_id)),
                counting_fetch(poll_id, Uuid::new_v4(), source, fetches.clone()),
            )
        };

        let mut tally = viewer.tally();
        wait_for_total(&mut tally, 0).await;

        // Quiet poll: long stretches of wall time produce no re-fetches.
        advance(FALLBACK_POLL_INTERVAL * 10).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        viewer.leave();
    }

    #[tokio::test(start_paused = true)]
    async fn degraded_viewer_converges_within_the_poll_interval() {
        let poll_id = Uuid::new_v4();
        let source = Arc::new(AtomicI64::new(0));
        let fetches = Arc::new(AtomicI64::new(0));

        let viewer = Viewer::open(
            || None,
            counting_fetch(poll_id, Uuid::new_v4(), source.clone(), fetches.clone()),
        );

        let mut tally = viewer.tally();
        wait_for_total(&mut tally, 0).await;
        assert_eq!(viewer.state(), ConnectionState::Degraded);

        // A vote lands while push is down; the next poll cycle picks it up.
        source.store(1, Ordering::SeqCst);
        wait_for_total(&mut tally, 1).await;

        viewer.leave();
    }

    #[tokio::test(start_paused = true)]
    async fn degraded_viewer_reconnects_and_suppresses_polling() {
        let events = Arc::new(PollEvents::new());
        let poll_id = Uuid::new_v4();
        let source = Arc::new(AtomicI64::new(0));
        let fetches = Arc::new(AtomicI64::new(0));

        let viewer = {
            let events = events.clone();
            let mut attempts = 0;
            Viewer::open(
                move || {
                    attempts += 1;
                    // First attempt fails; the retry on the next poll cycle
                    // establishes the push channel.
                    if attempts == 1 {
                        None
                    } else {
                        Some(events.subscribe(poll_id))
                    }
                },
                counting_fetch(poll_id, Uuid::new_v4(), source, fetches.clone()),
            )
        };

        let mut state = {
            let mut tally = viewer.tally();
            wait_for_total(&mut tally, 0).await;
            assert_eq!(viewer.state(), ConnectionState::Degraded);
            viewer.state.clone()
        };

        timeout(Duration::from_secs(30), async {
            while *state.borrow_and_update() != ConnectionState::Connected {
                state.changed().await.expect("viewer task alive");
            }
        })
        .await
        .expect("viewer reconnected");

        let after_connect = fetches.load(Ordering::SeqCst);
        advance(FALLBACK_POLL_INTERVAL * 10).await;
        assert_eq!(fetches.load(Ordering::SeqCst), after_connect);

        viewer.leave();
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_stops_the_fallback_refetch() {
        let source = Arc::new(AtomicI64::new(0));
        let fetches = Arc::new(AtomicI64::new(0));

        let viewer = Viewer::open(
            || None,
            counting_fetch(Uuid::new_v4(), Uuid::new_v4(), source, fetches.clone()),
        );

        let mut tally = viewer.tally();
        wait_for_total(&mut tally, 0).await;
        viewer.leave();

        let at_leave = fetches.load(Ordering::SeqCst);
        advance(FALLBACK_POLL_INTERVAL * 10).await;
        assert_eq!(fetches.load(Ordering::SeqCst), at_leave);
    }
}

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use super::event::MessageSnapshot;
use super::platform::{MessageFetcher, PlatformError};
use crate::config::MirrorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl From<&MirrorConfig> for RetryPolicy {
    fn from(config: &MirrorConfig) -> Self {
        Self {
            attempts: config.retry_attempts,
            interval: config.retry_interval(),
        }
    }
}

/// Progress of the wait for a message's rich content to show up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitState {
    Waiting {
        attempt: u32,
        snapshot: MessageSnapshot,
    },
    ContentReady(MessageSnapshot),
    MessageGone,
    TimedOut(MessageSnapshot),
    Cancelled,
}

/// Polls a message that arrived empty until it fills in, disappears, or the
/// retry budget runs out. Every pause can be interrupted by the shutdown
/// signal.
pub struct CompletenessWait {
    fetcher: Arc<dyn MessageFetcher>,
    policy: RetryPolicy,
    shutdown: watch::Receiver<bool>,
}

impl CompletenessWait {
    pub fn new(
        fetcher: Arc<dyn MessageFetcher>,
        policy: RetryPolicy,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            fetcher,
            policy,
            shutdown,
        }
    }

    pub async fn run(mut self, snapshot: MessageSnapshot) -> WaitState {
        let mut state = if snapshot.has_content() {
            WaitState::ContentReady(snapshot)
        } else {
            WaitState::Waiting {
                attempt: 0,
                snapshot,
            }
        };

        loop {
            state = match state {
                WaitState::Waiting { attempt, snapshot } => self.step(attempt, snapshot).await,
                terminal => return terminal,
            };
        }
    }

    async fn step(&mut self, attempt: u32, snapshot: MessageSnapshot) -> WaitState {
        if attempt >= self.policy.attempts {
            debug!(
                "message {} still empty after {} refetches",
                snapshot.id, attempt
            );
            return WaitState::TimedOut(snapshot);
        }

        tokio::select! {
            biased;
            _ = shutdown_requested(&mut self.shutdown) => {
                debug!("shutdown requested while waiting on message {}", snapshot.id);
                return WaitState::Cancelled;
            }
            _ = tokio::time::sleep(self.policy.interval) => {}
        }

        let attempt = attempt + 1;
        match self
            .fetcher
            .fetch_message(snapshot.channel_id, snapshot.id)
            .await
        {
            Ok(Some(fresh)) if fresh.has_content() => {
                debug!(
                    "message {} populated after {} refetches",
                    fresh.id, attempt
                );
                WaitState::ContentReady(fresh)
            }
            Ok(Some(fresh)) => WaitState::Waiting {
                attempt,
                snapshot: fresh,
            },
            Ok(None) | Err(PlatformError::NotFound(_)) => {
                warn!(
                    "message {} in channel {} was deleted before it could be mirrored",
                    snapshot.id, snapshot.channel_id
                );
                WaitState::MessageGone
            }
            Err(err) => {
                warn!(
                    "refetch {} of message {} failed: {}",
                    attempt, snapshot.id, err
                );
                WaitState::Waiting { attempt, snapshot }
            }
        }
    }
}

/// Resolves once shutdown is signalled. A dropped sender never resolves.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;
    use crate::relay::event::StickerRef;
    use crate::relay::testing::{message, user, MockPlatform};

    const INTERVAL: Duration = Duration::from_secs(2);

    fn policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 5,
            interval: INTERVAL,
        }
    }

    fn empty() -> MessageSnapshot {
        message(50, 111, user(123), "")
    }

    fn wait(platform: &Arc<MockPlatform>, shutdown: watch::Receiver<bool>) -> CompletenessWait {
        CompletenessWait::new(platform.clone(), policy(), shutdown)
    }

    #[tokio::test(start_paused = true)]
    async fn populated_message_skips_the_wait() {
        let platform = MockPlatform::with_channels(&[]);
        let (_tx, rx) = watch::channel(false);
        let snapshot = message(50, 111, user(123), "hi");

        let state = wait(&platform, rx).run(snapshot.clone()).await;

        assert_eq!(state, WaitState::ContentReady(snapshot));
        assert!(platform.fetch_times().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn refetches_are_spaced_by_the_interval_and_stop_early() {
        let platform = MockPlatform::with_channels(&[]);
        let mut filled = empty();
        filled.stickers.push(StickerRef {
            id: 9,
            name: "wave".to_string(),
        });
        platform.script_fetches([Ok(Some(empty())), Ok(Some(empty())), Ok(Some(filled.clone()))]);
        let (_tx, rx) = watch::channel(false);
        let start = Instant::now();

        let state = wait(&platform, rx).run(empty()).await;

        assert_eq!(state, WaitState::ContentReady(filled));
        let offsets: Vec<Duration> = platform
            .fetch_times()
            .into_iter()
            .map(|at| at - start)
            .collect();
        assert_eq!(
            offsets,
            vec![INTERVAL, INTERVAL * 2, INTERVAL * 3]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_retry_budget() {
        let platform = MockPlatform::with_channels(&[]);
        platform.script_fetches([Ok(Some(empty()))]);
        let (_tx, rx) = watch::channel(false);
        let start = Instant::now();

        let state = wait(&platform, rx).run(empty()).await;

        assert!(matches!(state, WaitState::TimedOut(ref snapshot) if !snapshot.has_content()));
        assert_eq!(platform.fetch_times().len(), 5);
        assert_eq!(Instant::now() - start, INTERVAL * 5);
    }

    #[tokio::test(start_paused = true)]
    async fn deleted_message_ends_the_wait() {
        let platform = MockPlatform::with_channels(&[]);
        platform.script_fetches([Ok(Some(empty())), Ok(None)]);
        let (_tx, rx) = watch::channel(false);

        let state = wait(&platform, rx).run(empty()).await;

        assert_eq!(state, WaitState::MessageGone);
        assert_eq!(platform.fetch_times().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_error_counts_as_deleted() {
        let platform = MockPlatform::with_channels(&[]);
        platform.script_fetches([Err(PlatformError::NotFound("Unknown Message".to_string()))]);
        let (_tx, rx) = watch::channel(false);

        let state = wait(&platform, rx).run(empty()).await;

        assert_eq!(state, WaitState::MessageGone);
        assert_eq!(platform.fetch_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn other_fetch_errors_use_up_an_attempt() {
        let platform = MockPlatform::with_channels(&[]);
        let filled = message(50, 111, user(123), "late text");
        platform.script_fetches([
            Err(PlatformError::Other("502 Bad Gateway".to_string())),
            Err(PlatformError::Other("502 Bad Gateway".to_string())),
            Ok(Some(filled.clone())),
        ]);
        let (_tx, rx) = watch::channel(false);

        let state = wait(&platform, rx).run(empty()).await;

        assert_eq!(state, WaitState::ContentReady(filled));
        assert_eq!(platform.fetch_times().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_fetch_errors_time_out_with_original_snapshot() {
        let platform = MockPlatform::with_channels(&[]);
        platform.script_fetches([Err(PlatformError::Other("timeout".to_string()))]);
        let (_tx, rx) = watch::channel(false);

        let state = wait(&platform, rx).run(empty()).await;

        assert_eq!(state, WaitState::TimedOut(empty()));
        assert_eq!(platform.fetch_times().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_during_a_pause() {
        let platform = MockPlatform::with_channels(&[]);
        platform.script_fetches([Ok(Some(empty()))]);
        let (tx, rx) = watch::channel(false);

        let stop = async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            let _ = tx.send(true);
        };
        let (state, ()) = tokio::join!(wait(&platform, rx).run(empty()), stop);

        assert_eq!(state, WaitState::Cancelled);
        assert_eq!(platform.fetch_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn already_signalled_shutdown_cancels_before_fetching() {
        let platform = MockPlatform::with_channels(&[]);
        let (tx, rx) = watch::channel(false);
        tx.send(true).expect("receiver alive");

        let state = wait(&platform, rx).run(empty()).await;

        assert_eq!(state, WaitState::Cancelled);
        assert!(platform.fetch_times().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_shutdown_sender_does_not_cancel() {
        let platform = MockPlatform::with_channels(&[]);
        platform.script_fetches([Ok(Some(message(50, 111, user(123), "ok")))]);
        let (tx, rx) = watch::channel(false);
        drop(tx);

        let state = wait(&platform, rx).run(empty()).await;

        assert!(matches!(state, WaitState::ContentReady(_)));
    }
}

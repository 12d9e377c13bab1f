//! Rate-limited upstream wrapper.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use super::{Upstream, UpstreamError};
use crate::throttle::TokenBucketThrottle;

/// Wraps an [`Upstream`] so every fetch first takes a throttle token.
///
/// Waiting is cancelled only by process shutdown, never by the inbound
/// request: a fetch that has been started keeps going so that its result
/// still reaches the cache.
pub struct ThrottledUpstream<U> {
    inner: U,
    throttle: Arc<TokenBucketThrottle>,
    shutdown: watch::Receiver<bool>,
}

impl<U: Upstream> ThrottledUpstream<U> {
    /// `shutdown` flips to `true` when the process is stopping.
    pub fn new(
        inner: U,
        throttle: Arc<TokenBucketThrottle>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            inner,
            throttle,
            shutdown,
        }
    }
}

#[async_trait]
impl<U: Upstream> Upstream for ThrottledUpstream<U> {
    async fn fetch(&self, key: &str) -> Result<String, UpstreamError> {
        let mut shutdown = self.shutdown.clone();
        let stopping = async move {
            let signalled = shutdown.wait_for(|stopped| *stopped).await.is_ok();
            if !signalled {
                // Sender gone without signalling: nothing can cancel us.
                std::future::pending::<()>().await;
            }
        };

        match self.throttle.run(stopping, || self.inner.fetch(key)).await {
            Ok(result) => result,
            Err(_) => {
                debug!("Upstream fetch for '{}' cancelled by shutdown", key);
                Err(UpstreamError::Cancelled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    struct CountingUpstream {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Upstream for CountingUpstream {
        async fn fetch(&self, key: &str) -> Result<String, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{{\"key\":\"{}\"}}", key))
        }
    }

    fn throttled(
        capacity: u32,
        rate: f64,
    ) -> (
        ThrottledUpstream<CountingUpstream>,
        Arc<AtomicUsize>,
        watch::Sender<bool>,
    ) {
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(false);
        let upstream = ThrottledUpstream::new(
            CountingUpstream {
                calls: Arc::clone(&calls),
            },
            Arc::new(TokenBucketThrottle::new(capacity, rate)),
            rx,
        );
        (upstream, calls, tx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_are_paced() {
        let (upstream, calls, _tx) = throttled(2, 1.0);
        let start = Instant::now();

        for key in ["a", "b", "c", "d"] {
            upstream.fetch(key).await.unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_waiting_fetch() {
        let (upstream, calls, tx) = throttled(1, 0.0);
        upstream.fetch("first").await.unwrap();

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            tx.send(true).unwrap();
        });

        let result = upstream.fetch("second").await;
        stopper.await.unwrap();

        assert_eq!(result, Err(UpstreamError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_shutdown_sender_does_not_cancel() {
        let (upstream, calls, tx) = throttled(1, 1.0);
        drop(tx);

        upstream.fetch("first").await.unwrap();
        upstream.fetch("second").await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

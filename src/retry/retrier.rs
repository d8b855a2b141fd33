use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Backoff;

type Filter<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;

#[derive(Debug, Default)]
struct State {
    count: u32,
    pending: Option<CancellationToken>,
}

/// Bounded attempt counter over a [`Backoff`].
///
/// `E` is whatever the caller wants the veto filter to look at; the client
/// session uses its close reason.
pub struct Retrier<E> {
    limit: u32,
    backoff: Backoff,
    filter: Option<Filter<E>>,
    state: Mutex<State>,
}

impl<E> Retrier<E> {
    /// Allows at most `limit` attempts between resets.
    pub fn new(limit: u32, backoff: Backoff) -> Self {
        Self {
            limit,
            backoff,
            filter: None,
            state: Mutex::new(State::default()),
        }
    }

    /// `veto` returning `true` means "never retry this".
    pub fn with_filter<F>(mut self, veto: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(veto));
        self
    }

    /// Returns the delay before the next attempt, or `None` when the error
    /// is vetoed or the limit has been reached. Counts the attempt.
    pub fn can(&self, err: &E) -> Option<Duration> {
        if self.filter.as_ref().is_some_and(|veto| veto(err)) {
            return None;
        }
        let mut state = self.state.lock();
        if state.count >= self.limit {
            return None;
        }
        state.count += 1;
        Some(self.backoff.next(state.count))
    }

    /// Runs `f` after `delay` unless [`cancel`](Self::cancel) is called
    /// first. Replaces any previously scheduled attempt.
    pub fn retry<F, Fut>(&self, delay: Duration, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        if let Some(old) = self.state.lock().pending.replace(token.clone()) {
            old.cancel();
        }
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => debug!("scheduled retry cancelled"),
                _ = tokio::time::sleep(delay) => f().await,
            }
        });
    }

    /// Resets the counter and aborts a scheduled attempt.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        state.count = 0;
        if let Some(token) = state.pending.take() {
            token.cancel();
        }
    }

    /// Attempts counted since the last reset.
    pub fn attempts(&self) -> u32 {
        self.state.lock().count
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

impl<E> std::fmt::Debug for Retrier<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retrier")
            .field("limit", &self.limit)
            .field("backoff", &self.backoff)
            .field("attempts", &self.attempts())
            .finish()
    }
}

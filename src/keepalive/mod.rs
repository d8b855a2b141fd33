//! Transport-independent heartbeat.
//!
//! A [`KeepAlive`] calls `on_ping` every `interval`, then waits up to
//! `timeout` for [`KeepAlive::handle_pong`]. If no pong arrives, `on_timeout`
//! fires once and the heartbeat stops. A zero interval disables the
//! heartbeat.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

type Callback = Arc<dyn Fn() + Send + Sync>;

/// Heartbeat for one connection. Stops itself when dropped.
pub struct KeepAlive {
    interval: Duration,
    timeout: Duration,
    on_ping: Callback,
    on_timeout: Callback,
    running: Mutex<Option<CancellationToken>>,
    pending: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl KeepAlive {
    /// Creates a stopped heartbeat. `on_ping` should send a PING;
    /// `on_timeout` should close the connection.
    pub fn new<P, T>(interval: Duration, timeout: Duration, on_ping: P, on_timeout: T) -> Self
    where
        P: Fn() + Send + Sync + 'static,
        T: Fn() + Send + Sync + 'static,
    {
        Self {
            interval,
            timeout,
            on_ping: Arc::new(on_ping),
            on_timeout: Arc::new(on_timeout),
            running: Mutex::new(None),
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// Starts ticking. No-op while already running or when the interval is
    /// zero. Must be called inside a tokio runtime.
    pub fn start(&self) {
        if self.interval.is_zero() {
            debug!("keepalive disabled, interval is zero");
            return;
        }
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|t| !t.is_cancelled()) {
            return;
        }
        let token = CancellationToken::new();
        *running = Some(token.clone());
        drop(running);

        let interval = self.interval;
        let timeout = self.timeout;
        let on_ping = self.on_ping.clone();
        let on_timeout = self.on_timeout.clone();
        let pending = self.pending.clone();

        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = ticker.tick() => {}
                }

                let (tx, rx) = oneshot::channel();
                *pending.lock() = Some(tx);
                on_ping();

                tokio::select! {
                    _ = token.cancelled() => return,
                    pong = rx => {
                        if pong.is_err() {
                            // window dropped by stop()
                            return;
                        }
                    }
                    _ = time::sleep(timeout) => {
                        pending.lock().take();
                        if token.is_cancelled() {
                            return;
                        }
                        debug!("keepalive timed out after {:?}", timeout);
                        token.cancel();
                        on_timeout();
                        return;
                    }
                }
            }
        });
    }

    /// Stops ticking and drops any open timeout window. Idempotent.
    pub fn stop(&self) {
        if let Some(token) = self.running.lock().take() {
            token.cancel();
        }
        self.pending.lock().take();
    }

    /// Closes the current timeout window, if one is open.
    pub fn handle_pong(&self) {
        if let Some(tx) = self.pending.lock().take() {
            let _ = tx.send(());
        }
    }

    /// Whether a heartbeat task is live.
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|t| !t.is_cancelled())
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for KeepAlive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeepAlive")
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests;

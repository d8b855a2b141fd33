use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;

use super::KeepAlive;

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

#[tokio::test(start_paused = true)]
async fn test_timeout_fires_once_without_pong() {
    let pings = counter();
    let timeouts = counter();
    let (p, t) = (pings.clone(), timeouts.clone());
    let ka = KeepAlive::new(
        Duration::from_secs(1),
        Duration::from_secs(1),
        move || {
            p.fetch_add(1, Ordering::SeqCst);
        },
        move || {
            t.fetch_add(1, Ordering::SeqCst);
        },
    );
    ka.start();
    assert!(ka.is_running());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(pings.load(Ordering::SeqCst), 1);
    assert_eq!(timeouts.load(Ordering::SeqCst), 1);
    assert!(!ka.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_pong_cancels_timeout() {
    let timeouts = counter();
    let t = timeouts.clone();
    let (ping_tx, mut ping_rx) = mpsc::unbounded_channel();
    let ka = Arc::new(KeepAlive::new(
        Duration::from_secs(1),
        Duration::from_secs(1),
        move || {
            let _ = ping_tx.send(());
        },
        move || {
            t.fetch_add(1, Ordering::SeqCst);
        },
    ));

    let responder = ka.clone();
    let answered = tokio::spawn(async move {
        let mut n = 0;
        while ping_rx.recv().await.is_some() {
            responder.handle_pong();
            n += 1;
            if n == 5 {
                break;
            }
        }
        n
    });

    ka.start();
    assert_eq!(answered.await.unwrap(), 5);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(timeouts.load(Ordering::SeqCst), 0);
    assert!(ka.is_running());
    ka.stop();
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent_and_silences_timeout() {
    let timeouts = counter();
    let t = timeouts.clone();
    let ka = KeepAlive::new(
        Duration::from_secs(1),
        Duration::from_secs(1),
        || {},
        move || {
            t.fetch_add(1, Ordering::SeqCst);
        },
    );
    ka.start();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    ka.stop();
    ka.stop();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(timeouts.load(Ordering::SeqCst), 0);
    assert!(!ka.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_pong_without_window_is_noop_and_start_twice() {
    let pings = counter();
    let p = pings.clone();
    let ka = KeepAlive::new(
        Duration::from_secs(1),
        Duration::from_secs(5),
        move || {
            p.fetch_add(1, Ordering::SeqCst);
        },
        || {},
    );
    ka.handle_pong();
    ka.start();
    ka.start();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(pings.load(Ordering::SeqCst), 1);
    ka.stop();
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_disables_heartbeat() {
    let pings = counter();
    let timeouts = counter();
    let (p, t) = (pings.clone(), timeouts.clone());
    let ka = KeepAlive::new(
        Duration::ZERO,
        Duration::from_secs(1),
        move || {
            p.fetch_add(1, Ordering::SeqCst);
        },
        move || {
            t.fetch_add(1, Ordering::SeqCst);
        },
    );
    ka.start();
    assert!(!ka.is_running());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(pings.load(Ordering::SeqCst), 0);
    assert_eq!(timeouts.load(Ordering::SeqCst), 0);
    ka.stop();
}

//! The monitor loop: drains [`LoopMessage`]s and feeds display hotplugs to the debouncer.
use anyhow::{Context, Result};
use std::future::Future;
use tokio::sync::mpsc;

use crate::debounce::{Debouncer, HotplugHandler};
use crate::event::LoopMessage;

/// Runs until shutdown is requested (`Ok`) or the event source dies (`Err`).
///
/// Either way the pending debounce timer is cancelled before returning, so no
/// command fires after the loop has stopped.
pub async fn run<H: HotplugHandler>(
    mut rx: mpsc::Receiver<LoopMessage>,
    debouncer: &Debouncer<H>,
) -> Result<()> {
    tracing::info!("Monitoring for screen connection/disconnection events...");

    let result = loop {
        let Some(message) = rx.recv().await else {
            break Err(anyhow::anyhow!("Event channel closed unexpectedly"));
        };

        match message {
            LoopMessage::Device(event) => {
                if event.is_display_hotplug() {
                    tracing::debug!("Device event: {} on {}", event.action, event.sysname);
                    debouncer.trigger();
                }
            }
            LoopMessage::Shutdown => {
                tracing::info!("Received interrupt, shutting down");
                break Ok(());
            }
            LoopMessage::SourceFailed(reason) => {
                break Err(anyhow::anyhow!("Device event source failed: {reason}"));
            }
        }
    };

    debouncer.cancel();
    result
}

/// Posts [`LoopMessage::Shutdown`] on SIGINT or SIGTERM.
///
/// SIGINT is always handled; if the SIGTERM handler cannot be installed the
/// daemon logs a warning and keeps running on SIGINT alone.
pub async fn forward_shutdown_signals(tx: mpsc::Sender<LoopMessage>) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let terminate = match signal(SignalKind::terminate()) {
        Ok(mut terminate) => Some(async move {
            terminate.recv().await;
        }),
        Err(e) => {
            tracing::warn!("Cannot listen for SIGTERM, only Ctrl+C will stop the daemon: {e}");
            None
        }
    };
    forward_first_signal(tx, tokio::signal::ctrl_c(), terminate).await
}

async fn forward_first_signal<I, T>(
    tx: mpsc::Sender<LoopMessage>,
    interrupt: I,
    terminate: Option<T>,
) -> Result<()>
where
    I: Future<Output = std::io::Result<()>>,
    T: Future<Output = ()>,
{
    let terminate = async {
        match terminate {
            Some(terminate) => terminate.await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        result = interrupt => result.context("Failed to listen for Ctrl+C")?,
        () = terminate => {}
    }
    let _ = tx.send(LoopMessage::Shutdown).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{DeviceAction, DeviceEvent};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::sleep;

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl HotplugHandler for Counter {
        async fn handle(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Counter {
        fn get(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn device(action: DeviceAction, sysname: &str) -> LoopMessage {
        LoopMessage::Device(DeviceEvent {
            action,
            sysname: sysname.to_string(),
            devtype: None,
        })
    }

    fn setup(delay_ms: u64) -> (Arc<Counter>, Arc<Debouncer<Counter>>) {
        let counter = Arc::new(Counter::default());
        let debouncer = Arc::new(Debouncer::new(
            Duration::from_millis(delay_ms),
            Arc::clone(&counter),
        ));
        (counter, debouncer)
    }

    #[tokio::test(start_paused = true)]
    async fn three_changes_in_quick_succession_run_once() {
        let (counter, debouncer) = setup(100);
        let (tx, rx) = mpsc::channel(16);
        let loop_debouncer = Arc::clone(&debouncer);
        let task = tokio::spawn(async move { run(rx, &*loop_debouncer).await });

        tx.send(device(DeviceAction::Change, "card0")).await.unwrap();
        sleep(Duration::from_millis(50)).await;
        tx.send(device(DeviceAction::Change, "card0")).await.unwrap();
        sleep(Duration::from_millis(30)).await;
        tx.send(device(DeviceAction::Change, "card0")).await.unwrap();
        sleep(Duration::from_millis(90)).await;
        assert_eq!(counter.get(), 0);

        sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.get(), 1);

        tx.send(LoopMessage::Shutdown).await.unwrap();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn irrelevant_events_are_not_forwarded() {
        let (counter, debouncer) = setup(100);
        let (tx, rx) = mpsc::channel(16);
        let loop_debouncer = Arc::clone(&debouncer);
        let task = tokio::spawn(async move { run(rx, &*loop_debouncer).await });

        tx.send(device(DeviceAction::Other, "card0")).await.unwrap();
        tx.send(device(DeviceAction::Change, "ttm")).await.unwrap();
        sleep(Duration::from_millis(500)).await;
        assert_eq!(counter.get(), 0);

        tx.send(LoopMessage::Shutdown).await.unwrap();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_timer() {
        let (counter, debouncer) = setup(100);
        let (tx, rx) = mpsc::channel(16);

        tx.send(device(DeviceAction::Add, "card1-HDMI-A-1")).await.unwrap();
        tx.send(LoopMessage::Shutdown).await.unwrap();
        run(rx, &*debouncer).await.unwrap();

        assert!(!debouncer.is_armed());
        sleep(Duration::from_millis(500)).await;
        assert_eq!(counter.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn source_failure_is_an_error() {
        let (counter, debouncer) = setup(100);
        let (tx, rx) = mpsc::channel(16);

        tx.send(device(DeviceAction::Remove, "card1-DP-1")).await.unwrap();
        tx.send(LoopMessage::SourceFailed("poll failed".into()))
            .await
            .unwrap();
        let err = run(rx, &*debouncer).await.unwrap_err();

        assert!(err.to_string().contains("poll failed"));
        sleep(Duration::from_millis(500)).await;
        assert_eq!(counter.get(), 0);
    }

    // ── signal forwarding ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn interrupt_without_terminate_handler_still_shuts_down() {
        let (tx, mut rx) = mpsc::channel(1);
        forward_first_signal(tx, async { Ok(()) }, None::<std::future::Ready<()>>)
            .await
            .unwrap();
        assert!(matches!(rx.recv().await, Some(LoopMessage::Shutdown)));
    }

    #[tokio::test]
    async fn terminate_shuts_down() {
        let (tx, mut rx) = mpsc::channel(1);
        forward_first_signal(
            tx,
            std::future::pending::<std::io::Result<()>>(),
            Some(std::future::ready(())),
        )
        .await
        .unwrap();
        assert!(matches!(rx.recv().await, Some(LoopMessage::Shutdown)));
    }

    #[tokio::test]
    async fn interrupt_listener_failure_is_an_error() {
        let (tx, mut rx) = mpsc::channel(1);
        let failed = async { Err(std::io::Error::other("no signal driver")) };
        let result = forward_first_signal(tx, failed, None::<std::future::Ready<()>>).await;
        assert!(result.is_err());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn closed_channel_is_an_error() {
        let (_counter, debouncer) = setup(100);
        let (tx, rx) = mpsc::channel(16);
        drop(tx);
        assert!(run(rx, &*debouncer).await.is_err());
    }
}

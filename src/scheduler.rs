//! Periodic invocation of [`MailboxRelay::poll`].

use crate::relay::MailboxRelay;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Handle to a running poller task.
#[derive(Debug)]
pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stops the poller and waits for it to exit.
    ///
    /// A cycle already in progress runs to completion first.
    pub async fn shutdown(self) {
        // the receiver is gone only if the task already ended
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Poller task ended abnormally");
        }
    }

    /// Whether the task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawns a task that polls immediately and then every `interval`.
///
/// Ticks missed while a cycle runs long are skipped rather than replayed.
///
/// # Panics
///
/// Panics if `interval` is zero, like [`tokio::time::interval`].
pub fn spawn_poller(
    relay: Arc<MailboxRelay>,
    trigger_token: impl Into<String>,
    interval: Duration,
) -> PollerHandle {
    let trigger_token = trigger_token.into();
    let (shutdown, mut stop) = watch::channel(false);

    let task = tokio::spawn(async move {
        info!(
            interval_secs = interval.as_secs(),
            trigger = %trigger_token,
            "Mailbox poller started"
        );

        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let summary = relay.poll(&trigger_token).await;
                    debug!(?summary, "Poll tick complete");
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Mailbox poller stopped");
    });

    PollerHandle { shutdown, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{Acknowledgment, Notifier};
    use crate::error::{Error, Result};
    use crate::matcher::PhoneMatcher;
    use crate::relay::RelaySettings;
    use crate::session::{MailSession, SessionFactory};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts cycles by refusing every login.
    #[derive(Default)]
    struct CountingFactory {
        opens: AtomicUsize,
    }

    #[async_trait]
    impl SessionFactory for CountingFactory {
        async fn open(&self) -> Result<Box<dyn MailSession>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Err(Error::AuthTimeout {
                email: "alerts@example.com".into(),
                timeout: Duration::from_secs(30),
            })
        }

        fn server_address(&self) -> String {
            "imap.example.com:993".into()
        }
    }

    struct NoopNotifier;

    #[async_trait]
    impl Notifier for NoopNotifier {
        async fn send(&self, _destination: &str, _body: &str) -> Result<Acknowledgment> {
            Ok(Acknowledgment::default())
        }
    }

    fn relay(factory: &Arc<CountingFactory>) -> Arc<MailboxRelay> {
        Arc::new(MailboxRelay::new(
            factory.clone(),
            Arc::new(NoopNotifier),
            PhoneMatcher::new(),
            RelaySettings::default(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_immediately_then_on_interval() {
        let factory = Arc::new(CountingFactory::default());
        let handle = spawn_poller(relay(&factory), "WHATSAPP_NOTIFICATION", Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(factory.opens.load(Ordering::SeqCst), 3);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let factory = Arc::new(CountingFactory::default());
        let handle = spawn_poller(
            relay(&factory),
            "WHATSAPP_NOTIFICATION",
            Duration::from_secs(3600),
        );

        for _ in 0..100 {
            if factory.opens.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(factory.opens.load(Ordering::SeqCst), 1);
        assert!(!handle.is_finished());

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("poller should stop promptly");
        assert_eq!(factory.opens.load(Ordering::SeqCst), 1);
    }
}

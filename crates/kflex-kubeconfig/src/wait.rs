//! Waiting for a credential bundle to appear.
//!
//! A control plane's kubeconfig bundle is written some time after the
//! control plane is requested. [`wait_for_bundle`] subscribes to bundle
//! creation events in the namespace, runs the subscription on a background
//! task, and parks the caller until that task reports the first matching
//! event.
//!
//! The wait ends on a match, on cancellation, on timeout, or when the event
//! stream ends. In every case the background task is stopped and the
//! subscription dropped before the function returns.

use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::bundle::BundleStore;
use crate::{KubeconfigError, Result};

/// Limits on how long [`wait_for_bundle`] may block.
#[derive(Debug, Clone, Default)]
pub struct WaitOptions {
    /// Give up after this long. `None` waits until cancelled.
    pub timeout: Option<Duration>,
    /// Abort the wait when cancelled.
    pub cancel: CancellationToken,
}

impl WaitOptions {
    /// Options with the given timeout and a fresh cancellation token.
    #[must_use]
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Use `cancel` to abort the wait.
    #[must_use]
    pub fn cancel_on(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A completion signal that can be fired at most once.
///
/// Firing again after the first time is a no-op, so racing matches cannot
/// resolve the wait twice. Dropping the signal without firing closes the
/// receiver.
struct CompletionSignal {
    tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl CompletionSignal {
    fn new() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Fire the signal. Returns `true` only for the call that delivered it.
    fn fire(&self) -> bool {
        self.tx
            .lock()
            .take()
            .is_some_and(|tx| tx.send(()).is_ok())
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Block until a bundle named `bundle_name` is observed in `namespace`.
///
/// A bundle that already exists when the wait starts counts as observed.
///
/// # Errors
///
/// - `KubeconfigError::Subscription` if the store subscription fails
/// - `KubeconfigError::Cancelled` if `options.cancel` is cancelled first
/// - `KubeconfigError::TimedOut` if `options.timeout` elapses first
/// - `KubeconfigError::SubscriptionClosed` if the event stream ends first
pub async fn wait_for_bundle<S>(
    store: &S,
    namespace: &str,
    bundle_name: &str,
    options: WaitOptions,
) -> Result<()>
where
    S: BundleStore + ?Sized,
{
    let WaitOptions { timeout, cancel } = options;
    let deadline = timeout.map(|t| Instant::now() + t);
    let timed_out = || KubeconfigError::TimedOut(timeout.unwrap_or_default());

    if cancel.is_cancelled() {
        return Err(KubeconfigError::Cancelled);
    }

    let mut events = tokio::select! {
        res = store.subscribe(namespace) => res?,
        () = cancel.cancelled() => return Err(KubeconfigError::Cancelled),
        () = sleep_until_deadline(deadline) => return Err(timed_out()),
    };

    debug!(namespace, bundle_name, ?timeout, "Waiting for bundle");

    let (signal, done) = CompletionSignal::new();
    let target = bundle_name.to_string();
    let listener = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if event.name == target {
                signal.fire();
                return;
            }
            trace!(bundle = %event.name, "Ignoring unrelated bundle");
        }
        // Stream ended: dropping `signal` closes `done`.
    });

    let outcome = tokio::select! {
        biased;
        res = done => res.map_err(|_| KubeconfigError::SubscriptionClosed),
        () = cancel.cancelled() => Err(KubeconfigError::Cancelled),
        () = sleep_until_deadline(deadline) => Err(timed_out()),
    };

    // Join after abort so the subscription is gone before returning.
    listener.abort();
    let _ = listener.await;

    match &outcome {
        Ok(()) => info!(namespace, bundle_name, "Bundle is available"),
        Err(e) => debug!(namespace, bundle_name, error = %e, "Stopped waiting for bundle"),
    }
    outcome
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::memory::InMemoryBundleStore;

    const GUARD: Duration = Duration::from_secs(5);

    async fn wait_for_subscribers(store: &InMemoryBundleStore, count: usize) {
        tokio::time::timeout(GUARD, async {
            while store.active_subscriptions() < count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("subscriber never registered");
    }

    fn spawn_wait(
        store: &Arc<InMemoryBundleStore>,
        target: &'static str,
        options: WaitOptions,
    ) -> tokio::task::JoinHandle<Result<()>> {
        let store = Arc::clone(store);
        tokio::spawn(async move { wait_for_bundle(&*store, "ns", target, options).await })
    }

    #[test]
    fn completion_signal_fires_once() {
        let (signal, mut rx) = CompletionSignal::new();
        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(!signal.fire());
        assert_eq!(rx.try_recv(), Ok(()));
    }

    #[test]
    fn dropped_signal_closes_receiver() {
        let (signal, mut rx) = CompletionSignal::new();
        drop(signal);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn resolves_on_matching_event_only() {
        let store = Arc::new(InMemoryBundleStore::new());
        let mut waiter = spawn_wait(&store, "target", WaitOptions::default());
        wait_for_subscribers(&store, 1).await;

        store.emit_event("ns", "other");
        store.emit_event("elsewhere", "target");
        assert!(
            tokio::time::timeout(Duration::from_millis(100), &mut waiter)
                .await
                .is_err(),
            "wait resolved before the target appeared"
        );

        store.emit_event("ns", "target");
        tokio::time::timeout(GUARD, waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(store.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn existing_bundle_resolves_immediately() {
        let store = InMemoryBundleStore::new();
        store.insert_bundle("ns", "target", [("config", "x")]);

        tokio::time::timeout(
            GUARD,
            wait_for_bundle(&store, "ns", "target", WaitOptions::default()),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(store.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn non_matching_events_never_resolve_until_cancelled() {
        let store = Arc::new(InMemoryBundleStore::new());
        let cancel = CancellationToken::new();
        let mut waiter = spawn_wait(
            &store,
            "target",
            WaitOptions::default().cancel_on(cancel.clone()),
        );
        wait_for_subscribers(&store, 1).await;

        store.emit_event("ns", "other");
        assert!(tokio::time::timeout(Duration::from_millis(100), &mut waiter)
            .await
            .is_err());

        cancel.cancel();
        let result = tokio::time::timeout(GUARD, waiter).await.unwrap().unwrap();
        assert!(matches!(result, Err(KubeconfigError::Cancelled)));
        assert_eq!(store.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn times_out() {
        let store = InMemoryBundleStore::new();
        let timeout = Duration::from_millis(20);

        let result =
            wait_for_bundle(&store, "ns", "target", WaitOptions::with_timeout(Some(timeout))).await;

        assert!(matches!(result, Err(KubeconfigError::TimedOut(t)) if t == timeout));
        assert_eq!(store.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn already_cancelled_does_not_subscribe() {
        let store = InMemoryBundleStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = wait_for_bundle(
            &store,
            "ns",
            "target",
            WaitOptions::default().cancel_on(cancel),
        )
        .await;

        assert!(matches!(result, Err(KubeconfigError::Cancelled)));
        assert_eq!(store.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn subscription_failure_propagates() {
        let store = InMemoryBundleStore::new();
        store.close();

        let result = wait_for_bundle(&store, "ns", "target", WaitOptions::default()).await;

        assert!(matches!(result, Err(KubeconfigError::Subscription(_))));
    }

    #[tokio::test]
    async fn closed_stream_ends_wait() {
        let store = Arc::new(InMemoryBundleStore::new());
        let waiter = spawn_wait(&store, "target", WaitOptions::default());
        wait_for_subscribers(&store, 1).await;

        store.close();

        let result = tokio::time::timeout(GUARD, waiter).await.unwrap().unwrap();
        assert!(matches!(result, Err(KubeconfigError::SubscriptionClosed)));
        assert_eq!(store.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn repeated_matches_resolve_once() {
        let store = Arc::new(InMemoryBundleStore::new());
        let waiter = spawn_wait(&store, "target", WaitOptions::default());
        wait_for_subscribers(&store, 1).await;

        store.emit_event("ns", "target");
        store.emit_event("ns", "target");

        tokio::time::timeout(GUARD, waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(store.active_subscriptions(), 0);
    }
}

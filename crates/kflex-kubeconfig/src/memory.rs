//! In-process bundle store.
//!
//! Useful for embedding kflex without a cluster and for tests. Subscriptions
//! behave like an informer: bundles already present are reported first,
//! followed by every bundle inserted afterwards.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::warn;

use crate::bundle::{BundleStore, CreationEvent, CreationStream};
use crate::{KubeconfigError, Result};

const EVENT_CAPACITY: usize = 64;

type Payloads = BTreeMap<String, Vec<u8>>;

/// A bundle store that keeps bundles in memory.
pub struct InMemoryBundleStore {
    state: Arc<Mutex<State>>,
    active: Arc<AtomicUsize>,
}

struct State {
    bundles: HashMap<(String, String), Payloads>,
    // `None` once the store is closed.
    events: Option<broadcast::Sender<(String, String)>>,
}

impl State {
    /// Creation events for every bundle in `namespace`, sorted by name.
    fn snapshot(&self, namespace: &str) -> Vec<CreationEvent> {
        let mut existing: Vec<CreationEvent> = self
            .bundles
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| CreationEvent::new(name.clone()))
            .collect();
        existing.sort_by(|a, b| a.name.cmp(&b.name));
        existing
    }
}

impl Default for InMemoryBundleStore {
    fn default() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(State {
                bundles: HashMap::new(),
                events: Some(events),
            })),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl InMemoryBundleStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a bundle and notify subscribers of its namespace.
    pub fn insert_bundle<K, V>(
        &self,
        namespace: &str,
        bundle_name: &str,
        payloads: impl IntoIterator<Item = (K, V)>,
    ) where
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        let payloads = payloads
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let mut state = self.state.lock();
        state
            .bundles
            .insert((namespace.to_string(), bundle_name.to_string()), payloads);
        if let Some(events) = &state.events {
            // No receivers is fine.
            let _ = events.send((namespace.to_string(), bundle_name.to_string()));
        }
    }

    /// Announce a bundle creation without storing anything.
    pub fn emit_event(&self, namespace: &str, bundle_name: &str) {
        if let Some(events) = &self.state.lock().events {
            let _ = events.send((namespace.to_string(), bundle_name.to_string()));
        }
    }

    /// Close the store: live subscriptions end and new ones fail.
    pub fn close(&self) {
        self.state.lock().events = None;
    }

    /// Number of subscriptions that have not been dropped yet.
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// Counts a live subscription for as long as it is held.
struct SubscriptionGuard(Arc<AtomicUsize>);

impl SubscriptionGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct LiveEvents {
    rx: broadcast::Receiver<(String, String)>,
    namespace: String,
    state: Arc<Mutex<State>>,
    // Replayed after a lag, ahead of further live events.
    pending: VecDeque<CreationEvent>,
    _guard: SubscriptionGuard,
}

async fn next_live_event(mut live: LiveEvents) -> Option<(CreationEvent, LiveEvents)> {
    loop {
        if let Some(event) = live.pending.pop_front() {
            return Some((event, live));
        }
        match live.rx.recv().await {
            Ok((namespace, name)) if namespace == live.namespace => {
                return Some((CreationEvent::new(name), live));
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                // Dropped events may include creations; report every
                // bundle currently present instead.
                let snapshot = live.state.lock().snapshot(&live.namespace);
                warn!(
                    namespace = %live.namespace,
                    skipped,
                    replayed = snapshot.len(),
                    "Bundle subscriber lagged, replaying current bundles"
                );
                live.pending.extend(snapshot);
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

#[async_trait]
impl BundleStore for InMemoryBundleStore {
    async fn fetch(&self, namespace: &str, bundle_name: &str) -> Result<Payloads> {
        self.state
            .lock()
            .bundles
            .get(&(namespace.to_string(), bundle_name.to_string()))
            .cloned()
            .ok_or_else(|| KubeconfigError::NotFound(format!("bundle {namespace}/{bundle_name}")))
    }

    async fn subscribe(&self, namespace: &str) -> Result<CreationStream> {
        // Snapshot and subscribe under one lock so no insertion falls between.
        let (existing, rx) = {
            let state = self.state.lock();
            let Some(events) = &state.events else {
                return Err(KubeconfigError::Subscription(format!(
                    "namespace {namespace}: store closed"
                )));
            };
            (state.snapshot(namespace), events.subscribe())
        };

        let live = LiveEvents {
            rx,
            namespace: namespace.to_string(),
            state: Arc::clone(&self.state),
            pending: VecDeque::new(),
            _guard: SubscriptionGuard::new(Arc::clone(&self.active)),
        };

        Ok(futures::stream::iter(existing)
            .chain(futures::stream::unfold(live, next_live_event))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_inserted_bundle() {
        let store = InMemoryBundleStore::new();
        store.insert_bundle("ns", "b", [("config", "data")]);

        let payloads = store.fetch("ns", "b").await.unwrap();
        assert_eq!(payloads["config"], b"data".to_vec());

        assert!(store.fetch("other", "b").await.unwrap_err().is_not_found());
        assert!(store.fetch("ns", "missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn subscription_replays_existing_then_streams_live() {
        let store = InMemoryBundleStore::new();
        store.insert_bundle("ns", "b", [("k", "v")]);
        store.insert_bundle("ns", "a", [("k", "v")]);
        store.insert_bundle("elsewhere", "x", [("k", "v")]);

        let mut events = store.subscribe("ns").await.unwrap();
        assert_eq!(events.next().await, Some(CreationEvent::new("a")));
        assert_eq!(events.next().await, Some(CreationEvent::new("b")));

        store.insert_bundle("elsewhere", "y", [("k", "v")]);
        store.insert_bundle("ns", "c", [("k", "v")]);
        assert_eq!(events.next().await, Some(CreationEvent::new("c")));
    }

    #[tokio::test]
    async fn lagging_subscriber_still_sees_created_bundle() {
        let store = InMemoryBundleStore::new();
        let mut events = store.subscribe("ns").await.unwrap();

        store.insert_bundle("ns", "target", [("k", "v")]);
        for i in 0..EVENT_CAPACITY * 2 {
            store.emit_event("ns", &format!("noise-{i}"));
        }

        let found = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while let Some(event) = events.next().await {
                if event.name == "target" {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap();
        assert!(found);
    }

    #[tokio::test]
    async fn dropping_stream_releases_subscription() {
        let store = InMemoryBundleStore::new();
        let events = store.subscribe("ns").await.unwrap();
        assert_eq!(store.active_subscriptions(), 1);

        drop(events);
        assert_eq!(store.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn close_ends_streams_and_rejects_subscribers() {
        let store = InMemoryBundleStore::new();
        let mut events = store.subscribe("ns").await.unwrap();

        store.close();

        assert_eq!(events.next().await, None);
        assert!(matches!(
            store.subscribe("ns").await,
            Err(KubeconfigError::Subscription(_))
        ));
    }
}

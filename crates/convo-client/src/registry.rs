//! Subscription registry.
//!
//! Tracks which topics are subscribed on one connection so that the set the
//! application believes is active never drifts from what the transport has
//! confirmed. A topic enters the tracked set only after the transport
//! confirms the subscription, and leaves it once an unsubscribe is
//! confirmed or the registry is torn down.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use parking_lot::RwLock;
use tokio::sync::Mutex;

use convo_topic::{TopicAddress, TopicLayout};

use crate::completion::{CompletionGate, CompletionSignal};
use crate::config::ClientConfig;
use crate::connection::{ConnectionHandle, ConnectionManager};
use crate::error::{Error, TeardownFailure};
use crate::transport::{ConnectionFactory, MessageHandler, QoS, Transport};

/// Delivery guarantee requested for every subscription.
pub const SUBSCRIPTION_QOS: QoS = QoS::AtLeastOnce;

/// Where a subscription is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Subscribe request issued, awaiting confirmation.
    Subscribing,
    /// Confirmed by the transport.
    Subscribed,
    /// Unsubscribe request issued, awaiting confirmation.
    Unsubscribing,
}

/// A subscription known to the registry.
#[derive(Debug, Clone)]
pub struct SubscriptionEntry {
    /// Topic or topic filter.
    pub topic: String,
    /// QoS granted by the transport.
    pub qos: QoS,
    /// Lifecycle state.
    pub state: SubscriptionState,
    /// When the subscription was requested.
    pub created_at: Instant,
}

impl SubscriptionEntry {
    fn new(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            qos: SUBSCRIPTION_QOS,
            state: SubscriptionState::Subscribing,
            created_at: Instant::now(),
        }
    }

    fn is_tracked(&self) -> bool {
        self.state == SubscriptionState::Subscribed
    }
}

/// Puts a topic's entry back the way it was unless the change is committed.
///
/// Held across each transport round-trip so that a mutation abandoned before
/// the transport answers (its future dropped by a caller deadline or a
/// `select!`) leaves the tracked set as it found it.
struct PendingChange<'a> {
    subscriptions: &'a RwLock<HashMap<String, SubscriptionEntry>>,
    topic: &'a str,
    previous: Option<Option<SubscriptionEntry>>,
}

impl<'a> PendingChange<'a> {
    fn new(
        subscriptions: &'a RwLock<HashMap<String, SubscriptionEntry>>,
        topic: &'a str,
        previous: Option<SubscriptionEntry>,
    ) -> Self {
        Self {
            subscriptions,
            topic,
            previous: Some(previous),
        }
    }

    /// Keep the change; nothing is restored on drop.
    fn commit(mut self) {
        self.previous = None;
    }
}

impl Drop for PendingChange<'_> {
    fn drop(&mut self) {
        let Some(previous) = self.previous.take() else {
            return;
        };
        let mut subs = self.subscriptions.write();
        match previous {
            Some(entry) => {
                subs.insert(self.topic.to_string(), entry);
            }
            None => {
                subs.remove(self.topic);
            }
        }
    }
}

/// Manages the subscriptions of a single connection.
///
/// Mutations (add, remove, teardown) are serialized per registry and each
/// holds the serialization lock across its transport round-trip. Queries
/// only take a short read lock and never wait on the transport. Message
/// handlers run on the transport's delivery task and never touch either lock.
pub struct SubscriptionRegistry<T: Transport> {
    connection: ConnectionManager<T>,
    layout: TopicLayout,
    /// Active subscriptions keyed by topic.
    subscriptions: RwLock<HashMap<String, SubscriptionEntry>>,
    /// Serializes mutations.
    ops: Mutex<()>,
    completion: CompletionGate,
}

impl<T: Transport> SubscriptionRegistry<T> {
    /// Create a registry that owns `connection`.
    pub fn new(connection: ConnectionManager<T>, layout: TopicLayout) -> Self {
        Self {
            connection,
            layout,
            subscriptions: RwLock::new(HashMap::new()),
            ops: Mutex::new(()),
            completion: CompletionGate::new(),
        }
    }

    /// Connect through `factory` and create a registry for the new connection.
    pub async fn connect<F>(factory: &F, config: &ClientConfig) -> Result<Self, Error>
    where
        F: ConnectionFactory<Transport = T>,
    {
        let connection = ConnectionManager::acquire(factory, config).await?;
        Ok(Self::new(connection, config.layout.clone()))
    }

    /// Connect, run `body` with the registry, and tear down on every exit path.
    ///
    /// Teardown runs whether the body returns `Ok`, returns `Err` or panics;
    /// a panic is resumed after teardown. A teardown failure is returned
    /// only when the body itself succeeded.
    pub async fn scoped<F, B, Fut, R, E>(factory: &F, config: &ClientConfig, body: B) -> Result<R, E>
    where
        F: ConnectionFactory<Transport = T>,
        B: FnOnce(Arc<Self>) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<Error>,
    {
        let registry = Arc::new(Self::connect(factory, config).await?);
        let outcome = AssertUnwindSafe(body(registry.clone()))
            .catch_unwind()
            .await;
        let torn_down = registry.teardown_all().await;

        match outcome {
            Ok(Ok(value)) => {
                torn_down?;
                Ok(value)
            }
            Ok(Err(e)) => {
                if let Err(teardown_err) = torn_down {
                    tracing::warn!(error = %teardown_err, "teardown failed after scope error");
                }
                Err(e)
            }
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Subscribe `handler` to `topic` and wait for confirmation.
    ///
    /// Subscribing to a topic that is already tracked issues a fresh
    /// subscribe request and replaces the tracked entry. On failure the
    /// tracked set is left exactly as it was, including when the call is
    /// abandoned before the transport answers.
    pub async fn add_subscription(
        &self,
        topic: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<QoS, Error> {
        let topic = topic.into();
        let _guard = self.ops.lock().await;

        tracing::info!(topic = %topic, "subscribing");

        let previous = self
            .subscriptions
            .write()
            .insert(topic.clone(), SubscriptionEntry::new(&topic));
        let pending = PendingChange::new(&self.subscriptions, &topic, previous);

        match self
            .connection
            .connection()
            .subscribe(&topic, SUBSCRIPTION_QOS, handler)
            .await
        {
            Ok(granted) => {
                pending.commit();
                if granted < SUBSCRIPTION_QOS {
                    tracing::warn!(topic = %topic, qos = %granted, "transport downgraded qos");
                }
                if let Some(entry) = self.subscriptions.write().get_mut(&topic) {
                    entry.qos = granted;
                    entry.state = SubscriptionState::Subscribed;
                }
                tracing::info!(topic = %topic, qos = %granted, "subscribed");
                Ok(granted)
            }
            Err(e) => {
                drop(pending);
                tracing::warn!(topic = %topic, error = %e, "subscribe failed");
                Err(e)
            }
        }
    }

    /// Build the topic for `address` with this registry's layout and subscribe to it.
    ///
    /// Returns the topic that was subscribed.
    pub async fn subscribe_address(
        &self,
        address: &TopicAddress,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<String, Error> {
        let topic = address.build(&self.layout)?;
        self.add_subscription(topic.clone(), handler).await?;
        Ok(topic)
    }

    /// Unsubscribe from `topic` and stop tracking it.
    ///
    /// Fails with [`Error::NotSubscribed`] before touching the transport if
    /// the topic is not tracked. If the transport refuses the unsubscribe the
    /// topic stays tracked, so the call can be retried. The same holds when
    /// the call is abandoned before the transport answers.
    pub async fn remove_subscription(&self, topic: &str) -> Result<(), Error> {
        let _guard = self.ops.lock().await;

        let previous = {
            let mut subs = self.subscriptions.write();
            match subs.get_mut(topic) {
                Some(entry) if entry.is_tracked() => {
                    let previous = entry.clone();
                    entry.state = SubscriptionState::Unsubscribing;
                    previous
                }
                _ => return Err(Error::NotSubscribed(topic.to_string())),
            }
        };
        let pending = PendingChange::new(&self.subscriptions, topic, Some(previous));

        match self.connection.connection().unsubscribe(topic).await {
            Ok(()) => {
                pending.commit();
                let entry = self.subscriptions.write().remove(topic);
                tracing::info!(
                    topic,
                    age_ms = entry.map(|e| e.created_at.elapsed().as_millis() as u64),
                    "unsubscribed"
                );
                Ok(())
            }
            Err(e) => {
                drop(pending);
                tracing::warn!(topic, error = %e, "unsubscribe failed");
                Err(e)
            }
        }
    }

    /// Unsubscribe every tracked topic, then release the connection.
    ///
    /// Every step is attempted even if earlier ones fail. Tracking is dropped
    /// for every topic regardless of outcome, and the connection is released
    /// last so that nothing is unsubscribed from a closed session. Failures
    /// are collected into [`Error::Teardown`]. Calling this again is a no-op.
    ///
    /// If the call is abandoned midway, topics not yet unsubscribed stay
    /// tracked and the connection stays open, so teardown can be run again.
    pub async fn teardown_all(&self) -> Result<(), Error> {
        let _guard = self.ops.lock().await;
        let mut failures = Vec::new();

        let mut topics: Vec<String> = self.subscriptions.read().keys().cloned().collect();
        topics.sort();

        if !topics.is_empty() {
            tracing::info!(count = topics.len(), "tearing down subscriptions");
        }

        for topic in &topics {
            let previous = {
                let mut subs = self.subscriptions.write();
                let Some(entry) = subs.get_mut(topic) else {
                    continue;
                };
                let previous = entry.clone();
                entry.state = SubscriptionState::Unsubscribing;
                previous
            };
            let pending = PendingChange::new(&self.subscriptions, topic, Some(previous));

            let result = self.connection.connection().unsubscribe(topic).await;
            pending.commit();
            self.subscriptions.write().remove(topic);

            if let Err(e) = result {
                tracing::warn!(topic = %topic, error = %e, "unsubscribe failed during teardown");
                failures.push(TeardownFailure::Unsubscribe {
                    topic: topic.clone(),
                    reason: e.to_string(),
                });
            }
        }

        if let Err(e) = self.connection.release().await {
            failures.push(TeardownFailure::Disconnect {
                reason: e.to_string(),
            });
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Teardown(failures))
        }
    }

    /// Wait until [`completion_signal`](Self::completion_signal) is fired.
    pub async fn await_completion(&self) {
        self.completion.wait().await
    }

    /// The one-shot gate that [`await_completion`](Self::await_completion) waits on.
    pub fn completion(&self) -> &CompletionGate {
        &self.completion
    }

    /// A handle that fires the completion gate, typically moved into a message handler.
    pub fn completion_signal(&self) -> CompletionSignal {
        self.completion.signal()
    }

    /// Confirmed topics, sorted.
    pub fn topics(&self) -> Vec<String> {
        let subs = self.subscriptions.read();
        let mut topics: Vec<String> = subs
            .values()
            .filter(|entry| entry.is_tracked())
            .map(|entry| entry.topic.clone())
            .collect();
        topics.sort();
        topics
    }

    /// Whether `topic` is confirmed and tracked.
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions
            .read()
            .get(topic)
            .map(SubscriptionEntry::is_tracked)
            .unwrap_or(false)
    }

    /// Get a subscription by topic, in any state.
    pub fn get_subscription(&self, topic: &str) -> Option<SubscriptionEntry> {
        self.subscriptions.read().get(topic).cloned()
    }

    /// Number of confirmed subscriptions.
    pub fn len(&self) -> usize {
        self.subscriptions
            .read()
            .values()
            .filter(|entry| entry.is_tracked())
            .count()
    }

    /// Whether no subscription is confirmed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The live connection.
    pub fn connection(&self) -> &ConnectionHandle<T> {
        self.connection.connection()
    }

    /// The layout used by [`subscribe_address`](Self::subscribe_address).
    pub fn layout(&self) -> &TopicLayout {
        &self.layout
    }
}

impl<T: Transport> std::fmt::Debug for SubscriptionRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("connection", self.connection.connection())
            .field("subscriptions", &self.len())
            .field("completed", &self.completion.is_fired())
            .finish()
    }
}

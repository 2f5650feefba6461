//! In-memory loopback transport.
//!
//! [`InMemoryBroker`] routes published messages to subscribed sessions
//! inside the process. Each session owns a delivery task, so handlers run
//! asynchronously and in publish order, the same way a network client's
//! event loop calls back into application code. Useful for tests, demos and
//! wiring checks; nothing is persisted.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use convo_topic::SEPARATOR;

use crate::transport::{
    ConnectOptions, ConnectionEvents, ConnectionFactory, MessageHandler, QoS, Transport,
    TransportError,
};

/// Multi-level wildcard.
const MULTI_LEVEL: &str = "#";

/// Single-level wildcard.
const SINGLE_LEVEL: &str = "+";

/// Check whether a subscription filter matches a concrete topic.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split(SEPARATOR);
    let mut topic_levels = topic.split(SEPARATOR);

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some(MULTI_LEVEL), _) => return true,
            (Some(SINGLE_LEVEL), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

struct Delivery {
    handler: Arc<dyn MessageHandler>,
    topic: String,
    payload: Bytes,
}

struct Session {
    client_id: String,
    routes: HashMap<String, Arc<dyn MessageHandler>>,
    outbox: mpsc::UnboundedSender<Delivery>,
    events: Arc<dyn ConnectionEvents>,
}

#[derive(Default)]
struct BrokerState {
    sessions: HashMap<u64, Session>,
    fail_connect: bool,
    fail_disconnect: bool,
    rejected_topics: HashSet<String>,
    failing_unsubscribes: HashSet<String>,
}

#[derive(Default)]
struct BrokerInner {
    state: Mutex<BrokerState>,
    next_session: AtomicU64,
    connects: AtomicU64,
    disconnects: AtomicU64,
}

/// An in-process publish-subscribe broker.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl InMemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory that opens sessions on this broker.
    pub fn factory(&self) -> InMemoryFactory {
        InMemoryFactory {
            broker: self.clone(),
        }
    }

    /// Publish `payload` on `topic`. Returns the number of subscriptions it was routed to.
    pub fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> usize {
        let payload = payload.into();
        let state = self.inner.state.lock();
        let mut routed = 0;

        for session in state.sessions.values() {
            for (filter, handler) in &session.routes {
                if !topic_matches(filter, topic) {
                    continue;
                }
                let delivery = Delivery {
                    handler: handler.clone(),
                    topic: topic.to_string(),
                    payload: payload.clone(),
                };
                if session.outbox.send(delivery).is_ok() {
                    routed += 1;
                }
            }
        }

        tracing::trace!(topic, routed, "published");
        routed
    }

    /// Report an interruption to every connected session.
    pub fn interrupt_all(&self, reason: &str) {
        let error = TransportError::Other(reason.to_string());
        for events in self.session_events() {
            events.on_interrupted(&error);
        }
    }

    /// Report a resumption to every connected session.
    pub fn resume_all(&self) {
        for events in self.session_events() {
            events.on_resumed(0, true);
        }
    }

    fn session_events(&self) -> Vec<Arc<dyn ConnectionEvents>> {
        let state = self.inner.state.lock();
        state.sessions.values().map(|s| s.events.clone()).collect()
    }

    /// Make subsequent connects fail (or succeed again).
    pub fn fail_connect(&self, fail: bool) {
        self.inner.state.lock().fail_connect = fail;
    }

    /// Make subsequent disconnects fail (or succeed again).
    pub fn fail_disconnect(&self, fail: bool) {
        self.inner.state.lock().fail_disconnect = fail;
    }

    /// Reject every subscribe request for `topic`.
    pub fn reject_subscribe(&self, topic: impl Into<String>) {
        self.inner.state.lock().rejected_topics.insert(topic.into());
    }

    /// Fail every unsubscribe request for `topic`.
    pub fn fail_unsubscribe(&self, topic: impl Into<String>) {
        self.inner
            .state
            .lock()
            .failing_unsubscribes
            .insert(topic.into());
    }

    /// Number of subscriptions across all sessions.
    pub fn subscription_count(&self) -> usize {
        let state = self.inner.state.lock();
        state.sessions.values().map(|s| s.routes.len()).sum()
    }

    /// Whether any session is subscribed to exactly `filter`.
    pub fn has_subscription(&self, filter: &str) -> bool {
        let state = self.inner.state.lock();
        state
            .sessions
            .values()
            .any(|s| s.routes.contains_key(filter))
    }

    /// Client identifiers of the connected sessions, sorted.
    pub fn connected_clients(&self) -> Vec<String> {
        let state = self.inner.state.lock();
        let mut clients: Vec<String> = state
            .sessions
            .values()
            .map(|s| s.client_id.clone())
            .collect();
        clients.sort();
        clients
    }

    /// Number of successful connects.
    pub fn connect_count(&self) -> u64 {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Number of disconnect requests received, successful or not.
    pub fn disconnect_count(&self) -> u64 {
        self.inner.disconnects.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for InMemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBroker")
            .field("sessions", &self.inner.state.lock().sessions.len())
            .field("connects", &self.connect_count())
            .field("disconnects", &self.disconnect_count())
            .finish()
    }
}

/// Opens sessions on an [`InMemoryBroker`].
#[derive(Debug, Clone)]
pub struct InMemoryFactory {
    broker: InMemoryBroker,
}

#[async_trait]
impl ConnectionFactory for InMemoryFactory {
    type Transport = InMemoryTransport;

    async fn connect(&self, options: &ConnectOptions) -> Result<InMemoryTransport, TransportError> {
        let inner = &self.broker.inner;
        let (outbox, mut inbox) = mpsc::unbounded_channel::<Delivery>();

        let session_id = {
            let mut state = inner.state.lock();
            if state.fail_connect {
                return Err(TransportError::Rejected("connection refused".to_string()));
            }
            let session_id = inner.next_session.fetch_add(1, Ordering::SeqCst);
            state.sessions.insert(
                session_id,
                Session {
                    client_id: options.client_id.clone(),
                    routes: HashMap::new(),
                    outbox,
                    events: options.events.clone(),
                },
            );
            session_id
        };

        // Ends once the session is removed and its outbox dropped.
        tokio::spawn(async move {
            while let Some(delivery) = inbox.recv().await {
                delivery
                    .handler
                    .on_message(&delivery.topic, &delivery.payload);
            }
        });

        inner.connects.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(session_id, client_id = %options.client_id, "in-memory session opened");

        Ok(InMemoryTransport {
            broker: self.broker.clone(),
            session_id,
            connected: AtomicBool::new(true),
        })
    }
}

/// A session on an [`InMemoryBroker`].
#[derive(Debug)]
pub struct InMemoryTransport {
    broker: InMemoryBroker,
    session_id: u64,
    connected: AtomicBool,
}

impl InMemoryTransport {
    fn with_session<R>(
        &self,
        f: impl FnOnce(&mut BrokerState, u64) -> Result<R, TransportError>,
    ) -> Result<R, TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        let mut state = self.broker.inner.state.lock();
        if !state.sessions.contains_key(&self.session_id) {
            return Err(TransportError::NotConnected);
        }
        f(&mut state, self.session_id)
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn subscribe(
        &self,
        topic: &str,
        qos: QoS,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<QoS, TransportError> {
        self.with_session(|state, id| {
            if state.rejected_topics.contains(topic) {
                return Err(TransportError::Rejected(format!("subscribe to '{}'", topic)));
            }
            if let Some(session) = state.sessions.get_mut(&id) {
                session.routes.insert(topic.to_string(), handler);
            }
            Ok(qos)
        })
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.with_session(|state, id| {
            if state.failing_unsubscribes.contains(topic) {
                return Err(TransportError::Other(format!(
                    "unsubscribe from '{}' not acknowledged",
                    topic
                )));
            }
            if let Some(session) = state.sessions.get_mut(&id) {
                session.routes.remove(topic);
            }
            Ok(())
        })
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let inner = &self.broker.inner;
        inner.disconnects.fetch_add(1, Ordering::SeqCst);

        let mut state = inner.state.lock();
        if state.fail_disconnect {
            return Err(TransportError::Other("disconnect not acknowledged".to_string()));
        }
        self.connected.store(false, Ordering::SeqCst);
        state.sessions.remove(&self.session_id);
        Ok(())
    }
}

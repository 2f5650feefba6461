//! Connection lifecycle management.
//!
//! [`ConnectionManager`] owns exactly one transport session. Acquisition
//! either yields a connected handle or fails without leaving anything
//! behind; release disconnects at most once, no matter how many times or
//! from how many paths it is requested.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;

use crate::config::ClientConfig;
use crate::error::Error;
use crate::transport::{
    ConnectionEvents, ConnectionFactory, LoggingConnectionEvents, MessageHandler, QoS, Transport,
};

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Session established and usable.
    Connected,
    /// Session released. Never reused.
    Released,
}

/// A live transport session.
///
/// Shared read-only between the [`ConnectionManager`] that owns it and the
/// registry that issues subscriptions against it.
pub struct ConnectionHandle<T: Transport> {
    transport: T,
    endpoint: String,
    client_id: String,
    operation_timeout: Duration,
    released: AtomicBool,
}

impl<T: Transport> ConnectionHandle<T> {
    fn new(transport: T, config: &ClientConfig) -> Self {
        Self {
            transport,
            endpoint: config.endpoint.clone(),
            client_id: config.client_id.clone(),
            operation_timeout: config.operation_timeout,
            released: AtomicBool::new(false),
        }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Broker endpoint this session is connected to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Client identifier of this session.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        if self.released.load(Ordering::SeqCst) {
            ConnectionState::Released
        } else {
            ConnectionState::Connected
        }
    }

    /// Check if the session is still usable.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn ensure_connected(&self) -> Result<(), Error> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::Connection(format!(
                "connection to {} released",
                self.endpoint
            )))
        }
    }

    /// Subscribe and wait for the transport's confirmation.
    pub(crate) async fn subscribe(
        &self,
        topic: &str,
        qos: QoS,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<QoS, Error> {
        self.ensure_connected()?;
        tokio::time::timeout(
            self.operation_timeout,
            self.transport.subscribe(topic, qos, handler),
        )
        .await
        .map_err(|_| Error::Timeout {
            operation: "subscribe",
            after: self.operation_timeout,
        })?
        .map_err(|e| Error::Subscription {
            topic: topic.to_string(),
            reason: e.to_string(),
        })
    }

    /// Unsubscribe and wait for the transport's confirmation.
    pub(crate) async fn unsubscribe(&self, topic: &str) -> Result<(), Error> {
        self.ensure_connected()?;
        tokio::time::timeout(self.operation_timeout, self.transport.unsubscribe(topic))
            .await
            .map_err(|_| Error::Timeout {
                operation: "unsubscribe",
                after: self.operation_timeout,
            })?
            .map_err(|e| Error::Unsubscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    /// Disconnect and wait for confirmation. Only the first call disconnects.
    ///
    /// The handle is marked released before the transport is asked to
    /// disconnect, so a failed disconnect still leaves it released.
    pub async fn release(&self) -> Result<(), Error> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        tracing::info!(endpoint = %self.endpoint, client_id = %self.client_id, "disconnecting");

        let result = tokio::time::timeout(self.operation_timeout, self.transport.disconnect())
            .await
            .map_err(|_| Error::Timeout {
                operation: "disconnect",
                after: self.operation_timeout,
            })
            .and_then(|r| {
                r.map_err(|e| Error::Connection(format!("failed to disconnect: {}", e)))
            });

        match &result {
            Ok(()) => tracing::info!(endpoint = %self.endpoint, "disconnected"),
            Err(e) => tracing::warn!(endpoint = %self.endpoint, error = %e, "disconnect failed"),
        }

        result
    }
}

impl<T: Transport> std::fmt::Debug for ConnectionHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.client_id)
            .field("state", &self.state())
            .finish()
    }
}

/// Owns one transport session for the duration of a scope.
///
/// # Example
///
/// ```ignore
/// use convo_client::{ClientConfig, ConnectionManager};
///
/// let answer = ConnectionManager::scoped(&factory, &ClientConfig::default(), |conn| async move {
///     println!("connected to {}", conn.endpoint());
///     Ok::<_, convo_client::Error>(42)
/// })
/// .await?;
/// ```
pub struct ConnectionManager<T: Transport> {
    handle: Arc<ConnectionHandle<T>>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Connect through `factory`, logging interruptions and resumptions.
    pub async fn acquire<F>(factory: &F, config: &ClientConfig) -> Result<Self, Error>
    where
        F: ConnectionFactory<Transport = T>,
    {
        Self::acquire_with_events(factory, config, Arc::new(LoggingConnectionEvents)).await
    }

    /// Connect through `factory`, reporting session health to `events`.
    pub async fn acquire_with_events<F>(
        factory: &F,
        config: &ClientConfig,
        events: Arc<dyn ConnectionEvents>,
    ) -> Result<Self, Error>
    where
        F: ConnectionFactory<Transport = T>,
    {
        config.validate()?;
        let options = config.connect_options(events);

        tracing::info!(
            endpoint = %options.endpoint,
            client_id = %options.client_id,
            "connecting"
        );

        let transport = tokio::time::timeout(config.connect_timeout, factory.connect(&options))
            .await
            .map_err(|_| {
                Error::Connection(format!(
                    "timed out connecting to {} after {:?}",
                    options.endpoint, config.connect_timeout
                ))
            })?
            .map_err(|e| {
                Error::Connection(format!("failed to connect to {}: {}", options.endpoint, e))
            })?;

        tracing::info!(endpoint = %options.endpoint, "connected");

        Ok(Self {
            handle: Arc::new(ConnectionHandle::new(transport, config)),
        })
    }

    /// Acquire a connection, run `body` with it, and release it on every exit path.
    ///
    /// Release runs whether the body returns `Ok`, returns `Err` or panics;
    /// a panic is resumed after release. A release failure is returned only
    /// when the body itself succeeded.
    pub async fn scoped<F, B, Fut, R, E>(factory: &F, config: &ClientConfig, body: B) -> Result<R, E>
    where
        F: ConnectionFactory<Transport = T>,
        B: FnOnce(Arc<ConnectionHandle<T>>) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<Error>,
    {
        let manager = Self::acquire(factory, config).await?;
        let outcome = AssertUnwindSafe(body(manager.handle())).catch_unwind().await;
        let released = manager.release().await;

        match outcome {
            Ok(Ok(value)) => {
                released?;
                Ok(value)
            }
            Ok(Err(e)) => {
                if let Err(release_err) = released {
                    tracing::warn!(error = %release_err, "release failed after scope error");
                }
                Err(e)
            }
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// The shared handle.
    pub fn handle(&self) -> Arc<ConnectionHandle<T>> {
        self.handle.clone()
    }

    /// Borrow the live connection.
    pub fn connection(&self) -> &ConnectionHandle<T> {
        &self.handle
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.handle.state()
    }

    /// Disconnect. Idempotent.
    pub async fn release(&self) -> Result<(), Error> {
        self.handle.release().await
    }
}

impl<T: Transport> Drop for ConnectionManager<T> {
    fn drop(&mut self) {
        if !self.handle.is_connected() {
            return;
        }

        tracing::warn!(
            endpoint = %self.handle.endpoint,
            "connection manager dropped without release"
        );

        // Best effort: disconnect in the background if a runtime is available.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let handle = self.handle.clone();
            runtime.spawn(async move {
                let _ = handle.release().await;
            });
        }
    }
}

impl<T: Transport> std::fmt::Debug for ConnectionManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connection", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryBroker, InMemoryTransport};
    use crate::transport::{ConnectOptions, TransportError};
    use async_trait::async_trait;

    fn config() -> ClientConfig {
        ClientConfig::new("memory")
            .with_client_id("test-client")
            .with_connect_timeout(Duration::from_millis(100))
            .with_operation_timeout(Duration::from_millis(100))
    }

    struct StallingFactory;

    #[async_trait]
    impl ConnectionFactory for StallingFactory {
        type Transport = InMemoryTransport;

        async fn connect(&self, _options: &ConnectOptions) -> Result<InMemoryTransport, TransportError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let broker = InMemoryBroker::new();
        let manager = ConnectionManager::acquire(&broker.factory(), &config())
            .await
            .unwrap();

        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.connection().client_id(), "test-client");
        assert_eq!(broker.connected_clients(), vec!["test-client".to_string()]);

        manager.release().await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Released);
        assert!(broker.connected_clients().is_empty());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let broker = InMemoryBroker::new();
        let manager = ConnectionManager::acquire(&broker.factory(), &config())
            .await
            .unwrap();

        manager.release().await.unwrap();
        manager.release().await.unwrap();
        manager.connection().release().await.unwrap();
        assert_eq!(broker.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_disconnect_still_releases() {
        let broker = InMemoryBroker::new();
        let manager = ConnectionManager::acquire(&broker.factory(), &config())
            .await
            .unwrap();

        broker.fail_disconnect(true);
        assert!(matches!(manager.release().await, Err(Error::Connection(_))));
        assert_eq!(manager.state(), ConnectionState::Released);

        manager.release().await.unwrap();
        assert_eq!(broker.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_stores_nothing() {
        let broker = InMemoryBroker::new();
        broker.fail_connect(true);

        let err = ConnectionManager::acquire(&broker.factory(), &config())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
        assert!(err.is_retryable());
        assert_eq!(broker.connect_count(), 0);
        assert!(broker.connected_clients().is_empty());
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        let err = ConnectionManager::acquire(&StallingFactory, &config())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection(ref msg) if msg.starts_with("timed out connecting")));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_invalid_config_never_connects() {
        let broker = InMemoryBroker::new();
        let err = ConnectionManager::acquire(&broker.factory(), &config().with_client_id(""))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(broker.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_scoped_releases_on_success() {
        let broker = InMemoryBroker::new();
        let value = ConnectionManager::scoped(&broker.factory(), &config(), |conn| async move {
            assert!(conn.is_connected());
            Ok::<_, Error>(7)
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(broker.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_scoped_releases_on_error() {
        let broker = InMemoryBroker::new();
        let result: Result<(), Error> =
            ConnectionManager::scoped(&broker.factory(), &config(), |_conn| async move {
                Err(Error::Config("body failed".to_string()))
            })
            .await;

        assert!(matches!(result, Err(Error::Config(msg)) if msg == "body failed"));
        assert_eq!(broker.disconnect_count(), 1);
        assert!(broker.connected_clients().is_empty());
    }

    #[tokio::test]
    async fn test_scoped_releases_on_panic() {
        let broker = InMemoryBroker::new();
        let factory = broker.factory();

        let joined = tokio::spawn(async move {
            ConnectionManager::scoped(&factory, &config(), |_conn| async move {
                if true {
                    panic!("body panicked");
                }
                Ok::<(), Error>(())
            })
            .await
        })
        .await;

        assert!(joined.unwrap_err().is_panic());
        assert_eq!(broker.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_scoped_surfaces_release_failure() {
        let broker = InMemoryBroker::new();
        broker.fail_disconnect(true);

        let result = ConnectionManager::scoped(&broker.factory(), &config(), |_conn| async move {
            Ok::<_, Error>(())
        })
        .await;
        assert!(matches!(result, Err(Error::Connection(_))));
    }

    #[tokio::test]
    async fn test_drop_without_release_disconnects() {
        let broker = InMemoryBroker::new();
        let manager = ConnectionManager::acquire(&broker.factory(), &config())
            .await
            .unwrap();
        drop(manager);

        for _ in 0..100 {
            if broker.disconnect_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(broker.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_operations_after_release_fail() {
        let broker = InMemoryBroker::new();
        let manager = ConnectionManager::acquire(&broker.factory(), &config())
            .await
            .unwrap();
        manager.release().await.unwrap();

        let err = manager
            .connection()
            .subscribe("t", QoS::AtLeastOnce, Arc::new(crate::LoggingHandler))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }
}

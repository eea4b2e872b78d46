use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;

use crate::profiles::ConnectionProfile;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    message: String,
}

impl BackendError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[async_trait]
pub trait ConnectionBackend {
    type Connection: Send;

    async fn connect(&self, profile: &ConnectionProfile) -> Result<Self::Connection, BackendError>;
    async fn ping(&self, connection: &mut Self::Connection) -> Result<(), BackendError>;
    async fn disconnect(&self, connection: Self::Connection) -> Result<(), BackendError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub profile_name: Option<String>,
    pub database: Option<String>,
    pub is_connected: bool,
    pub last_latency: Option<Duration>,
}

impl ConnectionStatus {
    #[must_use]
    pub fn disconnected() -> Self {
        Self {
            profile_name: None,
            database: None,
            is_connected: false,
            last_latency: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectionManagerError {
    #[error("active connection already exists for profile `{active_profile}`")]
    AlreadyConnected { active_profile: String },
    #[error("not connected to a database")]
    NotConnected,
    #[error("connection failed: {0}")]
    Backend(#[source] BackendError),
}

#[derive(Debug)]
struct ActiveConnection<C> {
    profile: ConnectionProfile,
    handle: C,
}

/// Owns the single database connection for the lifetime of the application.
/// There is no pool and no reconnect: a lost connection surfaces as errors on
/// the next statement.
#[derive(Debug)]
pub struct ConnectionManager<B: ConnectionBackend> {
    backend: B,
    active: Option<ActiveConnection<B::Connection>>,
    last_latency: Option<Duration>,
}

impl<B: ConnectionBackend> ConnectionManager<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            active: None,
            last_latency: None,
        }
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        let profile = self.active_profile();
        ConnectionStatus {
            profile_name: profile.map(|profile| profile.name.clone()),
            database: profile.and_then(|profile| profile.database.clone()),
            is_connected: self.active.is_some(),
            last_latency: self.last_latency,
        }
    }

    #[must_use]
    pub fn active_profile(&self) -> Option<&ConnectionProfile> {
        self.active.as_ref().map(|active| &active.profile)
    }

    pub fn connection_mut(&mut self) -> Result<&mut B::Connection, ConnectionManagerError> {
        self.active
            .as_mut()
            .map(|active| &mut active.handle)
            .ok_or(ConnectionManagerError::NotConnected)
    }

    pub async fn connect(
        &mut self,
        profile: ConnectionProfile,
    ) -> Result<Duration, ConnectionManagerError> {
        if let Some(active) = &self.active {
            return Err(ConnectionManagerError::AlreadyConnected {
                active_profile: active.profile.name.clone(),
            });
        }

        tracing::info!(
            profile = %profile.name,
            host = %profile.host,
            port = profile.port,
            database = ?profile.database,
            "connecting"
        );
        let started_at = Instant::now();
        let mut handle = self
            .backend
            .connect(&profile)
            .await
            .map_err(ConnectionManagerError::Backend)?;
        self.backend
            .ping(&mut handle)
            .await
            .map_err(ConnectionManagerError::Backend)?;

        let latency = started_at.elapsed();
        self.last_latency = Some(latency);
        self.active = Some(ActiveConnection { profile, handle });
        tracing::info!(latency_ms = latency.as_millis(), "connection established");

        Ok(latency)
    }

    pub async fn disconnect(&mut self) -> Result<(), ConnectionManagerError> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };

        self.last_latency = None;
        self.backend
            .disconnect(active.handle)
            .await
            .map_err(ConnectionManagerError::Backend)?;
        tracing::info!(profile = %active.profile.name, "disconnected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{
        BackendError, ConnectionBackend, ConnectionManager, ConnectionManagerError,
        ConnectionStatus,
    };
    use crate::profiles::ConnectionProfile;

    #[derive(Debug, Default)]
    struct FakeBackend {
        disconnect_calls: AtomicUsize,
        fail_connect: AtomicUsize,
        fail_ping: AtomicUsize,
    }

    #[derive(Debug)]
    struct FakeConnection;

    #[async_trait::async_trait]
    impl ConnectionBackend for FakeBackend {
        type Connection = FakeConnection;

        async fn connect(
            &self,
            _profile: &ConnectionProfile,
        ) -> Result<Self::Connection, BackendError> {
            if self.fail_connect.load(Ordering::Relaxed) > 0 {
                self.fail_connect.fetch_sub(1, Ordering::Relaxed);
                return Err(BackendError::new("Access denied for user 'root'"));
            }
            Ok(FakeConnection)
        }

        async fn ping(&self, _connection: &mut Self::Connection) -> Result<(), BackendError> {
            if self.fail_ping.load(Ordering::Relaxed) > 0 {
                self.fail_ping.fetch_sub(1, Ordering::Relaxed);
                return Err(BackendError::new("ping failed"));
            }
            Ok(())
        }

        async fn disconnect(&self, _connection: Self::Connection) -> Result<(), BackendError> {
            self.disconnect_calls.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    #[tokio::test]
    async fn connect_updates_status_and_exposes_connection() {
        let mut manager = ConnectionManager::new(FakeBackend::default());
        assert!(matches!(
            manager.connection_mut(),
            Err(ConnectionManagerError::NotConnected)
        ));

        manager
            .connect(ConnectionProfile::local_default())
            .await
            .expect("connect should succeed");

        let status = manager.status();
        assert!(status.is_connected);
        assert_eq!(status.profile_name.as_deref(), Some("local"));
        assert_eq!(status.database.as_deref(), Some("movie_theatre"));
        assert!(status.last_latency.is_some());
        assert!(manager.connection_mut().is_ok());
    }

    #[tokio::test]
    async fn connect_fails_when_already_connected() {
        let mut manager = ConnectionManager::new(FakeBackend::default());
        manager
            .connect(ConnectionProfile::local_default())
            .await
            .expect("first connect should succeed");

        let err = manager
            .connect(ConnectionProfile::local_default())
            .await
            .expect_err("second connect should fail");
        assert!(matches!(
            err,
            ConnectionManagerError::AlreadyConnected { .. }
        ));
    }

    #[tokio::test]
    async fn failed_connect_or_ping_leaves_manager_disconnected() {
        let backend = FakeBackend {
            fail_connect: AtomicUsize::new(1),
            fail_ping: AtomicUsize::new(1),
            ..FakeBackend::default()
        };
        let mut manager = ConnectionManager::new(backend);

        let err = manager
            .connect(ConnectionProfile::local_default())
            .await
            .expect_err("connect should fail");
        assert_eq!(err.to_string(), "connection failed: Access denied for user 'root'");
        assert!(manager.active_profile().is_none());

        let err = manager
            .connect(ConnectionProfile::local_default())
            .await
            .expect_err("ping should fail");
        assert!(matches!(err, ConnectionManagerError::Backend(_)));
        assert_eq!(manager.status(), ConnectionStatus::disconnected());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_clears_status() {
        let mut manager = ConnectionManager::new(FakeBackend::default());
        manager
            .connect(ConnectionProfile::local_default())
            .await
            .expect("connect should succeed");
        manager.disconnect().await.expect("disconnect should succeed");
        manager
            .disconnect()
            .await
            .expect("disconnect should stay idempotent");

        assert_eq!(manager.status(), ConnectionStatus::disconnected());
    }
}

//! Monotonic sessions pin connections so that a session never reads behind its own writes.
//!
//! A [`MonotonicSession`] holds at most one read-pinned and one write-pinned
//! connection, never both at once:
//! - reads are served by a connection pinned per read preference; asking for
//!   another preference replaces the pin,
//! - the first write pins a connection for writes and drops the read pin;
//!   from then on every request, read or write, uses that connection,
//! - [`close`](Session::close) releases whatever is pinned, and the session
//!   rejects every later request.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, trace, trace_span, warn, Instrument};

use super::session::{Session, SessionState};
use super::session_builder::{SessionConfig, SessionConsistency};
use crate::errors::{ConnectionAcquisitionError, GetConnectionError, NewSessionError};
use crate::network::{Connection, ConnectionHandle, ConnectionManager};
#[cfg(feature = "metrics")]
use crate::observability::metrics::Metrics;
use crate::read_preference::ReadPreference;

/// Which connection, if any, a session currently has pinned.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AffinityState {
    /// Nothing is pinned.
    Idle,
    /// A connection acquired under the contained read preference is pinned for reads.
    ReadPinned(ReadPreference),
    /// A write connection is pinned; it serves reads as well.
    WritePinned,
    /// The session is closed and holds no connections.
    Closed,
}

struct ReadPin {
    connection: Arc<dyn Connection>,
    read_preference: ReadPreference,
}

#[derive(Default)]
struct PinnedConnections {
    write: Option<Arc<dyn Connection>>,
    read: Option<ReadPin>,
}

/// Hands connections back to the connection manager, logging and counting
/// failures instead of returning them.
#[derive(Clone)]
struct Releaser {
    #[cfg(feature = "metrics")]
    metrics: Arc<Metrics>,
}

impl Releaser {
    async fn release(&self, connection: &Arc<dyn Connection>) {
        #[cfg(feature = "metrics")]
        self.metrics.inc_releases();
        if let Err(err) = connection.release().await {
            warn!(
                "Failed to release connection to {}: {}",
                connection.connect_address(),
                err
            );
            #[cfg(feature = "metrics")]
            self.metrics.inc_failed_releases();
        }
    }

    fn release_in_background(&self, connections: Vec<Arc<dyn Connection>>) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!(
                    "No tokio runtime to release on, abandoning {} connection(s)",
                    connections.len()
                );
                return;
            }
        };
        let releaser = self.clone();
        runtime.spawn(async move {
            for connection in connections {
                releaser.release(&connection).await;
            }
        });
    }
}

/// A connection taken out of the session that has not been released yet.
///
/// If dropped before [`PendingRelease::run`] completes, e.g. because the
/// caller's future was cancelled mid-release, the release is finished on a
/// background task.
struct PendingRelease {
    connection: Option<Arc<dyn Connection>>,
    releaser: Releaser,
}

impl PendingRelease {
    async fn run(mut self) {
        if let Some(connection) = self.connection.clone() {
            self.releaser.release(&connection).await;
        }
        self.connection = None;
    }
}

impl Drop for PendingRelease {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            debug!(
                "Release of connection to {} interrupted, finishing it in the background",
                connection.connect_address()
            );
            self.releaser.release_in_background(vec![connection]);
        }
    }
}

impl PinnedConnections {
    fn take_all(&mut self) -> Vec<Arc<dyn Connection>> {
        // Read pin first, matching the order in which `close` releases them.
        self.read
            .take()
            .map(|pin| pin.connection)
            .into_iter()
            .chain(self.write.take())
            .collect()
    }
}

/// Session providing monotonic (read-your-own-writes) consistency by
/// connection pinning.
///
/// All state transitions happen under a single lock, held for the whole
/// operation including calls out to the [`ConnectionManager`]. Concurrent
/// callers sharing a session are therefore served one at a time.
pub struct MonotonicSession {
    connection_manager: Arc<dyn ConnectionManager>,
    state: SessionState,
    pinned: Mutex<PinnedConnections>,
    release_on_drop: bool,
    #[cfg(feature = "metrics")]
    metrics: Arc<Metrics>,
}

impl MonotonicSession {
    /// Creates a session obtaining its connections from `connection_manager`.
    pub fn new(connection_manager: Arc<dyn ConnectionManager>) -> Self {
        Self {
            connection_manager,
            state: SessionState::new(),
            pinned: Mutex::new(PinnedConnections::default()),
            release_on_drop: true,
            #[cfg(feature = "metrics")]
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Creates a session from a [`SessionConfig`].
    pub fn with_config(config: SessionConfig) -> Result<Self, NewSessionError> {
        let connection_manager = config
            .connection_manager
            .ok_or(NewSessionError::MissingConnectionManager)?;
        let mut session = Self::new(connection_manager);
        session.release_on_drop = config.release_on_drop;
        Ok(session)
    }

    /// Reports which connection the session currently has pinned.
    pub async fn affinity_state(&self) -> AffinityState {
        let pinned = self.pinned.lock().await;
        if self.state.is_closed() {
            return AffinityState::Closed;
        }
        match (&pinned.write, &pinned.read) {
            (Some(_), _) => AffinityState::WritePinned,
            (None, Some(pin)) => AffinityState::ReadPinned(pin.read_preference.clone()),
            (None, None) => AffinityState::Idle,
        }
    }

    fn reuse(&self, connection: &Arc<dyn Connection>) -> ConnectionHandle {
        #[cfg(feature = "metrics")]
        self.metrics.inc_pinned_reuses();
        ConnectionHandle::new(connection.clone())
    }

    async fn acquire_for_read(
        &self,
        read_preference: &ReadPreference,
    ) -> Result<Arc<dyn Connection>, ConnectionAcquisitionError> {
        let span = trace_span!(
            "acquire_connection",
            kind = "read",
            read_preference = %read_preference
        );
        let connection = self
            .acquire(self.connection_manager.acquire_for_read(read_preference))
            .instrument(span)
            .await?;
        #[cfg(feature = "metrics")]
        self.metrics.inc_read_acquisitions();
        Ok(connection)
    }

    async fn acquire_for_write(&self) -> Result<Arc<dyn Connection>, ConnectionAcquisitionError> {
        let span = trace_span!("acquire_connection", kind = "write");
        let connection = self
            .acquire(self.connection_manager.acquire_for_write())
            .instrument(span)
            .await?;
        #[cfg(feature = "metrics")]
        self.metrics.inc_write_acquisitions();
        Ok(connection)
    }

    async fn acquire(
        &self,
        acquisition: impl Future<Output = Result<Arc<dyn Connection>, ConnectionAcquisitionError>>,
    ) -> Result<Arc<dyn Connection>, ConnectionAcquisitionError> {
        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();

        let result = acquisition.await;
        match &result {
            Ok(connection) => {
                debug!("Acquired connection to {}", connection.connect_address());
                #[cfg(feature = "metrics")]
                {
                    let latency = started.elapsed().as_millis() as u64;
                    let _ = self.metrics.log_acquisition_latency(latency);
                }
            }
            Err(err) => {
                debug!("Failed to acquire connection: {}", err);
                #[cfg(feature = "metrics")]
                self.metrics.inc_failed_acquisitions();
            }
        }
        result
    }

    fn releaser(&self) -> Releaser {
        Releaser {
            #[cfg(feature = "metrics")]
            metrics: self.metrics.clone(),
        }
    }

    // The connection is owned by the returned guard from here on, so it gets
    // released even if the caller stops polling halfway through.
    fn pending_release(&self, connection: Arc<dyn Connection>) -> PendingRelease {
        PendingRelease {
            connection: Some(connection),
            releaser: self.releaser(),
        }
    }
}

#[async_trait]
impl Session for MonotonicSession {
    async fn get_connection_for_read(
        &self,
        read_preference: &ReadPreference,
    ) -> Result<ConnectionHandle, GetConnectionError> {
        let mut pinned = self.pinned.lock().await;
        self.state.ensure_open()?;
        read_preference.validate()?;

        // Once written, all reads go where the write went.
        if let Some(write) = &pinned.write {
            trace!("Serving read with the write-pinned connection");
            return Ok(self.reuse(write));
        }

        if let Some(pin) = &pinned.read {
            if pin.read_preference == *read_preference {
                trace!("Reusing read-pinned connection for {}", read_preference);
                return Ok(self.reuse(&pin.connection));
            }
        }

        // Acquire before touching the pin, so that a failed acquisition
        // leaves the session exactly as it was.
        let connection = self.acquire_for_read(read_preference).await?;
        let stale = pinned.read.replace(ReadPin {
            connection: connection.clone(),
            read_preference: read_preference.clone(),
        });
        if let Some(stale) = stale {
            debug!(
                "Read preference changed from {} to {}, releasing connection to {}",
                stale.read_preference,
                read_preference,
                stale.connection.connect_address()
            );
            self.pending_release(stale.connection).run().await;
        }

        Ok(ConnectionHandle::new(connection))
    }

    async fn get_connection_for_write(&self) -> Result<ConnectionHandle, GetConnectionError> {
        let mut pinned = self.pinned.lock().await;
        self.state.ensure_open()?;

        if let Some(write) = &pinned.write {
            trace!("Reusing write-pinned connection");
            return Ok(self.reuse(write));
        }

        let connection = self.acquire_for_write().await?;
        pinned.write = Some(connection.clone());
        if let Some(stale) = pinned.read.take() {
            debug!(
                "Write pinned connection to {}, releasing read connection to {}",
                connection.connect_address(),
                stale.connection.connect_address()
            );
            self.pending_release(stale.connection).run().await;
        }

        Ok(ConnectionHandle::new(connection))
    }

    async fn close(&self) {
        let mut pinned = self.pinned.lock().await;
        if !self.state.mark_closed() {
            return;
        }

        let pending: Vec<PendingRelease> = pinned
            .take_all()
            .into_iter()
            .map(|connection| self.pending_release(connection))
            .collect();
        debug!("Closing session, releasing {} connection(s)", pending.len());
        for release in pending {
            release.run().await;
        }
    }

    fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    fn consistency(&self) -> SessionConsistency {
        SessionConsistency::Monotonic
    }

    #[cfg(feature = "metrics")]
    fn get_metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }
}

impl Drop for MonotonicSession {
    fn drop(&mut self) {
        if self.state.is_closed() {
            return;
        }
        let connections = self.pinned.get_mut().take_all();
        if connections.is_empty() {
            return;
        }

        if !self.release_on_drop {
            warn!(
                "Session dropped without being closed, abandoning {} pinned connection(s)",
                connections.len()
            );
            return;
        }

        warn!(
            "Session dropped without being closed, releasing {} pinned connection(s) in the background",
            connections.len()
        );
        self.releaser().release_in_background(connections);
    }
}

impl fmt::Debug for MonotonicSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonotonicSession")
            .field("connection_manager", &self.connection_manager)
            .field("closed", &self.state.is_closed())
            .field("release_on_drop", &self.release_on_drop)
            .finish_non_exhaustive()
    }
}

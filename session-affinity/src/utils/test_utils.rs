use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use crate::errors::{ConnectionAcquisitionError, ConnectionReleaseError, RequestError};
use crate::network::{Connection, ConnectionManager};
use crate::read_preference::ReadPreference;

pub(crate) fn setup_tracing() {
    let _ = tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(tracing_subscriber::fmt::TestWriter::new())
        .try_init();
}

/// Everything a [`MockConnectionManager`] and its connections observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MockEvent {
    AcquiredForRead { id: usize, read_preference: ReadPreference },
    AcquiredForWrite { id: usize },
    Released { id: usize },
}

type EventLog = Arc<Mutex<Vec<MockEvent>>>;

#[derive(Debug)]
pub(crate) struct MockConnection {
    id: usize,
    released: AtomicBool,
    release_count: AtomicUsize,
    executed: AtomicUsize,
    fail_release: bool,
    release_delay: Option<Duration>,
    log: Option<EventLog>,
}

impl MockConnection {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            id,
            released: AtomicBool::new(false),
            release_count: AtomicUsize::new(0),
            executed: AtomicUsize::new(0),
            fail_release: false,
            release_delay: None,
            log: None,
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn release_count(&self) -> usize {
        self.release_count.load(Ordering::SeqCst)
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub(crate) fn executed_requests(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn host_id(&self) -> Uuid {
        Uuid::from_u128(self.id as u128)
    }

    fn connect_address(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 9000 + self.id as u16)
    }

    async fn execute(&self, request: Bytes) -> Result<Bytes, RequestError> {
        if self.is_released() {
            return Err(RequestError::ConnectionReleased);
        }
        self.executed.fetch_add(1, Ordering::SeqCst);
        Ok(request)
    }

    async fn release(&self) -> Result<(), ConnectionReleaseError> {
        // Nothing is recorded for a release cancelled while sleeping.
        if let Some(delay) = self.release_delay {
            tokio::time::sleep(delay).await;
        }
        self.release_count.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.lock().unwrap().push(MockEvent::Released { id: self.id });
        }
        if self.released.swap(true, Ordering::SeqCst) {
            return Err(ConnectionReleaseError::AlreadyReleased);
        }
        if self.fail_release {
            return Err(ConnectionReleaseError::Other(
                "socket closed abruptly".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Connection manager handing out fresh [`MockConnection`]s with increasing ids,
/// starting from 1, and recording every acquisition and release.
#[derive(Debug, Default)]
pub(crate) struct MockConnectionManager {
    log: EventLog,
    next_id: AtomicUsize,
    connections: Mutex<Vec<Arc<MockConnection>>>,
    injected_failures: Mutex<VecDeque<ConnectionAcquisitionError>>,
    acquisition_delay: Option<Duration>,
    release_delay: Option<Duration>,
    fail_releases: bool,
}

impl MockConnectionManager {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every acquisition sleeps for `delay` before returning.
    pub(crate) fn with_acquisition_delay(mut self, delay: Duration) -> Self {
        self.acquisition_delay = Some(delay);
        self
    }

    /// Every release sleeps for `delay` before taking effect.
    pub(crate) fn with_release_delay(mut self, delay: Duration) -> Self {
        self.release_delay = Some(delay);
        self
    }

    /// Every connection handed out fails to release.
    pub(crate) fn with_failing_releases(mut self) -> Self {
        self.fail_releases = true;
        self
    }

    /// The next acquisition fails with the given error.
    pub(crate) fn fail_next_acquisition(&self, error: ConnectionAcquisitionError) {
        self.injected_failures.lock().unwrap().push_back(error);
    }

    pub(crate) fn events(&self) -> Vec<MockEvent> {
        self.log.lock().unwrap().clone()
    }

    pub(crate) fn read_acquisitions(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::AcquiredForRead { .. }))
    }

    pub(crate) fn write_acquisitions(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::AcquiredForWrite { .. }))
    }

    pub(crate) fn releases(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::Released { .. }))
    }

    /// Connection with the given id, as handed out by this manager.
    pub(crate) fn connection(&self, id: usize) -> Arc<MockConnection> {
        self.connections
            .lock()
            .unwrap()
            .iter()
            .find(|conn| conn.id() == id)
            .cloned()
            .unwrap_or_else(|| panic!("connection {id} was never handed out"))
    }

    fn count(&self, pred: impl Fn(&MockEvent) -> bool) -> usize {
        self.log.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    async fn acquire(
        &self,
        event: impl FnOnce(usize) -> MockEvent,
    ) -> Result<Arc<dyn Connection>, ConnectionAcquisitionError> {
        if let Some(delay) = self.acquisition_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.injected_failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let conn = Arc::new(MockConnection {
            fail_release: self.fail_releases,
            release_delay: self.release_delay,
            log: Some(self.log.clone()),
            ..MockConnection::new(id)
        });
        self.connections.lock().unwrap().push(conn.clone());
        self.log.lock().unwrap().push(event(id));
        Ok(conn)
    }
}

#[async_trait]
impl ConnectionManager for MockConnectionManager {
    async fn acquire_for_read(
        &self,
        read_preference: &ReadPreference,
    ) -> Result<Arc<dyn Connection>, ConnectionAcquisitionError> {
        let read_preference = read_preference.clone();
        self.acquire(|id| MockEvent::AcquiredForRead {
            id,
            read_preference,
        })
        .await
    }

    async fn acquire_for_write(&self) -> Result<Arc<dyn Connection>, ConnectionAcquisitionError> {
        self.acquire(|id| MockEvent::AcquiredForWrite { id }).await
    }
}

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;
use uuid::Uuid;

use crate::errors::{ConnectionReleaseError, RequestError};
use crate::network::Connection;

/// A non-owning view over a connection pinned by a session.
///
/// Every [`Connection`] operation is forwarded to the pinned connection except
/// [`release`](Connection::release), which does nothing. Many handles to the same
/// connection may be handed out over the lifetime of a session; only the session
/// decides when the connection goes back to the pool.
///
/// Handles are cheap to clone.
#[derive(Clone)]
pub struct ConnectionHandle {
    target: Arc<dyn Connection>,
}

impl ConnectionHandle {
    pub(crate) fn new(target: Arc<dyn Connection>) -> Self {
        Self { target }
    }

    /// Checks whether both handles are views over the same underlying connection.
    pub fn is_same_connection(&self, other: &ConnectionHandle) -> bool {
        self.is_handle_of(&other.target)
    }

    /// Checks whether this handle is a view over the given connection.
    pub fn is_handle_of(&self, connection: &Arc<dyn Connection>) -> bool {
        // Compare data pointers only; vtable pointers of the same object
        // are not guaranteed to be unique.
        std::ptr::addr_eq(Arc::as_ptr(&self.target), Arc::as_ptr(connection))
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("target", &self.target)
            .finish()
    }
}

#[async_trait]
impl Connection for ConnectionHandle {
    fn host_id(&self) -> Uuid {
        self.target.host_id()
    }

    fn connect_address(&self) -> SocketAddr {
        self.target.connect_address()
    }

    async fn execute(&self, request: Bytes) -> Result<Bytes, RequestError> {
        self.target.execute(request).await
    }

    async fn release(&self) -> Result<(), ConnectionReleaseError> {
        trace!(
            "Ignoring release of a session-pinned connection to {}",
            self.target.connect_address()
        );
        Ok(())
    }
}

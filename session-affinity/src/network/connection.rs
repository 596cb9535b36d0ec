use std::fmt::Debug;
use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use crate::errors::{ConnectionReleaseError, RequestError};

/// A live channel to a single cluster node.
///
/// Connections are owned by the pool of a [`ConnectionManager`](super::ConnectionManager).
/// Whoever acquired a connection is responsible for returning it with
/// [`release`](Connection::release), exactly once. Implementations are not required
/// to tolerate a second release.
#[async_trait]
pub trait Connection: Send + Sync + Debug {
    /// Host ID of the node this connection is opened to.
    fn host_id(&self) -> Uuid;

    /// Address this connection is opened to.
    fn connect_address(&self) -> SocketAddr;

    /// Sends an already encoded request and waits for the encoded response.
    async fn execute(&self, request: Bytes) -> Result<Bytes, RequestError>;

    /// Returns the connection to its pool.
    async fn release(&self) -> Result<(), ConnectionReleaseError>;
}

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::ConnectionAcquisitionError;
use crate::network::Connection;
use crate::read_preference::ReadPreference;

/// Grants connections to cluster nodes.
///
/// The manager owns node selection, the connection pool and the acquisition
/// policy (timeouts, failover). Sessions never retry a failed acquisition,
/// so any such policy has to live here.
#[async_trait]
pub trait ConnectionManager: Send + Sync + Debug {
    /// Acquires a connection to a node eligible to serve reads
    /// under the given read preference.
    async fn acquire_for_read(
        &self,
        read_preference: &ReadPreference,
    ) -> Result<Arc<dyn Connection>, ConnectionAcquisitionError>;

    /// Acquires a connection to a node that accepts writes.
    async fn acquire_for_write(&self) -> Result<Arc<dyn Connection>, ConnectionAcquisitionError>;
}

//! `Session` is the capability set shared by every session variant.
//!
//! A session spans multiple operations issued by one logical unit of work and
//! decides which connection each of them uses. Which consistency guarantee a
//! session provides depends on the variant, selected when the session is built
//! (see [`SessionBuilder`](super::session_builder::SessionBuilder)).

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(feature = "metrics")]
use std::sync::Arc;

use async_trait::async_trait;

use super::session_builder::SessionConsistency;
use crate::errors::GetConnectionError;
use crate::network::ConnectionHandle;
#[cfg(feature = "metrics")]
use crate::observability::metrics::Metrics;
use crate::read_preference::ReadPreference;

/// Hands out connections to the operations of one logical unit of work.
///
/// Returned [`ConnectionHandle`]s may be freely used and released by callers;
/// releasing a handle never returns the underlying connection to the pool.
/// Only [`close`](Session::close) does that, so every session has to be closed
/// once the unit of work is done.
#[async_trait]
pub trait Session: Send + Sync + Debug {
    /// Returns a connection for a read that may be served
    /// by any node eligible under `read_preference`.
    ///
    /// Fails with [`GetConnectionError::StateError`] if the session is closed
    /// and with [`GetConnectionError::InvalidArgument`] if the read preference
    /// is not well-formed.
    async fn get_connection_for_read(
        &self,
        read_preference: &ReadPreference,
    ) -> Result<ConnectionHandle, GetConnectionError>;

    /// Returns a connection to a node accepting writes.
    ///
    /// Fails with [`GetConnectionError::StateError`] if the session is closed.
    async fn get_connection_for_write(&self) -> Result<ConnectionHandle, GetConnectionError>;

    /// Returns every connection held by the session to the pool.
    ///
    /// Idempotent, and never fails: release failures are logged and suppressed.
    async fn close(&self);

    /// Whether [`close`](Session::close) has been called.
    fn is_closed(&self) -> bool;

    /// The consistency guarantee this session provides.
    fn consistency(&self) -> SessionConsistency;

    /// Access metrics collected by the session.
    #[cfg(feature = "metrics")]
    fn get_metrics(&self) -> Arc<Metrics>;
}

/// Bookkeeping shared by all session variants.
///
/// The closed flag is monotonic: once set it is never cleared.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    closed: AtomicBool,
}

impl SessionState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_open(&self) -> Result<(), GetConnectionError> {
        if self.is_closed() {
            return Err(GetConnectionError::StateError);
        }
        Ok(())
    }

    /// Marks the session as closed. Returns `false` if it already was.
    pub(crate) fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }
}

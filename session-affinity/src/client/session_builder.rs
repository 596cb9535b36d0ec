//! SessionBuilder provides an easy way to create new sessions

use std::fmt;
use std::sync::Arc;

use super::monotonic_session::MonotonicSession;
use super::session::Session;
use crate::errors::NewSessionError;
use crate::network::ConnectionManager;

/// Consistency guarantee provided by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum SessionConsistency {
    /// Once the session has written, every later read observes the node the
    /// write went to. Reads before the first write stay on one connection per
    /// read preference.
    #[default]
    Monotonic,
}

/// Configuration options for sessions.
/// Can be created manually, but usually it's easier to use
/// [SessionBuilder]
#[derive(Clone)]
#[non_exhaustive]
pub struct SessionConfig {
    /// Source of all connections the session hands out.
    pub connection_manager: Option<Arc<dyn ConnectionManager>>,

    /// Consistency guarantee of the session.
    pub consistency: SessionConsistency,

    /// Whether a session dropped without being closed should return its pinned
    /// connections to the pool in a background task.
    /// Requires a running tokio runtime at drop time.
    pub release_on_drop: bool,
}

impl SessionConfig {
    /// Creates a [`SessionConfig`] with default configuration
    /// # Default configuration
    /// * Connection manager: none, has to be set
    /// * Consistency: [`SessionConsistency::Monotonic`]
    /// * Release on drop: true
    pub fn new() -> Self {
        SessionConfig {
            connection_manager: None,
            consistency: SessionConsistency::default(),
            release_on_drop: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("connection_manager", &self.connection_manager)
            .field("consistency", &self.consistency)
            .field("release_on_drop", &self.release_on_drop)
            .finish()
    }
}

/// SessionBuilder is used to create new Session instances
/// # Example
///
/// ```
/// # use session_affinity::client::session_builder::{SessionBuilder, SessionConsistency};
/// # use session_affinity::network::ConnectionManager;
/// # use std::sync::Arc;
/// # fn example(manager: Arc<dyn ConnectionManager>) -> Result<(), Box<dyn std::error::Error>> {
/// let session = SessionBuilder::new()
///     .connection_manager(manager)
///     .consistency(SessionConsistency::Monotonic)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct SessionBuilder {
    /// Configuration the session will be built with.
    pub config: SessionConfig,
}

impl SessionBuilder {
    /// Creates new SessionBuilder with default configuration
    pub fn new() -> Self {
        SessionBuilder {
            config: SessionConfig::new(),
        }
    }

    /// Sets the connection manager the session obtains connections from.
    pub fn connection_manager(mut self, connection_manager: Arc<dyn ConnectionManager>) -> Self {
        self.config.connection_manager = Some(connection_manager);
        self
    }

    /// Sets the consistency guarantee of the session.
    pub fn consistency(mut self, consistency: SessionConsistency) -> Self {
        self.config.consistency = consistency;
        self
    }

    /// Sets whether a session dropped without [`Session::close`] should still
    /// return its connections to the pool. The default is true.
    pub fn release_on_drop(mut self, release_on_drop: bool) -> Self {
        self.config.release_on_drop = release_on_drop;
        self
    }

    /// Builds the session after setting all the options.
    pub fn build(&self) -> Result<Arc<dyn Session>, NewSessionError> {
        let session = match self.config.consistency {
            SessionConsistency::Monotonic => MonotonicSession::with_config(self.config.clone())?,
        };
        Ok(Arc::new(session))
    }
}

//! This module contains various errors which can be returned by a [`Session`](crate::client::session::Session)
//! and by its collaborators.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Error returned when a session fails to hand out a connection.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum GetConnectionError {
    /// The session has already been closed. Callers must not use a session
    /// after calling [`Session::close`](crate::client::session::Session::close).
    #[error("Session is closed")]
    StateError,

    /// Caller passed a read preference that is not well-formed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(#[from] BadReadPreference),

    /// The connection manager failed to provide a connection.
    /// Session performs no retry and no fallback on this error.
    #[error(transparent)]
    ConnectionAcquisitionError(#[from] ConnectionAcquisitionError),
}

/// A read preference that cannot be used to route reads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BadReadPreference {
    /// Tag sets only make sense for modes that may select a non-primary node.
    #[error("Tag sets are not allowed with the primary read preference mode")]
    TagSetsWithPrimary,

    /// Staleness bounds only make sense for modes that may select a non-primary node.
    #[error("Max staleness is not allowed with the primary read preference mode")]
    MaxStalenessWithPrimary,

    /// Max staleness is below the lowest bound a node can reliably report.
    #[error("Max staleness {max_staleness:?} is smaller than the minimum of {minimum:?}")]
    MaxStalenessTooSmall {
        /// The requested bound.
        max_staleness: Duration,
        /// The lowest accepted bound.
        minimum: Duration,
    },
}

/// Error raised by a [`ConnectionManager`](crate::network::ConnectionManager)
/// when it cannot provide a connection.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum ConnectionAcquisitionError {
    /// No node matching the request is reachable.
    #[error("No eligible node: {0}")]
    NoEligibleNode(String),

    /// The manager gave up waiting for a connection.
    #[error("Timeout Error")]
    TimeoutError,

    /// Input/Output error has occurred while opening the connection.
    #[error("IO Error: {0}")]
    IoError(Arc<std::io::Error>),

    /// The pool backing the manager has been shut down.
    #[error("Connection pool is closed")]
    PoolClosed,
}

impl From<std::io::Error> for ConnectionAcquisitionError {
    fn from(error: std::io::Error) -> Self {
        ConnectionAcquisitionError::IoError(Arc::new(error))
    }
}

/// Error raised when a connection cannot be returned to its pool.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum ConnectionReleaseError {
    /// Input/Output error has occurred while closing the connection.
    #[error("IO Error: {0}")]
    IoError(Arc<std::io::Error>),

    /// The connection was already returned to the pool.
    #[error("Connection was already released")]
    AlreadyReleased,

    /// Other reasons of a failed release.
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for ConnectionReleaseError {
    fn from(error: std::io::Error) -> Self {
        ConnectionReleaseError::IoError(Arc::new(error))
    }
}

/// Error of a request sent over a [`Connection`](crate::network::Connection).
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum RequestError {
    /// The connection broke while the request was in flight.
    #[error("Connection broken: {0}")]
    BrokenConnection(String),

    /// Input/Output error has occurred.
    #[error("IO Error: {0}")]
    IoError(Arc<std::io::Error>),

    /// The connection has been returned to its pool and no longer accepts requests.
    #[error("Connection has been released")]
    ConnectionReleased,
}

impl From<std::io::Error> for RequestError {
    fn from(error: std::io::Error) -> Self {
        RequestError::IoError(Arc::new(error))
    }
}

/// Error that occurred during session creation
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum NewSessionError {
    /// A session needs a connection manager to obtain connections from.
    #[error("No connection manager was provided")]
    MissingConnectionManager,
}

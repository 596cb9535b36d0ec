//! Session-level connection affinity for clients of clustered, replicated data stores.
//!
//! A [`Session`](client::session::Session) groups the operations of one logical
//! unit of work and decides, for each of them, which connection (and so which
//! cluster node) it uses. The [`MonotonicSession`](client::monotonic_session::MonotonicSession)
//! gives read-your-own-writes consistency: once the session has written, every
//! later read goes to the node the write went to instead of a possibly stale replica.
//!
//! Connections come from a [`ConnectionManager`](network::ConnectionManager),
//! which owns pooling and node selection. Sessions hand out
//! [`ConnectionHandle`](network::ConnectionHandle)s; releasing a handle does
//! nothing, the session returns connections to the pool when it is closed.
//!
//! # Example
//! ```rust
//! # use session_affinity::client::session::Session;
//! # use session_affinity::client::session_builder::SessionBuilder;
//! # use session_affinity::network::{Connection, ConnectionManager};
//! # use session_affinity::read_preference::ReadPreference;
//! # use std::error::Error;
//! # use std::sync::Arc;
//! # async fn check_only_compiles(manager: Arc<dyn ConnectionManager>) -> Result<(), Box<dyn Error>> {
//! let session = SessionBuilder::new().connection_manager(manager).build()?;
//!
//! // Served by a secondary, pinned for later reads with the same preference.
//! let conn = session
//!     .get_connection_for_read(&ReadPreference::secondary_preferred())
//!     .await?;
//! conn.execute(bytes::Bytes::from_static(b"find")).await?;
//!
//! // The write pins a connection to a writable node...
//! let conn = session.get_connection_for_write().await?;
//! conn.execute(bytes::Bytes::from_static(b"insert")).await?;
//!
//! // ...and this read observes it.
//! let conn = session
//!     .get_connection_for_read(&ReadPreference::secondary_preferred())
//!     .await?;
//! conn.execute(bytes::Bytes::from_static(b"find")).await?;
//!
//! session.close().await;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod client;
pub mod errors;
pub mod network;
pub mod observability;
pub mod read_preference;

pub(crate) mod utils;

pub use client::monotonic_session::{AffinityState, MonotonicSession};
pub use client::session::Session;
pub use client::session_builder::{SessionBuilder, SessionConfig, SessionConsistency};
pub use read_preference::ReadPreference;

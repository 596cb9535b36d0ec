//! Collaborators through which a session obtains connections,
//! and the handle type through which callers use them.

mod connection;
pub use connection::Connection;

mod connection_handle;
pub use connection_handle::ConnectionHandle;

mod connection_manager;
pub use connection_manager::ConnectionManager;

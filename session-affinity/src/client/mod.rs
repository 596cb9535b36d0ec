//! Sessions and their configuration.

pub mod monotonic_session;

pub mod session;

pub mod session_builder;

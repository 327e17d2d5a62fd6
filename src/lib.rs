//! proxycore: the flow-management core of an intercepting HTTP proxy.
//!
//! This crate owns no sockets. It receives `TransportEvent`s describing
//! requests, responses, and connection errors, keeps the flow store and
//! session policies consistent, and hands back acknowledgements telling
//! whatever owns the wire what to do next. See `FlowMaster` for the
//! dispatcher itself.

pub mod config;
pub mod events;
pub mod master;

pub use config::ProxyConfig;
pub use events::TransportEvent;
pub use master::FlowMaster;

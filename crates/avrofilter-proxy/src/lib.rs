//! Request-path integration for avrofilter
//!
//! - [`AvroFilter`]: classify / resolve / redact behind one handle
//! - [`middleware::avro_filter`]: axum middleware applying it to responses
//! - [`ProxyServer`]: sidecar reverse proxy in front of an object store

pub mod context;
pub mod filter;
pub mod middleware;
pub mod server;

pub use context::{RequestContext, is_object_read, roles_from_headers};
pub use filter::{AvroFilter, Decision, FilterOutcome, PassReason};
pub use middleware::avro_filter;
pub use server::ProxyServer;

//! Redaction decision engine for avrofilter
//!
//! This crate contains:
//! - Domain types (Role, Datatype, QualifiedField, ForbiddenSet)
//! - Policy model (retain rules, no-strip roles, protected fields)
//! - Access resolver (roles + datatype -> forbidden fields)
//! - Content-type classifier

pub mod classify;
pub mod error;
pub mod policy;
pub mod resolver;
pub mod types;

pub use classify::{ContentTypeClassifier, DEFAULT_NAMESPACE};
pub use error::{Error, Result};
pub use policy::{ADMIN_ROLE, NOSTRIP_ROLES_KEY, PolicyModel, RETAIN_KEYS_SUFFIX};
pub use resolver::resolve;
pub use types::{Datatype, ForbiddenSet, MissingFieldPolicy, QualifiedField, Role};

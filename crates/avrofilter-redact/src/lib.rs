//! Streaming field redaction for Avro object containers
//!
//! A [`Redactor`] consumes container bytes in arbitrary chunks and emits an
//! equivalent container with forbidden top-level fields removed from both the
//! embedded schema and every record. Memory use is bounded by one block.

pub mod reduce;
pub mod redactor;
pub mod stream;

pub use avrofilter_core::MissingFieldPolicy;
pub use reduce::reduce_schema;
pub use redactor::{RedactionStats, Redactor, redact_bytes, redact_io};
pub use stream::{ByteStream, redact_stream};

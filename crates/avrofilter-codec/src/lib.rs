//! Avro object container codec
//!
//! The collaborator the redactor relies on for everything format-specific:
//! - Zig-zag varint primitives
//! - Schema parsing with named type resolution
//! - Record decode/encode behind the [`RecordCodec`] trait
//! - Container header and block framing, block compression

pub mod binary;
pub mod codec;
pub mod container;
pub mod error;
pub mod schema;
pub mod value;

pub use codec::{AvroBinaryCodec, RecordCodec, check_count, min_encoded_size};
pub use container::{
    Block, BlockCodec, BlockHeader, CODEC_KEY, ContainerReader, ContainerWriter, Header,
    HeaderReader, MAGIC, MAX_HEADER_SIZE, SCHEMA_KEY, SYNC_SIZE, SyncMarker,
};
pub use error::{CodecError, Result};
pub use schema::{EnumSchema, Field, FixedSchema, ParsedSchema, RecordSchema, Schema};
pub use value::{Record, Value};

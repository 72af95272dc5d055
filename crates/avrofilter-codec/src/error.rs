//! Error types for avrofilter-codec

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CodecError>;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Unexpected end of input")]
    UnexpectedEof,

    #[error("Invalid container magic")]
    InvalidMagic,

    #[error("Varint exceeds 64 bits")]
    VarintOverflow,

    #[error("Invalid length: {0}")]
    InvalidLength(i64),

    #[error("Int value out of range: {0}")]
    IntOutOfRange(i64),

    #[error("Invalid boolean byte: {0}")]
    InvalidBoolean(u8),

    #[error("Invalid UTF-8 in string value")]
    InvalidUtf8,

    #[error("Union branch {index} out of range ({branches} branches)")]
    InvalidUnionIndex { index: i64, branches: usize },

    #[error("Enum symbol {index} out of range ({symbols} symbols)")]
    InvalidEnumIndex { index: i64, symbols: usize },

    #[error("Values nested deeper than {0} levels")]
    TooDeep(usize),

    #[error("Container header larger than {0} bytes")]
    HeaderTooLarge(usize),

    #[error("Sync marker mismatch")]
    SyncMismatch,

    #[error("Missing header metadata: {0}")]
    MissingMetadata(&'static str),

    #[error("Unsupported block codec: {0}")]
    UnsupportedCodec(String),

    #[error("Block holds {0} bytes past its last record")]
    TrailingBytes(usize),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Value does not match schema: {0}")]
    TypeMismatch(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// Whether more input could turn this failure into a success
    pub fn is_incomplete(&self) -> bool {
        matches!(self, CodecError::UnexpectedEof)
    }

    /// Whether the failure lies in the schema rather than the data
    pub fn is_schema_error(&self) -> bool {
        matches!(self, CodecError::Schema(_) | CodecError::Json(_))
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Corrupt input: {0}")]
    CorruptInput(String),

    #[error("Unsupported datatype for content type: {0}")]
    UnsupportedDatatype(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error must abort an in-flight response rather than fall
    /// back to pass-through.
    pub fn is_fatal_to_response(&self) -> bool {
        !matches!(self, Error::UnsupportedDatatype(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

//! Content-type classifier
//!
//! Objects eligible for redaction are stored with a content type of
//! `application/vnd.<namespace>.<datatype>.avro`. Anything else is passed
//! through untouched.

use crate::error::{Error, Result};
use crate::types::Datatype;

pub const DEFAULT_NAMESPACE: &str = "caida";

const SUFFIX: &str = ".avro";

#[derive(Debug, Clone)]
pub struct ContentTypeClassifier {
    prefix: String,
}

impl ContentTypeClassifier {
    pub fn new(namespace: &str) -> Self {
        Self {
            prefix: format!("application/vnd.{}.", namespace.to_ascii_lowercase()),
        }
    }

    /// Map a content type to its datatype, or `None` for the pass-through path
    pub fn classify(&self, content_type: &str) -> Option<Datatype> {
        let media_type = content_type.split(';').next().unwrap_or("").trim();
        let lowered = media_type.to_ascii_lowercase();

        if !lowered.starts_with(&self.prefix) || !lowered.ends_with(SUFFIX) {
            return None;
        }

        // datatype keeps its original case
        let start = self.prefix.len();
        let end = media_type.len().checked_sub(SUFFIX.len())?;
        if end <= start {
            return None;
        }

        Some(Datatype::new(&media_type[start..end]))
    }

    /// Like [`classify`](Self::classify), for callers that want an error value
    pub fn require(&self, content_type: &str) -> Result<Datatype> {
        self.classify(content_type)
            .ok_or_else(|| Error::UnsupportedDatatype(content_type.to_string()))
    }
}

impl Default for ContentTypeClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

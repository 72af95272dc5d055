use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Capability label attached to an authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Role(String);

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Role {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Role {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl Borrow<str> for Role {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Logical record kind, e.g. `flowtuple` or `dos`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Datatype(String);

impl Datatype {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Datatype {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Datatype {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl Borrow<str> for Datatype {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A field name scoped to its datatype, written `datatype:field` in config
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedField {
    pub datatype: Datatype,
    pub field: String,
}

impl QualifiedField {
    pub fn new(datatype: impl Into<Datatype>, field: impl Into<String>) -> Self {
        Self {
            datatype: datatype.into(),
            field: field.into(),
        }
    }
}

impl FromStr for QualifiedField {
    type Err = Error;

    fn from_str(token: &str) -> Result<Self> {
        let mut parts = token.split(':');
        let (datatype, field) = match (parts.next(), parts.next(), parts.next()) {
            (Some(datatype), Some(field), None) => (datatype.trim(), field.trim()),
            _ => {
                return Err(Error::Configuration(format!(
                    "invalid retain key '{}', expected <datatype>:<fieldname>",
                    token
                )));
            }
        };

        if datatype.is_empty() {
            return Err(Error::Configuration(format!(
                "retain key '{}' has an empty datatype",
                token
            )));
        }
        if field.is_empty() {
            return Err(Error::Configuration(format!(
                "retain key '{}' has an empty field name",
                token
            )));
        }

        Ok(Self::new(datatype, field))
    }
}

impl fmt::Display for QualifiedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.datatype, self.field)
    }
}

/// Fields to delete from one response, fixed for the lifetime of that response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForbiddenSet {
    datatype: Datatype,
    fields: BTreeSet<String>,
}

impl ForbiddenSet {
    pub fn new(datatype: Datatype, fields: BTreeSet<String>) -> Self {
        Self { datatype, fields }
    }

    pub fn empty(datatype: Datatype) -> Self {
        Self::new(datatype, BTreeSet::new())
    }

    pub fn datatype(&self) -> &Datatype {
        &self.datatype
    }

    pub fn fields(&self) -> &BTreeSet<String> {
        &self.fields
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    pub fn is_subset(&self, other: &ForbiddenSet) -> bool {
        self.fields.is_subset(&other.fields)
    }

    pub fn into_fields(self) -> BTreeSet<String> {
        self.fields
    }
}

/// What to do when a forbidden field is absent from a stream's schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingFieldPolicy {
    /// Fail the response with a schema error
    #[default]
    Reject,
    /// Nothing to strip for that field, carry on
    Ignore,
}

impl FromStr for MissingFieldPolicy {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(MissingFieldPolicy::Reject),
            "ignore" => Ok(MissingFieldPolicy::Ignore),
            other => Err(Error::Configuration(format!(
                "unknown missing field policy '{}', expected 'reject' or 'ignore'",
                other
            ))),
        }
    }
}

impl fmt::Display for MissingFieldPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingFieldPolicy::Reject => f.write_str("reject"),
            MissingFieldPolicy::Ignore => f.write_str("ignore"),
        }
    }
}

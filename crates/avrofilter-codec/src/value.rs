//! Decoded Avro values
//!
//! Union and enum values keep their branch/symbol index so a value decoded
//! against one schema re-encodes to identical bytes against any schema that
//! shares the same type for that position.

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    String(String),
    Record(Vec<(String, Value)>),
    Enum(u32, String),
    Array(Vec<Value>),
    Map(Vec<(String, Value)>),
    Union(u32, Box<Value>),
    Fixed(Vec<u8>),
}

/// One top-level record: ordered field name/value pairs
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new(fields: Vec<(String, Value)>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<(String, Value)> {
        self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Drop every field for which `remove` returns true, keeping order
    pub fn remove_fields<F>(&mut self, mut remove: F) -> usize
    where
        F: FnMut(&str) -> bool,
    {
        let before = self.fields.len();
        self.fields.retain(|(name, _)| !remove(name));
        before - self.fields.len()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<Vec<(String, Value)>> for Record {
    fn from(fields: Vec<(String, Value)>) -> Self {
        Self::new(fields)
    }
}

//! Record decode/encode primitives

use crate::binary::{
    read_block_count, read_bytes, read_fixed, read_int, read_long, read_string, write_bytes,
    write_long,
};
use crate::error::{CodecError, Result};
use crate::schema::{ParsedSchema, Schema};
use crate::value::{Record, Value};

const MAX_DEPTH: usize = 256;

/// Items whose encoding may be empty (`null`, empty records) that one decode
/// accepts on top of one item per input byte
pub const MAX_EMPTY_ITEMS: usize = 64 * 1024;

/// Turns encoded records into field lists and back.
///
/// The redactor only ever talks to the record encoding through this trait,
/// so schema reduction and field deletion can be exercised against any
/// implementation.
pub trait RecordCodec: Send + Sync {
    /// Decode one record from the front of `buf`, advancing it
    fn decode_record(&self, schema: &ParsedSchema, buf: &mut &[u8]) -> Result<Record>;

    /// Append the encoding of `record` to `out`
    fn encode_record(&self, schema: &ParsedSchema, record: &Record, out: &mut Vec<u8>) -> Result<()>;
}

/// Avro binary encoding
#[derive(Debug, Clone, Copy, Default)]
pub struct AvroBinaryCodec;

impl RecordCodec for AvroBinaryCodec {
    fn decode_record(&self, schema: &ParsedSchema, buf: &mut &[u8]) -> Result<Record> {
        let mut budget = max_items(buf.len(), 0);
        match decode_value(schema, schema.root(), buf, &mut budget, 0)? {
            Value::Record(fields) => Ok(Record::new(fields)),
            _ => Err(CodecError::Schema(
                "top-level schema is not a record".to_string(),
            )),
        }
    }

    fn encode_record(&self, schema: &ParsedSchema, record: &Record, out: &mut Vec<u8>) -> Result<()> {
        let record_schema = schema.root_record()?;
        encode_fields(schema, &record_schema.fields, record.fields(), out, 0)
    }
}

/// Fewest bytes any value of `node` encodes to
pub fn min_encoded_size(schema: &ParsedSchema, node: &Schema) -> usize {
    min_size(schema, node, 0)
}

fn min_size(schema: &ParsedSchema, node: &Schema, depth: usize) -> usize {
    if depth > MAX_DEPTH {
        return 0;
    }
    match schema.resolve(node) {
        Ok(Schema::Null) | Err(_) => 0,
        Ok(Schema::Float) => 4,
        Ok(Schema::Double) => 8,
        Ok(Schema::Fixed(fixed)) => fixed.size,
        Ok(Schema::Record(record)) => record
            .fields
            .iter()
            .map(|field| min_size(schema, &field.schema, depth + 1))
            .fold(0, usize::saturating_add),
        // one varint or one byte at least
        Ok(_) => 1,
    }
}

/// Largest number of items of `min_size` bytes each that `available` bytes
/// can hold
pub fn max_items(available: usize, min_size: usize) -> usize {
    match min_size {
        0 => available.saturating_add(MAX_EMPTY_ITEMS),
        size => available / size,
    }
}

/// Reject a count that `available` bytes cannot possibly encode
pub fn check_count(schema: &ParsedSchema, node: &Schema, count: usize, available: usize) -> Result<()> {
    if count > max_items(available, min_encoded_size(schema, node)) {
        return Err(too_many(count));
    }
    Ok(())
}

fn too_many(count: usize) -> CodecError {
    CodecError::InvalidLength(i64::try_from(count).unwrap_or(i64::MAX))
}

/// Check one array or map block against what is left of the input and of
/// the per-record item budget
fn take_items(budget: &mut usize, count: usize, available: usize, item_size: usize) -> Result<()> {
    if count > max_items(available, item_size) || count > *budget {
        return Err(too_many(count));
    }
    *budget -= count;
    Ok(())
}

fn decode_value(
    schema: &ParsedSchema,
    node: &Schema,
    buf: &mut &[u8],
    budget: &mut usize,
    depth: usize,
) -> Result<Value> {
    if depth > MAX_DEPTH {
        return Err(CodecError::TooDeep(MAX_DEPTH));
    }

    Ok(match schema.resolve(node)? {
        Schema::Null => Value::Null,
        Schema::Boolean => match read_fixed(buf, 1)?[0] {
            0 => Value::Boolean(false),
            1 => Value::Boolean(true),
            other => return Err(CodecError::InvalidBoolean(other)),
        },
        Schema::Int => Value::Int(read_int(buf)?),
        Schema::Long => Value::Long(read_long(buf)?),
        Schema::Float => {
            let raw = read_fixed(buf, 4)?;
            Value::Float(f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
        }
        Schema::Double => {
            let raw = read_fixed(buf, 8)?;
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(raw);
            Value::Double(f64::from_le_bytes(bytes))
        }
        Schema::Bytes => Value::Bytes(read_bytes(buf)?.to_vec()),
        Schema::String => Value::String(read_string(buf)?),
        Schema::Fixed(fixed) => Value::Fixed(read_fixed(buf, fixed.size)?.to_vec()),
        Schema::Enum(enum_schema) => {
            let index = read_long(buf)?;
            let symbol = usize::try_from(index)
                .ok()
                .and_then(|i| enum_schema.symbols.get(i))
                .ok_or(CodecError::InvalidEnumIndex {
                    index,
                    symbols: enum_schema.symbols.len(),
                })?;
            Value::Enum(index as u32, symbol.clone())
        }
        Schema::Union(variants) => {
            let index = read_long(buf)?;
            let variant = usize::try_from(index)
                .ok()
                .and_then(|i| variants.get(i))
                .ok_or(CodecError::InvalidUnionIndex {
                    index,
                    branches: variants.len(),
                })?;
            Value::Union(
                index as u32,
                Box::new(decode_value(schema, variant, buf, budget, depth + 1)?),
            )
        }
        Schema::Array(items) => {
            let item_size = min_size(schema, items, depth + 1);
            let mut values = Vec::new();
            loop {
                let count = read_block_count(buf)?;
                if count == 0 {
                    break;
                }
                take_items(budget, count, buf.len(), item_size)?;
                values.reserve(count.min(buf.len()));
                for _ in 0..count {
                    values.push(decode_value(schema, items, buf, budget, depth + 1)?);
                }
            }
            Value::Array(values)
        }
        Schema::Map(values_schema) => {
            // key length varint plus the value
            let entry_size = 1 + min_size(schema, values_schema, depth + 1);
            let mut entries = Vec::new();
            loop {
                let count = read_block_count(buf)?;
                if count == 0 {
                    break;
                }
                take_items(budget, count, buf.len(), entry_size)?;
                entries.reserve(count.min(buf.len()));
                for _ in 0..count {
                    let key = read_string(buf)?;
                    let value = decode_value(schema, values_schema, buf, budget, depth + 1)?;
                    entries.push((key, value));
                }
            }
            Value::Map(entries)
        }
        Schema::Record(record) => {
            let mut fields = Vec::with_capacity(record.fields.len());
            for field in &record.fields {
                let value = decode_value(schema, &field.schema, buf, budget, depth + 1)?;
                fields.push((field.name.clone(), value));
            }
            Value::Record(fields)
        }
        Schema::Ref(name) => {
            return Err(CodecError::Schema(format!(
                "named type '{}' resolves to another reference",
                name
            )));
        }
    })
}

fn encode_fields(
    schema: &ParsedSchema,
    fields: &[crate::schema::Field],
    values: &[(String, Value)],
    out: &mut Vec<u8>,
    depth: usize,
) -> Result<()> {
    if values.len() != fields.len() {
        return Err(CodecError::TypeMismatch(format!(
            "record has {} fields, schema expects {}",
            values.len(),
            fields.len()
        )));
    }

    for (position, field) in fields.iter().enumerate() {
        // fields normally arrive in schema order
        let value = match values.get(position) {
            Some((name, value)) if *name == field.name => value,
            _ => values
                .iter()
                .find(|(name, _)| *name == field.name)
                .map(|(_, value)| value)
                .ok_or_else(|| CodecError::TypeMismatch(format!("missing field '{}'", field.name)))?,
        };
        encode_value(schema, &field.schema, value, out, depth + 1)?;
    }

    Ok(())
}

fn encode_value(
    schema: &ParsedSchema,
    node: &Schema,
    value: &Value,
    out: &mut Vec<u8>,
    depth: usize,
) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(CodecError::TooDeep(MAX_DEPTH));
    }

    match (schema.resolve(node)?, value) {
        (Schema::Null, Value::Null) => {}
        (Schema::Boolean, Value::Boolean(b)) => out.push(u8::from(*b)),
        (Schema::Int, Value::Int(i)) => write_long(out, i64::from(*i)),
        (Schema::Long, Value::Long(l)) => write_long(out, *l),
        (Schema::Float, Value::Float(f)) => out.extend_from_slice(&f.to_le_bytes()),
        (Schema::Double, Value::Double(d)) => out.extend_from_slice(&d.to_le_bytes()),
        (Schema::Bytes, Value::Bytes(bytes)) => write_bytes(out, bytes),
        (Schema::String, Value::String(s)) => write_bytes(out, s.as_bytes()),
        (Schema::Fixed(fixed), Value::Fixed(bytes)) => {
            if bytes.len() != fixed.size {
                return Err(CodecError::TypeMismatch(format!(
                    "fixed '{}' expects {} bytes, got {}",
                    fixed.name,
                    fixed.size,
                    bytes.len()
                )));
            }
            out.extend_from_slice(bytes);
        }
        (Schema::Enum(enum_schema), Value::Enum(index, _)) => {
            if *index as usize >= enum_schema.symbols.len() {
                return Err(CodecError::InvalidEnumIndex {
                    index: i64::from(*index),
                    symbols: enum_schema.symbols.len(),
                });
            }
            write_long(out, i64::from(*index));
        }
        (Schema::Union(variants), Value::Union(index, inner)) => {
            let variant = variants.get(*index as usize).ok_or(CodecError::InvalidUnionIndex {
                index: i64::from(*index),
                branches: variants.len(),
            })?;
            write_long(out, i64::from(*index));
            encode_value(schema, variant, inner, out, depth + 1)?;
        }
        (Schema::Array(items), Value::Array(values)) => {
            if !values.is_empty() {
                write_long(out, values.len() as i64);
                for item in values {
                    encode_value(schema, items, item, out, depth + 1)?;
                }
            }
            write_long(out, 0);
        }
        (Schema::Map(values_schema), Value::Map(entries)) => {
            if !entries.is_empty() {
                write_long(out, entries.len() as i64);
                for (key, item) in entries {
                    write_bytes(out, key.as_bytes());
                    encode_value(schema, values_schema, item, out, depth + 1)?;
                }
            }
            write_long(out, 0);
        }
        (Schema::Record(record), Value::Record(values)) => {
            encode_fields(schema, &record.fields, values, out, depth)?;
        }
        (node, value) => {
            return Err(CodecError::TypeMismatch(format!(
                "cannot encode {:?} as {:?}",
                value, node
            )));
        }
    }

    Ok(())
}

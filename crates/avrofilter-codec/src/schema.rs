//! Avro schema model
//!
//! The parsed form keeps the original JSON document alongside the typed tree
//! so callers can derive new schemas by editing the document and reparsing,
//! without losing attributes the typed tree does not model (docs, aliases,
//! logical types, defaults).

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value as Json};

use crate::error::{CodecError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
    Record(RecordSchema),
    Enum(EnumSchema),
    Array(Box<Schema>),
    Map(Box<Schema>),
    Union(Vec<Schema>),
    Fixed(FixedSchema),
    /// Reference to a named type by full name
    Ref(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    pub name: String,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub schema: Schema,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumSchema {
    pub name: String,
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixedSchema {
    pub name: String,
    pub size: usize,
}

#[derive(Debug, Clone)]
pub struct ParsedSchema {
    root: Schema,
    names: HashMap<String, Schema>,
    json: Json,
}

impl ParsedSchema {
    pub fn parse_str(text: &str) -> Result<Self> {
        let json: Json = serde_json::from_str(text)?;
        Self::from_json(json)
    }

    pub fn parse_slice(bytes: &[u8]) -> Result<Self> {
        let json: Json = serde_json::from_slice(bytes)?;
        Self::from_json(json)
    }

    pub fn from_json(json: Json) -> Result<Self> {
        let mut parser = Parser::default();
        let root = parser.parse(&json, None)?;
        Ok(Self {
            root,
            names: parser.names,
            json,
        })
    }

    pub fn root(&self) -> &Schema {
        &self.root
    }

    pub fn json(&self) -> &Json {
        &self.json
    }

    /// Compact JSON text, as stored in a container header
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.json)?)
    }

    /// Follow named references until a concrete schema is reached
    pub fn resolve<'a>(&'a self, schema: &'a Schema) -> Result<&'a Schema> {
        match schema {
            Schema::Ref(name) => self
                .names
                .get(name)
                .ok_or_else(|| CodecError::Schema(format!("unknown named type '{}'", name))),
            other => Ok(other),
        }
    }

    /// The top-level record, if the schema is one
    pub fn root_record(&self) -> Result<&RecordSchema> {
        match self.resolve(&self.root)? {
            Schema::Record(record) => Ok(record),
            _ => Err(CodecError::Schema(
                "top-level schema is not a record".to_string(),
            )),
        }
    }

    pub fn field_names(&self) -> Result<Vec<&str>> {
        Ok(self
            .root_record()?
            .fields
            .iter()
            .map(|f| f.name.as_str())
            .collect())
    }
}

#[derive(Default)]
struct Parser {
    names: HashMap<String, Schema>,
    declared: HashSet<String>,
}

impl Parser {
    fn parse(&mut self, json: &Json, namespace: Option<&str>) -> Result<Schema> {
        match json {
            Json::String(name) => self.parse_name(name, namespace),
            Json::Array(branches) => {
                let variants = branches
                    .iter()
                    .map(|b| self.parse(b, namespace))
                    .collect::<Result<Vec<_>>>()?;
                if variants.iter().any(|v| matches!(v, Schema::Union(_))) {
                    return Err(CodecError::Schema(
                        "unions may not directly contain unions".to_string(),
                    ));
                }
                Ok(Schema::Union(variants))
            }
            Json::Object(object) => self.parse_object(object, namespace),
            other => Err(CodecError::Schema(format!("unexpected schema value {}", other))),
        }
    }

    fn parse_name(&mut self, name: &str, namespace: Option<&str>) -> Result<Schema> {
        if let Some(primitive) = primitive(name) {
            return Ok(primitive);
        }

        let candidates = match (name.contains('.'), namespace) {
            (false, Some(ns)) => vec![format!("{}.{}", ns, name), name.to_string()],
            _ => vec![name.to_string()],
        };

        candidates
            .into_iter()
            .find(|full| self.declared.contains(full))
            .map(Schema::Ref)
            .ok_or_else(|| CodecError::Schema(format!("unknown type '{}'", name)))
    }

    fn parse_object(&mut self, object: &Map<String, Json>, namespace: Option<&str>) -> Result<Schema> {
        let type_json = object
            .get("type")
            .ok_or_else(|| CodecError::Schema("schema object without 'type'".to_string()))?;

        let type_name = match type_json {
            Json::String(name) => name.as_str(),
            // lenient: {"type": {...}} or {"type": [...]}
            nested => return self.parse(nested, namespace),
        };

        match type_name {
            "record" | "error" => self.parse_record(object, namespace),
            "enum" => {
                let (full, _) = self.declare(object, namespace)?;
                let symbols = object
                    .get("symbols")
                    .and_then(Json::as_array)
                    .ok_or_else(|| CodecError::Schema(format!("enum '{}' has no symbols", full)))?
                    .iter()
                    .map(|s| {
                        s.as_str().map(str::to_string).ok_or_else(|| {
                            CodecError::Schema(format!("enum '{}' has a non-string symbol", full))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                let schema = Schema::Enum(EnumSchema {
                    name: full.clone(),
                    symbols,
                });
                self.names.insert(full, schema.clone());
                Ok(schema)
            }
            "fixed" => {
                let (full, _) = self.declare(object, namespace)?;
                let size = object
                    .get("size")
                    .and_then(Json::as_u64)
                    .and_then(|s| usize::try_from(s).ok())
                    .ok_or_else(|| CodecError::Schema(format!("fixed '{}' has no size", full)))?;
                let schema = Schema::Fixed(FixedSchema {
                    name: full.clone(),
                    size,
                });
                self.names.insert(full, schema.clone());
                Ok(schema)
            }
            "array" => {
                let items = object
                    .get("items")
                    .ok_or_else(|| CodecError::Schema("array without 'items'".to_string()))?;
                Ok(Schema::Array(Box::new(self.parse(items, namespace)?)))
            }
            "map" => {
                let values = object
                    .get("values")
                    .ok_or_else(|| CodecError::Schema("map without 'values'".to_string()))?;
                Ok(Schema::Map(Box::new(self.parse(values, namespace)?)))
            }
            // primitives with attributes, e.g. logical types
            other => self.parse_name(other, namespace),
        }
    }

    fn parse_record(&mut self, object: &Map<String, Json>, namespace: Option<&str>) -> Result<Schema> {
        let (full, record_ns) = self.declare(object, namespace)?;

        let fields_json = object
            .get("fields")
            .and_then(Json::as_array)
            .ok_or_else(|| CodecError::Schema(format!("record '{}' has no fields", full)))?;

        let mut fields = Vec::with_capacity(fields_json.len());
        let mut seen = HashSet::new();
        for field in fields_json {
            let name = field
                .get("name")
                .and_then(Json::as_str)
                .ok_or_else(|| CodecError::Schema(format!("record '{}' has an unnamed field", full)))?;
            if !seen.insert(name) {
                return Err(CodecError::Schema(format!(
                    "record '{}' declares field '{}' twice",
                    full, name
                )));
            }
            let field_type = field.get("type").ok_or_else(|| {
                CodecError::Schema(format!("field '{}.{}' has no type", full, name))
            })?;
            fields.push(Field {
                name: name.to_string(),
                schema: self.parse(field_type, record_ns.as_deref())?,
            });
        }

        let schema = Schema::Record(RecordSchema {
            name: full.clone(),
            fields,
        });
        self.names.insert(full, schema.clone());
        Ok(schema)
    }

    /// Register a named type and return its full name and namespace
    fn declare(
        &mut self,
        object: &Map<String, Json>,
        namespace: Option<&str>,
    ) -> Result<(String, Option<String>)> {
        let name = object
            .get("name")
            .and_then(Json::as_str)
            .ok_or_else(|| CodecError::Schema("named type without 'name'".to_string()))?;

        let (full, ns) = if let Some((ns, _)) = name.rsplit_once('.') {
            (name.to_string(), Some(ns.to_string()))
        } else {
            let ns = object
                .get("namespace")
                .and_then(Json::as_str)
                .filter(|ns| !ns.is_empty())
                .or(namespace)
                .map(str::to_string);
            match &ns {
                Some(ns) => (format!("{}.{}", ns, name), Some(ns.clone())),
                None => (name.to_string(), None),
            }
        };

        if !self.declared.insert(full.clone()) {
            return Err(CodecError::Schema(format!("type '{}' defined twice", full)));
        }
        Ok((full, ns))
    }
}

fn primitive(name: &str) -> Option<Schema> {
    Some(match name {
        "null" => Schema::Null,
        "boolean" => Schema::Boolean,
        "int" => Schema::Int,
        "long" => Schema::Long,
        "float" => Schema::Float,
        "double" => Schema::Double,
        "bytes" => Schema::Bytes,
        "string" => Schema::String,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLOWTUPLE: &str = r#"{
        "type": "record",
        "name": "flowtuple",
        "namespace": "org.caida",
        "fields": [
            {"name": "time", "type": "long"},
            {"name": "src_ip", "type": {"type": "fixed", "name": "ipv4", "size": 4}},
            {"name": "dest_ip", "type": "ipv4"},
            {"name": "netacq_country", "type": ["null", "string"], "default": null},
            {"name": "tags", "type": {"type": "array", "items": "string"}},
            {"name": "counts", "type": {"type": "map", "values": "int"}},
            {"name": "proto", "type": {"type": "enum", "name": "Proto", "symbols": ["TCP", "UDP"]}},
            {"name": "day", "type": {"type": "int", "logicalType": "date"}}
        ]
    }"#;

    #[test]
    fn test_parse_record_fields() {
        let schema = ParsedSchema::parse_str(FLOWTUPLE).unwrap();
        let record = schema.root_record().unwrap();
        assert_eq!(record.name, "org.caida.flowtuple");
        assert_eq!(
            schema.field_names().unwrap(),
            vec![
                "time",
                "src_ip",
                "dest_ip",
                "netacq_country",
                "tags",
                "counts",
                "proto",
                "day"
            ]
        );
        assert_eq!(record.fields[7].schema, Schema::Int);
    }

    #[test]
    fn test_named_reference_resolves_in_namespace() {
        let schema = ParsedSchema::parse_str(FLOWTUPLE).unwrap();
        let record = schema.root_record().unwrap();
        let dest = &record.fields[2].schema;
        assert_eq!(dest, &Schema::Ref("org.caida.ipv4".to_string()));
        assert!(matches!(
            schema.resolve(dest).unwrap(),
            Schema::Fixed(FixedSchema { size: 4, .. })
        ));
    }

    #[test]
    fn test_recursive_record() {
        let schema = ParsedSchema::parse_str(
            r#"{"type":"record","name":"Node","fields":[
                {"name":"value","type":"int"},
                {"name":"next","type":["null","Node"]}
            ]}"#,
        )
        .unwrap();
        let record = schema.root_record().unwrap();
        assert_eq!(
            record.fields[1].schema,
            Schema::Union(vec![Schema::Null, Schema::Ref("Node".to_string())])
        );
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = ParsedSchema::parse_str(
            r#"{"type":"record","name":"r","fields":[{"name":"a","type":"ipv6"}]}"#,
        )
        .unwrap_err();
        assert!(err.is_schema_error());
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let err = ParsedSchema::parse_str(
            r#"{"type":"record","name":"r","fields":[
                {"name":"a","type":"int"},{"name":"a","type":"long"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::Schema(_)));
    }

    #[test]
    fn test_non_record_root() {
        let schema = ParsedSchema::parse_str(r#""string""#).unwrap();
        assert!(schema.root_record().is_err());
    }

    #[test]
    fn test_invalid_json() {
        let err = ParsedSchema::parse_str("{not json").unwrap_err();
        assert!(err.is_schema_error());
    }

    #[test]
    fn test_json_preserves_attributes() {
        let schema = ParsedSchema::parse_str(FLOWTUPLE).unwrap();
        let text = schema.to_json_string().unwrap();
        assert!(text.contains("\"logicalType\":\"date\""));
        assert!(text.contains("\"default\":null"));
        // key order preserved
        assert!(text.starts_with("{\"type\":\"record\""));
    }
}

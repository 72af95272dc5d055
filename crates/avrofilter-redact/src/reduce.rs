//! Schema reduction
//!
//! Works on the schema's JSON document rather than the typed tree, so every
//! attribute of the kept fields (docs, defaults, logical types, nested named
//! types) survives byte-for-byte in the reduced schema.

use std::collections::{BTreeSet, HashMap, HashSet};

use avrofilter_codec::ParsedSchema;
use avrofilter_core::{Error, MissingFieldPolicy, Result};
use serde_json::{Map, Value as Json};
use tracing::debug;

const PRIMITIVES: [&str; 8] = [
    "null", "boolean", "int", "long", "float", "double", "bytes", "string",
];

/// Remove `forbidden` top-level fields from `original`, keeping field order.
///
/// Named types defined inside a removed field but still used by a kept one
/// are moved to their first remaining use. Type names do not appear in the
/// binary encoding, so records stay byte-compatible.
pub fn reduce_schema(
    original: &ParsedSchema,
    forbidden: &BTreeSet<String>,
    missing: MissingFieldPolicy,
) -> Result<ParsedSchema> {
    let present = original
        .field_names()
        .map_err(|e| Error::Schema(e.to_string()))?;

    let absent: Vec<&str> = forbidden
        .iter()
        .map(String::as_str)
        .filter(|name| !present.contains(name))
        .collect();

    if !absent.is_empty() {
        match missing {
            MissingFieldPolicy::Reject => {
                return Err(Error::Schema(format!(
                    "forbidden field(s) not in record schema: {}",
                    absent.join(", ")
                )));
            }
            MissingFieldPolicy::Ignore => {
                debug!(fields = ?absent, "forbidden fields absent from schema, ignoring");
            }
        }
    }

    let mut json = original.json().clone();
    let root = json
        .as_object_mut()
        .ok_or_else(|| Error::Schema("top-level schema is not a record".to_string()))?;
    let (_, root_ns) = full_name(root, None)
        .ok_or_else(|| Error::Schema("top-level record has no name".to_string()))?;
    let fields = root
        .get_mut("fields")
        .and_then(Json::as_array_mut)
        .ok_or_else(|| Error::Schema("top-level schema has no field list".to_string()))?;

    let mut orphans = HashMap::new();
    fields.retain(|field| {
        let name = field.get("name").and_then(Json::as_str);
        if name.is_some_and(|name| forbidden.contains(name)) {
            if let Some(field_type) = field.get("type") {
                collect_definitions(field_type, root_ns.as_deref(), &mut orphans);
            }
            false
        } else {
            true
        }
    });

    rehome_definitions(&mut json, orphans);

    ParsedSchema::from_json(json).map_err(|e| {
        Error::Schema(format!(
            "schema is inconsistent once fields are removed: {}",
            e
        ))
    })
}

/// Put each orphaned definition back at the first reference to it.
fn rehome_definitions(json: &mut Json, mut orphans: HashMap<String, Json>) {
    if orphans.is_empty() {
        return;
    }

    // every round either consumes an orphan or drops a repeated definition
    loop {
        let mut scan = Scan::default();
        let Some(gap) = scan.walk(json, None, String::new()) else {
            return;
        };

        let (pointer, replacement) = match gap {
            Gap::Unresolved { pointer, candidates } => {
                let Some(definition) = candidates.iter().find_map(|full| orphans.remove(full))
                else {
                    return;
                };
                debug!(at = %pointer, "moving named type out of removed field");
                (pointer, definition)
            }
            Gap::Redefined { pointer, full } => (pointer, Json::String(full)),
        };

        match json.pointer_mut(&pointer) {
            Some(node) => *node = replacement,
            None => return,
        }
    }
}

/// Record every named type defined under `json`, keyed by full name.
///
/// Stored copies carry their full name so they mean the same thing wherever
/// they are reinserted.
fn collect_definitions(json: &Json, namespace: Option<&str>, out: &mut HashMap<String, Json>) {
    match json {
        Json::Array(branches) => {
            for branch in branches {
                collect_definitions(branch, namespace, out);
            }
        }
        Json::Object(object) => match object.get("type") {
            Some(Json::String(kind)) => match kind.as_str() {
                "record" | "error" | "enum" | "fixed" => {
                    let Some((full, ns)) = full_name(object, namespace) else {
                        return;
                    };
                    let mut definition = object.clone();
                    definition.insert("name".to_string(), Json::String(full.clone()));
                    out.insert(full, Json::Object(definition));

                    for field in object
                        .get("fields")
                        .and_then(Json::as_array)
                        .into_iter()
                        .flatten()
                    {
                        if let Some(field_type) = field.get("type") {
                            collect_definitions(field_type, ns.as_deref(), out);
                        }
                    }
                }
                "array" => {
                    if let Some(items) = object.get("items") {
                        collect_definitions(items, namespace, out);
                    }
                }
                "map" => {
                    if let Some(values) = object.get("values") {
                        collect_definitions(values, namespace, out);
                    }
                }
                _ => {}
            },
            Some(nested) => collect_definitions(nested, namespace, out),
            None => {}
        },
        _ => {}
    }
}

enum Gap {
    /// A name used before (or without) any definition
    Unresolved {
        pointer: String,
        candidates: Vec<String>,
    },
    /// A second definition of an already defined name
    Redefined { pointer: String, full: String },
}

/// Walks a schema document in parse order, tracking defined names
#[derive(Default)]
struct Scan {
    defined: HashSet<String>,
}

impl Scan {
    fn walk(&mut self, json: &Json, namespace: Option<&str>, pointer: String) -> Option<Gap> {
        match json {
            Json::String(name) => self.reference(name, namespace, pointer),
            Json::Array(branches) => branches
                .iter()
                .enumerate()
                .find_map(|(i, branch)| self.walk(branch, namespace, format!("{}/{}", pointer, i))),
            Json::Object(object) => self.walk_object(object, namespace, pointer),
            _ => None,
        }
    }

    fn walk_object(
        &mut self,
        object: &Map<String, Json>,
        namespace: Option<&str>,
        pointer: String,
    ) -> Option<Gap> {
        let kind = match object.get("type")? {
            Json::String(kind) => kind.as_str(),
            nested => return self.walk(nested, namespace, format!("{}/type", pointer)),
        };

        match kind {
            "record" | "error" | "enum" | "fixed" => {
                let (full, ns) = full_name(object, namespace)?;
                if !self.defined.insert(full.clone()) {
                    return Some(Gap::Redefined { pointer, full });
                }
                let fields = object.get("fields").and_then(Json::as_array)?;
                fields.iter().enumerate().find_map(|(i, field)| {
                    let field_type = field.get("type")?;
                    self.walk(field_type, ns.as_deref(), format!("{}/fields/{}/type", pointer, i))
                })
            }
            "array" => self.walk(object.get("items")?, namespace, format!("{}/items", pointer)),
            "map" => self.walk(object.get("values")?, namespace, format!("{}/values", pointer)),
            other => self.reference(other, namespace, format!("{}/type", pointer)),
        }
    }

    fn reference(&self, name: &str, namespace: Option<&str>, pointer: String) -> Option<Gap> {
        if PRIMITIVES.contains(&name) {
            return None;
        }
        let candidates = match (name.contains('.'), namespace) {
            (false, Some(ns)) => vec![format!("{}.{}", ns, name), name.to_string()],
            _ => vec![name.to_string()],
        };
        if candidates.iter().any(|full| self.defined.contains(full)) {
            None
        } else {
            Some(Gap::Unresolved {
                pointer,
                candidates,
            })
        }
    }
}

/// Full name and namespace of a named type definition
fn full_name(object: &Map<String, Json>, namespace: Option<&str>) -> Option<(String, Option<String>)> {
    let name = object.get("name").and_then(Json::as_str)?;
    if let Some((ns, _)) = name.rsplit_once('.') {
        return Some((name.to_string(), Some(ns.to_string())));
    }
    let ns = object
        .get("namespace")
        .and_then(Json::as_str)
        .filter(|ns| !ns.is_empty())
        .or(namespace);
    Some(match ns {
        Some(ns) => (format!("{}.{}", ns, name), Some(ns.to_string())),
        None => (name.to_string(), None),
    })
}

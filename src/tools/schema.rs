//! JSON schema generation from Rust types.
//!
//! Schemas are generated draft-07 style with nested definitions referenced
//! through `#/$defs/`, the layout every provider accepts.

use schemars::gen::{SchemaGenerator, SchemaSettings};
use schemars::JsonSchema;
use serde_json::{Map, Value};

pub(crate) const DEFS_PATH: &str = "#/$defs/";

fn generator() -> SchemaGenerator {
    SchemaSettings::draft07()
        .with(|s| {
            s.definitions_path = DEFS_PATH.to_string();
            s.meta_schema = None;
        })
        .into_generator()
}

/// Schema of one parameter type plus the definitions it references.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeSchema {
    pub schema: Value,
    pub defs: Map<String, Value>,
}

impl TypeSchema {
    pub fn of<T: JsonSchema>() -> Self {
        let mut gen = generator();
        let schema = gen.subschema_for::<T>();
        let defs = gen
            .definitions()
            .iter()
            .filter_map(|(k, v)| serde_json::to_value(v).ok().map(|v| (k.clone(), v)))
            .collect();
        Self {
            schema: serde_json::to_value(&schema).unwrap_or_else(|_| Value::Object(Map::new())),
            defs,
        }
    }
}

/// Root schema of an object type, split into the parts a tool definition needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSchema {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Properties in declaration order with a required flag.
    pub properties: Vec<(String, Value, bool)>,
    pub defs: Map<String, Value>,
    /// Whether the root schema was an object with properties at all.
    pub is_object: bool,
}

impl ObjectSchema {
    pub fn of<T: JsonSchema>() -> Self {
        let root = generator().into_root_schema_for::<T>();
        let root = serde_json::to_value(&root).unwrap_or(Value::Null);
        Self::from_value(&root)
    }

    pub fn from_value(root: &Value) -> Self {
        let text = |key: &str| root.get(key).and_then(Value::as_str).map(str::to_string);

        let required: Vec<&str> = root
            .get("required")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let (properties, is_object) = match root.get("properties").and_then(Value::as_object) {
            Some(props) => (
                props
                    .iter()
                    .map(|(name, schema)| {
                        (name.clone(), schema.clone(), required.contains(&name.as_str()))
                    })
                    .collect(),
                true,
            ),
            None => (Vec::new(), root.get("type").and_then(Value::as_str) == Some("object")),
        };

        let mut defs = Map::new();
        for key in ["$defs", "definitions"] {
            if let Some(map) = root.get(key).and_then(Value::as_object) {
                defs.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }

        Self {
            title: text("title"),
            description: text("description"),
            properties,
            defs,
            is_object,
        }
    }
}

/// Name schemars gives `T` (`"int32"`, `"String"`, a struct's own name).
pub fn type_name<T: JsonSchema>() -> String {
    T::schema_name()
}

/// Split `description` and `default` out of a property schema.
pub(crate) fn take_annotations(mut schema: Value) -> (Value, Option<String>, Option<Value>) {
    let (description, default) = match schema.as_object_mut() {
        Some(obj) => (
            obj.remove("description")
                .and_then(|v| v.as_str().map(str::to_string)),
            obj.remove("default"),
        ),
        None => (None, None),
    };
    (schema, description, default)
}

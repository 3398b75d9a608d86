//! Immutable tool descriptions and the parameter schema they emit.

use serde::Serialize;
use serde_json::{json, Map, Value};

/// Field names starting with this prefix belong to the wrapper itself.
pub const RESERVED_PREFIX: &str = "tool_";
/// Prefix applied to user parameters that would collide with [`RESERVED_PREFIX`].
pub const ALIAS_PREFIX: &str = "aliased_";
/// Bookkeeping field linking an instance back to the provider's call.
pub const TOOL_CALL_FIELD: &str = "tool_call";
/// Definition name of the bookkeeping field's type.
pub const TOOL_CALL_DEF: &str = "ToolCall";

/// Internal field name for an externally visible parameter name.
pub fn internal_field_name(name: &str) -> String {
    if name.starts_with(RESERVED_PREFIX) {
        format!("{}{}", ALIAS_PREFIX, name)
    } else {
        name.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSpec {
    /// Name shown to the model.
    pub name: String,
    /// Name the argument is stored under once resolved.
    pub field: String,
    pub schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        let name = name.into();
        Self {
            field: internal_field_name(&name),
            name,
            schema,
            description: None,
            required: true,
            default: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self.required = false;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    fn property_schema(&self) -> Value {
        let mut schema = self.schema.clone();
        if let Value::Object(obj) = &mut schema {
            if let Some(desc) = &self.description {
                obj.insert("description".into(), Value::String(desc.clone()));
            }
            if let Some(default) = &self.default {
                obj.insert("default".into(), default.clone());
            }
        }
        schema
    }
}

/// Name, description and ordered parameters of one tool.
///
/// Built once and shared behind an `Arc` by every call that carries the tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub defs: Map<String, Value>,
}

impl ToolDefinition {
    pub fn parameter(&self, external_name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == external_name)
    }

    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters.iter().map(|p| p.name.as_str()).collect()
    }

    /// Object schema of the tool's arguments as sent to providers.
    ///
    /// The bookkeeping field and its definition never appear here.
    pub fn parameters_schema(&self) -> Value {
        let visible = self
            .parameters
            .iter()
            .filter(|p| p.field != TOOL_CALL_FIELD);

        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in visible {
            properties.insert(param.name.clone(), param.property_schema());
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        let mut schema = json!({
            "type": "object",
            "properties": properties,
            "required": required,
        });

        let defs: Map<String, Value> = self
            .defs
            .iter()
            .filter(|(k, _)| k.as_str() != TOOL_CALL_DEF)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if !defs.is_empty() {
            schema["$defs"] = Value::Object(defs);
        }
        schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> ToolDefinition {
        ToolDefinition {
            name: "FormatBook".into(),
            description: "Formats a book.".into(),
            parameters: vec![
                ParameterSpec::new("title", json!({"type": "string"}))
                    .with_description("The title."),
                ParameterSpec::new("tool_name", json!({"type": "string"})),
                ParameterSpec::new("pages", json!({"type": "integer"})).with_default(json!(100)),
                ParameterSpec {
                    field: TOOL_CALL_FIELD.into(),
                    ..ParameterSpec::new(TOOL_CALL_FIELD, json!({"$ref": "#/$defs/ToolCall"}))
                },
            ],
            defs: {
                let mut defs = Map::new();
                defs.insert(TOOL_CALL_DEF.into(), json!({"type": "object"}));
                defs
            },
        }
    }

    #[test]
    fn test_reserved_prefix_is_aliased_internally() {
        let def = definition();
        let param = def.parameter("tool_name").unwrap();
        assert_eq!(param.field, "aliased_tool_name");
        assert_eq!(def.parameter("title").unwrap().field, "title");
    }

    #[test]
    fn test_parameters_schema_strips_bookkeeping() {
        let schema = definition().parameters_schema();
        let props = schema["properties"].as_object().unwrap();
        let names: Vec<_> = props.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["title", "tool_name", "pages"]);
        assert_eq!(schema["required"], json!(["title", "tool_name"]));
        assert_eq!(schema["properties"]["title"]["description"], "The title.");
        assert_eq!(schema["properties"]["pages"]["default"], 100);
        assert!(schema.get("$defs").is_none());
    }

    #[test]
    fn test_user_parameter_named_tool_call_is_emitted() {
        let def = ToolDefinition {
            name: "Lookup".into(),
            description: "Looks something up.".into(),
            parameters: vec![ParameterSpec::new(TOOL_CALL_FIELD, json!({"type": "string"}))],
            defs: Map::new(),
        };
        assert_eq!(def.parameters[0].field, "aliased_tool_call");
        let schema = def.parameters_schema();
        assert_eq!(schema["properties"]["tool_call"]["type"], "string");
        assert_eq!(schema["required"], json!(["tool_call"]));
    }
}

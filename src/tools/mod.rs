//! Tool definitions and tool-call resolution.
//!
//! A [`Tool`] pairs an immutable [`ToolDefinition`] with an optional handler.
//! Tools come from four places:
//!
//! | Constructor | Source |
//! |-------------|--------|
//! | [`Tool::function`] | function name, docstring and typed parameters |
//! | [`Tool::from_type`] | a documented type deriving `JsonSchema` |
//! | [`Tool::from_schema`] | an extraction schema (default description allowed) |
//! | [`Tool::from_base_type`] | a primitive wrapped in a single `value` field |

pub mod builder;
pub mod definition;
pub mod docstring;
pub mod error;
pub mod instance;
pub mod schema;

pub use builder::FunctionToolBuilder;
pub use definition::{ParameterSpec, ToolDefinition};
pub use error::SchemaError;
pub use instance::ToolCallInstance;

use crate::types::tool::ToolCall;
use crate::utils::text::is_identifier;
use crate::{Error, ErrorContext, Result};
use jsonschema::{Draft, JSONSchema};
use once_cell::sync::OnceCell;
use schema::{take_annotations, ObjectSchema, TypeSchema};
use schemars::JsonSchema;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;

/// Function run by [`ToolCallInstance::call`].
pub type ToolHandler = Arc<dyn Fn(&ToolCallInstance) -> Result<Value> + Send + Sync>;

#[derive(Clone)]
pub struct Tool {
    definition: Arc<ToolDefinition>,
    handler: Option<ToolHandler>,
    validator: Arc<OnceCell<std::result::Result<JSONSchema, String>>>,
}

impl Tool {
    pub fn new(definition: ToolDefinition) -> Self {
        Self {
            definition: Arc::new(definition),
            handler: None,
            validator: Arc::new(OnceCell::new()),
        }
    }

    pub fn function(name: impl Into<String>) -> FunctionToolBuilder {
        FunctionToolBuilder::new(name)
    }

    /// Tool described by a type's own schema. The type's doc comment is required.
    pub fn from_type<T: JsonSchema>() -> std::result::Result<Self, SchemaError> {
        let obj = ObjectSchema::of::<T>();
        let name = obj
            .title
            .clone()
            .unwrap_or_else(schema::type_name::<T>);
        let description = obj
            .description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| SchemaError::MissingDescription { tool: name.clone() })?;
        Self::from_object_schema(name, description, obj)
    }

    /// Extraction tool named `<Type>Tool`; falls back to a generated description.
    pub fn from_schema<T: JsonSchema>() -> std::result::Result<Self, SchemaError> {
        let obj = ObjectSchema::of::<T>();
        let type_name = obj
            .title
            .clone()
            .unwrap_or_else(schema::type_name::<T>);
        let description = obj
            .description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| {
                format!(
                    "An `{}` instance with correctly formatted and typed parameters extracted \
                     from the completion. Must include required parameters and may exclude \
                     optional parameters unless present in the text.",
                    type_name
                )
            });
        Self::from_object_schema(format!("{}Tool", type_name), description, obj)
    }

    /// Wraps a non-object type in a single required `value` field.
    pub fn from_base_type<T: JsonSchema>() -> std::result::Result<Self, SchemaError> {
        let type_name = schema::type_name::<T>();
        let mut chars = type_name.chars();
        let capitalized = match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        };
        let name = format!("{}Tool", capitalized);
        if !is_identifier(&name) {
            return Err(SchemaError::InvalidName { name });
        }

        let ts = TypeSchema::of::<T>();
        let definition = ToolDefinition {
            name,
            description: format!("A tool for extracting a `{}` from the completion.", type_name),
            parameters: vec![ParameterSpec::new("value", ts.schema)],
            defs: ts.defs,
        };
        Ok(Self::new(definition))
    }

    fn from_object_schema(
        name: String,
        description: String,
        obj: ObjectSchema,
    ) -> std::result::Result<Self, SchemaError> {
        if !is_identifier(&name) {
            return Err(SchemaError::InvalidName { name });
        }
        if !obj.is_object {
            return Err(SchemaError::InvalidSchema {
                tool: name,
                reason: "schema is not an object; use a base-type tool instead".into(),
            });
        }

        let parameters = obj
            .properties
            .into_iter()
            .map(|(prop, schema, required)| {
                let (schema, desc, default) = take_annotations(schema);
                let mut spec = ParameterSpec::new(prop, schema);
                if let Some(desc) = desc {
                    spec = spec.with_description(desc);
                }
                if let Some(default) = default {
                    spec = spec.with_default(default);
                }
                if !required {
                    spec = spec.optional();
                }
                spec
            })
            .collect();

        Ok(Self::new(ToolDefinition {
            name,
            description,
            parameters,
            defs: obj.defs,
        }))
    }

    pub fn with_handler<F>(self, handler: F) -> Self
    where
        F: Fn(&ToolCallInstance) -> Result<Value> + Send + Sync + 'static,
    {
        self.with_shared_handler(Arc::new(handler))
    }

    pub(crate) fn with_shared_handler(mut self, handler: ToolHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    /// Provider-neutral `{name, description, parameters}` form.
    pub fn tool_schema(&self) -> Value {
        json!({
            "name": self.definition.name,
            "description": self.definition.description,
            "parameters": self.definition.parameters_schema(),
        })
    }

    fn validator(&self) -> Result<&JSONSchema> {
        self.validator
            .get_or_init(|| {
                JSONSchema::options()
                    .with_draft(Draft::Draft7)
                    .compile(&self.definition.parameters_schema())
                    .map_err(|e| e.to_string())
            })
            .as_ref()
            .map_err(|reason| {
                Error::Schema(SchemaError::InvalidSchema {
                    tool: self.definition.name.clone(),
                    reason: reason.clone(),
                })
            })
    }

    /// Resolve a provider tool call into an instance of this tool.
    ///
    /// Arguments are validated against the emitted schema, defaults are filled in
    /// and names are mapped to their internal fields.
    pub fn from_tool_call(&self, call: &ToolCall) -> Result<ToolCallInstance> {
        let raw = if call.arguments.trim().is_empty() {
            "{}"
        } else {
            call.arguments.as_str()
        };
        let args: Value = serde_json::from_str(raw).map_err(|e| {
            Error::validation_with_context(
                format!("tool call arguments are not valid JSON: {}", e),
                ErrorContext::new()
                    .with_field_path(format!("{}.arguments", call.name))
                    .with_details(call.arguments.clone())
                    .with_source("from_tool_call"),
            )
        })?;
        let Value::Object(args) = args else {
            return Err(Error::validation_with_context(
                "tool call arguments must be a JSON object",
                ErrorContext::new()
                    .with_field_path(format!("{}.arguments", call.name))
                    .with_details(call.arguments.clone())
                    .with_source("from_tool_call"),
            ));
        };

        let instance_value = Value::Object(args);
        let validator = self.validator()?;
        if let Err(mut errors) = validator.validate(&instance_value) {
            if let Some(first) = errors.next() {
                return Err(Error::validation_with_context(
                    first.to_string(),
                    ErrorContext::new()
                        .with_field_path(
                            std::iter::once(format!("{}.arguments", call.name))
                                .chain(first.instance_path.clone().into_vec())
                                .collect::<Vec<_>>()
                                .join("."),
                        )
                        .with_source("from_tool_call"),
                ));
            }
        }
        let Value::Object(mut args) = instance_value else {
            return Err(Error::runtime("validated arguments are no longer an object"));
        };

        let mut fields = Map::new();
        for param in &self.definition.parameters {
            let value = args.remove(&param.name).or_else(|| param.default.clone());
            if let Some(value) = value {
                fields.insert(param.field.clone(), value);
            }
        }

        Ok(ToolCallInstance::new(
            self.definition.clone(),
            fields,
            call.clone(),
            self.handler.clone(),
        ))
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("definition", &self.definition)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

impl PartialEq for Tool {
    fn eq(&self, other: &Self) -> bool {
        self.definition == other.definition
    }
}

//! Resolved tool invocations.

use super::definition::ToolDefinition;
use super::ToolHandler;
use crate::types::tool::ToolCall;
use crate::{Error, ErrorContext, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// A tool with concrete argument values, tied to the provider call that produced it.
///
/// Arguments are stored under their internal field names; [`arguments`](Self::arguments)
/// maps them back to the names the model used.
#[derive(Clone)]
pub struct ToolCallInstance {
    definition: Arc<ToolDefinition>,
    fields: Map<String, Value>,
    tool_call: ToolCall,
    handler: Option<ToolHandler>,
}

impl ToolCallInstance {
    pub(crate) fn new(
        definition: Arc<ToolDefinition>,
        fields: Map<String, Value>,
        tool_call: ToolCall,
        handler: Option<ToolHandler>,
    ) -> Self {
        Self {
            definition,
            fields,
            tool_call,
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Provider call id.
    pub fn id(&self) -> &str {
        &self.tool_call.id
    }

    pub fn tool_call(&self) -> &ToolCall {
        &self.tool_call
    }

    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    /// Argument values keyed by internal field name, without the bookkeeping field.
    pub fn args(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Value of the argument the model sent as `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let field = self
            .definition
            .parameter(name)
            .map(|p| p.field.as_str())
            .unwrap_or(name);
        self.fields.get(field)
    }

    /// Argument values keyed by the externally visible parameter names.
    pub fn arguments(&self) -> Map<String, Value> {
        self.definition
            .parameters
            .iter()
            .filter_map(|p| {
                self.fields
                    .get(&p.field)
                    .map(|v| (p.name.clone(), v.clone()))
            })
            .collect()
    }

    /// Deserialize the arguments into a typed value.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.arguments())).map_err(|e| {
            Error::validation_with_context(
                format!("arguments do not match `{}`: {}", std::any::type_name::<T>(), e),
                ErrorContext::new()
                    .with_field_path(format!("{}.arguments", self.name()))
                    .with_source("tool_call"),
            )
        })
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Run the function attached to the tool.
    pub fn call(&self) -> Result<Value> {
        match &self.handler {
            Some(handler) => handler(self),
            None => Err(Error::runtime(format!(
                "tool `{}` does not have an attached function",
                self.name()
            ))),
        }
    }
}

impl PartialEq for ToolCallInstance {
    fn eq(&self, other: &Self) -> bool {
        self.definition == other.definition
            && self.fields == other.fields
            && self.tool_call == other.tool_call
    }
}

impl fmt::Debug for ToolCallInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolCallInstance")
            .field("name", &self.definition.name)
            .field("fields", &self.fields)
            .field("tool_call", &self.tool_call)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

//! Per-call overrides computed from the template arguments.

use super::template::{TemplateArgs, TemplateValue};
use crate::tools::Tool;
use crate::types::Message;
use serde_json::{Map, Value};

/// Overrides returned by a call's dynamic-configuration closure.
///
/// Every field is optional; an empty config leaves the call unchanged.
#[derive(Debug, Clone, Default)]
pub struct DynamicConfig {
    /// Replaces the messages rendered from the template.
    pub messages: Option<Vec<Message>>,
    /// Merged over the call's default parameters.
    pub call_params: Map<String, Value>,
    /// Extra template values; they win over the call arguments.
    pub computed_fields: TemplateArgs,
    /// Appended to the call's tools.
    pub tools: Vec<Tool>,
    /// Carried to observers untouched.
    pub metadata: Map<String, Value>,
}

impl DynamicConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = Some(messages);
        self
    }

    pub fn call_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.call_params.insert(key.into(), value.into());
        self
    }

    pub fn computed_field(
        mut self,
        name: impl Into<String>,
        value: impl Into<TemplateValue>,
    ) -> Self {
        self.computed_fields.insert(name, value);
        self
    }

    pub fn tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

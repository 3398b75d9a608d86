//! Normalized tool invocations emitted by providers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool call (invocation from model), normalized across providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw argument string exactly as the provider produced it.
    pub arguments: String,
    /// The provider's own representation of the call.
    #[serde(default)]
    pub raw: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
            raw: Value::Null,
        }
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }
}

/// One streamed fragment of a tool call.
///
/// Providers identify fragments by position (`index`) and usually send the id and
/// name only on the first fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallDelta {
    pub index: Option<u32>,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
}

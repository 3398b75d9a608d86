//! Provider adapters.
//!
//! Each supported API is a zero-sized type implementing [`Provider`]. The trait
//! covers the whole round trip: building the request body, decoding the typed
//! response and chunk shapes, and normalizing them (content, finish reasons,
//! usage, tool calls, assistant message param). Providers are chosen at compile
//! time through the call builder, e.g. [`openai::call`].
//!
//! | Module | Wire style | Streaming |
//! |--------|------------|-----------|
//! | [`openai`] (`OpenAi`, `Groq`, `LiteLlm`) | Chat Completions | SSE |
//! | [`anthropic`] | Messages | SSE events |
//! | [`gemini`] (`Gemini`, `Vertex`) | generateContent | SSE |
//! | [`cohere`] | Chat v1 | NDJSON |

pub mod anthropic;
pub mod cohere;
pub mod config;
pub mod gemini;
pub mod openai;

pub use anthropic::Anthropic;
pub use cohere::Cohere;
pub use config::ProviderConfig;
pub use gemini::{Gemini, Vertex};
pub use openai::{Groq, LiteLlm, OpenAi};

use crate::tools::{Tool, ToolCallInstance};
use crate::transport::StreamFormat;
use crate::types::tool::{ToolCall, ToolCallDelta};
use crate::types::{Message, Usage};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::Debug;

/// Everything a provider needs to build one request body.
#[derive(Debug, Clone, Copy)]
pub struct CallRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub tools: &'a [Tool],
    pub call_params: &'a Map<String, Value>,
    /// Name of the tool the model must call.
    pub forced_tool: Option<&'a str>,
    pub json_mode: bool,
    pub stream: bool,
}

/// Accumulated state of a consumed stream, replayed into a provider response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamSnapshot {
    pub content: String,
    pub finish_reasons: Option<Vec<String>>,
    pub model: Option<String>,
    pub id: Option<String>,
    pub usage: Option<Usage>,
    pub tool_calls: Vec<ToolCall>,
}

/// Capability interface over one provider API.
pub trait Provider: Sized + Send + Sync + 'static {
    /// Key in the price table and in logs.
    const NAME: &'static str;
    /// Prefix of the provider's environment variables (`<PREFIX>_API_KEY`).
    const ENV_PREFIX: &'static str;

    type Response: DeserializeOwned + Serialize + Clone + Debug + PartialEq + Send + Sync;
    type Chunk: DeserializeOwned + Serialize + Clone + Debug + PartialEq + Send + Sync;

    fn stream_format() -> StreamFormat {
        StreamFormat::Sse
    }

    fn endpoint(config: &ProviderConfig, model: &str, stream: bool) -> Result<String>;

    fn auth_headers(config: &ProviderConfig) -> Result<Vec<(String, String)>>;

    /// Messages in the provider's native shape.
    fn message_params(messages: &[Message]) -> Vec<Value>;

    fn build_body(request: &CallRequest<'_>) -> Result<Value>;

    fn content(response: &Self::Response) -> String;
    fn finish_reasons(response: &Self::Response) -> Option<Vec<String>>;
    fn model(response: &Self::Response) -> Option<String>;
    fn id(response: &Self::Response) -> Option<String>;
    fn usage(response: &Self::Response) -> Option<Usage>;
    /// Assistant turn in native shape, ready to append to the history.
    fn message_param(response: &Self::Response) -> Value;
    fn tool_calls(response: &Self::Response) -> Vec<ToolCall>;
    /// Native messages carrying tool outputs back to the model.
    fn tool_message_params(results: &[(ToolCallInstance, Value)]) -> Vec<Value>;

    fn chunk_content(chunk: &Self::Chunk) -> String;
    fn chunk_finish_reasons(chunk: &Self::Chunk) -> Option<Vec<String>>;
    fn chunk_model(chunk: &Self::Chunk) -> Option<String>;
    fn chunk_id(chunk: &Self::Chunk) -> Option<String>;
    fn chunk_usage(chunk: &Self::Chunk) -> Option<Usage>;
    fn chunk_tool_deltas(chunk: &Self::Chunk) -> Vec<ToolCallDelta>;

    /// Error reported inside the stream itself.
    fn chunk_error(_chunk: &Self::Chunk) -> Option<String> {
        None
    }

    /// Id of a streamed tool call that arrived without one, by its position.
    fn fallback_call_id(position: usize) -> String {
        format!("call_{}", position)
    }

    /// Fold a chunk's usage into the running total. The latest report wins.
    fn merge_usage(_acc: Option<Usage>, latest: Usage) -> Usage {
        latest
    }

    /// Rebuild the non-streamed response shape from a consumed stream.
    fn construct_response(snapshot: &StreamSnapshot) -> Result<Self::Response>;
}

pub(crate) fn require_api_key<'a>(provider: &str, config: &'a ProviderConfig) -> Result<&'a str> {
    config.api_key.as_deref().ok_or_else(|| {
        Error::configuration(format!(
            "no API key for {}; set it on the call or in the environment",
            provider
        ))
    })
}

/// Copy call params over `body`; params win.
pub(crate) fn merge_params(body: &mut Value, params: &Map<String, Value>) {
    if let Value::Object(obj) = body {
        for (k, v) in params {
            obj.insert(k.clone(), v.clone());
        }
    }
}

/// Tool output as text for providers that take string content.
pub(crate) fn output_text(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse accumulated tool arguments; blank means `{}`.
pub(crate) fn arguments_value(call: &ToolCall) -> Result<Value> {
    if call.arguments.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(&call.arguments).map_err(|e| {
        Error::data_integrity_with_context(
            format!("arguments of tool call `{}` are not valid JSON: {}", call.name, e),
            crate::ErrorContext::new()
                .with_field_path(format!("tool_calls.{}.arguments", call.id))
                .with_details(call.arguments.clone())
                .with_source("construct_call_response"),
        )
    })
}

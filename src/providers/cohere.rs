//! Cohere Chat v1.
//!
//! The request carries the newest user turn as `message`, earlier turns as
//! `chat_history` and the system prompt as `preamble`. Tool outputs go back in
//! `tool_results`. Streams are newline-delimited JSON events keyed by
//! `event_type`.

use super::{
    arguments_value, merge_params, output_text, require_api_key, CallRequest, Provider,
    ProviderConfig, StreamSnapshot,
};
use crate::call::CallBuilder;
use crate::tools::{Tool, ToolCallInstance};
use crate::transport::StreamFormat;
use crate::types::message::{MessageContent, MessageRole};
use crate::types::tool::{ToolCall, ToolCallDelta};
use crate::types::{Message, Usage};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

const DEFAULT_BASE_URL: &str = "https://api.cohere.ai/v1";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NonStreamedChatResponse {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<CohereToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ApiMeta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohereToolCall {
    pub name: String,
    #[serde(default)]
    pub parameters: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billed_units: Option<BilledUnits>,
}

/// Billed token counts; the API reports them as numbers that may be fractional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BilledUnits {
    #[serde(default)]
    pub input_tokens: f64,
    #[serde(default)]
    pub output_tokens: f64,
}

/// One streamed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "kebab-case")]
pub enum StreamedChatResponse {
    StreamStart {
        #[serde(default)]
        generation_id: Option<String>,
    },
    TextGeneration {
        text: String,
    },
    ToolCallsGeneration {
        #[serde(default)]
        tool_calls: Vec<CohereToolCall>,
    },
    StreamEnd {
        #[serde(default)]
        finish_reason: Option<String>,
        #[serde(default)]
        response: Option<NonStreamedChatResponse>,
    },
    #[serde(other)]
    Other,
}

/// Cohere Chat v1 (`COHERE_API_KEY`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cohere;

impl Cohere {
    pub fn call(model: impl Into<String>) -> CallBuilder<Cohere> {
        CallBuilder::new(model)
    }
}

fn role_name(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "SYSTEM",
        MessageRole::User => "USER",
        MessageRole::Assistant => "CHATBOT",
        MessageRole::Tool => "TOOL",
    }
}

fn history_entry(message: &Message) -> Value {
    match (&message.role, &message.content) {
        (_, MessageContent::Native(v)) => v.clone(),
        (MessageRole::Tool, _) => json!({
            "role": "TOOL",
            "tool_results": [{
                "call": {"name": result_tool_name(message), "parameters": {}},
                "outputs": [{"result": message.text()}],
            }]
        }),
        (role, _) => json!({"role": role_name(*role), "message": message.text()}),
    }
}

/// Python-style type names used by `parameter_definitions`.
fn parameter_type(schema: &Value) -> &'static str {
    match schema.get("type").and_then(Value::as_str) {
        Some("integer") => "int",
        Some("number") => "float",
        Some("boolean") => "bool",
        Some("array") => "list",
        Some("object") => "dict",
        _ if schema.get("$ref").is_some() => "dict",
        _ => "str",
    }
}

fn tool_schema(tool: &Tool) -> Value {
    let def = tool.definition();
    let schema = def.parameters_schema();
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let mut definitions = Map::new();
    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (name, prop) in props {
            let mut entry = json!({
                "type": parameter_type(prop),
                "required": required.contains(&name.as_str()),
            });
            if let Some(desc) = prop.get("description") {
                entry["description"] = desc.clone();
            }
            definitions.insert(name.clone(), entry);
        }
    }
    json!({
        "name": def.name,
        "description": def.description,
        "parameter_definitions": definitions,
    })
}

fn is_role(entry: &Value, role: &str) -> bool {
    entry.get("role").and_then(Value::as_str) == Some(role)
}

fn tool_call_id(name: &str, index: usize) -> String {
    format!("{}-{}", name, index)
}

/// Tool name of a result message; without one, the `-{i}` suffix of our ids is dropped.
fn result_tool_name(message: &Message) -> String {
    if let Some(name) = &message.tool_name {
        return name.clone();
    }
    let id = message.tool_call_id.as_deref().unwrap_or_default();
    match id.rsplit_once('-') {
        Some((name, index)) if !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) => {
            name.to_string()
        }
        _ => id.to_string(),
    }
}

fn tool_calls_of(calls: &[CohereToolCall]) -> Vec<ToolCall> {
    calls
        .iter()
        .enumerate()
        .map(|(i, c)| {
            ToolCall::new(tool_call_id(&c.name, i), &c.name, c.parameters.to_string())
                .with_raw(serde_json::to_value(c).unwrap_or(Value::Null))
        })
        .collect()
}

impl Provider for Cohere {
    const NAME: &'static str = "cohere";
    const ENV_PREFIX: &'static str = "COHERE";

    type Response = NonStreamedChatResponse;
    type Chunk = StreamedChatResponse;

    fn stream_format() -> StreamFormat {
        StreamFormat::Ndjson
    }

    fn endpoint(config: &ProviderConfig, _model: &str, _stream: bool) -> Result<String> {
        Ok(format!("{}/chat", config.base_url_or(DEFAULT_BASE_URL)))
    }

    fn auth_headers(config: &ProviderConfig) -> Result<Vec<(String, String)>> {
        let key = require_api_key(Self::NAME, config)?;
        Ok(vec![("authorization".to_string(), format!("Bearer {}", key))])
    }

    fn message_params(messages: &[Message]) -> Vec<Value> {
        messages.iter().map(history_entry).collect()
    }

    fn build_body(request: &CallRequest<'_>) -> Result<Value> {
        let mut preamble = Vec::new();
        let mut history = Vec::new();
        for entry in Self::message_params(request.messages) {
            if is_role(&entry, "SYSTEM") {
                if let Some(text) = entry.get("message").and_then(Value::as_str) {
                    preamble.push(text.to_string());
                }
            } else {
                history.push(entry);
            }
        }

        let mut message = String::new();
        let mut groups = Vec::new();
        if history.last().map_or(false, |e| is_role(e, "USER")) {
            if let Some(last) = history.pop() {
                message = last
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
            }
        } else {
            while history.last().map_or(false, |e| is_role(e, "TOOL")) {
                let results = match history.pop() {
                    Some(Value::Object(mut entry)) => entry.remove("tool_results"),
                    _ => None,
                };
                if let Some(Value::Array(results)) = results {
                    groups.push(results);
                }
            }
        }
        let tool_results: Vec<Value> = groups.into_iter().rev().flatten().collect();

        let mut body = json!({
            "model": request.model,
            "message": message,
        });
        if !preamble.is_empty() {
            body["preamble"] = Value::String(preamble.join("\n\n"));
        }
        if !history.is_empty() {
            body["chat_history"] = Value::Array(history);
        }
        if !tool_results.is_empty() {
            body["tool_results"] = Value::Array(tool_results);
        }
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.iter().map(tool_schema).collect());
        }
        if let Some(name) = request.forced_tool {
            // Chat v1 cannot force a specific tool; the tool list is narrowed instead.
            tracing::debug!(tool = name, "cohere has no forced tool choice; sending the tool alone");
            if let Some(tool) = request.tools.iter().find(|t| t.name() == name) {
                body["tools"] = json!([tool_schema(tool)]);
            }
        }
        if request.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }
        if request.stream {
            body["stream"] = Value::Bool(true);
        }
        merge_params(&mut body, request.call_params);
        Ok(body)
    }

    fn content(r: &NonStreamedChatResponse) -> String {
        r.text.clone()
    }

    fn finish_reasons(r: &NonStreamedChatResponse) -> Option<Vec<String>> {
        r.finish_reason.clone().map(|f| vec![f])
    }

    /// Chat v1 does not echo the model.
    fn model(_r: &NonStreamedChatResponse) -> Option<String> {
        None
    }

    fn id(r: &NonStreamedChatResponse) -> Option<String> {
        r.generation_id.clone().or_else(|| r.response_id.clone())
    }

    fn usage(r: &NonStreamedChatResponse) -> Option<Usage> {
        r.meta
            .as_ref()
            .and_then(|m| m.billed_units)
            .map(|b| Usage::new(b.input_tokens as u64, b.output_tokens as u64))
    }

    fn message_param(r: &NonStreamedChatResponse) -> Value {
        let mut param = json!({"role": "CHATBOT", "message": r.text});
        if !r.tool_calls.is_empty() {
            param["tool_calls"] = serde_json::to_value(&r.tool_calls).unwrap_or(Value::Null);
        }
        param
    }

    fn tool_calls(r: &NonStreamedChatResponse) -> Vec<ToolCall> {
        tool_calls_of(&r.tool_calls)
    }

    fn tool_message_params(results: &[(ToolCallInstance, Value)]) -> Vec<Value> {
        if results.is_empty() {
            return Vec::new();
        }
        let tool_results: Vec<Value> = results
            .iter()
            .map(|(call, output)| {
                let output = match output {
                    Value::Object(_) => output.clone(),
                    other => json!({"result": output_text(other)}),
                };
                json!({
                    "call": {"name": call.name(), "parameters": call.arguments()},
                    "outputs": [output],
                })
            })
            .collect();
        vec![json!({"role": "TOOL", "tool_results": tool_results})]
    }

    fn chunk_content(c: &StreamedChatResponse) -> String {
        match c {
            StreamedChatResponse::TextGeneration { text } => text.clone(),
            _ => String::new(),
        }
    }

    fn chunk_finish_reasons(c: &StreamedChatResponse) -> Option<Vec<String>> {
        match c {
            StreamedChatResponse::StreamEnd {
                finish_reason: Some(reason),
                ..
            } => Some(vec![reason.clone()]),
            _ => None,
        }
    }

    fn chunk_model(_c: &StreamedChatResponse) -> Option<String> {
        None
    }

    fn chunk_id(c: &StreamedChatResponse) -> Option<String> {
        match c {
            StreamedChatResponse::StreamStart { generation_id } => generation_id.clone(),
            StreamedChatResponse::StreamEnd {
                response: Some(r), ..
            } => Self::id(r),
            _ => None,
        }
    }

    fn chunk_usage(c: &StreamedChatResponse) -> Option<Usage> {
        match c {
            StreamedChatResponse::StreamEnd {
                response: Some(r), ..
            } => Self::usage(r),
            _ => None,
        }
    }

    /// Complete calls arrive in one `tool-calls-generation` event.
    fn chunk_tool_deltas(c: &StreamedChatResponse) -> Vec<ToolCallDelta> {
        match c {
            StreamedChatResponse::ToolCallsGeneration { tool_calls } => tool_calls
                .iter()
                .enumerate()
                .map(|(i, call)| ToolCallDelta {
                    index: Some(i as u32),
                    id: Some(tool_call_id(&call.name, i)),
                    name: Some(call.name.clone()),
                    arguments: call.parameters.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    fn chunk_error(c: &StreamedChatResponse) -> Option<String> {
        match c {
            StreamedChatResponse::StreamEnd {
                finish_reason: Some(reason),
                ..
            } if reason.starts_with("ERROR") => Some(format!("stream ended with {}", reason)),
            _ => None,
        }
    }

    fn construct_response(snapshot: &StreamSnapshot) -> Result<NonStreamedChatResponse> {
        let tool_calls = snapshot
            .tool_calls
            .iter()
            .map(|call| {
                Ok(CohereToolCall {
                    name: call.name.clone(),
                    parameters: arguments_value(call)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(NonStreamedChatResponse {
            text: snapshot.content.clone(),
            response_id: None,
            generation_id: snapshot.id.clone(),
            finish_reason: snapshot
                .finish_reasons
                .as_ref()
                .and_then(|r| r.first().cloned()),
            tool_calls,
            meta: snapshot.usage.map(|u| ApiMeta {
                billed_units: Some(BilledUnits {
                    input_tokens: u.input_tokens as f64,
                    output_tokens: u.output_tokens as f64,
                }),
            }),
        })
    }
}

/// Start a Cohere call.
pub fn call(model: impl Into<String>) -> CallBuilder<Cohere> {
    Cohere::call(model)
}

//! Anthropic Messages API.
//!
//! Differences from the Chat Completions style:
//! - System messages become the top-level `system` parameter.
//! - Content is a list of typed blocks (`text`, `tool_use`, `tool_result`).
//! - `max_tokens` is required; it defaults to 1024.
//! - Streams are typed events; usage is split between `message_start` (input)
//!   and `message_delta` (output).

use super::{
    arguments_value, merge_params, output_text, require_api_key, CallRequest, Provider,
    ProviderConfig, StreamSnapshot,
};
use crate::call::CallBuilder;
use crate::tools::{Tool, ToolCallInstance};
use crate::types::message::{ContentBlock as InputBlock, MessageContent, MessageRole};
use crate::types::tool::{ToolCall, ToolCallDelta};
use crate::types::{Message, Usage};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const DEFAULT_MAX_TOKENS: u32 = 1024;
const API_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const JSON_MODE_INSTRUCTION: &str =
    "Respond only with a valid JSON object. Do not include any text outside the JSON.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default = "assistant_role")]
    pub role: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<AnthropicUsage>,
}

fn assistant_role() -> String {
    "assistant".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl From<AnthropicUsage> for Usage {
    fn from(u: AnthropicUsage) -> Self {
        Usage::new(u.input_tokens, u.output_tokens)
    }
}

/// One streamed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        message: AnthropicMessage,
    },
    ContentBlockStart {
        index: u32,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        delta: MessageDeltaBody,
        #[serde(default)]
        usage: Option<DeltaUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: ApiError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageDeltaBody {
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DeltaUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

/// Anthropic Messages API (`ANTHROPIC_API_KEY`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Anthropic;

impl Anthropic {
    pub fn call(model: impl Into<String>) -> CallBuilder<Anthropic> {
        CallBuilder::new(model)
    }

    /// Extract the system prompt; the rest stays as native messages.
    fn split_system_messages(messages: &[Message]) -> (Option<String>, Vec<Value>) {
        let mut system_parts: Vec<String> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        for m in messages {
            match (&m.role, &m.content) {
                (MessageRole::System, MessageContent::Native(v)) => {
                    if let Some(s) = v.get("content").and_then(Value::as_str) {
                        system_parts.push(s.to_string());
                    }
                }
                (MessageRole::System, _) => system_parts.push(m.text()),
                (_, MessageContent::Native(v)) => params.push(v.clone()),
                (MessageRole::Tool, content) => params.push(json!({
                    "role": "user",
                    "content": [{
                        "type": "tool_result",
                        "tool_use_id": m.tool_call_id.clone().unwrap_or_default(),
                        "content": [{"type": "text", "text": match content {
                            MessageContent::Text(s) => s.clone(),
                            _ => m.text(),
                        }}],
                    }],
                })),
                (role, content) => {
                    let content = match content {
                        MessageContent::Text(s) => json!([{"type": "text", "text": s}]),
                        MessageContent::Blocks(blocks) => Value::Array(
                            blocks
                                .iter()
                                .map(|b| match b {
                                    InputBlock::Text { text } => json!({"type": "text", "text": text}),
                                    InputBlock::Image { source } => json!({
                                        "type": "image",
                                        "source": {
                                            "type": "base64",
                                            "media_type": source.media_type.as_deref().unwrap_or("image/png"),
                                            "data": source.data,
                                        }
                                    }),
                                })
                                .collect(),
                        ),
                        MessageContent::Native(v) => v.clone(),
                    };
                    params.push(json!({"role": role.as_str(), "content": content}));
                }
            }
        }

        let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));
        (system, params)
    }
}

fn tool_schema(tool: &Tool) -> Value {
    let def = tool.definition();
    json!({
        "name": def.name,
        "description": def.description,
        "input_schema": def.parameters_schema(),
    })
}

fn text_of(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

impl Provider for Anthropic {
    const NAME: &'static str = "anthropic";
    const ENV_PREFIX: &'static str = "ANTHROPIC";

    type Response = AnthropicMessage;
    type Chunk = StreamEvent;

    fn endpoint(config: &ProviderConfig, _model: &str, _stream: bool) -> Result<String> {
        Ok(format!("{}/messages", config.base_url_or(DEFAULT_BASE_URL)))
    }

    fn auth_headers(config: &ProviderConfig) -> Result<Vec<(String, String)>> {
        let key = require_api_key(Self::NAME, config)?;
        Ok(vec![
            ("x-api-key".to_string(), key.to_string()),
            ("anthropic-version".to_string(), API_VERSION.to_string()),
        ])
    }

    fn message_params(messages: &[Message]) -> Vec<Value> {
        let (system, mut params) = Self::split_system_messages(messages);
        if let Some(system) = system {
            params.insert(0, json!({"role": "system", "content": system}));
        }
        params
    }

    fn build_body(request: &CallRequest<'_>) -> Result<Value> {
        let (mut system, messages) = Self::split_system_messages(request.messages);
        if request.json_mode {
            system = Some(match system {
                Some(s) => format!("{}\n\n{}", s, JSON_MODE_INSTRUCTION),
                None => JSON_MODE_INSTRUCTION.to_string(),
            });
        }
        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": DEFAULT_MAX_TOKENS,
        });
        if let Some(system) = system {
            body["system"] = Value::String(system);
        }
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.iter().map(tool_schema).collect());
        }
        if let Some(name) = request.forced_tool {
            body["tool_choice"] = json!({"type": "tool", "name": name});
        }
        if request.stream {
            body["stream"] = Value::Bool(true);
        }
        merge_params(&mut body, request.call_params);
        Ok(body)
    }

    fn content(r: &AnthropicMessage) -> String {
        text_of(&r.content)
    }

    fn finish_reasons(r: &AnthropicMessage) -> Option<Vec<String>> {
        r.stop_reason.clone().map(|s| vec![s])
    }

    fn model(r: &AnthropicMessage) -> Option<String> {
        (!r.model.is_empty()).then(|| r.model.clone())
    }

    fn id(r: &AnthropicMessage) -> Option<String> {
        (!r.id.is_empty()).then(|| r.id.clone())
    }

    fn usage(r: &AnthropicMessage) -> Option<Usage> {
        r.usage.map(Into::into)
    }

    fn message_param(r: &AnthropicMessage) -> Value {
        let content: Vec<&ContentBlock> = r
            .content
            .iter()
            .filter(|b| !matches!(b, ContentBlock::Unsupported))
            .collect();
        json!({"role": r.role, "content": content})
    }

    fn tool_calls(r: &AnthropicMessage) -> Vec<ToolCall> {
        r.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => Some(
                    ToolCall::new(id, name, input.to_string())
                        .with_raw(serde_json::to_value(b).unwrap_or(Value::Null)),
                ),
                _ => None,
            })
            .collect()
    }

    fn tool_message_params(results: &[(ToolCallInstance, Value)]) -> Vec<Value> {
        if results.is_empty() {
            return Vec::new();
        }
        let blocks: Vec<Value> = results
            .iter()
            .map(|(call, output)| {
                json!({
                    "type": "tool_result",
                    "tool_use_id": call.id(),
                    "content": [{"type": "text", "text": output_text(output)}],
                })
            })
            .collect();
        vec![json!({"role": "user", "content": blocks})]
    }

    fn chunk_content(c: &StreamEvent) -> String {
        match c {
            StreamEvent::ContentBlockDelta {
                delta: BlockDelta::TextDelta { text },
                ..
            } => text.clone(),
            StreamEvent::ContentBlockStart {
                content_block: ContentBlock::Text { text },
                ..
            } => text.clone(),
            _ => String::new(),
        }
    }

    fn chunk_finish_reasons(c: &StreamEvent) -> Option<Vec<String>> {
        match c {
            StreamEvent::MessageDelta { delta, .. } => delta.stop_reason.clone().map(|s| vec![s]),
            _ => None,
        }
    }

    fn chunk_model(c: &StreamEvent) -> Option<String> {
        match c {
            StreamEvent::MessageStart { message } => Self::model(message),
            _ => None,
        }
    }

    fn chunk_id(c: &StreamEvent) -> Option<String> {
        match c {
            StreamEvent::MessageStart { message } => Self::id(message),
            _ => None,
        }
    }

    fn chunk_usage(c: &StreamEvent) -> Option<Usage> {
        match c {
            StreamEvent::MessageStart { message } => message.usage.map(Into::into),
            StreamEvent::MessageDelta {
                usage: Some(usage), ..
            } => Some(Usage::new(usage.input_tokens, usage.output_tokens)),
            _ => None,
        }
    }

    fn chunk_tool_deltas(c: &StreamEvent) -> Vec<ToolCallDelta> {
        match c {
            StreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlock::ToolUse { id, name, input },
            } => {
                // The start block carries an empty `{}` input; real arguments follow as deltas.
                let initial = match input {
                    Value::Object(map) if map.is_empty() => String::new(),
                    other => other.to_string(),
                };
                vec![ToolCallDelta {
                    index: Some(*index),
                    id: Some(id.clone()),
                    name: Some(name.clone()),
                    arguments: initial,
                }]
            }
            StreamEvent::ContentBlockDelta {
                index,
                delta: BlockDelta::InputJsonDelta { partial_json },
            } => vec![ToolCallDelta {
                index: Some(*index),
                id: None,
                name: None,
                arguments: partial_json.clone(),
            }],
            _ => Vec::new(),
        }
    }

    fn chunk_error(c: &StreamEvent) -> Option<String> {
        match c {
            StreamEvent::Error { error } => Some(format!("{}: {}", error.kind, error.message)),
            _ => None,
        }
    }

    /// Input tokens come from `message_start`, output tokens from the latest `message_delta`.
    fn merge_usage(acc: Option<Usage>, latest: Usage) -> Usage {
        match acc {
            None => latest,
            Some(prev) => {
                let input = if latest.input_tokens > 0 {
                    latest.input_tokens
                } else {
                    prev.input_tokens
                };
                let output = if latest.output_tokens > 0 {
                    latest.output_tokens
                } else {
                    prev.output_tokens
                };
                Usage::new(input, output)
            }
        }
    }

    fn construct_response(snapshot: &StreamSnapshot) -> Result<AnthropicMessage> {
        let mut content = Vec::new();
        if !snapshot.content.is_empty() {
            content.push(ContentBlock::Text {
                text: snapshot.content.clone(),
            });
        }
        for call in &snapshot.tool_calls {
            content.push(ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: arguments_value(call)?,
            });
        }
        Ok(AnthropicMessage {
            id: snapshot.id.clone().unwrap_or_default(),
            role: assistant_role(),
            model: snapshot.model.clone().unwrap_or_default(),
            content,
            stop_reason: snapshot
                .finish_reasons
                .as_ref()
                .and_then(|r| r.first().cloned()),
            usage: snapshot.usage.map(|usage| AnthropicUsage {
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
            }),
        })
    }
}

/// Start an Anthropic call.
pub fn call(model: impl Into<String>) -> CallBuilder<Anthropic> {
    Anthropic::call(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn test_system_message_extraction() {
        let msgs = vec![Message::system("You are helpful."), Message::user("Hi")];
        let (sys, user_msgs) = Anthropic::split_system_messages(&msgs);
        assert_eq!(sys.as_deref(), Some("You are helpful."));
        assert_eq!(user_msgs.len(), 1);
        assert_eq!(user_msgs[0]["role"], "user");
        assert_eq!(user_msgs[0]["content"][0]["text"], "Hi");
    }

    #[test]
    fn test_build_request() {
        let messages = vec![Message::user("Hello")];
        let mut params = Map::new();
        params.insert("max_tokens".into(), json!(2048));
        let body = Anthropic::build_body(&CallRequest {
            model: "claude-3-5-sonnet-20240620",
            messages: &messages,
            tools: &[],
            call_params: &params,
            forced_tool: Some("FormatBook"),
            json_mode: false,
            stream: false,
        })
        .unwrap();
        assert_eq!(body["max_tokens"], 2048);
        assert!(body.get("system").is_none());
        assert_eq!(body["tool_choice"], json!({"type": "tool", "name": "FormatBook"}));
        let headers = Anthropic::auth_headers(&ProviderConfig::new().with_api_key("k")).unwrap();
        assert!(headers.iter().any(|(k, v)| k == "anthropic-version" && v == API_VERSION));
    }

    #[test]
    fn test_parse_response_with_tool_use() {
        let body = json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "model": "claude-3-haiku-20240307",
            "content": [
                {"type": "text", "text": "Let me format that."},
                {"type": "tool_use", "id": "toolu_1", "name": "FormatBook", "input": {"title": "Dune"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        });
        let r: AnthropicMessage = serde_json::from_value(body).unwrap();
        assert_eq!(Anthropic::content(&r), "Let me format that.");
        assert_eq!(Anthropic::finish_reasons(&r), Some(vec!["tool_use".to_string()]));
        assert_eq!(Anthropic::usage(&r).unwrap().total_tokens, 15);
        let calls = Anthropic::tool_calls(&r);
        assert_eq!(calls[0].id, "toolu_1");
        assert_eq!(
            serde_json::from_str::<Value>(&calls[0].arguments).unwrap(),
            json!({"title": "Dune"})
        );
    }

    #[test]
    fn test_stream_events_and_usage_merge() {
        let start: StreamEvent = serde_json::from_value(json!({
            "type": "message_start",
            "message": {"id": "msg_1", "type": "message", "role": "assistant", "model": "claude-3-haiku-20240307",
                        "content": [], "stop_reason": null, "usage": {"input_tokens": 25, "output_tokens": 1}}
        }))
        .unwrap();
        let delta: StreamEvent = serde_json::from_value(json!({
            "type": "content_block_delta", "index": 0,
            "delta": {"type": "text_delta", "text": "Hi"}
        }))
        .unwrap();
        let end: StreamEvent = serde_json::from_value(json!({
            "type": "message_delta",
            "delta": {"stop_reason": "end_turn", "stop_sequence": null},
            "usage": {"output_tokens": 15}
        }))
        .unwrap();

        assert_eq!(Anthropic::chunk_content(&delta), "Hi");
        assert_eq!(Anthropic::chunk_id(&start).as_deref(), Some("msg_1"));
        let usage = Anthropic::merge_usage(None, Anthropic::chunk_usage(&start).unwrap());
        let usage = Anthropic::merge_usage(Some(usage), Anthropic::chunk_usage(&end).unwrap());
        assert_eq!(usage, Usage::new(25, 15));
        assert_eq!(
            Anthropic::chunk_finish_reasons(&end),
            Some(vec!["end_turn".to_string()])
        );

        let ping: StreamEvent = serde_json::from_value(json!({"type": "ping"})).unwrap();
        assert_eq!(ping, StreamEvent::Ping);
        let err: StreamEvent = serde_json::from_value(json!({
            "type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}
        }))
        .unwrap();
        assert_eq!(
            Anthropic::chunk_error(&err).as_deref(),
            Some("overloaded_error: Overloaded")
        );
    }

    #[test]
    fn test_tool_deltas() {
        let start: StreamEvent = serde_json::from_value(json!({
            "type": "content_block_start", "index": 1,
            "content_block": {"type": "tool_use", "id": "toolu_1", "name": "FormatBook", "input": {}}
        }))
        .unwrap();
        let part: StreamEvent = serde_json::from_value(json!({
            "type": "content_block_delta", "index": 1,
            "delta": {"type": "input_json_delta", "partial_json": "{\"title\": "}
        }))
        .unwrap();
        let d0 = Anthropic::chunk_tool_deltas(&start);
        assert_eq!(d0[0].id.as_deref(), Some("toolu_1"));
        assert!(d0[0].arguments.is_empty());
        let d1 = Anthropic::chunk_tool_deltas(&part);
        assert_eq!(d1[0].index, Some(1));
        assert_eq!(d1[0].arguments, "{\"title\": ");
    }

    #[test]
    fn test_tool_message_params() {
        let tool = Tool::function("format_book")
            .docstring("Formats a book.\n\nArgs:\n    title: The title of the book.")
            .param::<String>("title")
            .build()
            .unwrap();
        let instance = tool
            .from_tool_call(&ToolCall::new("toolu_1", "FormatBook", r#"{"title": "Dune"}"#))
            .unwrap();
        let params = Anthropic::tool_message_params(&[(instance, json!("Dune by Frank Herbert"))]);
        assert_eq!(params[0]["role"], "user");
        assert_eq!(params[0]["content"][0]["tool_use_id"], "toolu_1");
        assert_eq!(params[0]["content"][0]["content"][0]["text"], "Dune by Frank Herbert");
    }

    #[test]
    fn test_missing_usage_stays_missing() {
        let r: AnthropicMessage = serde_json::from_value(json!({
            "id": "msg_2",
            "model": "claude-3-haiku-20240307",
            "content": [{"type": "text", "text": "Dune"}],
            "stop_reason": "end_turn"
        }))
        .unwrap();
        assert_eq!(Anthropic::usage(&r), None);

        let rebuilt = Anthropic::construct_response(&StreamSnapshot {
            content: "Dune".into(),
            finish_reasons: Some(vec!["end_turn".into()]),
            model: Some("claude-3-haiku-20240307".into()),
            id: Some("msg_2".into()),
            usage: None,
            tool_calls: Vec::new(),
        })
        .unwrap();
        assert_eq!(rebuilt, r);
    }
}

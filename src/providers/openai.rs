//! OpenAI Chat Completions wire format, shared by OpenAI, Groq and LiteLLM.
//!
//! - System, user and assistant turns are plain `{"role", "content"}` objects.
//! - Tool calls arrive as `choices[0].message.tool_calls[]` with string arguments.
//! - Streaming chunks carry `choices[].delta`; tool-call fragments are keyed by `index`.
//! - Usage on streams arrives in a final chunk (`stream_options.include_usage`),
//!   or under `x_groq.usage` for Groq.

use super::{
    arguments_value, merge_params, output_text, require_api_key, CallRequest, Provider,
    ProviderConfig, StreamSnapshot,
};
use crate::call::CallBuilder;
use crate::tools::{Tool, ToolCallInstance};
use crate::types::message::{ContentBlock, MessageContent, MessageRole};
use crate::types::tool::{ToolCall, ToolCallDelta};
use crate::types::{Message, Usage};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<CompletionUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: AssistantMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<FunctionToolCall>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompletionUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl From<CompletionUsage> for Usage {
    fn from(u: CompletionUsage) -> Self {
        Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u.total_tokens.max(u.prompt_tokens + u.completion_tokens),
        }
    }
}

impl From<Usage> for CompletionUsage {
    fn from(u: Usage) -> Self {
        Self {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<CompletionUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_groq: Option<GroqExtension>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroqExtension {
    #[serde(default)]
    pub usage: Option<CompletionUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: ChoiceDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChoiceDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallChunk>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallChunk {
    #[serde(default)]
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionDelta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

fn message_param(message: &Message) -> Value {
    if let MessageContent::Native(v) = &message.content {
        return v.clone();
    }
    let content = match &message.content {
        MessageContent::Text(s) => Value::String(s.clone()),
        MessageContent::Blocks(blocks) => Value::Array(
            blocks
                .iter()
                .map(|b| match b {
                    ContentBlock::Text { text } => json!({"type": "text", "text": text}),
                    ContentBlock::Image { source } => {
                        json!({"type": "image_url", "image_url": {"url": source.data_url()}})
                    }
                })
                .collect(),
        ),
        MessageContent::Native(v) => v.clone(),
    };
    let mut param = json!({"role": message.role.as_str(), "content": content});
    if message.role == MessageRole::Tool {
        if let Some(id) = &message.tool_call_id {
            param["tool_call_id"] = Value::String(id.clone());
        }
    }
    param
}

fn tool_schema(tool: &Tool) -> Value {
    let def = tool.definition();
    json!({
        "type": "function",
        "function": {
            "name": def.name,
            "description": def.description,
            "parameters": def.parameters_schema(),
        }
    })
}

fn build_body(request: &CallRequest<'_>, include_usage: bool) -> Value {
    let messages: Vec<Value> = request.messages.iter().map(message_param).collect();
    let mut body = json!({
        "model": request.model,
        "messages": messages,
    });
    if !request.tools.is_empty() {
        body["tools"] = Value::Array(request.tools.iter().map(tool_schema).collect());
    }
    if let Some(name) = request.forced_tool {
        body["tool_choice"] = json!({"type": "function", "function": {"name": name}});
    }
    if request.json_mode {
        body["response_format"] = json!({"type": "json_object"});
    }
    if request.stream {
        body["stream"] = Value::Bool(true);
        if include_usage {
            body["stream_options"] = json!({"include_usage": true});
        }
    }
    merge_params(&mut body, request.call_params);
    body
}

fn finish_reasons<'a>(reasons: impl Iterator<Item = &'a Option<String>>) -> Option<Vec<String>> {
    let reasons: Vec<String> = reasons.flatten().cloned().collect();
    (!reasons.is_empty()).then_some(reasons)
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

fn construct(snapshot: &StreamSnapshot) -> Result<ChatCompletion> {
    let tool_calls = snapshot
        .tool_calls
        .iter()
        .map(|call| {
            arguments_value(call)?;
            Ok(FunctionToolCall {
                id: call.id.clone(),
                kind: function_type(),
                function: FunctionCall {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                },
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let content = if snapshot.content.is_empty() && !tool_calls.is_empty() {
        None
    } else {
        Some(snapshot.content.clone())
    };

    Ok(ChatCompletion {
        id: snapshot.id.clone().unwrap_or_default(),
        model: snapshot.model.clone().unwrap_or_default(),
        choices: vec![Choice {
            index: 0,
            message: AssistantMessage {
                role: "assistant".into(),
                content,
                tool_calls,
            },
            finish_reason: snapshot
                .finish_reasons
                .as_ref()
                .and_then(|r| r.first().cloned()),
        }],
        usage: snapshot.usage.map(CompletionUsage::from),
    })
}

macro_rules! openai_compatible {
    (
        $(#[$meta:meta])*
        $provider:ident, $name:literal, $env:literal, $base_url:literal,
        key_required: $key_required:literal, include_usage: $include_usage:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $provider;

        impl Provider for $provider {
            const NAME: &'static str = $name;
            const ENV_PREFIX: &'static str = $env;

            type Response = ChatCompletion;
            type Chunk = ChatCompletionChunk;

            fn endpoint(config: &ProviderConfig, _model: &str, _stream: bool) -> Result<String> {
                Ok(format!("{}/chat/completions", config.base_url_or($base_url)))
            }

            fn auth_headers(config: &ProviderConfig) -> Result<Vec<(String, String)>> {
                let key = if $key_required {
                    Some(require_api_key($name, config)?)
                } else {
                    config.api_key.as_deref()
                };
                Ok(key
                    .map(|k| vec![("authorization".to_string(), format!("Bearer {}", k))])
                    .unwrap_or_default())
            }

            fn message_params(messages: &[Message]) -> Vec<Value> {
                messages.iter().map(message_param).collect()
            }

            fn build_body(request: &CallRequest<'_>) -> Result<Value> {
                Ok(build_body(request, $include_usage))
            }

            fn content(r: &ChatCompletion) -> String {
                r.choices
                    .first()
                    .and_then(|c| c.message.content.clone())
                    .unwrap_or_default()
            }

            fn finish_reasons(r: &ChatCompletion) -> Option<Vec<String>> {
                finish_reasons(r.choices.iter().map(|c| &c.finish_reason))
            }

            fn model(r: &ChatCompletion) -> Option<String> {
                non_empty(&r.model)
            }

            fn id(r: &ChatCompletion) -> Option<String> {
                non_empty(&r.id)
            }

            fn usage(r: &ChatCompletion) -> Option<Usage> {
                r.usage.map(Usage::from)
            }

            fn message_param(r: &ChatCompletion) -> Value {
                r.choices
                    .first()
                    .and_then(|c| serde_json::to_value(&c.message).ok())
                    .unwrap_or_else(|| json!({"role": "assistant", "content": null}))
            }

            fn tool_calls(r: &ChatCompletion) -> Vec<ToolCall> {
                r.choices
                    .first()
                    .map(|c| {
                        c.message
                            .tool_calls
                            .iter()
                            .map(|tc| {
                                ToolCall::new(&tc.id, &tc.function.name, &tc.function.arguments)
                                    .with_raw(serde_json::to_value(tc).unwrap_or(Value::Null))
                            })
                            .collect()
                    })
                    .unwrap_or_default()
            }

            fn tool_message_params(results: &[(ToolCallInstance, Value)]) -> Vec<Value> {
                results
                    .iter()
                    .map(|(call, output)| {
                        json!({
                            "role": "tool",
                            "tool_call_id": call.id(),
                            "name": call.name(),
                            "content": output_text(output),
                        })
                    })
                    .collect()
            }

            fn chunk_content(c: &ChatCompletionChunk) -> String {
                c.choices
                    .first()
                    .and_then(|ch| ch.delta.content.clone())
                    .unwrap_or_default()
            }

            fn chunk_finish_reasons(c: &ChatCompletionChunk) -> Option<Vec<String>> {
                finish_reasons(c.choices.iter().map(|ch| &ch.finish_reason))
            }

            fn chunk_model(c: &ChatCompletionChunk) -> Option<String> {
                non_empty(&c.model)
            }

            fn chunk_id(c: &ChatCompletionChunk) -> Option<String> {
                non_empty(&c.id)
            }

            fn chunk_usage(c: &ChatCompletionChunk) -> Option<Usage> {
                c.usage
                    .or_else(|| c.x_groq.as_ref().and_then(|x| x.usage))
                    .map(Usage::from)
            }

            fn chunk_tool_deltas(c: &ChatCompletionChunk) -> Vec<ToolCallDelta> {
                c.choices
                    .first()
                    .map(|ch| {
                        ch.delta
                            .tool_calls
                            .iter()
                            .map(|tc| ToolCallDelta {
                                index: Some(tc.index),
                                id: tc.id.clone(),
                                name: tc.function.as_ref().and_then(|f| f.name.clone()),
                                arguments: tc
                                    .function
                                    .as_ref()
                                    .and_then(|f| f.arguments.clone())
                                    .unwrap_or_default(),
                            })
                            .collect()
                    })
                    .unwrap_or_default()
            }

            fn construct_response(snapshot: &StreamSnapshot) -> Result<ChatCompletion> {
                construct(snapshot)
            }
        }

        impl $provider {
            pub fn call(model: impl Into<String>) -> CallBuilder<$provider> {
                CallBuilder::new(model)
            }
        }
    };
}

openai_compatible!(
    /// OpenAI Chat Completions (`OPENAI_API_KEY`).
    OpenAi, "openai", "OPENAI", "https://api.openai.com/v1",
    key_required: true, include_usage: true
);

openai_compatible!(
    /// Groq's OpenAI-compatible endpoint (`GROQ_API_KEY`).
    Groq, "groq", "GROQ", "https://api.groq.com/openai/v1",
    key_required: true, include_usage: false
);

openai_compatible!(
    /// A LiteLLM proxy (`LITELLM_BASE_URL`, key optional).
    LiteLlm, "litellm", "LITELLM", "http://localhost:4000",
    key_required: false, include_usage: true
);

/// Start an OpenAI call.
pub fn call(model: impl Into<String>) -> CallBuilder<OpenAi> {
    OpenAi::call(model)
}

pub mod groq {
    use super::{CallBuilder, Groq};

    /// Start a Groq call.
    pub fn call(model: impl Into<String>) -> CallBuilder<Groq> {
        Groq::call(model)
    }
}

pub mod litellm {
    use super::{CallBuilder, LiteLlm};

    /// Start a LiteLLM call.
    pub fn call(model: impl Into<String>) -> CallBuilder<LiteLlm> {
        LiteLlm::call(model)
    }
}

//! Google `generateContent` wire format, served by the Gemini API and Vertex AI.
//!
//! Turns are `{role, parts[]}` with roles `user` and `model`; the system prompt
//! travels separately as `systemInstruction`. Function calls arrive whole (never
//! split across chunks) and carry no id on most models, so ids are synthesized.

use super::{
    arguments_value, output_text, require_api_key, CallRequest, Provider, ProviderConfig,
    StreamSnapshot,
};
use crate::call::CallBuilder;
use crate::tools::{Tool, ToolCallInstance};
use crate::types::message::{ContentBlock, MessageContent, MessageRole};
use crate::types::tool::{ToolCall, ToolCallDelta};
use crate::types::{Message, Usage};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const VERTEX_DEFAULT_LOCATION: &str = "us-central1";
/// Prefix of ids minted for function calls the API returned without one.
const GENERATED_ID_PREFIX: &str = "gemini_call_";
/// Body keys that are not generation parameters.
const TOP_LEVEL_PARAMS: [&str; 4] = ["safetySettings", "toolConfig", "cachedContent", "labels"];
const MAX_REF_DEPTH: usize = 32;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<GeminiError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default = "empty_object")]
    pub args: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u64,
    #[serde(default)]
    pub candidates_token_count: u64,
    #[serde(default)]
    pub total_token_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiError {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
}

impl From<UsageMetadata> for Usage {
    fn from(u: UsageMetadata) -> Self {
        Usage {
            input_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count,
            total_tokens: u
                .total_token_count
                .max(u.prompt_token_count + u.candidates_token_count),
        }
    }
}

fn first_content(r: &GenerateContentResponse) -> Option<&Content> {
    r.candidates.first().and_then(|c| c.content.as_ref())
}

fn function_calls(r: &GenerateContentResponse) -> impl Iterator<Item = &FunctionCall> {
    first_content(r)
        .into_iter()
        .flat_map(|c| c.parts.iter())
        .filter_map(|p| p.function_call.as_ref())
}

/// Resolve local `$ref`s against `$defs`; the function-declaration schema
/// dialect has no references.
pub(crate) fn inline_refs(schema: &Value) -> Value {
    let defs = schema
        .get("$defs")
        .or_else(|| schema.get("definitions"))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    resolve(schema, &defs, 0)
}

fn resolve(node: &Value, defs: &Map<String, Value>, depth: usize) -> Value {
    match node {
        Value::Object(obj) => {
            if let Some(target) = obj.get("$ref").and_then(Value::as_str) {
                let name = target.rsplit('/').next().unwrap_or(target);
                return match defs.get(name) {
                    Some(def) if depth < MAX_REF_DEPTH => resolve(def, defs, depth + 1),
                    _ => json!({"type": "object"}),
                };
            }
            let mut out = Map::new();
            for (k, v) in obj {
                match k.as_str() {
                    "$defs" | "definitions" | "$schema" | "title" | "additionalProperties" => {}
                    "properties" => {
                        out.insert(k.clone(), resolve_properties(v, defs, depth));
                    }
                    _ => {
                        out.insert(k.clone(), resolve(v, defs, depth));
                    }
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve(v, defs, depth)).collect()),
        other => other.clone(),
    }
}

/// Keys of a `properties` map are field names, not keywords.
fn resolve_properties(node: &Value, defs: &Map<String, Value>, depth: usize) -> Value {
    match node {
        Value::Object(props) => Value::Object(
            props
                .iter()
                .map(|(name, schema)| (name.clone(), resolve(schema, defs, depth)))
                .collect(),
        ),
        other => resolve(other, defs, depth),
    }
}

fn function_declaration(tool: &Tool) -> Value {
    let def = tool.definition();
    json!({
        "name": def.name,
        "description": def.description,
        "parameters": inline_refs(&def.parameters_schema()),
    })
}

fn native_text(v: &Value) -> Option<String> {
    if let Some(s) = v.get("content").and_then(Value::as_str) {
        return Some(s.to_string());
    }
    v.get("parts").and_then(Value::as_array).map(|parts| {
        parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("")
    })
}

fn content_param(message: &Message) -> Value {
    if let MessageContent::Native(v) = &message.content {
        return v.clone();
    }
    let role = match message.role {
        MessageRole::Assistant => "model",
        _ => "user",
    };
    let parts = match (&message.role, &message.content) {
        (MessageRole::Tool, _) => vec![json!({
            "functionResponse": {
                "name": message
                    .tool_name
                    .clone()
                    .or_else(|| message.tool_call_id.clone())
                    .unwrap_or_default(),
                "response": {"result": message.text()},
            }
        })],
        (_, MessageContent::Text(s)) => vec![json!({"text": s})],
        (_, MessageContent::Blocks(blocks)) => blocks
            .iter()
            .map(|b| match b {
                ContentBlock::Text { text } => json!({"text": text}),
                ContentBlock::Image { source } => json!({
                    "inlineData": {
                        "mimeType": source.media_type.as_deref().unwrap_or("image/png"),
                        "data": source.data,
                    }
                }),
            })
            .collect(),
        (_, MessageContent::Native(v)) => vec![v.clone()],
    };
    json!({"role": role, "parts": parts})
}

/// System prompt and the remaining turns.
fn split_system(messages: &[Message]) -> (Option<String>, Vec<Value>) {
    let mut system = Vec::new();
    let mut contents = Vec::new();
    for m in messages {
        match (&m.role, &m.content) {
            (MessageRole::System, MessageContent::Native(v)) => {
                system.extend(native_text(v));
            }
            (MessageRole::System, _) => system.push(m.text()),
            _ => contents.push(content_param(m)),
        }
    }
    ((!system.is_empty()).then(|| system.join("\n\n")), contents)
}

fn build_body(request: &CallRequest<'_>) -> Value {
    let (system, contents) = split_system(request.messages);
    let mut body = json!({ "contents": contents });
    if let Some(system) = system {
        body["systemInstruction"] = json!({"parts": [{"text": system}]});
    }
    if !request.tools.is_empty() {
        let declarations: Vec<Value> = request.tools.iter().map(function_declaration).collect();
        body["tools"] = json!([{ "functionDeclarations": declarations }]);
    }
    if let Some(name) = request.forced_tool {
        body["toolConfig"] = json!({
            "functionCallingConfig": {"mode": "ANY", "allowedFunctionNames": [name]}
        });
    }

    let mut generation = Map::new();
    if request.json_mode {
        generation.insert("responseMimeType".into(), json!("application/json"));
    }
    for (k, v) in request.call_params {
        if TOP_LEVEL_PARAMS.contains(&k.as_str()) {
            body[k.as_str()] = v.clone();
        } else if k == "generationConfig" {
            if let Value::Object(cfg) = v {
                generation.extend(cfg.clone());
            }
        } else {
            generation.insert(k.clone(), v.clone());
        }
    }
    if !generation.is_empty() {
        body["generationConfig"] = Value::Object(generation);
    }
    body
}

fn call_id(call: &FunctionCall, fallback: impl FnOnce() -> String) -> String {
    call.id
        .clone()
        .unwrap_or_else(|| format!("{}{}", GENERATED_ID_PREFIX, fallback()))
}

fn construct(snapshot: &StreamSnapshot) -> Result<GenerateContentResponse> {
    let mut parts = Vec::new();
    if !snapshot.content.is_empty() {
        parts.push(Part {
            text: Some(snapshot.content.clone()),
            ..Part::default()
        });
    }
    for call in &snapshot.tool_calls {
        parts.push(Part {
            function_call: Some(FunctionCall {
                id: (!call.id.starts_with(GENERATED_ID_PREFIX)).then(|| call.id.clone()),
                name: call.name.clone(),
                args: arguments_value(call)?,
            }),
            ..Part::default()
        });
    }
    Ok(GenerateContentResponse {
        candidates: vec![Candidate {
            content: Some(Content {
                role: Some("model".into()),
                parts,
            }),
            finish_reason: snapshot
                .finish_reasons
                .as_ref()
                .and_then(|r| r.first().cloned()),
            index: Some(0),
        }],
        usage_metadata: snapshot.usage.map(|u| UsageMetadata {
            prompt_token_count: u.input_tokens,
            candidates_token_count: u.output_tokens,
            total_token_count: u.total_tokens,
        }),
        model_version: snapshot.model.clone(),
        response_id: snapshot.id.clone(),
        error: None,
    })
}

fn method(stream: bool) -> &'static str {
    if stream {
        "streamGenerateContent?alt=sse"
    } else {
        "generateContent"
    }
}

fn gemini_endpoint(config: &ProviderConfig, model: &str, stream: bool) -> Result<String> {
    Ok(format!(
        "{}/models/{}:{}",
        config.base_url_or(GEMINI_BASE_URL),
        model,
        method(stream)
    ))
}

fn gemini_auth(config: &ProviderConfig) -> Result<Vec<(String, String)>> {
    let key = require_api_key(Gemini::NAME, config)?;
    Ok(vec![("x-goog-api-key".to_string(), key.to_string())])
}

fn vertex_endpoint(config: &ProviderConfig, model: &str, stream: bool) -> Result<String> {
    let project = config.project.as_deref().ok_or_else(|| {
        Error::configuration("Vertex AI needs a project; set VERTEX_PROJECT or configure one")
    })?;
    let location = config.location.as_deref().unwrap_or(VERTEX_DEFAULT_LOCATION);
    let base = config.base_url_or(&format!("https://{}-aiplatform.googleapis.com/v1", location));
    Ok(format!(
        "{}/projects/{}/locations/{}/publishers/google/models/{}:{}",
        base,
        project,
        location,
        model,
        method(stream)
    ))
}

fn vertex_auth(config: &ProviderConfig) -> Result<Vec<(String, String)>> {
    let token = require_api_key(Vertex::NAME, config)?;
    Ok(vec![("authorization".to_string(), format!("Bearer {}", token))])
}

macro_rules! generate_content_api {
    (
        $(#[$meta:meta])*
        $provider:ident, $name:literal, $env:literal, endpoint: $endpoint:path, auth: $auth:path
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $provider;

        impl Provider for $provider {
            const NAME: &'static str = $name;
            const ENV_PREFIX: &'static str = $env;

            type Response = GenerateContentResponse;
            type Chunk = GenerateContentResponse;

            fn endpoint(config: &ProviderConfig, model: &str, stream: bool) -> Result<String> {
                $endpoint(config, model, stream)
            }

            fn auth_headers(config: &ProviderConfig) -> Result<Vec<(String, String)>> {
                $auth(config)
            }

            fn message_params(messages: &[Message]) -> Vec<Value> {
                let (system, mut contents) = split_system(messages);
                if let Some(system) = system {
                    contents.insert(0, json!({"role": "system", "parts": [{"text": system}]}));
                }
                contents
            }

            fn build_body(request: &CallRequest<'_>) -> Result<Value> {
                Ok(build_body(request))
            }

            fn content(r: &GenerateContentResponse) -> String {
                first_content(r)
                    .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
                    .unwrap_or_default()
            }

            fn finish_reasons(r: &GenerateContentResponse) -> Option<Vec<String>> {
                let reasons: Vec<String> = r
                    .candidates
                    .iter()
                    .filter_map(|c| c.finish_reason.clone())
                    .collect();
                (!reasons.is_empty()).then_some(reasons)
            }

            fn model(r: &GenerateContentResponse) -> Option<String> {
                r.model_version.clone()
            }

            fn id(r: &GenerateContentResponse) -> Option<String> {
                r.response_id.clone()
            }

            fn usage(r: &GenerateContentResponse) -> Option<Usage> {
                r.usage_metadata.map(Usage::from)
            }

            fn message_param(r: &GenerateContentResponse) -> Value {
                first_content(r)
                    .and_then(|c| serde_json::to_value(c).ok())
                    .unwrap_or_else(|| json!({"role": "model", "parts": []}))
            }

            fn tool_calls(r: &GenerateContentResponse) -> Vec<ToolCall> {
                function_calls(r)
                    .enumerate()
                    .map(|(i, fc)| {
                        ToolCall::new(call_id(fc, || i.to_string()), &fc.name, fc.args.to_string())
                            .with_raw(serde_json::to_value(fc).unwrap_or(Value::Null))
                    })
                    .collect()
            }

            fn tool_message_params(results: &[(ToolCallInstance, Value)]) -> Vec<Value> {
                if results.is_empty() {
                    return Vec::new();
                }
                let parts: Vec<Value> = results
                    .iter()
                    .map(|(call, output)| {
                        let response = match output {
                            Value::Object(_) => output.clone(),
                            other => json!({"result": output_text(other)}),
                        };
                        json!({"functionResponse": {"name": call.name(), "response": response}})
                    })
                    .collect();
                vec![json!({"role": "user", "parts": parts})]
            }

            fn chunk_content(c: &GenerateContentResponse) -> String {
                Self::content(c)
            }

            fn chunk_finish_reasons(c: &GenerateContentResponse) -> Option<Vec<String>> {
                Self::finish_reasons(c)
            }

            fn chunk_model(c: &GenerateContentResponse) -> Option<String> {
                Self::model(c)
            }

            fn chunk_id(c: &GenerateContentResponse) -> Option<String> {
                Self::id(c)
            }

            fn chunk_usage(c: &GenerateContentResponse) -> Option<Usage> {
                Self::usage(c)
            }

            fn chunk_tool_deltas(c: &GenerateContentResponse) -> Vec<ToolCallDelta> {
                // Calls arrive complete and unindexed; the stream numbers id-less ones.
                function_calls(c)
                    .map(|fc| ToolCallDelta {
                        index: None,
                        id: fc.id.clone(),
                        name: Some(fc.name.clone()),
                        arguments: fc.args.to_string(),
                    })
                    .collect()
            }

            fn fallback_call_id(position: usize) -> String {
                format!("{}{}", GENERATED_ID_PREFIX, position)
            }

            fn chunk_error(c: &GenerateContentResponse) -> Option<String> {
                c.error
                    .as_ref()
                    .map(|e| format!("{} ({}): {}", e.status, e.code, e.message))
            }

            fn construct_response(snapshot: &StreamSnapshot) -> Result<GenerateContentResponse> {
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

generate_content_api!(
    /// Gemini API (`GEMINI_API_KEY`).
    Gemini, "gemini", "GEMINI", endpoint: gemini_endpoint, auth: gemini_auth
);

generate_content_api!(
    /// Gemini models on Vertex AI (`VERTEX_API_KEY` access token, `VERTEX_PROJECT`,
    /// `VERTEX_LOCATION`).
    Vertex, "vertex", "VERTEX", endpoint: vertex_endpoint, auth: vertex_auth
);

/// Start a Gemini call.
pub fn call(model: impl Into<String>) -> CallBuilder<Gemini> {
    Gemini::call(model)
}

pub mod vertex {
    use super::{CallBuilder, Vertex};

    /// Start a Vertex AI call.
    pub fn call(model: impl Into<String>) -> CallBuilder<Vertex> {
        Vertex::call(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;

    fn response() -> GenerateContentResponse {
        serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"text": "Here you go."},
                        {"functionCall": {"name": "FormatBook", "args": {"title": "Dune"}}}
                    ]
                },
                "finishReason": "STOP",
                "index": 0,
                "safetyRatings": []
            }],
            "usageMetadata": {"promptTokenCount": 8, "candidatesTokenCount": 4, "totalTokenCount": 12},
            "modelVersion": "gemini-1.5-flash-001",
            "responseId": "resp-1"
        }))
        .unwrap()
    }

    #[test]
    fn test_response_accessors() {
        let r = response();
        assert_eq!(Gemini::content(&r), "Here you go.");
        assert_eq!(Gemini::finish_reasons(&r), Some(vec!["STOP".to_string()]));
        assert_eq!(Gemini::usage(&r), Some(Usage::new(8, 4)));
        assert_eq!(Gemini::model(&r).as_deref(), Some("gemini-1.5-flash-001"));
        let calls = Gemini::tool_calls(&r);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "gemini_call_0");
        assert_eq!(calls[0].name, "FormatBook");
        assert_eq!(Gemini::message_param(&r)["role"], "model");
    }

    #[test]
    fn test_build_body() {
        let messages = vec![
            Message::system("Be brief."),
            Message::user("Hi"),
            Message::assistant("Hello!"),
        ];
        let mut params = Map::new();
        params.insert("temperature".into(), json!(0.4));
        params.insert("safetySettings".into(), json!([]));
        let body = Gemini::build_body(&CallRequest {
            model: "gemini-1.5-flash",
            messages: &messages,
            tools: &[],
            call_params: &params,
            forced_tool: Some("FormatBook"),
            json_mode: true,
            stream: false,
        })
        .unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be brief.");
        assert_eq!(body["contents"].as_array().unwrap().len(), 2);
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["generationConfig"]["temperature"], 0.4);
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["safetySettings"], json!([]));
        assert_eq!(
            body["toolConfig"]["functionCallingConfig"]["allowedFunctionNames"],
            json!(["FormatBook"])
        );
    }

    #[test]
    fn test_tool_message_uses_tool_name() {
        let params = Gemini::message_params(&[
            Message::tool("gemini_call_0", "Dune by Frank Herbert").with_tool_name("FormatBook")
        ]);
        let response = &params[0]["parts"][0]["functionResponse"];
        assert_eq!(response["name"], "FormatBook");
        assert_eq!(response["response"]["result"], "Dune by Frank Herbert");
    }

    #[test]
    fn test_endpoints() {
        let cfg = ProviderConfig::new().with_api_key("g");
        assert_eq!(
            Gemini::endpoint(&cfg, "gemini-1.5-flash", true).unwrap(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:streamGenerateContent?alt=sse"
        );
        assert!(Vertex::endpoint(&cfg, "gemini-1.5-pro", false).is_err());
        let vcfg = cfg.with_project("proj").with_location("europe-west4");
        assert_eq!(
            Vertex::endpoint(&vcfg, "gemini-1.5-pro", false).unwrap(),
            "https://europe-west4-aiplatform.googleapis.com/v1/projects/proj/locations/europe-west4/publishers/google/models/gemini-1.5-pro:generateContent"
        );
        assert_eq!(Vertex::auth_headers(&vcfg).unwrap()[0].1, "Bearer g");
    }

    #[derive(JsonSchema)]
    #[allow(dead_code)]
    struct Author {
        first_name: String,
        last_name: String,
    }

    #[test]
    fn test_function_declaration_inlines_refs() {
        let tool = Tool::function("format_book")
            .docstring("Formats a book.\n\nArgs:\n    title: The title.\n    author: The author.")
            .param::<String>("title")
            .param::<Author>("author")
            .build()
            .unwrap();
        let decl = function_declaration(&tool);
        let params = &decl["parameters"];
        assert!(params.get("$defs").is_none());
        assert_eq!(params["properties"]["title"]["type"], "string");
        assert_eq!(params["properties"]["author"]["type"], "object");
        assert!(params["properties"]["author"]["properties"]["first_name"].is_object());
        assert!(!params.to_string().contains("$ref"));
    }

    #[test]
    fn test_streamed_call_ids_match_rebuilt_response() {
        use crate::response::CallContext;
        use crate::stream::Stream;

        let chunk = |text: &str| {
            json!({"candidates": [{"content": {"role": "model", "parts": [
                {"text": text},
                {"functionCall": {"name": "Ping", "args": {}}}
            ]}}]})
        };
        let ping = Tool::function("ping").docstring("Checks the service.").build().unwrap();
        let mut stream: Stream<Gemini> = Stream::new(
            Box::new(vec![chunk("a"), chunk("b")].into_iter().map(Ok)),
            CallContext::new("gemini-1.5-flash").with_tools(vec![ping]),
        );
        let yielded: Vec<String> = stream
            .by_ref()
            .filter_map(|item| item.unwrap().1)
            .map(|tool| tool.id().to_string())
            .collect();
        assert_eq!(yielded, vec!["gemini_call_0", "gemini_call_1"]);

        let rebuilt = stream.construct_call_response().unwrap();
        let ids: Vec<_> = rebuilt.tool_calls().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, yielded);
    }

    #[test]
    fn test_construct_response_matches_direct_response() {
        let direct = response();
        let snapshot = StreamSnapshot {
            content: "Here you go.".into(),
            finish_reasons: Some(vec!["STOP".into()]),
            model: Some("gemini-1.5-flash-001".into()),
            id: Some("resp-1".into()),
            usage: Some(Usage::new(8, 4)),
            tool_calls: vec![ToolCall::new("gemini_call_5f2c", "FormatBook", r#"{"title":"Dune"}"#)],
        };
        let rebuilt = Gemini::construct_response(&snapshot).unwrap();
        assert_eq!(rebuilt, direct);
        assert_eq!(Gemini::message_param(&rebuilt), Gemini::message_param(&direct));
    }

    #[test]
    fn test_stream_error_chunk() {
        let chunk: GenerateContentResponse = serde_json::from_value(json!({
            "error": {"code": 429, "message": "Resource exhausted", "status": "RESOURCE_EXHAUSTED"}
        }))
        .unwrap();
        assert_eq!(
            Gemini::chunk_error(&chunk).as_deref(),
            Some("RESOURCE_EXHAUSTED (429): Resource exhausted")
        );
    }
}

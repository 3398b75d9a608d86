//! Provider-agnostic message format used by prompt templates and dynamic configuration.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Unified message structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: MessageContent,
    /// Id of the tool call this message answers (role `tool` only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Name of the tool that produced the result (role `tool` only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self::with_content(MessageRole::System, MessageContent::Text(text.into()))
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::with_content(MessageRole::User, MessageContent::Text(text.into()))
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_content(MessageRole::Assistant, MessageContent::Text(text.into()))
    }

    pub fn tool(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: MessageContent::Text(text.into()),
            tool_call_id: Some(tool_call_id.into()),
            tool_name: None,
        }
    }

    /// Providers that key results by function name (Gemini, Cohere) need this.
    pub fn with_tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name = Some(name.into());
        self
    }

    /// A message already in a provider's native shape (e.g. a previous
    /// `CallResponse::message_param()`). It is sent verbatim.
    pub fn native(param: Value) -> Self {
        let role = match param.get("role").and_then(Value::as_str) {
            Some("system") | Some("SYSTEM") => MessageRole::System,
            Some("user") | Some("USER") => MessageRole::User,
            Some("tool") | Some("TOOL") => MessageRole::Tool,
            _ => MessageRole::Assistant,
        };
        Self::with_content(role, MessageContent::Native(param))
    }

    pub fn with_content(role: MessageRole, content: MessageContent) -> Self {
        Self {
            role,
            content,
            tool_call_id: None,
            tool_name: None,
        }
    }

    /// Plain text of the message, concatenating text blocks.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Blocks(bs) => bs
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
            MessageContent::Native(_) => String::new(),
        }
    }

    pub fn contains_image(&self) -> bool {
        match &self.content {
            MessageContent::Blocks(bs) => {
                bs.iter().any(|b| matches!(b, ContentBlock::Image { .. }))
            }
            _ => false,
        }
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }
}

/// Message content (can be string, array of content blocks, or a native provider message)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
    Native(Value),
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        MessageContent::Text(text.into())
    }

    pub fn blocks(blocks: Vec<ContentBlock>) -> Self {
        MessageContent::Blocks(blocks)
    }
}

/// Content block (for multimodal user messages)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image { source: ImageSource },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub data: String, // base64 encoded
}

impl ImageSource {
    /// `data:` URL form used by OpenAI-style APIs.
    pub fn data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.media_type.as_deref().unwrap_or("image/png"),
            self.data
        )
    }
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn image_base64(data: String, media_type: Option<String>) -> Self {
        ContentBlock::Image {
            source: ImageSource { media_type, data },
        }
    }

    pub fn image_from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let media_type = guess_media_type(path);
        let data = base64::engine::general_purpose::STANDARD.encode(bytes);
        Ok(Self::image_base64(data, media_type))
    }
}

fn guess_media_type(path: &Path) -> Option<String> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();
    let mt = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => return None,
    };
    Some(mt.to_string())
}

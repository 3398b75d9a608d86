//! Provider-neutral wrappers over one completion and one streamed chunk.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`CallContext`] | What was sent: model, messages, tools, params, price table |
//! | [`CallResponse`] | A complete provider response plus its context |
//! | [`CallResponseChunk`] | One streamed chunk of a provider response |

use crate::providers::Provider;
use crate::tokens::PriceTable;
use crate::tools::{Tool, ToolCallInstance};
use crate::types::tool::{ToolCall, ToolCallDelta};
use crate::types::{Message, MessageRole, Usage};
use crate::Result;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Inputs of one call, carried by its response or stream.
#[derive(Clone)]
pub struct CallContext {
    pub(crate) model: String,
    pub(crate) messages: Vec<Message>,
    pub(crate) tools: Vec<Tool>,
    pub(crate) call_params: Map<String, Value>,
    pub(crate) prompt_template: Option<String>,
    pub(crate) fn_args: Map<String, Value>,
    pub(crate) metadata: Map<String, Value>,
    pub(crate) price_table: Arc<PriceTable>,
    pub(crate) started: Instant,
}

impl CallContext {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            tools: Vec::new(),
            call_params: Map::new(),
            prompt_template: None,
            fn_args: Map::new(),
            metadata: Map::new(),
            price_table: PriceTable::builtin(),
            started: Instant::now(),
        }
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_call_params(mut self, params: Map<String, Value>) -> Self {
        self.call_params = params;
        self
    }

    pub fn with_price_table(mut self, table: Arc<PriceTable>) -> Self {
        self.price_table = table;
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub(crate) fn with_template(mut self, template: Option<String>, args: Map<String, Value>) -> Self {
        self.prompt_template = template;
        self.fn_args = args;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn call_params(&self) -> &Map<String, Value> {
        &self.call_params
    }

    pub fn prompt_template(&self) -> Option<&str> {
        self.prompt_template.as_deref()
    }

    /// Template arguments as JSON.
    pub fn fn_args(&self) -> &Map<String, Value> {
        &self.fn_args
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn price_table(&self) -> &PriceTable {
        &self.price_table
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Cost of `usage` for the reported model, falling back to the requested one.
    pub(crate) fn cost<P: Provider>(&self, model: Option<&str>, usage: Option<&Usage>) -> Option<f64> {
        let usage = usage?;
        self.price_table
            .cost(P::NAME, model.unwrap_or(&self.model), usage)
    }

    /// Resolve tool calls against the call's tools. Calls naming an unknown tool
    /// are skipped.
    pub(crate) fn resolve_tools(&self, calls: &[ToolCall]) -> Result<Vec<ToolCallInstance>> {
        calls
            .iter()
            .filter_map(|call| {
                self.tools
                    .iter()
                    .find(|t| t.name() == call.name)
                    .map(|tool| tool.from_tool_call(call))
            })
            .collect()
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("model", &self.model)
            .field("messages", &self.messages.len())
            .field("tools", &self.tools.iter().map(Tool::name).collect::<Vec<_>>())
            .field("call_params", &self.call_params)
            .finish()
    }
}

/// A complete provider response.
pub struct CallResponse<P: Provider> {
    response: P::Response,
    context: CallContext,
    duration: Duration,
}

impl<P: Provider> CallResponse<P> {
    pub fn new(response: P::Response, context: CallContext) -> Self {
        let duration = context.elapsed();
        Self {
            response,
            context,
            duration,
        }
    }

    pub(crate) fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// The provider's own response.
    pub fn response(&self) -> &P::Response {
        &self.response
    }

    pub fn into_response(self) -> P::Response {
        self.response
    }

    pub fn context(&self) -> &CallContext {
        &self.context
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Primary text; empty when there is none.
    pub fn content(&self) -> String {
        P::content(&self.response)
    }

    pub fn finish_reasons(&self) -> Option<Vec<String>> {
        P::finish_reasons(&self.response)
    }

    /// Model reported by the provider, else the one requested.
    pub fn model(&self) -> Option<String> {
        P::model(&self.response).or_else(|| Some(self.context.model.clone()))
    }

    pub fn id(&self) -> Option<String> {
        P::id(&self.response)
    }

    pub fn usage(&self) -> Option<Usage> {
        P::usage(&self.response)
    }

    pub fn input_tokens(&self) -> Option<u64> {
        self.usage().map(|u| u.input_tokens)
    }

    pub fn output_tokens(&self) -> Option<u64> {
        self.usage().map(|u| u.output_tokens)
    }

    /// `None` without usage or for a model missing from the price table.
    pub fn cost(&self) -> Option<f64> {
        self.context
            .cost::<P>(P::model(&self.response).as_deref(), self.usage().as_ref())
    }

    /// Assistant turn in native shape, ready for the next call's history.
    pub fn message_param(&self) -> Value {
        P::message_param(&self.response)
    }

    /// Messages that were sent, in native shape.
    pub fn message_params(&self) -> Vec<Value> {
        P::message_params(&self.context.messages)
    }

    /// The last user message that was sent.
    pub fn user_message_param(&self) -> Option<Value> {
        self.context
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .and_then(|m| P::message_params(std::slice::from_ref(m)).into_iter().next())
    }

    pub fn tool_calls(&self) -> Vec<ToolCall> {
        P::tool_calls(&self.response)
    }

    /// Tool calls resolved against the call's tools.
    pub fn tools(&self) -> Result<Vec<ToolCallInstance>> {
        self.context.resolve_tools(&self.tool_calls())
    }

    /// First resolved tool call.
    pub fn tool(&self) -> Result<Option<ToolCallInstance>> {
        Ok(self.tools()?.into_iter().next())
    }

    /// Native messages returning tool outputs to the model.
    pub fn tool_message_params(results: &[(ToolCallInstance, Value)]) -> Vec<Value> {
        P::tool_message_params(results)
    }
}

impl<P: Provider> Clone for CallResponse<P> {
    fn clone(&self) -> Self {
        Self {
            response: self.response.clone(),
            context: self.context.clone(),
            duration: self.duration,
        }
    }
}

impl<P: Provider> fmt::Debug for CallResponse<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallResponse")
            .field("provider", &P::NAME)
            .field("response", &self.response)
            .field("context", &self.context)
            .finish()
    }
}

/// One streamed chunk.
pub struct CallResponseChunk<P: Provider> {
    chunk: P::Chunk,
}

impl<P: Provider> CallResponseChunk<P> {
    pub fn new(chunk: P::Chunk) -> Self {
        Self { chunk }
    }

    pub fn chunk(&self) -> &P::Chunk {
        &self.chunk
    }

    /// Text delta; empty for chunks without one.
    pub fn content(&self) -> String {
        P::chunk_content(&self.chunk)
    }

    pub fn finish_reasons(&self) -> Option<Vec<String>> {
        P::chunk_finish_reasons(&self.chunk)
    }

    pub fn model(&self) -> Option<String> {
        P::chunk_model(&self.chunk)
    }

    pub fn id(&self) -> Option<String> {
        P::chunk_id(&self.chunk)
    }

    pub fn usage(&self) -> Option<Usage> {
        P::chunk_usage(&self.chunk)
    }

    pub fn input_tokens(&self) -> Option<u64> {
        self.usage().map(|u| u.input_tokens)
    }

    pub fn output_tokens(&self) -> Option<u64> {
        self.usage().map(|u| u.output_tokens)
    }

    pub fn tool_deltas(&self) -> Vec<ToolCallDelta> {
        P::chunk_tool_deltas(&self.chunk)
    }
}

impl<P: Provider> Clone for CallResponseChunk<P> {
    fn clone(&self) -> Self {
        Self {
            chunk: self.chunk.clone(),
        }
    }
}

impl<P: Provider> PartialEq for CallResponseChunk<P> {
    fn eq(&self, other: &Self) -> bool {
        self.chunk == other.chunk
    }
}

impl<P: Provider> fmt::Debug for CallResponseChunk<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CallResponseChunk").field(&self.chunk).finish()
    }
}

use crate::types::tool::{ToolCall, ToolCallDelta};
use crate::{Error, ErrorContext, Result};

/// Collects streamed tool-call fragments into final ToolCall objects.
///
/// Fragments are matched by index, then by call id. A fragment with neither but
/// with a name starts a new call. A call is complete once its concatenated
/// argument string parses as JSON; an empty argument string is read as `{}` when
/// the stream ends. Calls that never receive an id get one from their position.
#[derive(Debug, Clone)]
pub struct ToolCallAssembler {
    calls: Vec<PendingToolCall>,
    fallback_id: fn(usize) -> String,
}

impl Default for ToolCallAssembler {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            fallback_id: default_call_id,
        }
    }
}

fn default_call_id(position: usize) -> String {
    format!("call_{}", position)
}

#[derive(Debug, Clone)]
struct PendingToolCall {
    index: Option<u32>,
    id: String,
    name: String,
    arguments: String,
    reported: bool,
}

impl PendingToolCall {
    fn parsed_arguments(&self) -> Option<String> {
        let trimmed = self.arguments.trim();
        if trimmed.is_empty() {
            return None;
        }
        serde_json::from_str::<serde_json::Value>(trimmed)
            .ok()
            .map(|_| trimmed.to_string())
    }

    fn to_tool_call(&self, id: impl FnOnce() -> String, arguments: String) -> ToolCall {
        let id = if self.id.is_empty() { id() } else { self.id.clone() };
        ToolCall::new(id, self.name.clone(), arguments)
    }
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids for calls the provider streams without one, by position.
    pub fn with_fallback_id(mut self, fallback_id: fn(usize) -> String) -> Self {
        self.fallback_id = fallback_id;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Apply one fragment and return the position of the call it belongs to.
    pub fn on_delta(&mut self, delta: &ToolCallDelta) -> usize {
        let existing = match (delta.index, delta.id.as_deref()) {
            (Some(index), _) => self.calls.iter().position(|c| c.index == Some(index)),
            (None, Some(id)) if !id.is_empty() => self.calls.iter().position(|c| c.id == id),
            (None, _) if delta.name.as_deref().is_some_and(|n| !n.is_empty()) => None,
            (None, _) => self.calls.len().checked_sub(1),
        };

        let pos = match existing {
            Some(pos) => pos,
            None => {
                self.calls.push(PendingToolCall {
                    index: delta.index,
                    id: String::new(),
                    name: String::new(),
                    arguments: String::new(),
                    reported: false,
                });
                self.calls.len() - 1
            }
        };

        let call = &mut self.calls[pos];
        if let Some(id) = delta.id.as_deref().filter(|s| !s.is_empty()) {
            if call.id.is_empty() {
                call.id = id.to_string();
            }
        }
        if let Some(name) = delta.name.as_deref().filter(|s| !s.is_empty()) {
            if call.name.is_empty() {
                call.name = name.to_string();
            }
        }
        call.arguments.push_str(&delta.arguments);
        pos
    }

    /// Arguments accumulated so far for the call at `pos`.
    pub fn arguments(&self, pos: usize) -> Option<&str> {
        self.calls.get(pos).map(|c| c.arguments.as_str())
    }

    /// Returns the call at `pos` the first time its arguments become valid JSON.
    pub fn take_completed(&mut self, pos: usize) -> Option<ToolCall> {
        let fallback_id = self.fallback_id;
        let call = self.calls.get_mut(pos)?;
        if call.reported {
            return None;
        }
        let args = call.parsed_arguments()?;
        call.reported = true;
        Some(call.to_tool_call(|| fallback_id(pos), args))
    }

    /// At end of stream: report every unreported call whose arguments are empty
    /// (read as `{}`) or now parse.
    pub fn take_remaining(&mut self) -> Vec<ToolCall> {
        let fallback_id = self.fallback_id;
        let mut out = Vec::new();
        for (pos, call) in self.calls.iter_mut().enumerate() {
            if call.reported {
                continue;
            }
            let args = if call.arguments.trim().is_empty() {
                Some("{}".to_string())
            } else {
                call.parsed_arguments()
            };
            if let Some(args) = args {
                call.reported = true;
                out.push(call.to_tool_call(|| fallback_id(pos), args));
            }
        }
        out
    }

    /// All calls with their arguments exactly as accumulated, empty read as `{}`.
    pub fn accumulated(&self) -> Vec<ToolCall> {
        self.calls
            .iter()
            .enumerate()
            .map(|(pos, call)| {
                let args = call.arguments.trim();
                let args = if args.is_empty() { "{}" } else { args };
                call.to_tool_call(|| (self.fallback_id)(pos), args.to_string())
            })
            .collect()
    }

    /// All calls with their final argument strings.
    ///
    /// Fails when any call's arguments never became valid JSON.
    pub fn finalize(&self) -> Result<Vec<ToolCall>> {
        self.calls
            .iter()
            .enumerate()
            .map(|(i, call)| {
                if call.arguments.trim().is_empty() {
                    return Ok(call.to_tool_call(|| (self.fallback_id)(i), "{}".to_string()));
                }
                call.parsed_arguments()
                    .map(|args| call.to_tool_call(|| (self.fallback_id)(i), args))
                    .ok_or_else(|| {
                        Error::data_integrity_with_context(
                            format!(
                                "streamed arguments for tool call `{}` never formed valid JSON",
                                call.name
                            ),
                            ErrorContext::new()
                                .with_field_path(format!("tool_calls[{}].arguments", i))
                                .with_details(call.arguments.clone())
                                .with_source("stream"),
                        )
                    })
            })
            .collect()
    }
}

//! Pull-based streams over provider chunks.
//!
//! A stream moves `NotStarted → Consuming → Exhausted`. Every pull yields one
//! chunk, paired with a tool call whenever that chunk completed one. Usage, cost
//! and the assistant message param are only available once the stream is
//! exhausted; `construct_call_response()` then replays what was accumulated into
//! the provider's non-streamed response shape.
//!
//! A provider error (transport failure or an error event inside the stream) is
//! yielded once as `Err` and ends the stream; it never reaches `Exhausted`.

use crate::providers::{Provider, StreamSnapshot};
use crate::response::{CallContext, CallResponse, CallResponseChunk};
use crate::telemetry::{CallKind, CallObserver, CallRecord};
use crate::tools::ToolCallInstance;
use crate::transport::ValueIter;
use crate::types::{ToolCall, Usage};
use crate::utils::{repair_partial_json, ToolCallAssembler};
use crate::{BoxStream, Error, Result};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    NotStarted,
    Consuming,
    Exhausted,
}

/// One pull: the chunk and the tool call it completed, if any.
pub type StreamItem<P> = (CallResponseChunk<P>, Option<ToolCallInstance>);

/// A queued pull. `repeat` marks a chunk already handed out with another tool.
struct Pending<P: Provider> {
    item: StreamItem<P>,
    repeat: bool,
}

impl<P: Provider> Pending<P> {
    fn first(item: StreamItem<P>) -> Self {
        Self { item, repeat: false }
    }

    fn repeat(item: StreamItem<P>) -> Self {
        Self { item, repeat: true }
    }
}

/// Stream bookkeeping shared by the blocking and async streams.
struct Accumulator<P: Provider> {
    state: StreamState,
    content: String,
    finish_reasons: Option<Vec<String>>,
    model: Option<String>,
    id: Option<String>,
    usage: Option<Usage>,
    tools: ToolCallAssembler,
    pending: VecDeque<Pending<P>>,
    last_chunk: Option<CallResponseChunk<P>>,
    context: CallContext,
    observer: Option<Arc<dyn CallObserver>>,
    kind: CallKind,
    duration: Option<Duration>,
}

impl<P: Provider> Accumulator<P> {
    fn new(context: CallContext) -> Self {
        Self {
            state: StreamState::NotStarted,
            content: String::new(),
            finish_reasons: None,
            model: None,
            id: None,
            usage: None,
            tools: ToolCallAssembler::new().with_fallback_id(P::fallback_call_id),
            pending: VecDeque::new(),
            last_chunk: None,
            context,
            observer: None,
            kind: CallKind::Stream,
            duration: None,
        }
    }

    fn on_value(&mut self, value: Value) -> Result<()> {
        self.state = StreamState::Consuming;
        let raw: P::Chunk = serde_json::from_value(value)?;
        if let Some(message) = P::chunk_error(&raw) {
            tracing::warn!(provider = P::NAME, %message, "provider reported an error mid-stream");
            return Err(Error::Remote {
                provider: P::NAME.to_string(),
                status: 0,
                message,
            });
        }
        let chunk = CallResponseChunk::<P>::new(raw);

        self.content.push_str(&chunk.content());
        if let Some(reasons) = chunk.finish_reasons() {
            self.finish_reasons = Some(reasons);
        }
        if let Some(model) = chunk.model() {
            self.model = Some(model);
        }
        if let Some(id) = chunk.id() {
            self.id = Some(id);
        }
        if let Some(usage) = chunk.usage() {
            self.usage = Some(P::merge_usage(self.usage, usage));
        }

        let mut touched: Vec<usize> = Vec::new();
        for delta in chunk.tool_deltas() {
            let pos = self.tools.on_delta(&delta);
            if !touched.contains(&pos) {
                touched.push(pos);
            }
        }
        let completed: Vec<ToolCall> = touched
            .into_iter()
            .filter_map(|pos| self.tools.take_completed(pos))
            .collect();
        let mut instances = self.context.resolve_tools(&completed)?.into_iter();
        self.pending
            .push_back(Pending::first((chunk.clone(), instances.next())));
        for instance in instances {
            self.pending
                .push_back(Pending::repeat((chunk.clone(), Some(instance))));
        }
        self.last_chunk = Some(chunk);
        Ok(())
    }

    /// Source ended: flush calls whose arguments only resolved at the end and
    /// mark the stream exhausted.
    fn on_end(&mut self) -> Result<()> {
        self.state = StreamState::Exhausted;
        self.duration = Some(self.context.elapsed());

        let remaining = self.tools.take_remaining();
        let instances = self.context.resolve_tools(&remaining)?;
        if let Some(chunk) = &self.last_chunk {
            for instance in instances {
                self.pending
                    .push_back(Pending::repeat((chunk.clone(), Some(instance))));
            }
        }

        tracing::info!(
            provider = P::NAME,
            model = %self.model.as_deref().unwrap_or(&self.context.model),
            input_tokens = self.usage.map(|u| u.input_tokens),
            output_tokens = self.usage.map(|u| u.output_tokens),
            duration_ms = self.context.elapsed().as_millis() as u64,
            "stream exhausted"
        );
        if let Some(observer) = &self.observer {
            observer.on_record(&self.record());
        }
        Ok(())
    }

    fn record(&self) -> CallRecord {
        CallRecord {
            kind: self.kind,
            provider: P::NAME,
            model: self.model.clone().unwrap_or_else(|| self.context.model.clone()),
            id: self.id.clone(),
            content: self.content.clone(),
            finish_reasons: self.finish_reasons.clone(),
            usage: self.usage,
            cost: self.cost(),
            tool_calls: self.recorded_tool_calls(),
            duration: self.duration.unwrap_or_default(),
            prompt_template: self.context.prompt_template.clone(),
            metadata: self.context.metadata.clone(),
        }
    }

    /// Final tool calls, or the raw accumulated ones when some arguments never parsed.
    fn recorded_tool_calls(&self) -> Vec<ToolCall> {
        match self.tools.finalize() {
            Ok(calls) => calls,
            Err(e) => {
                tracing::warn!(provider = P::NAME, error = %e, "recording unparsed tool call arguments");
                self.tools.accumulated()
            }
        }
    }

    fn exhausted(&self) -> bool {
        self.state == StreamState::Exhausted
    }

    fn usage(&self) -> Option<Usage> {
        self.exhausted().then_some(self.usage).flatten()
    }

    fn cost(&self) -> Option<f64> {
        if !self.exhausted() {
            return None;
        }
        self.context
            .cost::<P>(self.model.as_deref(), self.usage.as_ref())
    }

    fn construct_response(&self) -> Result<CallResponse<P>> {
        if !self.exhausted() {
            return Err(Error::runtime(
                "construct_call_response() requires an exhausted stream",
            ));
        }
        let snapshot = StreamSnapshot {
            content: self.content.clone(),
            finish_reasons: self.finish_reasons.clone(),
            model: self.model.clone(),
            id: self.id.clone(),
            usage: self.usage,
            tool_calls: self.tools.finalize()?,
        };
        let response = P::construct_response(&snapshot)?;
        let mut rebuilt = CallResponse::new(response, self.context.clone());
        if let Some(duration) = self.duration {
            rebuilt = rebuilt.with_duration(duration);
        }
        Ok(rebuilt)
    }

    fn message_param(&self) -> Option<Value> {
        self.construct_response().ok().map(|r| r.message_param())
    }
}

macro_rules! accumulated_accessors {
    () => {
        pub fn state(&self) -> StreamState {
            self.acc.state
        }

        pub fn context(&self) -> &CallContext {
            &self.acc.context
        }

        /// Content received so far.
        pub fn content(&self) -> &str {
            &self.acc.content
        }

        pub fn finish_reasons(&self) -> Option<&[String]> {
            self.acc.finish_reasons.as_deref()
        }

        pub fn model(&self) -> Option<&str> {
            self.acc.model.as_deref()
        }

        pub fn id(&self) -> Option<&str> {
            self.acc.id.as_deref()
        }

        /// `None` until the stream is exhausted.
        pub fn usage(&self) -> Option<Usage> {
            self.acc.usage()
        }

        pub fn input_tokens(&self) -> Option<u64> {
            self.usage().map(|u| u.input_tokens)
        }

        pub fn output_tokens(&self) -> Option<u64> {
            self.usage().map(|u| u.output_tokens)
        }

        /// `None` until the stream is exhausted, or when the model has no price.
        pub fn cost(&self) -> Option<f64> {
            self.acc.cost()
        }

        /// `None` until the stream is exhausted.
        pub fn message_param(&self) -> Option<Value> {
            self.acc.message_param()
        }

        /// The non-streamed response equivalent to everything consumed.
        ///
        /// Fails before exhaustion, and with a data-integrity error when a tool
        /// call's arguments never formed valid JSON.
        pub fn construct_call_response(&self) -> Result<CallResponse<P>> {
            self.acc.construct_response()
        }

        pub(crate) fn with_observer(mut self, observer: Option<Arc<dyn CallObserver>>) -> Self {
            self.acc.observer = observer;
            self
        }

        pub(crate) fn with_kind(mut self, kind: CallKind) -> Self {
            self.acc.kind = kind;
            self
        }
    };
}

/// Blocking stream over a provider response.
pub struct Stream<P: Provider> {
    source: Option<ValueIter>,
    acc: Accumulator<P>,
}

impl<P: Provider> Stream<P> {
    pub fn new(source: ValueIter, context: CallContext) -> Self {
        Self {
            source: Some(source),
            acc: Accumulator::new(context),
        }
    }

    accumulated_accessors!();

    fn next_pending(&mut self) -> Option<Result<Pending<P>>> {
        loop {
            if let Some(pending) = self.acc.pending.pop_front() {
                return Some(Ok(pending));
            }
            let source = self.source.as_mut()?;
            let step = match source.next() {
                Some(Ok(value)) => self.acc.on_value(value),
                Some(Err(e)) => Err(e),
                None => {
                    self.source = None;
                    self.acc.on_end()
                }
            };
            if let Err(e) = step {
                self.source = None;
                return Some(Err(e));
            }
        }
    }
}

impl<P: Provider> Iterator for Stream<P> {
    type Item = Result<StreamItem<P>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_pending().map(|r| r.map(|p| p.item))
    }
}

/// Async stream over a provider response.
pub struct AsyncStream<P: Provider> {
    source: Option<BoxStream<'static, Value>>,
    acc: Accumulator<P>,
}

// Nothing is pinned structurally: the source is already boxed.
impl<P: Provider> Unpin for AsyncStream<P> {}

impl<P: Provider> AsyncStream<P> {
    pub fn new(source: BoxStream<'static, Value>, context: CallContext) -> Self {
        Self {
            source: Some(source),
            acc: Accumulator::new(context),
        }
    }

    accumulated_accessors!();

    fn poll_pending(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Pending<P>>>> {
        loop {
            if let Some(pending) = self.acc.pending.pop_front() {
                return Poll::Ready(Some(Ok(pending)));
            }
            let Some(source) = self.source.as_mut() else {
                return Poll::Ready(None);
            };
            let step = match futures::ready!(source.poll_next_unpin(cx)) {
                Some(Ok(value)) => self.acc.on_value(value),
                Some(Err(e)) => Err(e),
                None => {
                    self.source = None;
                    self.acc.on_end()
                }
            };
            if let Err(e) = step {
                self.source = None;
                return Poll::Ready(Some(Err(e)));
            }
        }
    }
}

impl<P: Provider> futures::Stream for AsyncStream<P> {
    type Item = Result<StreamItem<P>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut()
            .poll_pending(cx)
            .map(|next| next.map(|r| r.map(|p| p.item)))
    }
}

/// Where a structured stream reads its JSON from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JsonSource {
    /// Argument fragments of the forced tool.
    ToolArguments,
    /// Text content (JSON mode).
    Content,
}

/// Rebuilds a value from JSON fragments as they arrive.
struct PartialValue<T> {
    source: JsonSource,
    /// Unwrap the single `value` field of a primitive extraction tool.
    wrapped: bool,
    buffer: String,
    last: Option<Value>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> PartialValue<T> {
    fn new(source: JsonSource, wrapped: bool) -> Self {
        Self {
            source,
            wrapped,
            buffer: String::new(),
            last: None,
            _marker: PhantomData,
        }
    }

    /// The next value, if this chunk changed what the repaired JSON deserializes to.
    fn push<P: Provider>(&mut self, chunk: &CallResponseChunk<P>) -> Option<T> {
        let before = self.buffer.len();
        match self.source {
            JsonSource::ToolArguments => {
                for delta in chunk.tool_deltas() {
                    self.buffer.push_str(&delta.arguments);
                }
            }
            JsonSource::Content => self.buffer.push_str(&chunk.content()),
        }
        if self.buffer.len() == before {
            return None;
        }

        let mut value = repair_partial_json(&self.buffer)?;
        if self.wrapped {
            value = value.get("value").cloned()?;
        }
        if self.last.as_ref() == Some(&value) {
            return None;
        }
        let parsed = serde_json::from_value::<T>(value.clone()).ok()?;
        self.last = Some(value);
        Some(parsed)
    }
}

/// Blocking stream of progressively complete `T` values.
pub struct StructuredStream<P: Provider, T> {
    inner: Stream<P>,
    partial: PartialValue<T>,
}

impl<P: Provider, T: DeserializeOwned> StructuredStream<P, T> {
    pub(crate) fn new(inner: Stream<P>, source: JsonSource, wrapped: bool) -> Self {
        Self {
            inner: inner.with_kind(CallKind::StructuredStream),
            partial: PartialValue::new(source, wrapped),
        }
    }

    /// The underlying chunk stream, for usage and cost after exhaustion.
    pub fn stream(&self) -> &Stream<P> {
        &self.inner
    }
}

impl<P: Provider, T: DeserializeOwned> Iterator for StructuredStream<P, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next_pending()? {
                Ok(pending) if pending.repeat => {}
                Ok(Pending { item: (chunk, _), .. }) => {
                    if let Some(value) = self.partial.push(&chunk) {
                        return Some(Ok(value));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Async stream of progressively complete `T` values.
pub struct AsyncStructuredStream<P: Provider, T> {
    inner: AsyncStream<P>,
    partial: PartialValue<T>,
}

impl<P: Provider, T> Unpin for AsyncStructuredStream<P, T> {}

impl<P: Provider, T: DeserializeOwned> AsyncStructuredStream<P, T> {
    pub(crate) fn new(inner: AsyncStream<P>, source: JsonSource, wrapped: bool) -> Self {
        Self {
            inner: inner.with_kind(CallKind::StructuredStream),
            partial: PartialValue::new(source, wrapped),
        }
    }

    pub fn stream(&self) -> &AsyncStream<P> {
        &self.inner
    }
}

impl<P: Provider, T: DeserializeOwned> futures::Stream for AsyncStructuredStream<P, T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match futures::ready!(this.inner.poll_pending(cx)) {
                Some(Ok(pending)) if pending.repeat => {}
                Some(Ok(Pending { item: (chunk, _), .. })) => {
                    if let Some(value) = this.partial.push(&chunk) {
                        return Poll::Ready(Some(Ok(value)));
                    }
                }
                Some(Err(e)) => return Poll::Ready(Some(Err(e))),
                None => return Poll::Ready(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Anthropic, OpenAi};
    use crate::telemetry::InMemoryObserver;
    use crate::tools::Tool;
    use serde::Deserialize;
    use serde_json::json;

    fn source(values: Vec<Value>) -> ValueIter {
        Box::new(values.into_iter().map(Ok))
    }

    fn openai_chunk(content: Option<&str>, finish: Option<&str>, usage: Option<(u64, u64)>) -> Value {
        let mut chunk = json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "delta": {}, "finish_reason": finish}],
        });
        if let Some(text) = content {
            chunk["choices"][0]["delta"]["content"] = json!(text);
        }
        if let Some((i, o)) = usage {
            chunk["usage"] = json!({"prompt_tokens": i, "completion_tokens": o, "total_tokens": i + o});
        }
        chunk
    }

    fn tool_chunk(index: u32, id: Option<&str>, name: Option<&str>, args: &str) -> Value {
        let mut call = json!({"index": index, "function": {"arguments": args}});
        if let Some(id) = id {
            call["id"] = json!(id);
            call["type"] = json!("function");
        }
        if let Some(name) = name {
            call["function"]["name"] = json!(name);
        }
        json!({
            "id": "chatcmpl-2", "model": "gpt-4o",
            "choices": [{"index": 0, "delta": {"tool_calls": [call]}, "finish_reason": null}]
        })
    }

    fn format_book() -> Tool {
        Tool::function("format_book")
            .docstring(
                "Formats a book.\n\nArgs:\n    title: The title of the book.\n    author: The author.",
            )
            .param::<String>("title")
            .param::<String>("author")
            .build()
            .unwrap()
    }

    #[test]
    fn test_three_chunk_stream() {
        let mut stream: Stream<OpenAi> = Stream::new(
            source(vec![
                openai_chunk(Some("Sure, "), None, None),
                openai_chunk(Some("I recommend..."), None, None),
                openai_chunk(None, Some("stop"), Some((10, 5))),
            ]),
            CallContext::new("gpt-4o-mini"),
        );
        assert_eq!(stream.state(), StreamState::NotStarted);
        assert_eq!(stream.cost(), None);
        assert_eq!(stream.message_param(), None);

        let (first, tool) = stream.next().unwrap().unwrap();
        assert_eq!(first.content(), "Sure, ");
        assert!(tool.is_none());
        assert_eq!(stream.state(), StreamState::Consuming);
        assert_eq!(stream.usage(), None);

        let rest: Vec<_> = stream.by_ref().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(stream.state(), StreamState::Exhausted);
        assert_eq!(stream.content(), "Sure, I recommend...");
        assert_eq!(stream.input_tokens(), Some(10));
        assert_eq!(stream.output_tokens(), Some(5));
        assert_eq!(stream.finish_reasons(), Some(&["stop".to_string()][..]));
        assert!(stream.cost().is_some());
        assert!(stream.message_param().is_some());
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_reconstruction_matches_direct_response() {
        let mut stream: Stream<OpenAi> = Stream::new(
            source(vec![
                openai_chunk(Some("Sure, "), None, None),
                openai_chunk(Some("I recommend..."), Some("stop"), None),
                openai_chunk(None, None, Some((10, 5))),
            ]),
            CallContext::new("gpt-4o-mini"),
        );
        assert!(stream.construct_call_response().is_err());
        for item in stream.by_ref() {
            item.unwrap();
        }
        let rebuilt = stream.construct_call_response().unwrap();
        let direct: CallResponse<OpenAi> = CallResponse::new(
            serde_json::from_value(json!({
                "id": "chatcmpl-1", "model": "gpt-4o-mini",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Sure, I recommend..."},
                             "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
            }))
            .unwrap(),
            CallContext::new("gpt-4o-mini"),
        );
        assert_eq!(rebuilt.content(), direct.content());
        assert_eq!(rebuilt.finish_reasons(), direct.finish_reasons());
        assert_eq!(rebuilt.model(), direct.model());
        assert_eq!(rebuilt.id(), direct.id());
        assert_eq!(rebuilt.usage(), direct.usage());
        assert_eq!(rebuilt.cost(), direct.cost());
        assert_eq!(rebuilt.message_param(), direct.message_param());
        assert_eq!(rebuilt.response(), direct.response());
    }

    #[test]
    fn test_split_tool_arguments_parse_identically() {
        let tool = format_book();
        let mut stream: Stream<OpenAi> = Stream::new(
            source(vec![
                tool_chunk(0, Some("call_1"), Some("FormatBook"), ""),
                tool_chunk(0, None, None, "{\"title\": \"Du"),
                tool_chunk(0, None, None, "ne\", \"author\": "),
                tool_chunk(0, None, None, "\"Frank Herbert\"}"),
            ]),
            CallContext::new("gpt-4o").with_tools(vec![tool.clone()]),
        );
        let items: Vec<_> = stream.by_ref().collect::<Result<Vec<_>>>().unwrap();
        let streamed: Vec<_> = items.into_iter().filter_map(|(_, t)| t).collect();
        assert_eq!(streamed.len(), 1);

        let whole = tool
            .from_tool_call(&ToolCall::new(
                "call_1",
                "FormatBook",
                r#"{"title": "Dune", "author": "Frank Herbert"}"#,
            ))
            .unwrap();
        assert_eq!(streamed[0].arguments(), whole.arguments());
        assert_eq!(streamed[0].id(), "call_1");
    }

    #[test]
    fn test_chunk_completing_two_tools_is_yielded_twice() {
        let both = json!({
            "id": "c", "model": "gpt-4o",
            "choices": [{"index": 0, "finish_reason": null, "delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "\"A\", \"author\": \"B\"}"}},
                {"index": 1, "function": {"arguments": "\"C\", \"author\": \"D\"}"}}
            ]}}]
        });
        let mut stream: Stream<OpenAi> = Stream::new(
            source(vec![
                tool_chunk(0, Some("call_1"), Some("FormatBook"), "{\"title\": "),
                tool_chunk(1, Some("call_2"), Some("FormatBook"), "{\"title\": "),
                both,
            ]),
            CallContext::new("gpt-4o").with_tools(vec![format_book()]),
        );
        let items: Vec<_> = stream.by_ref().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[2].0, items[3].0);
        assert_eq!(items[2].1.as_ref().unwrap().id(), "call_1");
        assert_eq!(items[3].1.as_ref().unwrap().id(), "call_2");
    }

    #[test]
    fn test_unresolved_arguments_fail_reconstruction() {
        let mut stream: Stream<OpenAi> = Stream::new(
            source(vec![tool_chunk(0, Some("call_1"), Some("FormatBook"), "{\"title\": \"Du")]),
            CallContext::new("gpt-4o").with_tools(vec![format_book()]),
        );
        assert_eq!(stream.by_ref().filter(|i| i.is_ok()).count(), 1);
        assert_eq!(stream.state(), StreamState::Exhausted);
        let err = stream.construct_call_response().unwrap_err();
        assert!(matches!(err, Error::DataIntegrity { .. }));
        assert_eq!(stream.message_param(), None);
    }

    #[test]
    fn test_observer_keeps_unparsed_tool_calls() {
        let observer = Arc::new(InMemoryObserver::default());
        let stream: Stream<OpenAi> = Stream::new(
            source(vec![tool_chunk(0, Some("call_1"), Some("FormatBook"), "{\"title\": \"Du")]),
            CallContext::new("gpt-4o").with_tools(vec![format_book()]),
        )
        .with_observer(Some(observer.clone() as Arc<dyn CallObserver>));
        assert_eq!(stream.count(), 1);

        let records = observer.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tool_calls.len(), 1);
        assert_eq!(records[0].tool_calls[0].id, "call_1");
        assert_eq!(records[0].tool_calls[0].arguments, "{\"title\": \"Du");
    }

    #[test]
    fn test_empty_arguments_read_as_empty_object() {
        let ping = Tool::function("ping")
            .docstring("Checks the service.")
            .build()
            .unwrap();
        let mut stream: Stream<OpenAi> = Stream::new(
            source(vec![tool_chunk(0, Some("call_1"), Some("Ping"), "")]),
            CallContext::new("gpt-4o").with_tools(vec![ping]),
        );
        let items: Vec<_> = stream.by_ref().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(items.len(), 2);
        assert!(items[0].1.is_none());
        assert_eq!(items[1].1.as_ref().unwrap().name(), "Ping");
        let rebuilt = stream.construct_call_response().unwrap();
        assert_eq!(rebuilt.tool_calls()[0].arguments, "{}");
    }

    #[test]
    fn test_error_event_ends_stream_before_exhaustion() {
        let observer = Arc::new(InMemoryObserver::default());
        let mut stream: Stream<Anthropic> = Stream::new(
            source(vec![
                json!({"type": "message_start", "message": {"id": "msg_1", "model": "claude-3-haiku-20240307",
                       "content": [], "usage": {"input_tokens": 5, "output_tokens": 1}}}),
                json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}),
                json!({"type": "message_stop"}),
            ]),
            CallContext::new("claude-3-haiku-20240307"),
        )
        .with_observer(Some(observer.clone() as Arc<dyn CallObserver>));
        assert!(stream.next().unwrap().is_ok());
        match stream.next().unwrap() {
            Err(Error::Remote { status, message, .. }) => {
                assert_eq!(status, 0);
                assert!(message.contains("Overloaded"));
            }
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(stream.next().is_none());
        assert_eq!(stream.state(), StreamState::Consuming);
        assert!(observer.is_empty());
    }

    #[test]
    fn test_observer_sees_exhausted_stream() {
        let observer = Arc::new(InMemoryObserver::default());
        let stream: Stream<OpenAi> = Stream::new(
            source(vec![openai_chunk(Some("hi"), Some("stop"), Some((1, 1)))]),
            CallContext::new("gpt-4o-mini"),
        )
        .with_observer(Some(observer.clone() as Arc<dyn CallObserver>));
        assert_eq!(stream.count(), 1);
        let records = observer.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, CallKind::Stream);
        assert_eq!(records[0].content, "hi");
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Book {
        title: String,
        #[serde(default)]
        author: Option<String>,
    }

    #[test]
    fn test_structured_stream_yields_progressive_values() {
        let stream: Stream<OpenAi> = Stream::new(
            source(vec![
                tool_chunk(0, Some("call_1"), Some("Book"), ""),
                tool_chunk(0, None, None, "{\"title\": \"Du"),
                tool_chunk(0, None, None, "ne\", \"auth"),
                tool_chunk(0, None, None, "or\": \"Frank\"}"),
            ]),
            CallContext::new("gpt-4o"),
        );
        let books: Vec<Book> = StructuredStream::new(stream, JsonSource::ToolArguments, false)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(books.first().unwrap().title, "Du");
        assert_eq!(
            books.last().unwrap(),
            &Book {
                title: "Dune".into(),
                author: Some("Frank".into())
            }
        );
    }

    #[test]
    fn test_structured_stream_reads_each_chunk_once() {
        let first = "{\"title\": \"Du";
        let rest = "ne\", \"author\": \"Frank\"}";
        let other = "{\"title\": \"Emma\", \"author\": \"Jane\"}";
        let both = json!({
            "id": "c", "model": "gpt-4o",
            "choices": [{"index": 0, "finish_reason": null, "delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": rest}},
                {"index": 1, "id": "call_2", "type": "function",
                 "function": {"name": "FormatBook", "arguments": other}}
            ]}}]
        });
        let stream: Stream<OpenAi> = Stream::new(
            source(vec![tool_chunk(0, Some("call_1"), Some("FormatBook"), first), both]),
            CallContext::new("gpt-4o").with_tools(vec![format_book()]),
        );
        let mut structured: StructuredStream<OpenAi, Book> =
            StructuredStream::new(stream, JsonSource::ToolArguments, false);
        let books: Vec<Book> = structured.by_ref().collect::<Result<Vec<_>>>().unwrap();

        assert_eq!(books[0].title, "Du");
        assert_eq!(structured.partial.buffer, format!("{}{}{}", first, rest, other));
        assert_eq!(structured.stream().state(), StreamState::Exhausted);
    }

    #[tokio::test]
    async fn test_async_stream_matches_blocking() {
        let values = vec![
            openai_chunk(Some("Sure, "), None, None),
            openai_chunk(Some("I recommend..."), None, None),
            openai_chunk(None, Some("stop"), Some((10, 5))),
        ];
        let source: BoxStream<'static, Value> =
            Box::pin(futures::stream::iter(values.into_iter().map(Ok)));
        let mut stream: AsyncStream<OpenAi> = AsyncStream::new(source, CallContext::new("gpt-4o-mini"));
        let mut count = 0;
        while let Some(item) = stream.next().await {
            item.unwrap();
            count += 1;
        }
        assert_eq!(count, 3);
        assert_eq!(stream.content(), "Sure, I recommend...");
        assert_eq!(stream.usage(), Some(Usage::new(10, 5)));
    }

    #[tokio::test]
    async fn test_async_structured_stream_in_json_mode() {
        let values = vec![
            openai_chunk(Some("{\"title\": \"Dune\""), None, None),
            openai_chunk(Some(", \"author\": \"Frank Herbert\"}"), Some("stop"), None),
        ];
        let source: BoxStream<'static, Value> =
            Box::pin(futures::stream::iter(values.into_iter().map(Ok)));
        let inner: AsyncStream<OpenAi> = AsyncStream::new(source, CallContext::new("gpt-4o"));
        let books: Vec<Book> = AsyncStructuredStream::new(inner, JsonSource::Content, false)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(books.len(), 2);
        assert_eq!(books[1].author.as_deref(), Some("Frank Herbert"));
    }
}

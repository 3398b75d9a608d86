//! Call factory: a prompt template plus settings, bound to one provider.
//!
//! [`CallBuilder`] collects the template, tools, parameters, configuration and
//! collaborators; [`Call`] renders the template for each set of arguments and
//! runs one of the invocation variants:
//!
//! | Variant | Blocking | Async | Returns |
//! |---------|----------|-------|---------|
//! | plain call | [`Call::call`] | [`Call::call_async`] | [`CallResponse`] |
//! | stream | [`Call::stream`] | [`Call::stream_async`] | [`Stream`] / [`AsyncStream`] |
//! | extraction | [`Call::extract`] | [`Call::extract_async`] | `T` |
//! | structured stream | [`Call::structured_stream`] | [`Call::structured_stream_async`] | partial `T`s |
//! | output parser | [`Call::call_with_parser`] | [`Call::call_with_parser_async`] | parser output |
//!
//! Every variant sends exactly one request; nothing is retried.
//!
//! ```no_run
//! use ai_call::{openai, template_args};
//!
//! let recommend = openai::call("gpt-4o-mini")
//!     .template(
//!         "SYSTEM: You are a librarian.
//!          USER: Recommend a {genre} book.",
//!     )
//!     .param("temperature", 0.7)
//!     .build()?;
//! let response = recommend.call(&template_args! { "genre" => "fantasy" })?;
//! println!("{}", response.content());
//! # Ok::<(), ai_call::Error>(())
//! ```

use crate::prompt::{DynamicConfig, PromptTemplate, TemplateArgs};
use crate::providers::{CallRequest, Provider, ProviderConfig};
use crate::response::{CallContext, CallResponse};
use crate::stream::{AsyncStream, AsyncStructuredStream, JsonSource, Stream, StructuredStream};
use crate::telemetry::{CallKind, CallObserver, CallRecord};
use crate::tokens::PriceTable;
use crate::tools::{FunctionToolBuilder, SchemaError, Tool};
use crate::transport::{
    AsyncTransport, BlockingHttpTransport, HttpTransport, ProviderRequest, Transport,
};
use crate::{Error, ErrorContext, Result};
use once_cell::sync::OnceCell;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Closure computing per-call overrides from the template arguments.
pub type DynamicConfigFn = Arc<dyn Fn(&TemplateArgs) -> DynamicConfig + Send + Sync>;

/// Builder for a [`Call`].
pub struct CallBuilder<P: Provider> {
    model: String,
    template: Option<PromptTemplate>,
    tools: Vec<Tool>,
    call_params: Map<String, Value>,
    dynamic_config: Option<DynamicConfigFn>,
    config: ProviderConfig,
    price_table: Option<Arc<PriceTable>>,
    observer: Option<Arc<dyn CallObserver>>,
    transport: Option<Arc<dyn Transport>>,
    async_transport: Option<Arc<dyn AsyncTransport>>,
    json_mode: bool,
    pending_error: Option<Error>,
    _provider: PhantomData<fn() -> P>,
}

impl<P: Provider> CallBuilder<P> {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            template: None,
            tools: Vec::new(),
            call_params: Map::new(),
            dynamic_config: None,
            config: ProviderConfig::default(),
            price_table: None,
            observer: None,
            transport: None,
            async_transport: None,
            json_mode: false,
            pending_error: None,
            _provider: PhantomData,
        }
    }

    /// Prompt template with optional `SYSTEM:`/`USER:`/`ASSISTANT:`/`MESSAGES:` markers.
    pub fn template(mut self, source: impl Into<String>) -> Self {
        self.template = Some(PromptTemplate::new(source));
        self
    }

    pub fn tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: impl IntoIterator<Item = Tool>) -> Self {
        self.tools.extend(tools);
        self
    }

    /// Add a function tool; a schema error surfaces from [`build`](Self::build).
    pub fn function(mut self, builder: FunctionToolBuilder) -> Self {
        match builder.build() {
            Ok(tool) => self.tools.push(tool),
            Err(e) => {
                self.pending_error.get_or_insert(Error::Schema(e));
            }
        }
        self
    }

    /// Default call parameters; must be a JSON object.
    pub fn call_params(mut self, params: Value) -> Self {
        match params {
            Value::Object(map) => self.call_params.extend(map),
            other => {
                self.pending_error.get_or_insert(Error::configuration_with_context(
                    "call params must be a JSON object",
                    ErrorContext::new().with_details(other.to_string()),
                ));
            }
        }
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.call_params.insert(key.into(), value.into());
        self
    }

    pub fn dynamic_config<F>(mut self, f: F) -> Self
    where
        F: Fn(&TemplateArgs) -> DynamicConfig + Send + Sync + 'static,
    {
        self.dynamic_config = Some(Arc::new(f));
        self
    }

    /// Explicit settings; they win over `<PROVIDER>_*` environment variables.
    pub fn config(mut self, config: ProviderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn price_table(mut self, table: Arc<PriceTable>) -> Self {
        self.price_table = Some(table);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn CallObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn async_transport(mut self, transport: Arc<dyn AsyncTransport>) -> Self {
        self.async_transport = Some(transport);
        self
    }

    /// Ask for a JSON object as content; extraction then reads the content
    /// instead of forcing a tool call.
    pub fn json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }

    pub fn build(self) -> Result<Call<P>> {
        if let Some(err) = self.pending_error {
            return Err(err);
        }
        let config = ProviderConfig::for_provider::<P>().overlay(&self.config);
        config.validate()?;

        let transport = OnceCell::new();
        if let Some(t) = self.transport {
            let _ = transport.set(t);
        }
        let async_transport = OnceCell::new();
        if let Some(t) = self.async_transport {
            let _ = async_transport.set(t);
        }

        Ok(Call {
            model: self.model,
            template: self.template,
            tools: self.tools,
            call_params: self.call_params,
            dynamic_config: self.dynamic_config,
            config,
            price_table: self.price_table.unwrap_or_else(PriceTable::builtin),
            observer: self.observer,
            transport,
            async_transport,
            json_mode: self.json_mode,
            _provider: PhantomData,
        })
    }
}

/// A reusable call bound to one provider and model.
pub struct Call<P: Provider> {
    model: String,
    template: Option<PromptTemplate>,
    tools: Vec<Tool>,
    call_params: Map<String, Value>,
    dynamic_config: Option<DynamicConfigFn>,
    config: ProviderConfig,
    price_table: Arc<PriceTable>,
    observer: Option<Arc<dyn CallObserver>>,
    transport: OnceCell<Arc<dyn Transport>>,
    async_transport: OnceCell<Arc<dyn AsyncTransport>>,
    json_mode: bool,
    _provider: PhantomData<fn() -> P>,
}

/// A rendered request and the context its response will carry.
struct Prepared {
    request: ProviderRequest,
    context: CallContext,
}

/// The tool that carries an extracted `T`, and whether `T` sits in its `value` field.
fn extraction_tool<T: JsonSchema>() -> std::result::Result<(Tool, bool), SchemaError> {
    match Tool::from_schema::<T>() {
        Ok(tool) => Ok((tool, false)),
        Err(SchemaError::InvalidSchema { .. }) => Ok((Tool::from_base_type::<T>()?, true)),
        Err(e) => Err(e),
    }
}

/// Text between the first `{`/`[` and the matching last `}`/`]`.
fn json_span(content: &str) -> &str {
    let start = content.find(['{', '[']);
    let end = content.rfind(['}', ']']);
    match (start, end) {
        (Some(s), Some(e)) if e >= s => &content[s..=e],
        _ => content.trim(),
    }
}

fn parse_content<T: DeserializeOwned>(content: &str) -> Result<T> {
    serde_json::from_str(json_span(content)).map_err(|e| {
        Error::validation_with_context(
            format!("completion content is not the expected JSON: {}", e),
            ErrorContext::new()
                .with_details(content.to_string())
                .with_source("extract"),
        )
    })
}

impl<P: Provider> Call<P> {
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn prepare(&self, args: &TemplateArgs, stream: bool, extraction: Option<&Tool>) -> Result<Prepared> {
        let dynamic = self
            .dynamic_config
            .as_ref()
            .map(|f| f(args))
            .unwrap_or_default();

        let mut template_args = args.clone();
        template_args.extend(&dynamic.computed_fields);

        let messages = match (dynamic.messages, &self.template) {
            (Some(messages), _) => messages,
            (None, Some(template)) => template.render(&template_args)?,
            (None, None) => {
                return Err(Error::configuration(
                    "call has neither a template nor dynamic messages",
                ))
            }
        };

        let mut call_params = self.call_params.clone();
        call_params.extend(dynamic.call_params);

        let (tools, forced) = match extraction {
            Some(tool) => (vec![tool.clone()], Some(tool.name().to_string())),
            None => {
                let mut tools = self.tools.clone();
                tools.extend(dynamic.tools);
                (tools, None)
            }
        };

        let body = P::build_body(&CallRequest {
            model: &self.model,
            messages: &messages,
            tools: &tools,
            call_params: &call_params,
            forced_tool: forced.as_deref(),
            json_mode: self.json_mode,
            stream,
        })?;
        let mut headers = P::auth_headers(&self.config)?;
        headers.extend(self.config.headers.iter().cloned());
        let url = P::endpoint(&self.config, &self.model, stream)?;
        tracing::debug!(provider = P::NAME, model = %self.model, %url, stream, "sending request");

        let request = ProviderRequest {
            provider: P::NAME,
            url,
            headers,
            body,
            stream,
            format: P::stream_format(),
        };
        let context = CallContext::new(self.model.clone())
            .with_messages(messages)
            .with_tools(tools)
            .with_call_params(call_params)
            .with_price_table(self.price_table.clone())
            .with_metadata(dynamic.metadata)
            .with_template(
                self.template.as_ref().map(|t| t.source().to_string()),
                template_args.to_json(),
            );
        Ok(Prepared { request, context })
    }

    fn blocking_transport(&self) -> Result<&Arc<dyn Transport>> {
        self.transport.get_or_try_init(|| {
            Ok(Arc::new(BlockingHttpTransport::new(&self.config)?) as Arc<dyn Transport>)
        })
    }

    fn async_transport(&self) -> Result<&Arc<dyn AsyncTransport>> {
        self.async_transport.get_or_try_init(|| {
            Ok(Arc::new(HttpTransport::new(&self.config)?) as Arc<dyn AsyncTransport>)
        })
    }

    fn wrap(&self, raw: Value, context: CallContext) -> Result<CallResponse<P>> {
        let response: P::Response = serde_json::from_value(raw)?;
        let response = CallResponse::new(response, context);
        tracing::info!(
            provider = P::NAME,
            model = %response.model().unwrap_or_default(),
            input_tokens = response.input_tokens(),
            output_tokens = response.output_tokens(),
            duration_ms = response.duration().as_millis() as u64,
            "call completed"
        );
        Ok(response)
    }

    fn observe(&self, kind: CallKind, response: &CallResponse<P>) {
        if let Some(observer) = &self.observer {
            observer.on_record(&CallRecord::from_response(kind, response));
        }
    }

    fn send(&self, args: &TemplateArgs, extraction: Option<&Tool>) -> Result<CallResponse<P>> {
        let Prepared { request, context } = self.prepare(args, false, extraction)?;
        let raw = self.blocking_transport()?.send(&request)?;
        self.wrap(raw, context)
    }

    async fn send_async(
        &self,
        args: &TemplateArgs,
        extraction: Option<&Tool>,
    ) -> Result<CallResponse<P>> {
        let Prepared { request, context } = self.prepare(args, false, extraction)?;
        let raw = self.async_transport()?.send(&request).await?;
        self.wrap(raw, context)
    }

    pub fn call(&self, args: &TemplateArgs) -> Result<CallResponse<P>> {
        let response = self.send(args, None)?;
        self.observe(CallKind::Call, &response);
        Ok(response)
    }

    pub async fn call_async(&self, args: &TemplateArgs) -> Result<CallResponse<P>> {
        let response = self.send_async(args, None).await?;
        self.observe(CallKind::Call, &response);
        Ok(response)
    }

    pub fn stream(&self, args: &TemplateArgs) -> Result<Stream<P>> {
        self.open_stream(args, None)
    }

    pub async fn stream_async(&self, args: &TemplateArgs) -> Result<AsyncStream<P>> {
        self.open_stream_async(args, None).await
    }

    fn open_stream(&self, args: &TemplateArgs, extraction: Option<&Tool>) -> Result<Stream<P>> {
        let Prepared { request, context } = self.prepare(args, true, extraction)?;
        let source = self.blocking_transport()?.send_stream(&request)?;
        Ok(Stream::new(source, context).with_observer(self.observer.clone()))
    }

    async fn open_stream_async(
        &self,
        args: &TemplateArgs,
        extraction: Option<&Tool>,
    ) -> Result<AsyncStream<P>> {
        let Prepared { request, context } = self.prepare(args, true, extraction)?;
        let source = self.async_transport()?.send_stream(&request).await?;
        Ok(AsyncStream::new(source, context).with_observer(self.observer.clone()))
    }

    /// Extraction tool for `T`, unless JSON mode reads the content instead.
    fn extraction<T: JsonSchema>(&self) -> Result<Option<(Tool, bool)>> {
        if self.json_mode {
            return Ok(None);
        }
        Ok(Some(extraction_tool::<T>()?))
    }

    fn extracted<T: DeserializeOwned>(
        &self,
        response: &CallResponse<P>,
        wrapped: bool,
    ) -> Result<T> {
        let instance = match response.tool()? {
            Some(instance) => instance,
            None => return parse_content(&response.content()),
        };
        if wrapped {
            let value = instance.get("value").cloned().unwrap_or(Value::Null);
            return serde_json::from_value(value).map_err(|e| {
                Error::validation_with_context(
                    format!("`value` of {} does not fit the requested type: {}", instance.name(), e),
                    ErrorContext::new()
                        .with_field_path(format!("{}.value", instance.name()))
                        .with_source("extract"),
                )
            });
        }
        instance.parse()
    }

    /// Force a tool call shaped like `T` and parse its arguments. Falls back to
    /// JSON in the content when the model answered in text (always, in JSON mode).
    pub fn extract<T: DeserializeOwned + JsonSchema>(&self, args: &TemplateArgs) -> Result<T> {
        let extraction = self.extraction::<T>()?;
        let response = self.send(args, extraction.as_ref().map(|(t, _)| t))?;
        self.observe(CallKind::Extract, &response);
        self.extracted(&response, extraction.map_or(false, |(_, w)| w))
    }

    pub async fn extract_async<T: DeserializeOwned + JsonSchema>(
        &self,
        args: &TemplateArgs,
    ) -> Result<T> {
        let extraction = self.extraction::<T>()?;
        let response = self
            .send_async(args, extraction.as_ref().map(|(t, _)| t))
            .await?;
        self.observe(CallKind::Extract, &response);
        self.extracted(&response, extraction.map_or(false, |(_, w)| w))
    }

    /// Stream progressively complete values of `T`.
    pub fn structured_stream<T: DeserializeOwned + JsonSchema>(
        &self,
        args: &TemplateArgs,
    ) -> Result<StructuredStream<P, T>> {
        let extraction = self.extraction::<T>()?;
        let inner = self.open_stream(args, extraction.as_ref().map(|(t, _)| t))?;
        Ok(match extraction {
            Some((_, wrapped)) => StructuredStream::new(inner, JsonSource::ToolArguments, wrapped),
            None => StructuredStream::new(inner, JsonSource::Content, false),
        })
    }

    pub async fn structured_stream_async<T: DeserializeOwned + JsonSchema>(
        &self,
        args: &TemplateArgs,
    ) -> Result<AsyncStructuredStream<P, T>> {
        let extraction = self.extraction::<T>()?;
        let inner = self
            .open_stream_async(args, extraction.as_ref().map(|(t, _)| t))
            .await?;
        Ok(match extraction {
            Some((_, wrapped)) => {
                AsyncStructuredStream::new(inner, JsonSource::ToolArguments, wrapped)
            }
            None => AsyncStructuredStream::new(inner, JsonSource::Content, false),
        })
    }

    /// Run a plain call and hand the response to `parser`. Parser errors come
    /// back as [`Error::OutputParser`] with the original error inside.
    pub fn call_with_parser<O, E, F>(&self, args: &TemplateArgs, parser: F) -> Result<O>
    where
        F: FnOnce(&CallResponse<P>) -> std::result::Result<O, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let response = self.call(args)?;
        parser(&response).map_err(Error::output_parser)
    }

    pub async fn call_with_parser_async<O, E, F>(&self, args: &TemplateArgs, parser: F) -> Result<O>
    where
        F: FnOnce(&CallResponse<P>) -> std::result::Result<O, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let response = self.call_async(args).await?;
        parser(&response).map_err(Error::output_parser)
    }
}

impl<P: Provider> fmt::Debug for Call<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("provider", &P::NAME)
            .field("model", &self.model)
            .field("template", &self.template.as_ref().map(PromptTemplate::source))
            .field("tools", &self.tools.iter().map(Tool::name).collect::<Vec<_>>())
            .field("call_params", &self.call_params)
            .field("json_mode", &self.json_mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::OpenAi;
    use crate::template_args;
    use crate::transport::ValueIter;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replies with canned bodies and remembers what it was sent.
    #[derive(Default)]
    struct Canned {
        reply: Value,
        frames: Vec<Value>,
        sent: Mutex<Vec<ProviderRequest>>,
    }

    impl Transport for Canned {
        fn send(&self, request: &ProviderRequest) -> Result<Value> {
            self.sent.lock().unwrap().push(request.clone());
            Ok(self.reply.clone())
        }

        fn send_stream(&self, request: &ProviderRequest) -> Result<ValueIter> {
            self.sent.lock().unwrap().push(request.clone());
            Ok(Box::new(self.frames.clone().into_iter().map(Ok)))
        }
    }

    fn completion(message: Value) -> Value {
        json!({
            "id": "chatcmpl-1", "model": "gpt-4o-mini",
            "choices": [{"index": 0, "message": message, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        })
    }

    fn build(transport: Arc<Canned>) -> CallBuilder<OpenAi> {
        OpenAi::call("gpt-4o-mini")
            .config(ProviderConfig::new().with_api_key("sk-test"))
            .transport(transport)
    }

    #[test]
    fn test_call_renders_template_and_merges_params() {
        let transport = Arc::new(Canned {
            reply: completion(json!({"role": "assistant", "content": "Dune"})),
            ..Canned::default()
        });
        let call = build(transport.clone())
            .template("SYSTEM: You are a librarian.\nUSER: Recommend a {genre} book.")
            .param("temperature", 0.5)
            .dynamic_config(|args| {
                DynamicConfig::new()
                    .call_param("max_tokens", 64)
                    .metadata("genre", args.to_json().get("genre").cloned().unwrap_or(Value::Null))
            })
            .build()
            .unwrap();
        let response = call.call(&template_args! { "genre" => "fantasy" }).unwrap();
        assert_eq!(response.content(), "Dune");
        assert_eq!(response.context().metadata()["genre"], "fantasy");

        let sent = transport.sent.lock().unwrap();
        let body = &sent[0].body;
        assert_eq!(body["messages"][1]["content"], "Recommend a fantasy book.");
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["max_tokens"], 64);
        assert!(sent[0]
            .headers
            .contains(&("authorization".to_string(), "Bearer sk-test".to_string())));
    }

    #[test]
    fn test_missing_docstring_fails_at_build() {
        let transport = Arc::new(Canned::default());
        let err = build(transport.clone())
            .template("Hi")
            .function(Tool::function("format_book").param::<String>("title"))
            .build()
            .unwrap_err();
        assert!(err.is_schema());
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_call_params_must_be_an_object() {
        let err = build(Arc::new(Canned::default()))
            .template("Hi")
            .call_params(json!([1, 2]))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Book {
        title: String,
        author: String,
    }

    #[test]
    fn test_extract_forces_the_schema_tool() {
        let transport = Arc::new(Canned {
            reply: completion(json!({
                "role": "assistant", "content": null,
                "tool_calls": [{"id": "call_1", "type": "function", "function": {
                    "name": "BookTool", "arguments": "{\"title\": \"Dune\", \"author\": \"Frank Herbert\"}"
                }}]
            })),
            ..Canned::default()
        });
        let call = build(transport.clone())
            .template("Extract the book from: {text}")
            .build()
            .unwrap();
        let book: Book = call
            .extract(&template_args! { "text" => "Dune by Frank Herbert" })
            .unwrap();
        assert_eq!(book.title, "Dune");
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].body["tool_choice"]["function"]["name"], "BookTool");
    }

    #[test]
    fn test_extract_base_type_and_json_mode() {
        let transport = Arc::new(Canned {
            reply: completion(json!({
                "role": "assistant", "content": null,
                "tool_calls": [{"id": "call_1", "type": "function", "function": {
                    "name": "Int32Tool", "arguments": "{\"value\": 42}"
                }}]
            })),
            ..Canned::default()
        });
        let call = build(transport).template("How many?").build().unwrap();
        let n: i32 = call.extract(&TemplateArgs::new()).unwrap();
        assert_eq!(n, 42);

        let transport = Arc::new(Canned {
            reply: completion(json!({
                "role": "assistant",
                "content": "Sure: {\"title\": \"Dune\", \"author\": \"Frank Herbert\"}"
            })),
            ..Canned::default()
        });
        let call = build(transport.clone())
            .template("Extract the book.")
            .json_mode(true)
            .build()
            .unwrap();
        let book: Book = call.extract(&TemplateArgs::new()).unwrap();
        assert_eq!(book.author, "Frank Herbert");
        let sent = transport.sent.lock().unwrap();
        assert!(sent[0].body.get("tools").is_none());
        assert_eq!(sent[0].body["response_format"]["type"], "json_object");
    }

    #[derive(Debug)]
    struct NotANumber;

    impl fmt::Display for NotANumber {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("not a number")
        }
    }

    impl std::error::Error for NotANumber {}

    #[test]
    fn test_parser_errors_propagate_unchanged() {
        let transport = Arc::new(Canned {
            reply: completion(json!({"role": "assistant", "content": "seven"})),
            ..Canned::default()
        });
        let call = build(transport).template("Pick a number.").build().unwrap();
        let err = call
            .call_with_parser(&TemplateArgs::new(), |r| {
                r.content().parse::<u32>().map_err(|_| NotANumber)
            })
            .unwrap_err();
        match err {
            Error::OutputParser(inner) => assert!(inner.downcast_ref::<NotANumber>().is_some()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_template_is_a_configuration_error() {
        let call = build(Arc::new(Canned::default())).build().unwrap();
        assert!(matches!(
            call.call(&TemplateArgs::new()),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn test_json_span() {
        assert_eq!(json_span("Here: {\"a\": 1} done"), "{\"a\": 1}");
        assert_eq!(json_span("[1, 2]"), "[1, 2]");
        assert_eq!(json_span(" 42 "), "42");
    }
}

//! # ai-call
//!
//! Provider-agnostic LLM calls: one prompt template, many providers.
//!
//! A call is built once from a provider, a model, a prompt template and
//! optional tools, then invoked with template arguments. Every provider answers
//! through the same normalized surface: content, finish reasons, usage, cost,
//! tool calls and the assistant message to append to history. Streams
//! accumulate the same information chunk by chunk and can reconstruct the
//! response the provider would have returned directly.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_call::{anthropic, template_args, Tool};
//!
//! let format_book = Tool::function("format_book")
//!     .docstring(
//!         "Returns the title and author nicely formatted.
//!
//!          Args:
//!              title: The title of the book.
//!              author: The author of the book.",
//!     )
//!     .param::<String>("title")
//!     .param::<String>("author");
//!
//! let librarian = anthropic::call("claude-3-5-sonnet-20240620")
//!     .template("Recommend a {genre} book.")
//!     .function(format_book)
//!     .build()?;
//!
//! let mut stream = librarian.stream(&template_args! { "genre" => "fantasy" })?;
//! for item in stream.by_ref() {
//!     let (chunk, tool) = item?;
//!     match tool {
//!         Some(tool) => println!("tool call: {:?}", tool.arguments()),
//!         None => print!("{}", chunk.content()),
//!     }
//! }
//! println!("\ncost: {:?}", stream.cost());
//! # Ok::<(), ai_call::Error>(())
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`call`] | Call builder and the invocation variants |
//! | [`providers`] | Provider adapters and their configuration |
//! | [`response`] | Normalized responses and chunks |
//! | [`stream`] | Stream accumulation and structured streaming |
//! | [`tools`] | Tool schemas built from functions and types |
//! | [`prompt`] | Prompt templates and dynamic configuration |
//! | [`transport`] | HTTP transports and stream frame decoding |
//! | [`tokens`] | Price tables and cost estimation |
//! | [`telemetry`] | Call observers and logging setup |
//! | [`types`] | Messages, tool calls and usage |

pub mod call;
pub mod error;
pub mod prompt;
pub mod providers;
pub mod response;
pub mod stream;
pub mod telemetry;
pub mod tokens;
pub mod tools;
pub mod transport;
pub mod types;
pub mod utils;

pub use call::{Call, CallBuilder};
pub use error::{Error, ErrorContext};
pub use prompt::{DynamicConfig, PromptTemplate, TemplateArgs};
pub use providers::gemini::vertex;
pub use providers::openai::{groq, litellm};
pub use providers::{anthropic, cohere, gemini, openai, Provider, ProviderConfig};
pub use response::{CallContext, CallResponse, CallResponseChunk};
pub use stream::{AsyncStream, AsyncStructuredStream, Stream, StreamState, StructuredStream};
pub use telemetry::{CallKind, CallObserver, CallRecord};
pub use tools::{SchemaError, Tool, ToolCallInstance};
pub use types::{Message, MessageRole, ToolCall, Usage};

use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A pinned, boxed stream of fallible items
pub type BoxStream<'a, T> = Pin<Box<dyn futures::Stream<Item = Result<T>> + Send + 'a>>;

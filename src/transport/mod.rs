//! Transport boundary between calls and provider HTTP APIs.
//!
//! Providers build a [`ProviderRequest`]; a [`Transport`] (blocking) or
//! [`AsyncTransport`] sends it and returns raw JSON, either whole or as a
//! stream of decoded frames. Tests plug in their own implementations.

pub mod decode;
pub mod http;

pub use decode::{FrameDecoder, StreamFormat};
pub use http::{BlockingHttpTransport, HttpTransport, TransportError};

use crate::{BoxStream, Result};
use serde_json::Value;

/// One outbound request, fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub provider: &'static str,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
    pub stream: bool,
    pub format: StreamFormat,
}

/// Blocking iterator of decoded stream frames.
pub type ValueIter = Box<dyn Iterator<Item = Result<Value>> + Send>;

pub trait Transport: Send + Sync {
    fn send(&self, request: &ProviderRequest) -> Result<Value>;

    fn send_stream(&self, request: &ProviderRequest) -> Result<ValueIter>;
}

#[async_trait::async_trait]
pub trait AsyncTransport: Send + Sync {
    async fn send(&self, request: &ProviderRequest) -> Result<Value>;

    async fn send_stream(&self, request: &ProviderRequest) -> Result<BoxStream<'static, Value>>;
}

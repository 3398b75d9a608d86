//! Shared fixtures: a scripted transport and a mockito server wrapper.

#![allow(dead_code)]

use ai_call::transport::{AsyncTransport, ProviderRequest, Transport, ValueIter};
use ai_call::{BoxStream, ProviderConfig, Result};
use mockito::{Mock, Server, ServerGuard};
use serde_json::Value;
use std::sync::Mutex;

/// Replies with a canned body (or canned stream frames) and records every request.
#[derive(Default)]
pub struct ScriptedTransport {
    reply: Value,
    frames: Vec<Value>,
    sent: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedTransport {
    pub fn replying(reply: Value) -> Self {
        Self {
            reply,
            ..Self::default()
        }
    }

    pub fn streaming(frames: Vec<Value>) -> Self {
        Self {
            frames,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, request: &ProviderRequest) {
        self.sent.lock().unwrap().push(request.clone());
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &ProviderRequest) -> Result<Value> {
        self.record(request);
        Ok(self.reply.clone())
    }

    fn send_stream(&self, request: &ProviderRequest) -> Result<ValueIter> {
        self.record(request);
        Ok(Box::new(self.frames.clone().into_iter().map(Ok::<_, ai_call::Error>)))
    }
}

#[async_trait::async_trait]
impl AsyncTransport for ScriptedTransport {
    async fn send(&self, request: &ProviderRequest) -> Result<Value> {
        self.record(request);
        Ok(self.reply.clone())
    }

    async fn send_stream(&self, request: &ProviderRequest) -> Result<BoxStream<'static, Value>> {
        self.record(request);
        let frames = self.frames.clone().into_iter().map(Ok::<_, ai_call::Error>);
        Ok(Box::pin(futures::stream::iter(frames)))
    }
}

pub fn test_config() -> ProviderConfig {
    ProviderConfig::new().with_api_key("test-key")
}

/// Mock HTTP server standing in for a provider API.
pub struct MockServerFixture {
    pub server: ServerGuard,
    pub base_url: String,
}

impl MockServerFixture {
    pub fn new() -> Self {
        let server = Server::new();
        let base_url = server.url();
        Self { server, base_url }
    }

    pub async fn new_async() -> Self {
        let server = Server::new_async().await;
        let base_url = server.url();
        Self { server, base_url }
    }

    pub fn config(&self) -> ProviderConfig {
        test_config().with_base_url(self.base_url.clone())
    }

    pub fn mock_json_response(&mut self, path: &str, status: usize, body: &str) -> Mock {
        self.server
            .mock("POST", path)
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create()
    }

    /// SSE body from `data:` payloads, one event per payload.
    pub fn mock_sse_stream(&mut self, path: &str, chunks: &[&str]) -> Mock {
        let body: String = chunks
            .iter()
            .map(|chunk| format!("data: {}\n\n", chunk))
            .collect();
        self.server
            .mock("POST", path)
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create()
    }

    pub fn mock_ndjson_stream(&mut self, path: &str, lines: &[&str]) -> Mock {
        let body: String = lines.iter().map(|l| format!("{}\n", l)).collect();
        self.server
            .mock("POST", path)
            .with_status(200)
            .with_header("content-type", "application/stream+json")
            .with_body(body)
            .create()
    }
}

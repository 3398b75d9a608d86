use super::decode::FrameDecoder;
use super::{AsyncTransport, ProviderRequest, Transport, ValueIter};
use crate::providers::ProviderConfig;
use crate::{BoxStream, Error, Result};
use futures::StreamExt;
use reqwest::Proxy;
use serde_json::Value;
use std::io::Read;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Other(String),
}

fn http_err(e: reqwest::Error) -> Error {
    Error::Transport(TransportError::Http(e))
}

/// Provider error message from an error body, falling back to the raw text.
fn remote_error(provider: &str, status: u16, body: &str) -> Error {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("message"))
                .or_else(|| v.pointer("/0/error/message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());
    tracing::warn!(provider, status, %message, "provider returned an error");
    Error::Remote {
        provider: provider.to_string(),
        status,
        message,
    }
}

fn proxy(config: &ProviderConfig) -> Result<Option<Proxy>> {
    config
        .proxy
        .as_deref()
        .map(|url| {
            Proxy::all(url).map_err(|e| {
                Error::configuration(format!("invalid proxy url `{}`: {}", url, e))
            })
        })
        .transpose()
}

/// Async transport over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.timeout());
        if let Some(proxy) = proxy(config)? {
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn execute(&self, request: &ProviderRequest) -> Result<reqwest::Response> {
        let mut req = self.client.post(&request.url).json(&request.body);
        for (k, v) in &request.headers {
            req = req.header(k, v);
        }
        if request.stream {
            req = req.header("accept", "text/event-stream");
        }

        let resp = req.send().await.map_err(http_err)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(remote_error(request.provider, status.as_u16(), &body));
        }
        Ok(resp)
    }
}

#[async_trait::async_trait]
impl AsyncTransport for HttpTransport {
    async fn send(&self, request: &ProviderRequest) -> Result<Value> {
        self.execute(request).await?.json().await.map_err(http_err)
    }

    async fn send_stream(&self, request: &ProviderRequest) -> Result<BoxStream<'static, Value>> {
        let resp = self.execute(request).await?;
        let bytes = resp.bytes_stream().boxed();
        let decoder = FrameDecoder::new(request.format);

        // Incrementally buffer bytes and emit decoded frames.
        let stream = futures::stream::unfold(
            (bytes, decoder, false),
            |(mut bytes, mut decoder, mut eof)| async move {
                loop {
                    if let Some(v) = decoder.next_value() {
                        return Some((Ok(v), (bytes, decoder, eof)));
                    }
                    if eof || decoder.is_done() {
                        return None;
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => decoder.push(&chunk),
                        Some(Err(e)) => return Some((Err(http_err(e)), (bytes, decoder, true))),
                        None => {
                            decoder.finish();
                            eof = true;
                        }
                    }
                }
            },
        );
        Ok(Box::pin(stream))
    }
}

/// Blocking transport over `reqwest::blocking::Client`.
///
/// Must not be created or dropped inside an async runtime.
#[derive(Debug, Clone)]
pub struct BlockingHttpTransport {
    client: reqwest::blocking::Client,
}

impl BlockingHttpTransport {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder().timeout(config.timeout());
        if let Some(proxy) = proxy(config)? {
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;
        Ok(Self { client })
    }

    fn execute(&self, request: &ProviderRequest) -> Result<reqwest::blocking::Response> {
        let mut req = self.client.post(&request.url).json(&request.body);
        for (k, v) in &request.headers {
            req = req.header(k, v);
        }
        if request.stream {
            req = req.header("accept", "text/event-stream");
        }

        let resp = req.send().map_err(http_err)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(remote_error(request.provider, status.as_u16(), &body));
        }
        Ok(resp)
    }
}

impl Transport for BlockingHttpTransport {
    fn send(&self, request: &ProviderRequest) -> Result<Value> {
        self.execute(request)?.json().map_err(http_err)
    }

    fn send_stream(&self, request: &ProviderRequest) -> Result<ValueIter> {
        let resp = self.execute(request)?;
        Ok(Box::new(BlockingFrames {
            resp,
            decoder: FrameDecoder::new(request.format),
            buf: vec![0; 8 * 1024],
            eof: false,
        }))
    }
}

struct BlockingFrames {
    resp: reqwest::blocking::Response,
    decoder: FrameDecoder,
    buf: Vec<u8>,
    eof: bool,
}

impl Iterator for BlockingFrames {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(v) = self.decoder.next_value() {
                return Some(Ok(v));
            }
            if self.eof || self.decoder.is_done() {
                return None;
            }
            match self.resp.read(&mut self.buf) {
                Ok(0) => {
                    self.decoder.finish();
                    self.eof = true;
                }
                Ok(n) => self.decoder.push(&self.buf[..n]),
                Err(e) => {
                    self.eof = true;
                    return Some(Err(Error::Io(e)));
                }
            }
        }
    }
}

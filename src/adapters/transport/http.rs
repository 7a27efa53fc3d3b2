//! reqwest-backed transport.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::{Client, RequestBuilder};
use std::fmt::Display;
use std::time::Duration;

use crate::adapters::codecs::parse_retry_after_header;
use crate::domain::provider::ProviderError;
use crate::ports::{Transport, WireBody, WireRequest, WireResponse, WireStream};

/// Sends vendor requests over HTTPS.
///
/// Deadlines are enforced by the orchestrator, not by the client, so one
/// client can serve adapters with different timeouts.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a transport with a default client.
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Creates a transport around a preconfigured client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn prepare(&self, request: &WireRequest) -> RequestBuilder {
        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.expose());
        }
        builder
    }

    async fn send(&self, request: &WireRequest) -> Result<reqwest::Response, ProviderError> {
        self.prepare(request).send().await.map_err(|e| {
            if e.is_connect() {
                ProviderError::network(format!("Connection failed: {}", e.without_url()))
            } else {
                ProviderError::network(e.without_url().to_string())
            }
        })
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_retry_after_header)
}

/// Decodes SSE framing and keeps the non-empty `data` payloads.
fn sse_data<S, B, E>(bytes: S) -> impl Stream<Item = Result<String, ProviderError>> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let mut events = Box::pin(bytes.eventsource());
    async_stream::stream! {
        while let Some(event) = events.next().await {
            match event {
                Ok(event) if event.data.trim().is_empty() => {}
                Ok(event) => yield Ok(event.data),
                Err(e) => {
                    yield Err(ProviderError::network(format!("Stream error: {e}")));
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: WireRequest) -> Result<WireResponse, ProviderError> {
        let response = self.send(&request).await?;
        let status = response.status().as_u16();
        let retry_after = retry_after(&response);
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("Failed to read body: {}", e.without_url())))?;

        Ok(WireResponse {
            status,
            retry_after,
            body,
        })
    }

    async fn open_stream(&self, request: WireRequest) -> Result<WireStream, ProviderError> {
        let response = self.send(&request).await?;
        let status = response.status().as_u16();
        let retry_after = retry_after(&response);

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Ok(WireStream {
                status,
                retry_after,
                body: WireBody::Complete(body),
            });
        }

        let bytes = response.bytes_stream().map(|chunk| chunk.map_err(|e| e.without_url()));
        let events = sse_data(bytes);

        Ok(WireStream {
            status,
            retry_after,
            body: WireBody::Events(Box::pin(events)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn frames(parts: Vec<&'static [u8]>) -> Vec<Result<String, ProviderError>> {
        let bytes = stream::iter(parts.into_iter().map(Ok::<_, std::io::Error>));
        futures::executor::block_on(sse_data(bytes).collect())
    }

    #[test]
    fn decodes_events_split_across_reads() {
        let events = frames(vec![&b"data: hel"[..], &b"lo\r\n"[..], &b"\r\ndata: [DONE]\n\n"[..]]);
        assert_eq!(events, vec![Ok("hello".to_string()), Ok("[DONE]".to_string())]);
    }

    #[test]
    fn skips_comments_and_event_names() {
        let events = frames(vec![
            &b": keep-alive\n\nevent: message_stop\ndata: {\"type\":\"message_stop\"}\n\n"[..],
        ]);
        assert_eq!(events, vec![Ok("{\"type\":\"message_stop\"}".to_string())]);
    }

    #[test]
    fn read_error_ends_the_stream() {
        let bytes = stream::iter(vec![
            Ok(&b"data: one\n\n"[..]),
            Err("connection reset"),
            Ok(&b"data: two\n\n"[..]),
        ]);
        let events: Vec<_> = futures::executor::block_on(sse_data(bytes).collect());

        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Ok("one".to_string()));
        assert!(matches!(&events[1], Err(ProviderError::Network(m)) if m.contains("connection reset")));
    }
}

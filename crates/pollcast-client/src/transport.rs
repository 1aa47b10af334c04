//! Push transport.
//!
//! A transport opens one long-lived stream of change events for a tenant.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::ACCEPT;
use tracing::debug;

use pollcast_proto::ChangeEvent;

use crate::config::ClientConfig;
use crate::error::Error;
use crate::sse::SseDecoder;

/// Stream of decoded events. Protocol errors are recoverable; any other error
/// ends the connection.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<ChangeEvent, Error>> + Send>>;

/// Opens event streams.
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Open the event stream of `tenant_id`.
    async fn open(&self, tenant_id: &str) -> Result<EventStream, Error>;
}

/// Server-sent events over HTTP.
#[derive(Debug, Clone)]
pub struct SseTransport {
    client: reqwest::Client,
    endpoint: String,
    connect_timeout: Duration,
}

impl SseTransport {
    /// Create a transport for the endpoint in `config`.
    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| Error::Connection(format!("failed to build http client: {}", e)))?;
        Ok(Self::with_client(client, config))
    }

    /// Create a transport using an existing HTTP client.
    pub fn with_client(client: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            connect_timeout: config.connect_timeout,
        }
    }

    fn url_for(&self, tenant_id: &str) -> String {
        format!("{}/watch/{}", self.endpoint, tenant_id)
    }
}

#[async_trait]
impl EventTransport for SseTransport {
    async fn open(&self, tenant_id: &str) -> Result<EventStream, Error> {
        let url = self.url_for(tenant_id);
        let request = self
            .client
            .get(&url)
            .header(ACCEPT, "text/event-stream")
            .send();

        let response = tokio::time::timeout(self.connect_timeout, request)
            .await
            .map_err(|_| Error::Timeout)??;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status(status.as_u16()));
        }
        debug!(url = %url, "event stream opened");

        Ok(decode_events(response.bytes_stream()))
    }
}

/// Decode an SSE byte stream into change events.
pub fn decode_events<S, B, E>(bytes: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = (Box::pin(bytes), SseDecoder::new(), false);

    let events = futures::stream::unfold(state, |(mut bytes, mut decoder, done)| async move {
        if done {
            return None;
        }
        loop {
            if let Some(message) = decoder.next_message() {
                if message.data.trim().is_empty() {
                    continue;
                }
                let event = ChangeEvent::from_json(&message.data).map_err(Error::from);
                return Some((event, (bytes, decoder, false)));
            }

            match bytes.next().await {
                Some(Ok(chunk)) => decoder.push(chunk.as_ref()),
                Some(Err(e)) => {
                    let error = Error::Transport(e.to_string());
                    return Some((Err(error), (bytes, decoder, true)));
                }
                None => return None,
            }
        }
    });

    Box::pin(events)
}

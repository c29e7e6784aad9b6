//! IPFS (kubo) HTTP API pubsub adapter
//!
//! Topics and payloads are multibase-encoded on the API: `u` + unpadded
//! base64url. Subscriptions are a long-lived POST streaming one JSON frame
//! per line. When that stream breaks (daemon restart, network error) the
//! reader resubscribes with exponential backoff, so a `Subscription` only
//! ends when its receiver is dropped.

use std::time::Duration;

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tokio::sync::mpsc;

use async_trait::async_trait;

use crate::{BusError, BusMessage, BusResult, MessageBus, Subscription};

#[derive(Debug, Deserialize)]
struct PubsubFrame {
    #[serde(default)]
    from: Option<String>,
    data: String,
}

/// Longest frame kept while waiting for its terminating newline
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// First wait before resubscribing
pub const DEFAULT_RECONNECT_INITIAL: Duration = Duration::from_millis(500);

/// Cap on the resubscribe wait
pub const DEFAULT_RECONNECT_MAX: Duration = Duration::from_secs(30);

/// Pubsub over a local IPFS daemon's HTTP API
#[derive(Clone)]
pub struct IpfsPubsub {
    api_url: String,
    http: reqwest::Client,
    reconnect_initial: Duration,
    reconnect_max: Duration,
}

impl IpfsPubsub {
    /// `api_url` like `http://127.0.0.1:5001`
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            reconnect_initial: DEFAULT_RECONNECT_INITIAL,
            reconnect_max: DEFAULT_RECONNECT_MAX,
        }
    }

    /// Bounds for the wait between resubscribe attempts
    pub fn with_reconnect_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect_initial = initial;
        self.reconnect_max = max.max(initial);
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn endpoint(&self, command: &str) -> String {
        format!("{}/api/v0/pubsub/{}", self.api_url, command)
    }

    /// Open the streaming `sub` request
    async fn open(&self, topic: &str) -> BusResult<reqwest::Response> {
        let subscribe_error = |reason: String| BusError::Subscribe {
            topic: topic.to_string(),
            reason,
        };
        let response = self
            .http
            .post(self.endpoint("sub"))
            .query(&[("arg", multibase_encode(topic.as_bytes()))])
            .send()
            .await
            .map_err(|e| subscribe_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(subscribe_error(format!("HTTP {}", response.status())));
        }
        Ok(response)
    }

    /// Forward frames until the receiver goes away, resubscribing whenever
    /// the daemon drops the stream
    async fn run_subscription(
        self,
        topic: String,
        mut response: reqwest::Response,
        sender: mpsc::UnboundedSender<BusMessage>,
    ) {
        let mut delay = self.reconnect_initial;
        loop {
            match pump(&topic, response, &sender).await {
                StreamEnd::ReceiverGone => break,
                StreamEnd::Broken { delivered } => {
                    if delivered {
                        delay = self.reconnect_initial;
                    }
                }
            }

            response = loop {
                if sender.is_closed() {
                    tracing::info!(topic = %topic, "pubsub subscription ended");
                    return;
                }
                tracing::warn!(
                    topic = %topic,
                    retry_in_ms = delay.as_millis() as u64,
                    "pubsub stream lost, resubscribing"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(self.reconnect_max);
                match self.open(&topic).await {
                    Ok(response) => {
                        tracing::info!(topic = %topic, "resubscribed");
                        break response;
                    }
                    Err(e) => tracing::warn!(topic = %topic, error = %e, "resubscribe failed"),
                }
            };
        }
        tracing::info!(topic = %topic, "pubsub subscription ended");
    }
}

enum StreamEnd {
    ReceiverGone,
    Broken { delivered: bool },
}

/// Read one streaming response to its end
async fn pump(
    topic: &str,
    response: reqwest::Response,
    sender: &mpsc::UnboundedSender<BusMessage>,
) -> StreamEnd {
    let mut stream = response.bytes_stream();
    let mut lines = LineBuffer::new(MAX_FRAME_LEN);
    let mut delivered = false;
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(topic, error = %e, "pubsub stream failed");
                break;
            }
        };
        delivered = true;
        let dropped_before = lines.dropped();
        let complete = lines.push(&chunk);
        if lines.dropped() > dropped_before {
            tracing::warn!(topic, limit = MAX_FRAME_LEN, "dropping oversized pubsub frame");
        }
        for line in complete {
            match parse_frame(topic, &line) {
                Ok(message) => {
                    if sender.send(message).is_err() {
                        return StreamEnd::ReceiverGone;
                    }
                }
                Err(e) => tracing::warn!(topic, error = %e, "skipping pubsub frame"),
            }
        }
    }
    StreamEnd::Broken { delivered }
}

/// Multibase (base64url, no padding) encoding of a topic name
pub fn multibase_encode(bytes: &[u8]) -> String {
    format!("u{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// Decode a multibase string in one of the base64 flavours kubo emits
pub fn multibase_decode(text: &str) -> BusResult<Vec<u8>> {
    let mut chars = text.chars();
    let decoded = match chars.next() {
        Some('u') => URL_SAFE_NO_PAD.decode(chars.as_str()),
        Some('m') => STANDARD_NO_PAD.decode(chars.as_str()),
        other => {
            return Err(BusError::Decode(format!(
                "unsupported multibase prefix {:?}",
                other
            )))
        }
    };
    decoded.map_err(|e| BusError::Decode(e.to_string()))
}

fn parse_frame(topic: &str, line: &[u8]) -> BusResult<BusMessage> {
    let frame: PubsubFrame =
        serde_json::from_slice(line).map_err(|e| BusError::Decode(e.to_string()))?;
    let data = multibase_decode(&frame.data)?;
    Ok(BusMessage::new(topic, frame.from, data))
}

/// Splits a byte stream into newline-terminated frames of bounded size
///
/// A frame longer than the limit is discarded whole, including whatever of
/// it arrives after the limit was crossed.
struct LineBuffer {
    buffer: Vec<u8>,
    limit: usize,
    skipping: bool,
    dropped: usize,
}

impl LineBuffer {
    fn new(limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            limit,
            skipping: false,
            dropped: 0,
        }
    }

    /// Number of frames discarded for exceeding the limit
    fn dropped(&self) -> usize {
        self.dropped
    }

    /// Append `chunk` and return every frame it completes
    fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut rest = chunk;
        if self.skipping {
            match rest.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    rest = &rest[pos + 1..];
                    self.skipping = false;
                }
                None => return Vec::new(),
            }
        }
        self.buffer.extend_from_slice(rest);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.len() > self.limit {
                self.dropped += 1;
            } else if !line.iter().all(u8::is_ascii_whitespace) {
                lines.push(line);
            }
        }

        if self.buffer.len() > self.limit {
            self.buffer.clear();
            self.skipping = true;
            self.dropped += 1;
        }
        lines
    }
}

#[async_trait]
impl MessageBus for IpfsPubsub {
    async fn publish(&self, topic: &str, data: Vec<u8>) -> BusResult<()> {
        let publish_error = |reason: String| BusError::Publish {
            topic: topic.to_string(),
            reason,
        };
        let form = Form::new().part("file", Part::bytes(data).file_name("data"));
        let response = self
            .http
            .post(self.endpoint("pub"))
            .query(&[("arg", multibase_encode(topic.as_bytes()))])
            .multipart(form)
            .send()
            .await
            .map_err(|e| publish_error(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(publish_error(format!("HTTP {}: {}", status, body)));
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> BusResult<Subscription> {
        let response = self.open(topic).await?;

        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(self.clone().run_subscription(topic.to_string(), response, sender));

        tracing::info!(topic, api = %self.api_url, "subscribed");
        Ok(Subscription::new(topic, receiver))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    use super::*;

    #[test]
    fn test_multibase_roundtrip() {
        let encoded = multibase_encode(b"provider_topic");
        assert!(encoded.starts_with('u'));
        assert_eq!(multibase_decode(&encoded).unwrap(), b"provider_topic".to_vec());
        assert_eq!(multibase_decode("maGk").unwrap(), b"hi".to_vec());
        assert!(multibase_decode("zabc").is_err());
        assert!(multibase_decode("").is_err());
    }

    #[test]
    fn test_parse_frame() {
        let line = format!(
            r#"{{"from":"12D3KooWPeer","data":"{}","seqno":"uAAE","topicIDs":["{}"]}}"#,
            multibase_encode(br#"{"finalized":true}"#),
            multibase_encode(b"provider")
        );
        let message = parse_frame("provider", line.as_bytes()).unwrap();
        assert_eq!(message.topic, "provider");
        assert_eq!(message.from.as_deref(), Some("12D3KooWPeer"));
        assert_eq!(message.data, br#"{"finalized":true}"#.to_vec());

        assert!(parse_frame("provider", b"{}").is_err());
    }

    #[test]
    fn test_line_buffer_keeps_partial_tail() {
        let mut lines = LineBuffer::new(64);
        let complete = lines.push(b"{\"a\":1}\n\n{\"b\":2}\n{\"c\"");
        assert_eq!(complete, vec![b"{\"a\":1}".to_vec(), b"{\"b\":2}".to_vec()]);
        assert_eq!(lines.push(b":3}\n"), vec![b"{\"c\":3}".to_vec()]);
        assert_eq!(lines.dropped(), 0);
    }

    #[test]
    fn test_line_buffer_drops_unterminated_oversized_frame() {
        let mut lines = LineBuffer::new(8);
        assert!(lines.push(b"0123456789").is_empty());
        assert_eq!(lines.dropped(), 1);
        assert!(lines.buffer.is_empty());

        // The rest of the oversized frame is discarded up to its newline
        assert!(lines.push(b"abcdefghijklmnop").is_empty());
        assert_eq!(lines.buffer.len(), 0);
        assert_eq!(lines.push(b"tail\nok\n"), vec![b"ok".to_vec()]);
        assert_eq!(lines.dropped(), 1);
    }

    #[test]
    fn test_line_buffer_drops_complete_oversized_frame() {
        let mut lines = LineBuffer::new(4);
        assert_eq!(lines.push(b"toolong\nfine\n"), vec![b"fine".to_vec()]);
        assert_eq!(lines.dropped(), 1);
    }

    async fn serve_one_frame(listener: &TcpListener, payload: &[u8]) {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut chunk = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&chunk[..n]);
        }
        let body = format!(
            "{{\"from\":\"12D3KooWPeer\",\"data\":\"{}\"}}\n",
            multibase_encode(payload)
        );
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(body.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_subscription_resubscribes_after_stream_ends() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let daemon = tokio::spawn(async move {
            serve_one_frame(&listener, b"first").await;
            serve_one_frame(&listener, b"second").await;
        });

        let bus = IpfsPubsub::new(format!("http://{}", addr))
            .with_reconnect_backoff(Duration::from_millis(10), Duration::from_millis(50));
        let mut subscription = bus.subscribe("provider").await.unwrap();

        let first = timeout(Duration::from_secs(5), subscription.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.data, b"first".to_vec());

        let second = timeout(Duration::from_secs(5), subscription.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.data, b"second".to_vec());
        assert_eq!(second.topic, "provider");

        daemon.await.unwrap();
    }

    #[test]
    fn test_reconnect_backoff_max_never_below_initial() {
        let bus = IpfsPubsub::new("http://127.0.0.1:5001")
            .with_reconnect_backoff(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(bus.reconnect_initial, Duration::from_secs(2));
        assert_eq!(bus.reconnect_max, Duration::from_secs(2));
    }

    #[test]
    fn test_api_url_normalized() {
        let bus = IpfsPubsub::new("http://127.0.0.1:5001/");
        assert_eq!(bus.api_url(), "http://127.0.0.1:5001");
        assert_eq!(bus.endpoint("pub"), "http://127.0.0.1:5001/api/v0/pubsub/pub");
    }
}

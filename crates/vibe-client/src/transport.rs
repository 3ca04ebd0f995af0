//! The seam between `EventChannel` and the network.
//!
//! A transport turns a URL into a stream of `TransportEvent`s.  The stream
//! ending means the server closed the connection; dropping it closes the
//! connection from our side.

use std::collections::VecDeque;
use std::time::Duration;

use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tracing::debug;

use crate::error::ChannelError;
use crate::sse::{SseDecoder, SseEvent};

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Response head received with a success status.
    Opened,
    Message(SseEvent),
    /// The connection failed.  Nothing follows.
    Failed(ChannelError),
}

pub type TransportStream = BoxStream<'static, TransportEvent>;

pub trait Transport: Send + Sync + 'static {
    /// Start connecting.  No I/O happens until the stream is polled.
    fn open(&self, url: &str) -> TransportStream;
}

/// `text/event-stream` over HTTP with reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    idle_timeout: Option<Duration>,
}

impl HttpTransport {
    pub fn new(http: reqwest::Client, idle_timeout: Option<Duration>) -> Self {
        Self { http, idle_timeout }
    }
}

enum Phase {
    Connect(reqwest::RequestBuilder),
    Reading(Reader),
    Done,
}

struct Reader {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<SseEvent>,
}

impl Transport for HttpTransport {
    fn open(&self, url: &str) -> TransportStream {
        let request = self
            .http
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        let idle_timeout = self.idle_timeout;

        stream::unfold(Phase::Connect(request), move |phase| step(phase, idle_timeout)).boxed()
    }
}

async fn step(phase: Phase, idle_timeout: Option<Duration>) -> Option<(TransportEvent, Phase)> {
    match phase {
        Phase::Connect(request) => {
            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let failure = ChannelError::Transport(e.to_string());
                    return Some((TransportEvent::Failed(failure), Phase::Done));
                }
            };
            let status = response.status();
            if !status.is_success() {
                let failure = ChannelError::Http {
                    status: status.as_u16(),
                };
                return Some((TransportEvent::Failed(failure), Phase::Done));
            }
            let body = response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                .boxed();
            let reader = Reader {
                body,
                decoder: SseDecoder::new(),
                pending: VecDeque::new(),
            };
            Some((TransportEvent::Opened, Phase::Reading(reader)))
        }
        Phase::Reading(mut reader) => loop {
            if let Some(event) = reader.pending.pop_front() {
                return Some((TransportEvent::Message(event), Phase::Reading(reader)));
            }

            let next = match idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, reader.body.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        let failure = ChannelError::IdleTimeout(limit);
                        return Some((TransportEvent::Failed(failure), Phase::Done));
                    }
                },
                None => reader.body.next().await,
            };

            match next {
                Some(Ok(chunk)) => reader.pending.extend(reader.decoder.feed(&chunk)),
                Some(Err(e)) => {
                    let failure = ChannelError::Transport(e.to_string());
                    return Some((TransportEvent::Failed(failure), Phase::Done));
                }
                None => {
                    debug!("Event stream ended by server");
                    return None;
                }
            }
        },
        Phase::Done => None,
    }
}

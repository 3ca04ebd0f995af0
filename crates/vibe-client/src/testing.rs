//! In-process transport for unit tests.

use std::sync::Mutex;
use std::time::Duration;

use futures_util::stream;
use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};

use crate::sse::SseEvent;
use crate::transport::{Transport, TransportEvent, TransportStream};

/// Every `open` creates a connection the test drives by hand.  Dropping the
/// sender ends the stream as if the server hung up.
#[derive(Default)]
pub struct ScriptedTransport {
    connections: Mutex<Vec<mpsc::UnboundedSender<TransportEvent>>>,
}

impl ScriptedTransport {
    pub fn opened(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub fn connection(&self, index: usize) -> mpsc::UnboundedSender<TransportEvent> {
        self.connections.lock().unwrap()[index].clone()
    }

    /// Drop the transport's own sender so the stream ends once the test's
    /// clones are gone too.
    pub fn release(&self, index: usize) -> mpsc::UnboundedSender<TransportEvent> {
        let mut connections = self.connections.lock().unwrap();
        let (tx, _) = mpsc::unbounded_channel();
        std::mem::replace(&mut connections[index], tx)
    }
}

impl Transport for ScriptedTransport {
    fn open(&self, _url: &str) -> TransportStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.lock().unwrap().push(tx);
        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|ev| (ev, rx)) }).boxed()
    }
}

pub fn progress(json: &str) -> TransportEvent {
    named("progress", json)
}

pub fn named(event: &str, data: &str) -> TransportEvent {
    TransportEvent::Message(SseEvent {
        event: event.to_string(),
        data: data.to_string(),
        id: None,
    })
}

/// Wait until the watched value satisfies `pred`, failing the test after a
/// second.
pub async fn wait_for<T, F>(rx: &mut watch::Receiver<T>, mut pred: F) -> T
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    loop {
        {
            let current = rx.borrow_and_update();
            if pred(&current) {
                return current.clone();
            }
        }
        tokio::time::timeout_at(deadline, rx.changed())
            .await
            .expect("timed out waiting for state")
            .expect("sender dropped");
    }
}

/// Let spawned tasks run for a moment.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

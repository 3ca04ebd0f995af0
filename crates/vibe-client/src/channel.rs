//! One progress stream: connection lifecycle plus the latest snapshot.
//!
//! Each `connect()` gets a fresh epoch.  The reader task tags everything it
//! delivers with the epoch it was spawned for, and delivery happens under
//! the watch channel's lock only while that epoch is still current and the
//! channel is live.  So once `connect()`, `close()` or drop returns, nothing
//! from an older connection can reach observers, even if its task has not
//! been torn down yet.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vibe_proto::protocol::{
    ChannelStatus, ProgressSnapshot, StreamErrorPayload, EVENT_COMPLETE, EVENT_ERROR,
    EVENT_PROGRESS,
};

use crate::error::ChannelError;
use crate::transport::{Transport, TransportEvent, TransportStream};

/// What observers of a channel see.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelState {
    pub status: ChannelStatus,
    /// Last valid `progress` payload of the current connection.
    pub snapshot: Option<ProgressSnapshot>,
    pub last_error: Option<ChannelError>,
    /// Identity of the connection this state belongs to.  Bumped by every
    /// `connect()`, never by anything else.
    pub epoch: u64,
}

struct Connection {
    epoch: u64,
    task: JoinHandle<()>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct EventChannel {
    url: String,
    transport: Arc<dyn Transport>,
    state: Arc<watch::Sender<ChannelState>>,
    connection: Option<Connection>,
}

impl EventChannel {
    pub fn new(url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        let (tx, _) = watch::channel(ChannelState::default());
        Self {
            url: url.into(),
            transport,
            state: Arc::new(tx),
            connection: None,
        }
    }

    /// Open a new connection, superseding any existing one.  Returns the new
    /// epoch.  Must be called from within a tokio runtime.
    pub fn connect(&mut self) -> u64 {
        if let Some(old) = self.connection.take() {
            debug!("Superseding stream connection #{} to {}", old.epoch, self.url);
        }

        let mut epoch = 0;
        self.state.send_modify(|st| {
            st.epoch += 1;
            epoch = st.epoch;
            st.status = ChannelStatus::Connecting;
            st.snapshot = None;
            st.last_error = None;
        });

        info!("Connecting to {} (#{})", self.url, epoch);
        let events = self.transport.open(&self.url);
        let task = tokio::spawn(pump(events, Arc::clone(&self.state), epoch));
        self.connection = Some(Connection { epoch, task });
        epoch
    }

    /// Tear down the connection and go `Idle`.  No-op when there is none.
    pub fn close(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        self.state.send_modify(|st| st.status = ChannelStatus::Idle);
        drop(connection);
        info!("Closed stream {}", self.url);
    }

    /// A connection exists and has not reached a terminal status.
    pub fn is_open(&self) -> bool {
        self.connection.is_some() && !self.state.borrow().status.is_terminal()
    }

    pub fn state(&self) -> ChannelState {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> ChannelStatus {
        self.state.borrow().status
    }

    pub fn snapshot(&self) -> Option<ProgressSnapshot> {
        self.state.borrow().snapshot.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        self.close();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

async fn pump(mut events: TransportStream, state: Arc<watch::Sender<ChannelState>>, epoch: u64) {
    while let Some(event) = events.next().await {
        if deliver(&state, epoch, event) == Flow::Stop {
            debug!("Reader #{} finished", epoch);
            return;
        }
    }
    deliver(
        &state,
        epoch,
        TransportEvent::Failed(ChannelError::ClosedEarly),
    );
}

fn deliver(state: &watch::Sender<ChannelState>, epoch: u64, event: TransportEvent) -> Flow {
    let mut flow = Flow::Stop;
    state.send_if_modified(|st| {
        let (changed, next) = apply(st, epoch, event);
        flow = next;
        changed
    });
    flow
}

/// Fold one transport event into the state.  Returns whether observers
/// should be notified and whether the reader should keep going.
fn apply(st: &mut ChannelState, epoch: u64, event: TransportEvent) -> (bool, Flow) {
    if st.epoch != epoch || !st.status.is_live() {
        return (false, Flow::Stop);
    }

    match event {
        TransportEvent::Opened => {
            if st.status == ChannelStatus::Connected {
                return (false, Flow::Continue);
            }
            st.status = ChannelStatus::Connected;
            st.last_error = None;
            (true, Flow::Continue)
        }
        TransportEvent::Message(msg) => match msg.event.as_str() {
            EVENT_PROGRESS => match serde_json::from_str::<ProgressSnapshot>(&msg.data) {
                Ok(snapshot) => {
                    if st.snapshot.as_ref() == Some(&snapshot) {
                        return (false, Flow::Continue);
                    }
                    st.snapshot = Some(snapshot);
                    (true, Flow::Continue)
                }
                Err(e) => {
                    warn!("Dropping malformed progress event: {} ({:?})", e, msg.data);
                    (false, Flow::Continue)
                }
            },
            EVENT_COMPLETE => {
                debug!("Stream #{} complete: {}", epoch, msg.data);
                st.status = ChannelStatus::Complete;
                (true, Flow::Stop)
            }
            EVENT_ERROR => {
                let message = serde_json::from_str::<StreamErrorPayload>(&msg.data)
                    .map(|payload| payload.message)
                    .unwrap_or_else(|_| msg.data.trim().to_string());
                warn!("Server reported stream error: {}", message);
                st.status = ChannelStatus::Error;
                st.last_error = Some(ChannelError::Server(message));
                (true, Flow::Stop)
            }
            other => {
                debug!("Ignoring stream event {:?}", other);
                (false, Flow::Continue)
            }
        },
        TransportEvent::Failed(error) => {
            warn!("Stream #{} failed: {}", epoch, error);
            st.status = ChannelStatus::Error;
            st.last_error = Some(error);
            (true, Flow::Stop)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{named, progress, settle, wait_for, ScriptedTransport};

    fn channel() -> (EventChannel, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::default());
        let channel = EventChannel::new("http://test/api/download/stream", transport.clone());
        (channel, transport)
    }

    fn live(epoch: u64) -> ChannelState {
        ChannelState {
            status: ChannelStatus::Connected,
            epoch,
            ..ChannelState::default()
        }
    }

    #[test]
    fn test_apply_discards_other_epochs() {
        let mut st = live(2);
        let before = st.clone();
        let (changed, flow) = apply(&mut st, 1, progress(r#"{"current":9,"total":9}"#));
        assert!(!changed);
        assert_eq!(flow, Flow::Stop);
        assert_eq!(st, before);
    }

    #[test]
    fn test_apply_discards_after_terminal() {
        let mut st = live(1);
        st.status = ChannelStatus::Complete;
        let (changed, _) = apply(&mut st, 1, progress(r#"{"current":1}"#));
        assert!(!changed);
        assert_eq!(st.snapshot, None);
    }

    #[test]
    fn test_apply_error_event_message() {
        let mut st = live(1);
        let (changed, flow) = apply(&mut st, 1, named("error", r#"{"message":"Playlist not found"}"#));
        assert!(changed);
        assert_eq!(flow, Flow::Stop);
        assert_eq!(st.status, ChannelStatus::Error);
        assert_eq!(
            st.last_error,
            Some(ChannelError::Server("Playlist not found".into()))
        );
    }

    #[test]
    fn test_apply_unknown_event_is_ignored() {
        let mut st = live(1);
        let (changed, flow) = apply(&mut st, 1, named("heartbeat", "{}"));
        assert!(!changed);
        assert_eq!(flow, Flow::Continue);
    }

    #[tokio::test]
    async fn test_connect_open_progress_complete() {
        let (mut channel, transport) = channel();
        let mut rx = channel.subscribe();
        assert_eq!(channel.status(), ChannelStatus::Idle);

        let epoch = channel.connect();
        assert_eq!(epoch, 1);
        assert_eq!(channel.status(), ChannelStatus::Connecting);

        let conn = transport.connection(0);
        conn.send(TransportEvent::Opened).unwrap();
        wait_for(&mut rx, |st| st.status == ChannelStatus::Connected).await;

        conn.send(progress(r#"{"current":3,"total":10}"#)).unwrap();
        let st = wait_for(&mut rx, |st| st.snapshot.is_some()).await;
        let snap = st.snapshot.unwrap();
        assert_eq!((snap.current, snap.total), (3, 10));

        conn.send(named("complete", r#"{"count":10}"#)).unwrap();
        let st = wait_for(&mut rx, |st| st.status == ChannelStatus::Complete).await;
        assert_eq!(st.snapshot.map(|s| s.current), Some(3));
        assert_eq!(st.last_error, None);
    }

    #[tokio::test]
    async fn test_malformed_progress_is_dropped() {
        let (mut channel, transport) = channel();
        let mut rx = channel.subscribe();
        channel.connect();
        let conn = transport.connection(0);
        conn.send(TransportEvent::Opened).unwrap();
        conn.send(progress(r#"{"current":1,"total":2}"#)).unwrap();
        wait_for(&mut rx, |st| st.snapshot.is_some()).await;

        conn.send(progress("{not json")).unwrap();
        settle().await;
        assert!(!rx.has_changed().unwrap());
        let st = channel.state();
        assert_eq!(st.status, ChannelStatus::Connected);
        assert_eq!(st.snapshot.map(|s| s.current), Some(1));

        // The stream keeps flowing afterwards.
        conn.send(progress(r#"{"current":2,"total":2}"#)).unwrap();
        wait_for(&mut rx, |st| st.snapshot.as_ref().map(|s| s.current) == Some(2)).await;
    }

    #[tokio::test]
    async fn test_server_close_without_complete_is_an_error() {
        let (mut channel, transport) = channel();
        let mut rx = channel.subscribe();
        channel.connect();
        let conn = transport.release(0);
        conn.send(TransportEvent::Opened).unwrap();
        drop(conn);

        let st = wait_for(&mut rx, |st| st.status == ChannelStatus::Error).await;
        assert_eq!(st.last_error, Some(ChannelError::ClosedEarly));
    }

    #[tokio::test]
    async fn test_transport_failure_sets_error() {
        let (mut channel, transport) = channel();
        let mut rx = channel.subscribe();
        channel.connect();
        transport
            .connection(0)
            .send(TransportEvent::Failed(ChannelError::Http { status: 503 }))
            .unwrap();
        let st = wait_for(&mut rx, |st| st.status == ChannelStatus::Error).await;
        assert_eq!(st.last_error, Some(ChannelError::Http { status: 503 }));
    }

    #[tokio::test]
    async fn test_is_open_ends_with_terminal_status() {
        let (mut channel, transport) = channel();
        let mut rx = channel.subscribe();
        assert!(!channel.is_open());

        channel.connect();
        assert!(channel.is_open());
        let conn = transport.connection(0);
        conn.send(TransportEvent::Opened).unwrap();
        wait_for(&mut rx, |st| st.status == ChannelStatus::Connected).await;
        assert!(channel.is_open());
        conn.send(named("complete", "{}")).unwrap();
        wait_for(&mut rx, |st| st.status == ChannelStatus::Complete).await;
        assert!(!channel.is_open());

        channel.connect();
        assert!(channel.is_open());
        transport
            .connection(1)
            .send(named("error", r#"{"message":"boom"}"#))
            .unwrap();
        wait_for(&mut rx, |st| st.status == ChannelStatus::Error).await;
        assert!(!channel.is_open());
    }

    #[tokio::test]
    async fn test_reconnect_supersedes_old_connection() {
        let (mut channel, transport) = channel();
        let mut rx = channel.subscribe();
        channel.connect();
        let first = transport.connection(0);
        first.send(TransportEvent::Opened).unwrap();
        first.send(progress(r#"{"current":5,"total":10}"#)).unwrap();
        wait_for(&mut rx, |st| st.snapshot.is_some()).await;

        let epoch = channel.connect();
        assert_eq!(epoch, 2);
        assert_eq!(transport.opened(), 2);
        let st = channel.state();
        assert_eq!(st.status, ChannelStatus::Connecting);
        assert_eq!(st.snapshot, None);

        // Late traffic on the old connection goes nowhere.
        let _ = first.send(progress(r#"{"current":6,"total":10}"#));
        let _ = first.send(named("complete", "{}"));

        let second = transport.connection(1);
        second.send(TransportEvent::Opened).unwrap();
        second.send(progress(r#"{"current":1,"total":3}"#)).unwrap();
        let st = wait_for(&mut rx, |st| st.snapshot.is_some()).await;
        assert_eq!(st.epoch, 2);
        assert_eq!(st.snapshot.map(|s| s.current), Some(1));

        settle().await;
        let st = channel.state();
        assert_eq!(st.status, ChannelStatus::Connected);
        assert_eq!(st.snapshot.map(|s| s.current), Some(1));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_final() {
        let (mut channel, transport) = channel();
        let mut rx = channel.subscribe();

        channel.close();
        assert_eq!(channel.status(), ChannelStatus::Idle);
        assert!(!rx.has_changed().unwrap());

        channel.connect();
        let conn = transport.connection(0);
        conn.send(TransportEvent::Opened).unwrap();
        wait_for(&mut rx, |st| st.status == ChannelStatus::Connected).await;

        channel.close();
        channel.close();
        assert!(!channel.is_open());
        assert_eq!(channel.status(), ChannelStatus::Idle);
        rx.borrow_and_update();

        let _ = conn.send(progress(r#"{"current":4,"total":4}"#));
        settle().await;
        assert!(!rx.has_changed().unwrap());
        assert_eq!(channel.status(), ChannelStatus::Idle);
    }

    #[tokio::test]
    async fn test_drop_stops_delivery() {
        let (mut channel, transport) = channel();
        let rx = channel.subscribe();
        channel.connect();
        let conn = transport.connection(0);
        drop(channel);

        let _ = conn.send(TransportEvent::Opened);
        let _ = conn.send(progress(r#"{"current":1,"total":1}"#));
        settle().await;
        let st = rx.borrow().clone();
        assert_eq!(st.status, ChannelStatus::Idle);
        assert_eq!(st.snapshot, None);
    }
}

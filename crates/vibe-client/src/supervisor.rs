//! Owns the single progress channel of one stage.

use std::sync::Arc;

use tokio::sync::watch;
use vibe_proto::protocol::{ChannelStatus, ProgressSnapshot, Stage};

use crate::api::ApiBase;
use crate::channel::{ChannelState, EventChannel};
use crate::transport::Transport;

/// At most one live connection per stage: the supervisor is the only owner
/// of the stage's `EventChannel` and is not `Clone`.
pub struct ChannelSupervisor {
    stage: Stage,
    channel: EventChannel,
}

impl ChannelSupervisor {
    pub fn new(stage: Stage, base: &ApiBase, transport: Arc<dyn Transport>) -> Self {
        Self {
            stage,
            channel: EventChannel::new(base.stream_url(stage), transport),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Connect, superseding whatever was open.  Returns the new epoch.
    pub fn connect(&mut self) -> u64 {
        self.channel.connect()
    }

    pub fn close(&mut self) {
        self.channel.close();
    }

    pub fn state(&self) -> ChannelState {
        self.channel.state()
    }

    pub fn status(&self) -> ChannelStatus {
        self.channel.status()
    }

    pub fn snapshot(&self) -> Option<ProgressSnapshot> {
        self.channel.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.channel.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{progress, wait_for, ScriptedTransport};
    use crate::transport::TransportEvent;

    #[tokio::test]
    async fn test_stream_url_and_lifecycle() {
        let transport = Arc::new(ScriptedTransport::default());
        let base = ApiBase::parse("http://localhost:8000").unwrap();
        let mut supervisor = ChannelSupervisor::new(Stage::Sync, &base, transport.clone());
        let mut rx = supervisor.subscribe();
        assert_eq!(supervisor.stage(), Stage::Sync);
        assert_eq!(supervisor.status(), ChannelStatus::Idle);

        supervisor.connect();
        assert_eq!(supervisor.status(), ChannelStatus::Connecting);

        let conn = transport.connection(0);
        conn.send(TransportEvent::Opened).unwrap();
        wait_for(&mut rx, |st| st.status == ChannelStatus::Connected).await;

        conn.send(progress(r#"{"current":1,"total":2}"#)).unwrap();
        let st = wait_for(&mut rx, |st| st.snapshot.is_some()).await;
        assert_eq!(st.snapshot.map(|s| s.total), Some(2));
        assert_eq!(supervisor.snapshot().map(|s| s.current), Some(1));

        supervisor.close();
        assert_eq!(supervisor.state().status, ChannelStatus::Idle);
    }

    #[tokio::test]
    async fn test_reconnect_opens_one_connection_each() {
        let transport = Arc::new(ScriptedTransport::default());
        let base = ApiBase::parse("http://localhost:8000").unwrap();
        let mut supervisor = ChannelSupervisor::new(Stage::Embed, &base, transport.clone());

        assert_eq!(supervisor.connect(), 1);
        assert_eq!(supervisor.connect(), 2);
        assert_eq!(transport.opened(), 2);
        let st = supervisor.state();
        assert_eq!(st.epoch, 2);
        assert_eq!(st.status, ChannelStatus::Connecting);
    }
}

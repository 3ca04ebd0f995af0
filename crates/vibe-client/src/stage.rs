//! Start a stage job and follow its progress.
//!
//! `StageState` is derived from the stage's channel by a watcher task.  The
//! derivation is level-triggered: whenever the channel state of the current
//! run is terminal, `running` is false, however many times that state is
//! observed.  `start` re-derives before it checks `running`, so a start
//! right after completion is never rejected because the watcher was late.
//!
//! Lock order: supervisor mutex, then the stage watch, then the channel
//! watch (read only).  Reader tasks only ever take the channel watch.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vibe_proto::protocol::{ChannelStatus, ProgressSnapshot, SongRef, Stage, StartResponse};

use crate::api::{ApiClient, StartRequest, SyncSource};
use crate::channel::ChannelState;
use crate::error::StageError;
use crate::supervisor::ChannelSupervisor;
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StageState {
    /// A job accepted by the server whose stream has not ended yet.
    pub running: bool,
    /// A start call is in flight.
    pub starting: bool,
    pub status: ChannelStatus,
    pub snapshot: Option<ProgressSnapshot>,
    /// Last rejection or stream error, for a banner.
    pub message: Option<String>,
    /// `total` from the start response, shown until the first progress event.
    pub total_hint: Option<u64>,
    /// Channel epoch of the current (or last) run.  Observers use it to tell
    /// one run's end from the next.
    pub run_epoch: Option<u64>,
}

/// Progress numbers ready for display.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Progress {
    pub current: u64,
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub active: Option<u64>,
    /// Always within `[0, 100]`.
    pub percentage: f64,
    pub song: Option<SongRef>,
}

/// `current / total` as a percentage, 0 when the total is unknown.
pub fn percentage(current: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (current as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

impl StageState {
    pub fn progress(&self) -> Progress {
        match &self.snapshot {
            Some(snap) => Progress {
                current: snap.current,
                total: snap.total,
                success: snap.success,
                failed: snap.failed,
                active: snap.active,
                percentage: percentage(snap.current, snap.total),
                song: snap.song.clone(),
            },
            None => Progress {
                total: self.total_hint.unwrap_or(0),
                ..Progress::default()
            },
        }
    }

    pub fn percentage(&self) -> f64 {
        self.progress().percentage
    }

    /// Start is pointless while this is true.
    pub fn is_busy(&self) -> bool {
        self.running || self.starting
    }
}

/// Fold the channel state into the stage state.  Returns whether anything
/// visible changed.
fn reconcile(stage: Stage, st: &mut StageState, channel: &ChannelState) -> bool {
    if let Some(run) = st.run_epoch {
        if channel.epoch < run {
            return false;
        }
    }

    let before = st.clone();
    st.status = channel.status;
    st.snapshot = channel.snapshot.clone();
    if channel.status == ChannelStatus::Error {
        if let Some(err) = &channel.last_error {
            st.message = Some(err.to_string());
        }
    }
    if st.running && st.run_epoch == Some(channel.epoch) && channel.status.is_terminal() {
        st.running = false;
        info!("{} run finished: {}", stage, channel.status.label());
    }
    *st != before
}

/// Handle to one stage.  Clones share the same job and channel; the channel
/// is closed when the last clone is dropped.
#[derive(Clone)]
pub struct StageController {
    inner: Arc<Inner>,
}

struct Inner {
    stage: Stage,
    api: ApiClient,
    supervisor: Mutex<ChannelSupervisor>,
    state: Arc<watch::Sender<StageState>>,
    watcher: JoinHandle<()>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

impl Inner {
    fn supervisor(&self) -> MutexGuard<'_, ChannelSupervisor> {
        self.supervisor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears `starting` however the start call ends, including cancellation.
struct StartGuard<'a> {
    state: &'a watch::Sender<StageState>,
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        self.state
            .send_if_modified(|st| std::mem::replace(&mut st.starting, false));
    }
}

impl StageController {
    /// Must be called from within a tokio runtime.
    pub fn new(stage: Stage, api: ApiClient, transport: Arc<dyn Transport>) -> Self {
        let supervisor = ChannelSupervisor::new(stage, api.base(), transport);
        let channel_rx = supervisor.subscribe();
        let (tx, _) = watch::channel(StageState::default());
        let state = Arc::new(tx);
        let watcher = tokio::spawn(watch_channel(stage, channel_rx, Arc::clone(&state)));
        Self {
            inner: Arc::new(Inner {
                stage,
                api,
                supervisor: Mutex::new(supervisor),
                state,
                watcher,
            }),
        }
    }

    pub fn stage(&self) -> Stage {
        self.inner.stage
    }

    pub fn state(&self) -> StageState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StageState> {
        self.inner.state.subscribe()
    }

    pub fn progress(&self) -> Progress {
        self.inner.state.borrow().progress()
    }

    /// Ask the server to start the stage's job and, if it did, connect the
    /// progress stream.
    ///
    /// Fails without any network call when a run is already in flight or
    /// the request is malformed.  A response other than `started` (or an
    /// HTTP error) leaves the stage not running, with the server's message
    /// in `StageState::message`.
    pub async fn start(&self, request: StartRequest) -> Result<StartResponse, StageError> {
        let stage = self.inner.stage;
        if request.stage() != stage {
            return Err(StageError::WrongStage {
                stage,
                requested: request.stage(),
            });
        }
        if let StartRequest::Sync(SyncSource::Playlist(id)) = &request {
            if id.trim().is_empty() {
                return Err(StageError::InvalidInput(
                    "Enter a playlist ID or URL".to_string(),
                ));
            }
        }

        if !self.claim() {
            warn!("Ignoring start: {} is already running", stage);
            return Err(StageError::AlreadyRunning(stage));
        }
        let _guard = StartGuard {
            state: &self.inner.state,
        };

        info!("Starting {}", stage);
        match self.inner.api.start(&request).await {
            Ok(response) if response.is_started() => {
                let mut supervisor = self.inner.supervisor();
                let epoch = supervisor.connect();
                self.inner.state.send_modify(|st| {
                    st.starting = false;
                    st.running = true;
                    st.run_epoch = Some(epoch);
                    st.total_hint = response.total;
                    st.message = None;
                    reconcile(stage, st, &supervisor.state());
                });
                Ok(response)
            }
            Ok(response) => {
                let message = response
                    .message
                    .unwrap_or_else(|| format!("{} did not start ({})", stage, response.status));
                info!("{} not started: {}", stage, message);
                self.inner.state.send_modify(|st| {
                    st.starting = false;
                    st.message = Some(message.clone());
                });
                Err(StageError::Rejected(message))
            }
            Err(e) => {
                warn!("{} start failed: {}", stage, e);
                let message = e.user_message();
                self.inner.state.send_modify(|st| {
                    st.starting = false;
                    st.message = Some(message);
                });
                Err(StageError::Api(e))
            }
        }
    }

    /// Close the stream and forget the run.  The server-side job, if any,
    /// keeps going.
    pub fn reset(&self) {
        let mut supervisor = self.inner.supervisor();
        supervisor.close();
        self.inner.state.send_modify(|st| {
            reconcile(self.inner.stage, st, &supervisor.state());
            st.running = false;
            st.message = None;
        });
        debug!("{} reset", self.inner.stage);
    }

    /// Reconcile with the channel, then mark a start in flight unless one
    /// already is.  Both under one lock so concurrent starts cannot both win.
    fn claim(&self) -> bool {
        let supervisor = self.inner.supervisor();
        let mut claimed = false;
        self.inner.state.send_if_modified(|st| {
            let changed = reconcile(self.inner.stage, st, &supervisor.state());
            if st.is_busy() {
                return changed;
            }
            st.starting = true;
            st.message = None;
            claimed = true;
            true
        });
        claimed
    }
}

async fn watch_channel(
    stage: Stage,
    mut channel_rx: watch::Receiver<ChannelState>,
    state: Arc<watch::Sender<StageState>>,
) {
    loop {
        state.send_if_modified(|st| {
            let channel = channel_rx.borrow_and_update();
            reconcile(stage, st, &channel)
        });
        if channel_rx.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(current: u64, total: u64) -> ProgressSnapshot {
        ProgressSnapshot {
            current,
            total,
            ..ProgressSnapshot::default()
        }
    }

    fn channel(epoch: u64, status: ChannelStatus) -> ChannelState {
        ChannelState {
            status,
            epoch,
            ..ChannelState::default()
        }
    }

    #[test]
    fn test_percentage_bounds() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(5, 0), 0.0);
        assert_eq!(percentage(1, 4), 25.0);
        assert_eq!(percentage(4, 4), 100.0);
        assert_eq!(percentage(12, 10), 100.0);
    }

    #[test]
    fn test_progress_falls_back_to_total_hint() {
        let st = StageState {
            total_hint: Some(42),
            ..StageState::default()
        };
        let progress = st.progress();
        assert_eq!(progress.total, 42);
        assert_eq!(progress.current, 0);
        assert_eq!(progress.percentage, 0.0);

        let st = StageState {
            total_hint: Some(42),
            snapshot: Some(snapshot(3, 12)),
            ..StageState::default()
        };
        assert_eq!(st.progress().total, 12);
        assert_eq!(st.percentage(), 25.0);
    }

    #[test]
    fn test_terminal_state_stops_running_once() {
        let mut st = StageState {
            running: true,
            run_epoch: Some(3),
            ..StageState::default()
        };
        let mut done = channel(3, ChannelStatus::Complete);
        done.snapshot = Some(snapshot(10, 10));

        assert!(reconcile(Stage::Embed, &mut st, &done));
        assert!(!st.running);
        assert_eq!(st.status, ChannelStatus::Complete);
        // Seeing the same terminal state again is a no-op.
        assert!(!reconcile(Stage::Embed, &mut st, &done));
    }

    #[test]
    fn test_states_from_older_runs_are_ignored() {
        let mut st = StageState {
            running: true,
            run_epoch: Some(2),
            status: ChannelStatus::Connecting,
            ..StageState::default()
        };
        assert!(!reconcile(Stage::Download, &mut st, &channel(1, ChannelStatus::Complete)));
        assert!(st.running);
        assert_eq!(st.status, ChannelStatus::Connecting);
    }

    #[test]
    fn test_stream_error_surfaces_message() {
        let mut st = StageState {
            running: true,
            run_epoch: Some(1),
            ..StageState::default()
        };
        let mut failed = channel(1, ChannelStatus::Error);
        failed.last_error = Some(crate::error::ChannelError::ClosedEarly);
        reconcile(Stage::Sync, &mut st, &failed);
        assert!(!st.running);
        assert_eq!(st.message.as_deref(), Some("stream closed before completion"));
    }
}

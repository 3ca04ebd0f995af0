//! Client side of the vibe pipeline.
//!
//! The interesting part is the progress subsystem:
//!
//! ```text
//!   StageController ── start call (api) ──► "started"
//!         │
//!         └── ChannelSupervisor ── EventChannel ── Transport (text/event-stream)
//!                                        │
//!                                        └── watch::Sender<ChannelState>
//! ```
//!
//! Every layer publishes its state through a `tokio::sync::watch` channel, so
//! surfaces subscribe and re-render on change instead of polling.

pub mod api;
pub mod channel;
pub mod error;
pub mod search;
pub mod sse;
pub mod stage;
pub mod supervisor;
pub mod transport;

#[cfg(test)]
mod testing;

pub use api::{ApiBase, ApiClient, StartRequest, SyncSource};
pub use channel::{ChannelState, EventChannel};
pub use error::{ApiError, ChannelError, StageError};
pub use search::{SearchController, SearchOutcome, SearchState};
pub use stage::{Progress, StageController, StageState};
pub use supervisor::ChannelSupervisor;
pub use transport::{HttpTransport, Transport, TransportEvent};

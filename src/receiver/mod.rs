//! Receiver core: one state value, one update function, one loop.
//!
//! ```text
//! MqttHandler ──┐
//! Downloader  ──┼─[AppEvent]─► ReceiverRuntime ── update() ──► Effects ──► Presenter
//! Remote      ──┘                    ▲                            │
//!                                    └──── HideOverlay timers ────┘
//! ```
//!
//! Every producer sends [`AppEvent`]s over the same channel. Only the runtime owns
//! [`ReceiverState`]; everything it has to do outside of state changes comes back
//! from `update` as an [`Effect`].

pub mod runtime;
pub mod state;

pub use runtime::ReceiverRuntime;
pub use state::{Overlay, ReceiverState, StatusLevel, StatusLine};

use crate::media::{DownloadEvent, MediaBatch};
use crate::mqtt::{OutboundMessage, TransportEvent};
use crate::persistence::SessionSnapshot;
use crate::remote::RemoteKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    Transport(TransportEvent),
    Download(DownloadEvent),
    Key(RemoteKey),
    /// Auto-hide timer for the overlay generation it was scheduled for fired
    HideOverlay(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Publish(OutboundMessage),
    Download { batch_id: u64, batch: MediaBatch },
    Persist(SessionSnapshot),
    ScheduleHide { generation: u64 },
    Render,
    Shutdown,
}

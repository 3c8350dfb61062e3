//! Receiver state and the single function that advances it.
//!
//! `update` consumes the current state and one event and returns the next state with
//! the effects the runtime has to carry out. It performs no I/O itself.

use super::{AppEvent, Effect};
use crate::identity::DeviceIdentity;
use crate::media::{DownloadEvent, DownloadReport, MediaBatch, MediaItem, MediaRegistry};
use crate::mqtt::{ConnectionState, DeviceTopics, Inbound, OutboundMessage, TransportEvent};
use crate::pairing::{PairClaim, Pairing, PairingError};
use crate::persistence::SessionSnapshot;
use crate::remote::RemoteKey;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub text: String,
    pub level: StatusLevel,
}

/// Info overlay drawn on top of the current media.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overlay {
    pub visible: bool,
    pub status: Option<StatusLine>,
    /// Bumped on every status change; a hide timer only applies to its own generation
    pub generation: u64,
}

#[derive(Debug)]
pub struct ReceiverState {
    pub identity: DeviceIdentity,
    pub topics: DeviceTopics,
    pub pairing: Pairing,
    pub registry: MediaRegistry,
    pub connection: ConnectionState,
    pub overlay: Overlay,
    next_batch_id: u64,
    /// Batches below this id were queued before the last re-arm
    first_live_batch: u64,
}

impl ReceiverState {
    pub fn new(
        identity: DeviceIdentity,
        topics: DeviceTopics,
        pairing: Pairing,
        registry: MediaRegistry,
    ) -> Self {
        Self {
            identity,
            topics,
            pairing,
            registry,
            connection: ConnectionState::Disconnected,
            overlay: Overlay {
                visible: true,
                status: None,
                generation: 0,
            },
            next_batch_id: 1,
            first_live_batch: 1,
        }
    }

    pub fn is_paired(&self) -> bool {
        self.pairing.is_paired()
    }

    pub fn current(&self) -> Option<&MediaItem> {
        self.registry.current()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::capture(self.is_paired(), self.pairing.code(), &self.registry)
    }

    pub fn update(mut self, event: AppEvent) -> (Self, Vec<Effect>) {
        let mut effects = Vec::new();

        match event {
            AppEvent::Transport(event) => self = self.on_transport(event, &mut effects),
            AppEvent::Download(event) => self.on_download(event, &mut effects),
            AppEvent::Key(key) => self = self.on_key(key, &mut effects),
            AppEvent::HideOverlay(generation) => self.on_hide(generation, &mut effects),
        }

        (self, effects)
    }

    fn on_transport(mut self, event: TransportEvent, effects: &mut Vec<Effect>) -> Self {
        match event {
            TransportEvent::ConnectionChanged(state) => {
                self.connection = state;
                let (text, level) = match state {
                    ConnectionState::Connected => ("MQTT connected", StatusLevel::Success),
                    ConnectionState::Connecting => ("Connecting...", StatusLevel::Info),
                    ConnectionState::Reconnecting => ("Reconnecting...", StatusLevel::Warning),
                    ConnectionState::Disconnected => ("MQTT disconnected", StatusLevel::Error),
                };
                self.show_status(text, level, effects);
            }
            TransportEvent::Message(Inbound::PairClaim(claim)) => {
                self = self.on_claim(claim, effects);
            }
            TransportEvent::Message(Inbound::MediaBatch(batch)) => {
                self.on_batch(batch, effects);
            }
            TransportEvent::Message(Inbound::ShowIndex(index)) => {
                if !self.is_paired() {
                    warn!("Ignoring index {} while unpaired", index);
                    return self;
                }
                if self.registry.show_nearest(index).is_some() {
                    self.show_position(effects);
                    effects.push(Effect::Persist(self.snapshot()));
                } else {
                    self.show_status("No media available", StatusLevel::Warning, effects);
                }
            }
            TransportEvent::Malformed { topic, reason } => {
                debug!("Malformed message on {}: {}", topic, reason);
                self.show_status("Could not process message", StatusLevel::Error, effects);
            }
        }
        self
    }

    fn on_claim(mut self, claim: PairClaim, effects: &mut Vec<Effect>) -> Self {
        let (pairing, result) = self.pairing.try_claim(&claim.pairing_code);
        self.pairing = pairing;

        match result {
            Ok(ack) => {
                info!("Paired with companion app");
                effects.push(Effect::Publish(OutboundMessage {
                    topic: self.topics.pair_response.clone(),
                    payload: ack.to_json(),
                }));
                effects.push(Effect::Persist(self.snapshot()));
                self.show_status("Paired successfully", StatusLevel::Success, effects);
            }
            Err(PairingError::AlreadyPaired) => debug!("Duplicate pairing claim ignored"),
            Err(e) => warn!("Pairing claim rejected: {}", e),
        }
        self
    }

    fn on_batch(&mut self, batch: MediaBatch, effects: &mut Vec<Effect>) {
        if !self.is_paired() {
            warn!("Ignoring media batch while unpaired");
            return;
        }

        let batch_id = self.next_batch_id;
        self.next_batch_id += 1;
        let text = format!("Downloading {} items...", batch.len());
        info!("Batch {}: {}", batch_id, text);

        effects.push(Effect::Download { batch_id, batch });
        self.show_status(&text, StatusLevel::Info, effects);
    }

    fn accepts_batch(&self, batch_id: u64) -> bool {
        self.is_paired() && batch_id >= self.first_live_batch
    }

    fn on_download(&mut self, event: DownloadEvent, effects: &mut Vec<Effect>) {
        let batch_id = match &event {
            DownloadEvent::Progress { batch_id, .. } => *batch_id,
            DownloadEvent::Finished(report) => report.batch_id,
        };
        if !self.accepts_batch(batch_id) {
            warn!(
                "Discarding download result of batch {} from a previous session",
                batch_id
            );
            return;
        }

        match event {
            DownloadEvent::Progress {
                completed, total, ..
            } => {
                let text = format!("Downloading {}/{}", completed, total);
                self.show_status(&text, StatusLevel::Info, effects);
            }
            DownloadEvent::Finished(report) => self.on_batch_finished(report, effects),
        }
    }

    fn on_batch_finished(&mut self, report: DownloadReport, effects: &mut Vec<Effect>) {
        if report.items.is_empty() {
            warn!(
                "Batch {} produced no items, keeping current media",
                report.batch_id
            );
            self.show_status("Download failed", StatusLevel::Error, effects);
            return;
        }

        let (text, level) = if report.is_complete() {
            (format!("{} items ready", report.succeeded()), StatusLevel::Success)
        } else {
            (
                format!("{}/{} items downloaded", report.succeeded(), report.attempted),
                StatusLevel::Warning,
            )
        };

        self.registry.replace_all(report.items);
        effects.push(Effect::Persist(self.snapshot()));
        self.show_status(&text, level, effects);
    }

    fn on_key(mut self, key: RemoteKey, effects: &mut Vec<Effect>) -> Self {
        match key {
            RemoteKey::Quit => {
                effects.push(Effect::Shutdown);
                return self;
            }
            RemoteKey::Pair => {
                self.pairing = self.pairing.rearm();
                self.first_live_batch = self.next_batch_id;
                effects.push(Effect::Persist(self.snapshot()));
                self.show_status("Scan QR code with mobile app", StatusLevel::Info, effects);
                return self;
            }
            _ => {}
        }

        if !self.is_paired() || self.registry.is_empty() {
            debug!("Ignoring key {:?}, nothing to navigate", key);
            return self;
        }

        match key {
            RemoteKey::Digit(_) => {
                let Some(index) = key.digit_index() else {
                    return self;
                };
                let shown = self.registry.show_by_index(index).map(|_| ());
                match shown {
                    Ok(()) => {
                        self.show_position(effects);
                        effects.push(Effect::Persist(self.snapshot()));
                    }
                    Err(e) => {
                        debug!("{}", e);
                        let text = format!("Item {} not available", index + 1);
                        self.show_status(&text, StatusLevel::Warning, effects);
                    }
                }
            }
            RemoteKey::Left | RemoteKey::Right => {
                if key == RemoteKey::Left {
                    self.registry.previous();
                } else {
                    self.registry.next();
                }
                self.show_position(effects);
                effects.push(Effect::Persist(self.snapshot()));
            }
            RemoteKey::Info => {
                if self.overlay.visible {
                    self.overlay.visible = false;
                    effects.push(Effect::Render);
                } else {
                    self.show_position(effects);
                }
            }
            RemoteKey::Pair | RemoteKey::Quit => {}
        }
        self
    }

    fn on_hide(&mut self, generation: u64, effects: &mut Vec<Effect>) {
        // the pairing screen stays up until a client has paired
        if generation != self.overlay.generation || !self.is_paired() {
            return;
        }
        if self.overlay.visible {
            self.overlay.visible = false;
            effects.push(Effect::Render);
        }
    }

    fn show_position(&mut self, effects: &mut Vec<Effect>) {
        if let Some(index) = self.registry.current_index() {
            let text = format!("Showing {}/{}", index + 1, self.registry.len());
            self.show_status(&text, StatusLevel::Info, effects);
        }
    }

    fn show_status(&mut self, text: &str, level: StatusLevel, effects: &mut Vec<Effect>) {
        self.overlay.generation += 1;
        self.overlay.visible = true;
        self.overlay.status = Some(StatusLine {
            text: text.to_string(),
            level,
        });
        effects.push(Effect::Render);
        effects.push(Effect::ScheduleHide {
            generation: self.overlay.generation,
        });
    }
}

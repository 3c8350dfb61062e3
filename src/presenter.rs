//! Headless presentation shell.
//!
//! The receiver has no screen of its own here. [`Frame`] describes what a screen would
//! show, and [`LogPresenter`] writes each new frame to the log.

use crate::media::MediaKind;
use crate::receiver::{ReceiverState, StatusLevel};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    /// Waiting for a client: the QR payload to encode and the serial to print
    Pairing { serial: String, qr_payload: String },
    /// Paired but no media yet
    Idle,
    Media {
        label: String,
        path: PathBuf,
        kind: MediaKind,
        position: usize,
        total: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub screen: Screen,
    pub overlay: Option<(String, StatusLevel)>,
}

impl Frame {
    pub fn of(state: &ReceiverState) -> Self {
        let screen = match (state.pairing.qr_payload(), state.current()) {
            (Some(qr), _) => Screen::Pairing {
                serial: state.identity.serial().to_string(),
                // timestamps differ per call, keep the frame stable on the code alone
                qr_payload: format!("{}:{}", qr.tv_serial, qr.pairing_code),
            },
            (None, Some(item)) => Screen::Media {
                label: item.label(),
                path: item.local_path.clone(),
                kind: item.kind,
                position: state.registry.current_index().unwrap_or(0) + 1,
                total: state.registry.len(),
            },
            (None, None) => Screen::Idle,
        };

        let overlay = if state.overlay.visible {
            state
                .overlay
                .status
                .as_ref()
                .map(|s| (s.text.clone(), s.level))
        } else {
            None
        };

        Self { screen, overlay }
    }
}

pub trait Presenter: Send {
    fn render(&mut self, state: &ReceiverState);
}

#[derive(Default)]
pub struct LogPresenter {
    last: Option<Frame>,
}

impl Presenter for LogPresenter {
    fn render(&mut self, state: &ReceiverState) {
        let frame = Frame::of(state);
        if self.last.as_ref() == Some(&frame) {
            return;
        }

        if self.last.as_ref().map(|f| &f.screen) != Some(&frame.screen) {
            match &frame.screen {
                Screen::Pairing { serial, .. } => {
                    if let Some(qr) = state.pairing.qr_payload() {
                        info!("[screen] Serial: {} | scan QR: {}", serial, qr.to_json());
                    }
                }
                Screen::Idle => info!("[screen] Paired, waiting for media"),
                Screen::Media {
                    label,
                    path,
                    position,
                    total,
                    ..
                } => info!(
                    "[screen] {} ({}/{}) from {}",
                    label,
                    position,
                    total,
                    path.display()
                ),
            }
        }

        if let Some((text, level)) = &frame.overlay {
            match level {
                StatusLevel::Info | StatusLevel::Success => info!("[status] {}", text),
                StatusLevel::Warning => warn!("[status] {}", text),
                StatusLevel::Error => error!("[status] {}", text),
            }
        }

        self.last = Some(frame);
    }
}

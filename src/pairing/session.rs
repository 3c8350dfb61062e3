//! Pairing session with statum typestates
//!
//! ```text
//! Unpaired ──[matching claim]──► Paired ──[rearm]──► Unpaired (fresh code)
//! ```
//!
//! [`Pairing`] wraps both typestates so the receiver state can hold either one.

use super::messages::{generate_pairing_code, PairAck, QrPayload};
use super::PairingError;
use statum::{machine, state};
use tracing::{debug, info, warn};

#[state]
#[derive(Debug, Clone)]
pub enum PairingState {
    Unpaired, // Waiting for a client to claim the code
    Paired,   // Code claimed, session authorized
}

#[machine]
#[derive(Debug)]
pub struct PairingSession<S: PairingState> {
    code: String,
    serial: String,
}

impl<S: PairingState> PairingSession<S> {
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }
}

impl PairingSession<Unpaired> {
    /// Starts a session with a freshly generated code.
    pub fn start(serial: &str) -> Self {
        Self::with_code(generate_pairing_code(), serial)
    }

    pub fn with_code(code: String, serial: &str) -> Self {
        debug!("Pairing session armed with code {}", code);
        Self::new(code, serial.to_string())
    }

    pub fn qr_payload(&self) -> QrPayload {
        QrPayload::new(&self.serial, &self.code)
    }

    /// Accepts the claim iff `received` matches the code exactly.
    pub fn claim(self, received: &str) -> Result<PairingSession<Paired>, (Self, PairingError)> {
        if received == self.code {
            info!("Pairing code accepted");
            Ok(self.transition())
        } else {
            warn!("Rejected pairing claim with code '{}'", received);
            Err((self, PairingError::CodeMismatch))
        }
    }
}

impl PairingSession<Paired> {
    pub fn acknowledgement(&self) -> PairAck {
        PairAck::success(&self.code, &self.serial)
    }

    /// Leaves the paired state and waits for a new claim on a new code.
    pub fn rearm(self) -> PairingSession<Unpaired> {
        let mut session: PairingSession<Unpaired> = self.transition();
        session.code = generate_pairing_code();
        info!("Pairing re-armed with code {}", session.code);
        session
    }
}

/// Runtime view over the two pairing typestates.
#[derive(Debug)]
pub enum Pairing {
    Unpaired(PairingSession<Unpaired>),
    Paired(PairingSession<Paired>),
}

impl Pairing {
    /// Contract entry point: arms an unpaired session and returns it with its code.
    pub fn start_session(serial: &str) -> (Self, String) {
        let session = PairingSession::<Unpaired>::start(serial);
        let code = session.code().to_string();
        (Pairing::Unpaired(session), code)
    }

    /// Restores a session from persisted parts.
    pub fn restore(code: String, serial: &str, paired: bool) -> Self {
        let session = PairingSession::<Unpaired>::with_code(code, serial);
        if paired {
            Pairing::Paired(session.transition())
        } else {
            Pairing::Unpaired(session)
        }
    }

    /// Attempts a claim. Returns the acknowledgement to publish on the transition
    /// into `Paired`; every other outcome leaves the session as it was.
    pub fn try_claim(self, received: &str) -> (Self, Result<PairAck, PairingError>) {
        match self {
            Pairing::Unpaired(session) => match session.claim(received) {
                Ok(paired) => {
                    let ack = paired.acknowledgement();
                    (Pairing::Paired(paired), Ok(ack))
                }
                Err((session, e)) => (Pairing::Unpaired(session), Err(e)),
            },
            Pairing::Paired(session) => {
                debug!("Ignoring claim, session already paired");
                (Pairing::Paired(session), Err(PairingError::AlreadyPaired))
            }
        }
    }

    /// Re-enters pairing mode with a new code, whatever the current state.
    pub fn rearm(self) -> Self {
        match self {
            Pairing::Unpaired(session) => {
                Pairing::Unpaired(PairingSession::<Unpaired>::start(session.serial()))
            }
            Pairing::Paired(session) => Pairing::Unpaired(session.rearm()),
        }
    }

    pub fn is_paired(&self) -> bool {
        matches!(self, Pairing::Paired(_))
    }

    pub fn code(&self) -> &str {
        match self {
            Pairing::Unpaired(session) => session.code(),
            Pairing::Paired(session) => session.code(),
        }
    }

    pub fn qr_payload(&self) -> Option<QrPayload> {
        match self {
            Pairing::Unpaired(session) => Some(session.qr_payload()),
            Pairing::Paired(_) => None,
        }
    }
}

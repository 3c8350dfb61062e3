//! One-time pairing between the receiver and a companion app.
//!
//! The receiver shows a QR payload with its serial and a short code. The app sends
//! the code back as a claim; a matching claim authorizes it and is acknowledged.

pub mod messages;
pub mod session;

pub use messages::{generate_pairing_code, PairAck, PairClaim, QrPayload};
pub use session::{Paired, Pairing, PairingSession, PairingState, Unpaired};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PairingError {
    #[error("pairing code does not match")]
    CodeMismatch,

    #[error("session is already paired")]
    AlreadyPaired,

    #[error("unsupported pairing action '{0}'")]
    UnsupportedAction(String),

    #[error("invalid pairing claim: {0}")]
    InvalidClaim(#[from] serde_json::Error),
}

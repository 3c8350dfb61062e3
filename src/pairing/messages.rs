//! Wire formats exchanged with the companion app during pairing.

use super::PairingError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const CODE_LEN: usize = 6;
const CLAIM_ACTION: &str = "pair";

/// Six upper-case hex characters taken from a random UUID.
pub fn generate_pairing_code() -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(CODE_LEN)
        .collect::<String>()
        .to_uppercase()
}

/// Content of the QR code shown while waiting for a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    pub tv_serial: String,
    pub pairing_code: String,
    /// Unix time in milliseconds
    pub timestamp: i64,
}

impl QrPayload {
    pub fn new(tv_serial: &str, pairing_code: &str) -> Self {
        Self {
            tv_serial: tv_serial.to_string(),
            pairing_code: pairing_code.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Claim sent by the app on `<prefix>/<serial>/pair`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairClaim {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub pairing_code: String,
}

impl PairClaim {
    pub fn parse(payload: &str) -> Result<Self, PairingError> {
        let claim: PairClaim = serde_json::from_str(payload)?;
        if claim.action != CLAIM_ACTION {
            return Err(PairingError::UnsupportedAction(claim.action));
        }
        Ok(claim)
    }
}

/// Acknowledgement published on `<prefix>/<serial>/pair_response`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairAck {
    pub status: String,
    pub pairing_code: String,
    pub tv_serial: String,
}

impl PairAck {
    pub fn success(pairing_code: &str, tv_serial: &str) -> Self {
        Self {
            status: "success".to_string(),
            pairing_code: pairing_code.to_string(),
            tv_serial: tv_serial.to_string(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_six_uppercase_hex_chars() {
        for _ in 0..32 {
            let code = generate_pairing_code();
            assert_eq!(code.len(), 6);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        }
    }

    #[test]
    fn qr_payload_uses_camel_case_keys() {
        let json = QrPayload::new("TV_1234ABCD", "A1B2C3").to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["tvSerial"], "TV_1234ABCD");
        assert_eq!(value["pairingCode"], "A1B2C3");
        assert!(value["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn claim_requires_pair_action() {
        let claim = PairClaim::parse(r#"{"action":"pair","pairingCode":"A1B2C3"}"#).unwrap();
        assert_eq!(claim.pairing_code, "A1B2C3");

        assert!(matches!(
            PairClaim::parse(r#"{"action":"unpair","pairingCode":"A1B2C3"}"#),
            Err(PairingError::UnsupportedAction(action)) if action == "unpair"
        ));
        assert!(matches!(
            PairClaim::parse("paired_ok"),
            Err(PairingError::InvalidClaim(_))
        ));
    }

    #[test]
    fn ack_carries_code_and_serial() {
        let ack: serde_json::Value =
            serde_json::from_str(&PairAck::success("A1B2C3", "TV_X").to_json()).unwrap();

        assert_eq!(ack["status"], "success");
        assert_eq!(ack["pairingCode"], "A1B2C3");
        assert_eq!(ack["tvSerial"], "TV_X");
    }
}

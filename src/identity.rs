//! Persistent device identity used to namespace MQTT topics.

use crate::persistence::{KeyValueStore, StoreError, KEY_SERIAL};
use std::fmt;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    serial: String,
}

impl DeviceIdentity {
    /// Returns the stored serial, generating and saving a new one on first start.
    pub async fn load_or_create(store: &mut KeyValueStore) -> Result<Self, StoreError> {
        if let Some(serial) = store.get(KEY_SERIAL).filter(|s| !s.is_empty()) {
            return Ok(Self {
                serial: serial.to_string(),
            });
        }

        let serial = generate_serial();
        store.set(KEY_SERIAL, &serial);
        store.save().await?;
        info!("Generated new serial: {}", serial);

        Ok(Self { serial })
    }

    pub fn from_serial(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.serial)
    }
}

/// `TV_` followed by eight upper-case hex characters.
fn generate_serial() -> String {
    let id: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!("TV_{}", id.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serial_is_created_once_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");

        let mut store = KeyValueStore::open(&path).await;
        let first = DeviceIdentity::load_or_create(&mut store).await.unwrap();

        let mut reopened = KeyValueStore::open(&path).await;
        let second = DeviceIdentity::load_or_create(&mut reopened).await.unwrap();

        assert_eq!(first, second);
        assert!(first.serial().starts_with("TV_"));
        assert_eq!(first.serial().len(), 11);
    }
}

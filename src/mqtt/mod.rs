//! # MQTT Transport Module
//!
//! Connects the receiver to the broker and translates traffic on the four device
//! topics into receiver events. The transport owns no receiver state: it only
//! forwards what it hears and publishes what it is asked to.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Broker settings and per-device topic names
//! ├── message_manager.rs  - Message representation and topic dispatch
//! └── mqtt_handler.rs     - Connection loop, subscriptions and reconnects
//! ```
//!
//! ## Topics
//!
//! | Topic                  | Direction | Payload                          |
//! |------------------------|-----------|----------------------------------|
//! | `tv/S/pair`            | in        | `{"action":"pair","pairingCode"}`|
//! | `tv/S/images`          | in        | media batch JSON                 |
//! | `tv/S/image`           | in        | plain-text index                 |
//! | `tv/S/pair_response`   | out       | pairing acknowledgement          |
//!
//! ## Connection Handling
//!
//! A lost connection is retried after a fixed delay with no upper bound on attempts.
//! Subscriptions are renewed on every ConnAck since sessions are clean.

pub mod config;
pub mod message_manager;
pub mod mqtt_handler;

pub use config::{DeviceTopics, MqttConfig, TopicKind};
pub use message_manager::{dispatch, Inbound, MqttMessage, TransportError};
pub use mqtt_handler::{ConnectionState, MqttHandler, OutboundMessage, TransportEvent};

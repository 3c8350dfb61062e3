use crate::config::ReceiverConfig;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    pub reconnect_delay: Duration,
    pub topics: DeviceTopics,
}

impl MqttConfig {
    pub fn for_device(config: &ReceiverConfig, serial: &str) -> Self {
        Self {
            host: config.broker.host.clone(),
            port: config.broker.port,
            client_id: format!("TV_{}_{}", serial, chrono::Utc::now().timestamp_millis()),
            keep_alive: Duration::from_secs(config.broker.keep_alive_secs),
            reconnect_delay: config.reconnect_delay(),
            topics: DeviceTopics::for_serial(&config.broker.topic_prefix, serial),
        }
    }
}

/// Which of the device topics a message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    Pair,
    PairResponse,
    Images,
    Image,
}

/// The four fixed topics of one device, `<prefix>/<serial>/<name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTopics {
    pub pair: String,
    pub pair_response: String,
    pub images: String,
    pub image: String,
}

impl DeviceTopics {
    pub fn for_serial(prefix: &str, serial: &str) -> Self {
        Self {
            pair: format!("{}/{}/pair", prefix, serial),
            pair_response: format!("{}/{}/pair_response", prefix, serial),
            images: format!("{}/{}/images", prefix, serial),
            image: format!("{}/{}/image", prefix, serial),
        }
    }

    pub fn all(&self) -> [&str; 4] {
        [&self.pair, &self.images, &self.image, &self.pair_response]
    }

    pub fn classify(&self, topic: &str) -> Option<TopicKind> {
        if topic == self.pair {
            Some(TopicKind::Pair)
        } else if topic == self.pair_response {
            Some(TopicKind::PairResponse)
        } else if topic == self.images {
            Some(TopicKind::Images)
        } else if topic == self.image {
            Some(TopicKind::Image)
        } else {
            None
        }
    }
}

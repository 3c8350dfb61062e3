use super::config::MqttConfig;
use super::message_manager::{dispatch, Inbound, MqttMessage};
use crate::receiver::AppEvent;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const DISCONNECT_GRACE: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// What the transport reports to the receiver runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    ConnectionChanged(ConnectionState),
    Message(Inbound),
    /// A payload that could not be understood; carried for the status line.
    Malformed { topic: String, reason: String },
}

/// A message the runtime wants published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: String,
}

#[derive(Clone, Debug, Default)]
pub struct TransportStatus {
    pub connection_state: ConnectionState,
    pub connect_attempts: usize,
    pub messages_received: usize,
    pub messages_sent: usize,
}

pub struct MqttHandler {
    status: TransportStatus,
    client: AsyncClient,
    eventloop: EventLoop,
    config: MqttConfig,
    events: mpsc::Sender<AppEvent>,
}

impl MqttHandler {
    pub fn new(config: MqttConfig, events: mpsc::Sender<AppEvent>) -> Self {
        let mut mqtt_options = MqttOptions::new(&config.client_id, &config.host, config.port);
        mqtt_options
            .set_keep_alive(config.keep_alive)
            .set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(mqtt_options, 100);

        MqttHandler {
            status: TransportStatus::default(),
            client,
            eventloop,
            config,
            events,
        }
    }

    /// Runs the connection until `cancel` fires. Lost connections are retried after a
    /// fixed delay, forever.
    pub fn spawn(
        self,
        outbound: mpsc::Receiver<OutboundMessage>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(outbound, cancel).await })
    }

    async fn run(mut self, mut outbound: mpsc::Receiver<OutboundMessage>, cancel: CancellationToken) {
        info!(
            "Connecting to MQTT broker {}:{} as {}",
            self.config.host, self.config.port, self.config.client_id
        );
        self.set_state(ConnectionState::Connecting).await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutting down MQTT connection");
                    match self.client.try_disconnect() {
                        Ok(_) => {
                            // one more poll flushes the DISCONNECT packet
                            let _ = tokio::time::timeout(DISCONNECT_GRACE, self.eventloop.poll()).await;
                        }
                        Err(e) => warn!("MQTT disconnect failed: {}", e),
                    }
                    break;
                }
                Some(msg) = outbound.recv() => {
                    self.publish(msg).await;
                }
                polled = self.eventloop.poll() => match polled {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) if ack.code == ConnectReturnCode::Success => {
                        info!("MQTT connected");
                        self.subscribe_all().await;
                        self.set_state(ConnectionState::Connected).await;
                    }
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        warn!("MQTT connection refused: {:?}", ack.code);
                        self.set_state(ConnectionState::Disconnected).await;
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        self.handle_publish(&publish.topic, &publish.payload).await;
                    }
                    Ok(other) => {
                        debug!("MQTT event: {:?}", other);
                    }
                    Err(e) => {
                        error!("MQTT connection error: {}", e);
                        self.set_state(ConnectionState::Disconnected).await;

                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(self.config.reconnect_delay) => {}
                        }

                        self.status.connect_attempts += 1;
                        info!(
                            "Reconnecting to MQTT broker (attempt {})",
                            self.status.connect_attempts
                        );
                        self.set_state(ConnectionState::Reconnecting).await;
                    }
                },
            }
        }

        self.set_state(ConnectionState::Disconnected).await;
        info!(
            "MQTT task stopped ({} received, {} sent)",
            self.status.messages_received, self.status.messages_sent
        );
    }

    async fn subscribe_all(&mut self) {
        for topic in self.config.topics.all() {
            match self.client.subscribe(topic, QoS::AtLeastOnce).await {
                Ok(_) => debug!("Subscribed to {}", topic),
                Err(e) => error!("Failed to subscribe to {}: {}", topic, e),
            }
        }
    }

    async fn publish(&mut self, msg: OutboundMessage) {
        match self
            .client
            .publish(&msg.topic, QoS::AtLeastOnce, false, msg.payload.into_bytes())
            .await
        {
            Ok(_) => {
                self.status.messages_sent += 1;
                debug!("Published to {}", msg.topic);
            }
            Err(e) => error!("Failed to publish to {}: {}", msg.topic, e),
        }
    }

    async fn handle_publish(&mut self, topic: &str, payload: &[u8]) {
        self.status.messages_received += 1;

        let event = match MqttMessage::from_publish(topic, payload) {
            Ok(msg) => {
                debug!("Message arrived: {}", msg);
                match dispatch(&self.config.topics, &msg) {
                    Ok(Some(inbound)) => TransportEvent::Message(inbound),
                    Ok(None) => return,
                    Err(e) => {
                        warn!("Dropping message on {}: {}", topic, e);
                        TransportEvent::Malformed {
                            topic: topic.to_string(),
                            reason: e.to_string(),
                        }
                    }
                }
            }
            Err(e) => {
                warn!("Dropping message on {}: {}", topic, e);
                TransportEvent::Malformed {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                }
            }
        };

        self.emit(event).await;
    }

    async fn set_state(&mut self, state: ConnectionState) {
        if self.status.connection_state == state {
            return;
        }
        self.status.connection_state = state;
        self.emit(TransportEvent::ConnectionChanged(state)).await;
    }

    async fn emit(&mut self, event: TransportEvent) {
        if self.events.send(AppEvent::Transport(event)).await.is_err() {
            warn!("Receiver runtime gone, dropping transport event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::DeviceTopics;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const CONNACK_ACCEPTED: [u8; 4] = [0x20, 0x02, 0x00, 0x00];
    const CONNACK_NOT_AUTHORIZED: [u8; 4] = [0x20, 0x02, 0x00, 0x05];

    fn config(port: u16) -> MqttConfig {
        MqttConfig {
            host: "127.0.0.1".to_string(),
            port,
            client_id: "TV_TV_TEST0001_0".to_string(),
            keep_alive: Duration::from_secs(60),
            reconnect_delay: Duration::from_millis(50),
            topics: DeviceTopics::for_serial("tv", "TV_TEST0001"),
        }
    }

    /// Reads one MQTT packet and returns its first header byte and its body.
    async fn read_packet(socket: &mut TcpStream) -> std::io::Result<(u8, Vec<u8>)> {
        let header = socket.read_u8().await?;
        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let byte = socket.read_u8().await?;
            len |= ((byte & 0x7f) as usize) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut body = vec![0u8; len];
        socket.read_exact(&mut body).await?;
        Ok((header, body))
    }

    /// Topic filter and QoS of a SUBSCRIBE body carrying one filter.
    fn subscription(body: &[u8]) -> (String, u8) {
        let len = u16::from_be_bytes([body[2], body[3]]) as usize;
        let topic = String::from_utf8(body[4..4 + len].to_vec()).unwrap();
        (topic, body[4 + len])
    }

    /// Minimal broker: answers CONNECT with `connack` and reports the subscriptions
    /// seen on each connection. The first `drop_first` connections are closed once
    /// they have subscribed.
    async fn broker(
        connack: [u8; 4],
        drop_first: usize,
    ) -> (u16, mpsc::Receiver<Vec<(String, u8)>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(async move {
            let mut accepted = 0;
            while let Ok((mut socket, _)) = listener.accept().await {
                accepted += 1;
                let keep_open = accepted > drop_first;
                let tx = tx.clone();
                tokio::spawn(async move {
                    if read_packet(&mut socket).await.is_err() {
                        return;
                    }
                    let _ = socket.write_all(&connack).await;

                    let mut subscriptions = Vec::new();
                    while subscriptions.len() < 4 {
                        match read_packet(&mut socket).await {
                            Ok((header, body)) if header & 0xf0 == 0x80 => {
                                subscriptions.push(subscription(&body))
                            }
                            Ok(_) => {}
                            Err(_) => break,
                        }
                    }
                    let _ = tx.send(subscriptions).await;

                    if keep_open {
                        while read_packet(&mut socket).await.is_ok() {}
                    }
                });
            }
        });

        (port, rx)
    }

    async fn next_state(events: &mut mpsc::Receiver<AppEvent>) -> ConnectionState {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .unwrap()
                .unwrap();
            if let AppEvent::Transport(TransportEvent::ConnectionChanged(state)) = event {
                return state;
            }
        }
    }

    fn handler() -> (MqttHandler, mpsc::Receiver<AppEvent>) {
        let (events_tx, events_rx) = mpsc::channel(10);
        (MqttHandler::new(config(1883), events_tx), events_rx)
    }

    #[tokio::test]
    async fn subscribes_on_every_connack_and_reconnects_after_delay() {
        let (port, mut subscriptions) = broker(CONNACK_ACCEPTED, 1).await;
        let (events_tx, mut events_rx) = mpsc::channel(100);
        let (_outbound_tx, outbound_rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();
        let task = MqttHandler::new(config(port), events_tx).spawn(outbound_rx, cancel.clone());

        assert_eq!(next_state(&mut events_rx).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut events_rx).await, ConnectionState::Connected);
        let first = subscriptions.recv().await.unwrap();

        // broker closed the first connection
        assert_eq!(next_state(&mut events_rx).await, ConnectionState::Disconnected);
        assert_eq!(next_state(&mut events_rx).await, ConnectionState::Reconnecting);
        assert_eq!(next_state(&mut events_rx).await, ConnectionState::Connected);
        let second = subscriptions.recv().await.unwrap();

        let expected: Vec<(String, u8)> = config(port)
            .topics
            .all()
            .iter()
            .map(|topic| (topic.to_string(), 1))
            .collect();
        assert_eq!(first, expected);
        assert_eq!(second, expected);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn refused_connection_is_not_reported_as_connected() {
        let (port, mut subscriptions) = broker(CONNACK_NOT_AUTHORIZED, 0).await;
        let (events_tx, mut events_rx) = mpsc::channel(100);
        let (_outbound_tx, outbound_rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();
        let task = MqttHandler::new(config(port), events_tx).spawn(outbound_rx, cancel.clone());

        assert_eq!(next_state(&mut events_rx).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut events_rx).await, ConnectionState::Disconnected);
        assert!(subscriptions.recv().await.unwrap().is_empty());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn bad_payloads_become_malformed_events() {
        let (mut handler, mut events) = handler();

        handler
            .handle_publish("tv/TV_TEST0001/images", b"{not json")
            .await;
        handler.handle_publish("tv/TV_TEST0001/image", &[0xff, 0xfe]).await;

        for expected in ["tv/TV_TEST0001/images", "tv/TV_TEST0001/image"] {
            match events.try_recv().unwrap() {
                AppEvent::Transport(TransportEvent::Malformed { topic, .. }) => {
                    assert_eq!(topic, expected)
                }
                other => panic!("expected malformed event, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn own_acknowledgements_are_dropped() {
        let (mut handler, mut events) = handler();
        let ack = r#"{"status":"success","pairingCode":"A1B2C3","tvSerial":"TV_TEST0001"}"#;

        handler
            .handle_publish("tv/TV_TEST0001/pair_response", ack.as_bytes())
            .await;

        assert!(events.try_recv().is_err());
        assert_eq!(handler.status.messages_received, 1);
    }

    #[tokio::test]
    async fn pairing_claim_is_forwarded() {
        let (mut handler, mut events) = handler();

        handler
            .handle_publish(
                "tv/TV_TEST0001/pair",
                br#"{"action":"pair","pairingCode":"A1B2C3"}"#,
            )
            .await;

        match events.try_recv().unwrap() {
            AppEvent::Transport(TransportEvent::Message(Inbound::PairClaim(claim))) => {
                assert_eq!(claim.pairing_code, "A1B2C3")
            }
            other => panic!("expected pairing claim, got {:?}", other),
        }
    }
}

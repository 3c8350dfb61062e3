pub mod config;
pub mod identity;
pub mod media;
pub mod mqtt;
pub mod pairing;
pub mod persistence;
pub mod presenter;
pub mod receiver;
pub mod remote;

use crate::config::ReceiverConfig;
use crate::identity::DeviceIdentity;
use crate::media::{DownloadHandle, MediaRegistry};
use crate::mqtt::{MqttConfig, MqttHandler};
use crate::pairing::Pairing;
use crate::persistence::{KeyValueStore, SessionSnapshot, STATE_FILE};
use crate::presenter::LogPresenter;
use crate::receiver::{ReceiverRuntime, ReceiverState};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(ReceiverConfig::default_path);
    let config = ReceiverConfig::load_or_create(&config_path).await?;
    info!("Loaded configuration from {}", config_path.display());

    let mut store = KeyValueStore::open(config.data_dir().join(STATE_FILE)).await;
    let identity = DeviceIdentity::load_or_create(&mut store)
        .await
        .map_err(|e| eyre!("Failed to set up device identity: {}", e))?;
    info!("Device serial: {}", identity);

    let (pairing, registry) = restore_session(&config, &store, &identity);
    let mqtt_config = MqttConfig::for_device(&config, identity.serial());
    let state = ReceiverState::new(identity, mqtt_config.topics.clone(), pairing, registry);

    let cancel = CancellationToken::new();
    let (events_tx, events_rx) = mpsc::channel(100);
    let (outbound_tx, outbound_rx) = mpsc::channel(100);

    let http_client = reqwest::Client::builder()
        .build()
        .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;
    let (downloads, download_task) = DownloadHandle::spawn(
        http_client,
        config.media_dir(),
        events_tx.clone(),
        cancel.clone(),
    );

    let mqtt_task =
        MqttHandler::new(mqtt_config, events_tx.clone()).spawn(outbound_rx, cancel.clone());
    let _remote_task = remote::spawn_terminal_remote(events_tx.clone(), cancel.clone());

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            ctrl_c_cancel.cancel();
        }
    });

    let runtime = ReceiverRuntime::new(
        events_rx,
        events_tx,
        outbound_tx,
        downloads,
        store,
        LogPresenter::default(),
        config.auto_hide(),
        cancel.clone(),
    );
    let final_state = runtime.run(state).await;

    cancel.cancel();
    if let Err(e) = mqtt_task.await {
        warn!("MQTT task ended abnormally: {}", e);
    }
    if let Err(e) = download_task.await {
        warn!("Download task ended abnormally: {}", e);
    }

    info!(
        "Receiver stopped (paired: {}, {} media items)",
        final_state.is_paired(),
        final_state.registry.len()
    );
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

fn restore_session(
    config: &ReceiverConfig,
    store: &KeyValueStore,
    identity: &DeviceIdentity,
) -> (Pairing, MediaRegistry) {
    if !config.storage.restore_session {
        let (pairing, code) = Pairing::start_session(identity.serial());
        info!("Pairing code: {}", code);
        return (pairing, MediaRegistry::new());
    }

    let snapshot = SessionSnapshot::load(store);
    let registry = snapshot.registry();
    let pairing = match snapshot.pairing_code {
        Some(code) if snapshot.paired => {
            info!("Restored paired session with {} media items", registry.len());
            Pairing::restore(code, identity.serial(), true)
        }
        _ => {
            let (pairing, code) = Pairing::start_session(identity.serial());
            info!("Pairing code: {}", code);
            pairing
        }
    };

    (pairing, registry)
}

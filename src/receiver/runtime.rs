use super::{AppEvent, Effect, ReceiverState};
use crate::media::DownloadHandle;
use crate::mqtt::OutboundMessage;
use crate::persistence::KeyValueStore;
use crate::presenter::Presenter;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Owns the receiver state and executes the effects of every update.
pub struct ReceiverRuntime<P: Presenter> {
    events_rx: mpsc::Receiver<AppEvent>,
    events_tx: mpsc::Sender<AppEvent>,
    outbound: mpsc::Sender<OutboundMessage>,
    downloads: DownloadHandle,
    store: KeyValueStore,
    presenter: P,
    auto_hide: Duration,
    cancel: CancellationToken,
}

impl<P: Presenter> ReceiverRuntime<P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        events_rx: mpsc::Receiver<AppEvent>,
        events_tx: mpsc::Sender<AppEvent>,
        outbound: mpsc::Sender<OutboundMessage>,
        downloads: DownloadHandle,
        store: KeyValueStore,
        presenter: P,
        auto_hide: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            events_rx,
            events_tx,
            outbound,
            downloads,
            store,
            presenter,
            auto_hide,
            cancel,
        }
    }

    /// Processes events until shutdown and returns the final state.
    pub async fn run(mut self, initial: ReceiverState) -> ReceiverState {
        let mut state = initial;
        self.presenter.render(&state);
        info!("Receiver {} running", state.identity);

        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = self.events_rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            debug!("Event: {:?}", event);
            let (next, effects) = state.update(event);
            state = next;

            for effect in effects {
                self.execute(&state, effect).await;
            }
        }

        info!("Receiver runtime stopped");
        state
    }

    async fn execute(&mut self, state: &ReceiverState, effect: Effect) {
        match effect {
            Effect::Publish(msg) => {
                if let Err(e) = self.outbound.send(msg).await {
                    error!("Transport gone, could not publish: {}", e);
                }
            }
            Effect::Download { batch_id, batch } => {
                if let Err(e) = self.downloads.queue(batch_id, batch).await {
                    error!("Could not queue batch {}: {}", batch_id, e);
                }
            }
            Effect::Persist(snapshot) => {
                snapshot.write_to(&mut self.store);
                if let Err(e) = self.store.save().await {
                    warn!(
                        "Failed to persist session to {}: {}",
                        self.store.path().display(),
                        e
                    );
                }
            }
            Effect::ScheduleHide { generation } => {
                let events = self.events_tx.clone();
                let delay = self.auto_hide;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    // runtime may already be gone on shutdown
                    let _ = events.send(AppEvent::HideOverlay(generation)).await;
                });
            }
            Effect::Render => self.presenter.render(state),
            Effect::Shutdown => {
                info!("Shutdown requested");
                self.cancel.cancel();
            }
        }
    }
}

//! # Live leaderboard
//!
//! `GET /votes/live` upgrades to a websocket owning one [`LiveView`]. The view subscribes to the
//! [`ChangeNotifier`](crate::notify::ChangeNotifier) before taking its initial snapshot, then
//! reconciles its [`Projection`] on every delivery and pushes a [`Frame`] as JSON text.
//!
//! | Delivery | Patch | Rebuild |
//! |----------|-------|---------|
//! | change | apply the delta | drain the queue, refetch once |
//! | change already in the last snapshot | skip | drain the queue, refetch once |
//! | change on a caption created since the last snapshot | refetch | drain the queue, refetch once |
//! | lagged | drain the queue, refetch once | drain the queue, refetch once |
//!
//! Every notification counts toward `received`, drained, skipped and dropped ones included. A
//! failed refetch keeps the previous rows until the next delivery.
use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{Sink, SinkExt, StreamExt};
use ledger::{Frame, Patched, Projection, Store, StoreResult, Strategy};
use tracing::{debug, info, warn};

use crate::{
    notify::{Delivery, Subscription},
    state::AppState,
};

pub async fn live_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let subscription = state.notifier.subscribe();
    let store = state.store.clone();
    let strategy = state.config.strategy;

    ws.on_upgrade(move |socket| async move {
        match LiveView::start(store, strategy, subscription).await {
            Ok(view) => view.run(socket).await,
            Err(e) => warn!("Failed to start live view: {e}"),
        }
    })
}

pub struct LiveView {
    store: Arc<dyn Store>,
    strategy: Strategy,
    projection: Projection,
    subscription: Subscription,
}

impl LiveView {
    /// `subscription` must already be open so nothing published after the snapshot is missed.
    pub async fn start(
        store: Arc<dyn Store>,
        strategy: Strategy,
        subscription: Subscription,
    ) -> StoreResult<Self> {
        let snapshot = store.snapshot().await?;
        let projection = Projection::from_snapshot(&snapshot);

        Ok(Self {
            store,
            strategy,
            projection,
            subscription,
        })
    }

    pub fn frame(&self) -> Frame {
        self.projection.frame()
    }

    /// Waits for the next delivery and reconciles. `false` once the notifier is gone.
    pub async fn advance(&mut self) -> bool {
        match self.subscription.recv().await {
            Some(delivery) => {
                self.reconcile(delivery).await;
                true
            }
            None => false,
        }
    }

    async fn reconcile(&mut self, delivery: Delivery) {
        match (delivery, self.strategy) {
            (Delivery::Change(change), Strategy::Patch) => {
                self.projection.observe(1);
                match self.projection.apply_change(&change) {
                    Patched::Applied => {}
                    Patched::Stale => {
                        debug!(position = change.position, "Skipping change already in snapshot");
                    }
                    Patched::UnknownCaption => {
                        debug!(position = change.position, "Change on unseen caption, refetching");
                        self.rebuild().await;
                    }
                }
            }
            (Delivery::Change(_), Strategy::Rebuild) => {
                let queued = self.subscription.drain();
                self.projection.observe(1 + queued);
                self.rebuild().await;
            }
            (Delivery::Lagged(missed), _) => {
                debug!(viewer = %self.subscription.viewer(), missed, "Live view lagged");
                let queued = self.subscription.drain();
                self.projection.observe(missed + queued);
                self.rebuild().await;
            }
        }
    }

    async fn rebuild(&mut self) {
        match self.store.snapshot().await {
            Ok(snapshot) => self.projection.resync(&snapshot),
            Err(e) => warn!("Live rebuild failed, keeping previous leaderboard: {e}"),
        }
    }

    pub async fn run(mut self, socket: WebSocket) {
        let viewer = self.subscription.viewer();
        let (mut sender, mut receiver) = socket.split();
        info!(%viewer, "Live view opened");

        if send_frame(&mut sender, &self.frame()).await.is_err() {
            return;
        }

        loop {
            tokio::select! {
                delivery = self.subscription.recv() => {
                    let Some(delivery) = delivery else { break };
                    self.reconcile(delivery).await;

                    if send_frame(&mut sender, &self.frame()).await.is_err() {
                        break;
                    }
                }
                message = receiver.next() => match message {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(%viewer, "Live socket error: {e}");
                        break;
                    }
                    Some(Ok(_)) => {}
                },
            }
        }

        info!(%viewer, "Live view closed");
    }
}

async fn send_frame<S>(sender: &mut S, frame: &Frame) -> Result<(), ()>
where
    S: Sink<Message> + Unpin,
{
    let json = serde_json::to_string(frame).map_err(|e| {
        warn!("Failed to encode frame: {e}");
    })?;

    sender.send(Message::Text(json.into())).await.map_err(|_| {
        debug!("Live viewer went away");
    })
}

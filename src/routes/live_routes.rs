// src/routes/live_routes.rs

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::{self, Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::AppState,
    notify::LiveRegistry,
};

pub const CONNECTED: &str = "connected";

pub fn router() -> Router<AppState> {
    Router::new().route("/live", get(live_updates))
}

/// Drops the registry entry when the client goes away.
struct SubscriberGuard {
    id: Uuid,
    registry: Arc<LiveRegistry>,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        let registry = self.registry.clone();
        let id = self.id;
        debug!("Live client {} disconnected", id);
        tokio::spawn(async move {
            registry.unregister(id).await;
        });
    }
}

/// Staff screens hold this open and reload their data on every "refresh".
pub async fn live_updates(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    auth.require_staff()?;

    let subscription = state.live.register().await;
    let guard = SubscriberGuard {
        id: subscription.id,
        registry: state.live.clone(),
    };

    let first = stream::once(async { Ok::<_, Infallible>(Event::default().data(CONNECTED)) });
    let updates = stream::unfold(
        (subscription.receiver, guard),
        |(mut receiver, guard): (mpsc::Receiver<String>, SubscriberGuard)| async move {
            let token = receiver.recv().await?;
            Some((Ok::<_, Infallible>(Event::default().data(token)), (receiver, guard)))
        },
    );

    Ok(Sse::new(first.chain(updates)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

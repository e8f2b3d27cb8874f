use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use tokio_stream::{Stream, StreamExt};
use tracing::info;

use crate::web::AppState;

/// GET /api/events — the live update stream. Each bus update is framed as
/// one `data:` event; a comment ping goes out every 15 seconds. Dropping the
/// connection drops the subscription, which releases the bus slot.
pub async fn sse_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.bus.subscribe();
    info!(total_clients = state.bus.subscriber_count(), "SSE客户端连接");

    let stream = subscription.map(|update| {
        Ok(Event::default().data(serde_json::to_string(&update).unwrap_or_default()))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

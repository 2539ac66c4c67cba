use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use pkg_state::store::kind_prefix;
use pkg_state::watch::WatchEvent;
use pkg_types::kind::ResourceKind;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WatchQuery {
    /// Plural kind to filter on, e.g. `scalingtargets`.
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub seq: Option<u64>,
}

fn to_event(event: &WatchEvent) -> Option<Event> {
    serde_json::to_string(event)
        .ok()
        .map(|data| Event::default().data(data))
}

/// GET /api/v1/watch — SSE stream of store mutations, replaying buffered
/// events newer than `seq` first.
pub async fn watch_events(
    State(state): State<AppState>,
    Query(query): Query<WatchQuery>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let prefix = query
        .kind
        .as_deref()
        .and_then(ResourceKind::from_plural)
        .map(|kind| kind_prefix(kind, None))
        .unwrap_or_default();
    let from_seq = query.seq.unwrap_or(0);

    info!(
        "Watch subscription: prefix='{}', from_seq={}",
        prefix, from_seq
    );

    let event_log = state.store.event_log();
    let rx = event_log.subscribe();
    let buffered = event_log.events_since(from_seq).await;
    let last_buffered = buffered.last().map(|e| e.seq).unwrap_or(from_seq);

    let buffered_prefix = prefix.clone();
    let buffered_stream = tokio_stream::iter(
        buffered
            .into_iter()
            .filter(move |e| e.key.starts_with(&buffered_prefix))
            .filter_map(|e| to_event(&e))
            .map(Ok::<_, Infallible>),
    );

    // Skip live events already replayed from the buffer.
    let live_stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) if event.seq > last_buffered && event.key.starts_with(&prefix) => {
            to_event(&event).map(Ok::<_, Infallible>)
        }
        _ => None,
    });

    Sse::new(buffered_stream.chain(live_stream)).keep_alive(KeepAlive::default())
}

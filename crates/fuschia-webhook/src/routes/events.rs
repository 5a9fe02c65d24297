//! Execution event stream over Server-Sent Events (C8, §4.5/§6.6). Each run
//! registers its own broadcast channel via `AppState::notifier_for`; this
//! route turns a subscription to that channel into an SSE byte stream.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures::stream::Stream;
use futures::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
  Router::new().route("/executions/{id}/events", get(stream_events))
}

async fn stream_events(State(state): State<AppState>, Path(execution_id): Path<String>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
  let receiver = state.subscribe(&execution_id);
  let stream = futures::stream::iter(receiver)
    .map(BroadcastStream::new)
    .flatten()
    .filter_map(|next| next.ok())
    .filter_map(|event| serde_json::to_string(&event).ok())
    .map(|json| Ok(Event::default().data(json)));
  Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

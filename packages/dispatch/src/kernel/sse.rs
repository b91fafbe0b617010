//! Server-sent events over [`StreamHub`](super::StreamHub) topics.
//!
//! Each hub value becomes one SSE frame named after its `type` field, so a
//! browser `EventSource` can `addEventListener("helper_offered", ..)`.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use serde_json::{json, Value};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use super::deps::ServerDeps;
use super::stream_hub::topics;
use crate::common::{DispatchError, DispatchResult};

fn to_event(item: Result<Value, BroadcastStreamRecvError>) -> Result<Event, Infallible> {
    let event = match item {
        Ok(value) => {
            let name = value.get("type").and_then(Value::as_str).unwrap_or("message");
            Event::default().event(name).data(value.to_string())
        }
        Err(BroadcastStreamRecvError::Lagged(skipped)) => Event::default()
            .event("lagged")
            .data(json!({ "skipped": skipped }).to_string()),
    };
    Ok(event)
}

/// `GET /api/streams/{topic}`
pub async fn stream_handler(
    State(deps): State<ServerDeps>,
    Path(topic): Path<String>,
) -> DispatchResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    if !topics::is_known(&topic) {
        return Err(DispatchError::Validation(format!("unknown stream topic '{topic}'")));
    }

    let rx = deps.stream_hub.subscribe(&topic).await;
    tracing::debug!(topic = %topic, "Stream subscriber attached");

    Ok(Sse::new(BroadcastStream::new(rx).map(to_event)).keep_alive(KeepAlive::default()))
}

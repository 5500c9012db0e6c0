use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures_util::{Stream, StreamExt};
use skyhold_core::FlightId;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/flights/{flight_id}/holds/stream", get(hold_stream))
}

/// Server-Sent Events of hold lifecycle changes for one flight.
///
/// Lagging subscribers silently skip the events they missed.
async fn hold_stream(
    State(state): State<AppState>,
    Path(flight_id): Path<FlightId>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events_tx.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| async move {
        let event = result.ok()?;
        if event.flight_id != flight_id {
            return None;
        }
        let data = event.to_json().ok()?;
        Some(Ok::<_, Infallible>(Event::default().event(event.kind.as_str()).data(data)))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

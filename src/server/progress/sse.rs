use std::convert::Infallible;
use std::time::Duration;

use async_stream::stream;
use axum::response::Sse;
use axum::response::sse::{Event, KeepAlive};
use futures::Stream;

use crate::server::extraction::model::ProgressEvent;
use crate::server::progress::bus::JobRegistry;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// cancels the job's token when this guard is dropped - covers both a normal
/// terminal exit (harmless no-op, nothing checks the token after terminal) and
/// a client disconnect, where axum drops the SSE stream's generator without
/// ever reaching the `break`. That drop is the only signal we get that the
/// caller went away, so it has to be the thing that flips the token.
struct CancelOnDrop(tokio_util::sync::CancellationToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// builds the SSE response for `/extract-stream-progress`. replays the snapshot
/// first so a caller attaching mid-job isn't staring at a blank stream, then
/// forwards the broadcast channel verbatim, and closes once a terminal event has
/// been sent.
pub fn progress_stream(registry: JobRegistry, request_id: String) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = stream! {
        let subscription = registry.subscribe(&request_id).await;

        let Some((mut receiver, snapshot, cancellation)) = subscription else {
            let event = ProgressEvent {
                request_id: request_id.clone(),
                phase: crate::server::extraction::model::Phase::Error,
                progress: 0,
                message: "unknown requestId".to_string(),
                result: None,
                error: None,
            };
            yield Ok(encode(&event));
            return;
        };

        let _cancel_guard = CancelOnDrop(cancellation.clone());

        if let Some(snapshot) = snapshot {
            let already_terminal = snapshot.is_terminal();
            yield Ok(encode(&snapshot));
            if already_terminal {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    break;
                }
                received = receiver.recv() => {
                    match received {
                        Ok(event) => {
                            let terminal = event.is_terminal();
                            yield Ok(encode(&event));
                            if terminal {
                                break;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                            continue;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                    yield Ok(Event::default().event("heartbeat").data("{}"));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(HEARTBEAT_INTERVAL).text("heartbeat"))
}

fn encode(event: &ProgressEvent) -> Event {
    let payload = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Event::default().event("progress").id(event.request_id.clone()).data(payload)
}

//! SSE (Server-Sent Events) stream of host messages.
//!
//! Each subscriber to `/v1/updates` is one registered listener.

use axum::response::sse::Event;
use futures::stream::Stream;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::warn;

use crate::overlay::HostMessage;

/// Convert a listener's receiver into an SSE stream.
///
/// Each message becomes one event named after its type. A listener that falls
/// behind skips the lost messages and keeps going. The stream ends when
/// `closed` turns true, so open listeners never hold up a graceful shutdown.
pub fn updates_to_sse_stream(
    rx: broadcast::Receiver<HostMessage>,
    mut closed: watch::Receiver<bool>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    let events = BroadcastStream::new(rx).filter_map(|item| match item {
        Ok(message) => {
            let data = serde_json::to_string(&message).unwrap_or_default();
            Some(Ok(Event::default().event(message.kind.clone()).data(data)))
        }
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(skipped, "Update listener lagged");
            None
        }
    });

    futures::StreamExt::take_until(events, async move {
        // A dropped sender ends the stream as well.
        let _ = closed.wait_for(|closed| *closed).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn message(n: u64) -> HostMessage {
        HostMessage::update_info(json!({ "n": n }))
    }

    #[tokio::test]
    async fn test_lagged_listener_skips_lost_messages() {
        let (tx, rx) = broadcast::channel(1);
        let (_closed_tx, closed) = watch::channel(false);

        for n in 0..3 {
            tx.send(message(n)).unwrap();
        }
        drop(tx);

        let events: Vec<_> = updates_to_sse_stream(rx, closed).collect().await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_close_ends_open_stream() {
        let (tx, rx) = broadcast::channel(4);
        let (closed_tx, closed) = watch::channel(false);

        let stream = updates_to_sse_stream(rx, closed);
        tokio::pin!(stream);

        tx.send(message(1)).unwrap();
        assert!(stream.next().await.is_some());

        closed_tx.send_replace(true);
        let end = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap();
        assert!(end.is_none());
        drop(tx);
    }
}

//! The watch streaming loop.
//!
//! A watch response body is a stream of chunks. Each chunk holds every event
//! that was ready when the loop woke up, so bursts are written together and a
//! chunk boundary (a flush) happens whenever the subscription is drained.
//! The loop ends when the timeout fires, the server shuts down, the feed
//! closes, encoding fails or the client goes away (the body is dropped).

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};
use http::header::CONTENT_TYPE;
use serde::Serialize;
use tokio::time::Sleep;
use tracing::{debug, trace, warn};
use wrapper_cache::{Event, Subscription};

use crate::codec::encode_watch_event;
use crate::metrics::WrapperMetrics;
use crate::negotiate::MediaType;
use crate::shutdown::ShutdownSignal;
use crate::state::AppState;
use crate::watches::WatchGuard;

/// Events feeding one watch response.
pub type EventStream<T> = BoxStream<'static, Event<Arc<T>>>;

/// Adapt a cache subscription into an [`EventStream`].
pub fn subscription_stream<T>(subscription: Subscription<Arc<T>>) -> EventStream<T>
where
    T: Send + Sync + 'static,
{
    stream::unfold(subscription, |mut subscription| async move {
        let event = subscription.recv().await?;
        Some((event, subscription))
    })
    .boxed()
}

/// Parameters of one watch response.
#[derive(Debug, Clone)]
pub struct WatchRequest {
    /// Resource label for logs, metrics and the watch tracker.
    pub resource: &'static str,
    /// Frame serializer.
    pub media: MediaType,
    /// How long the watch stays open.
    pub timeout: Duration,
    /// Node unit for ingress-filtered watches.
    pub node_unit: Option<String>,
}

struct WatchLoop<T> {
    events: EventStream<T>,
    deadline: Pin<Box<Sleep>>,
    shutdown: ShutdownSignal,
    media: MediaType,
    resource: &'static str,
    metrics: WrapperMetrics,
    guard: WatchGuard,
    finished: bool,
}

/// Build a streaming watch response over `events`.
pub fn watch_response<T>(state: &AppState, request: WatchRequest, events: EventStream<T>) -> Response
where
    T: Serialize + Send + Sync + 'static,
{
    let guard = state.watches.register(
        request.resource,
        request.node_unit,
        request.media,
        &state.shutdown,
        &state.metrics,
    );
    debug!(
        watch = %guard.id(),
        resource = request.resource,
        timeout = ?request.timeout,
        "starting watch"
    );

    let watch = WatchLoop {
        events,
        deadline: Box::pin(tokio::time::sleep(request.timeout)),
        shutdown: state.shutdown.shutdown_signal(),
        media: request.media,
        resource: request.resource,
        metrics: state.metrics.clone(),
        guard,
        finished: false,
    };

    let body = Body::from_stream(stream::unfold(watch, next_chunk));
    (
        [(CONTENT_TYPE, request.media.stream_content_type())],
        body,
    )
        .into_response()
}

async fn next_chunk<T>(mut watch: WatchLoop<T>) -> Option<(Result<Bytes, Infallible>, WatchLoop<T>)>
where
    T: Serialize + Send + Sync + 'static,
{
    if watch.finished {
        return None;
    }

    let first = tokio::select! {
        _ = &mut watch.deadline => {
            debug!(watch = %watch.guard.id(), "watch timed out");
            None
        }
        _ = watch.shutdown.changed() => {
            debug!(watch = %watch.guard.id(), "watch ended by shutdown");
            None
        }
        event = watch.events.next() => {
            if event.is_none() {
                debug!(watch = %watch.guard.id(), "watch feed closed");
            }
            event
        }
    }?;

    let mut buf = BytesMut::new();
    let mut count = 0usize;
    let mut next = Some(first);

    while let Some(event) = next.take() {
        if let Err(e) = encode_watch_event(watch.media, event.kind, event.object.as_ref(), &mut buf)
        {
            warn!(watch = %watch.guard.id(), error = %e, "failed to encode watch event");
            watch.finished = true;
            break;
        }
        count += 1;

        match watch.events.next().now_or_never() {
            Some(Some(event)) => next = Some(event),
            Some(None) => {
                watch.finished = true;
            }
            None => {}
        }
    }

    if buf.is_empty() {
        return None;
    }

    trace!(watch = %watch.guard.id(), events = count, bytes = buf.len(), "flushing watch chunk");
    watch.metrics.events_sent(watch.resource, count);
    Some((Ok(buf.freeze()), watch))
}

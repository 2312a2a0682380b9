//! Server-Sent Events transport for generation event streams

use crate::error::UpstreamError;
use crate::events::ConversationEvent;
use futures::future::BoxFuture;
use futures::stream::Stream;
use futures::FutureExt;
use reqwest_eventsource::{Event, EventSource, RequestBuilderExt};
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

/// Sentinel payload some deployments send after the last event.
const DONE_SENTINEL: &str = "done";

/// A stream of [`ConversationEvent`]s for one generation
///
/// Reconnects are disabled: once the server ends the stream, or a transport
/// error is yielded, the stream is finished. Dropping the stream (or calling
/// [`EventStream::close`]) releases the underlying connection.
///
/// A non-2xx reply is classified from its error body, so the service's code
/// and message survive just as they do for JSON calls.
pub struct EventStream {
    inner: EventSource,
    finished: bool,
    rejected: Option<BoxFuture<'static, UpstreamError>>,
}

impl EventStream {
    pub(crate) fn new(request: reqwest::RequestBuilder) -> Result<Self, UpstreamError> {
        let mut inner = request
            .eventsource()
            .map_err(|e| UpstreamError::Stream(format!("Failed to create event source: {}", e)))?;
        inner.set_retry_policy(Box::new(reqwest_eventsource::retry::Never));

        Ok(Self {
            inner,
            finished: false,
            rejected: None,
        })
    }

    /// Close the connection; subsequent polls yield `None`
    pub fn close(&mut self) {
        self.inner.close();
        self.rejected = None;
        self.finished = true;
    }

    fn read_rejection(
        status: reqwest::StatusCode,
        response: reqwest::Response,
    ) -> BoxFuture<'static, UpstreamError> {
        async move {
            let body = response.text().await.unwrap_or_default();
            UpstreamError::from_body(status.as_u16(), &body)
        }
        .boxed()
    }

    /// Decode one SSE frame; `None` means "nothing to yield, keep polling"
    fn parse_event(event: Event) -> Option<ConversationEvent> {
        let msg = match event {
            Event::Open => return None,
            Event::Message(msg) => msg,
        };

        match ConversationEvent::parse(&msg.data) {
            Ok(Some(event)) => Some(event),
            Ok(None) => {
                tracing::debug!(sse_event = %msg.event, "skipping empty event payload");
                None
            }
            Err(e) => {
                tracing::warn!(
                    sse_event = %msg.event,
                    error = %e,
                    "skipping malformed event payload"
                );
                None
            }
        }
    }

    fn classify_error(err: reqwest_eventsource::Error) -> Option<UpstreamError> {
        match err {
            reqwest_eventsource::Error::StreamEnded => None,
            reqwest_eventsource::Error::InvalidContentType(_, _) => Some(UpstreamError::Stream(
                "Invalid content type for event stream".to_string(),
            )),
            reqwest_eventsource::Error::Transport(e) => Some(UpstreamError::Network(format!(
                "Event stream transport error: {}",
                e
            ))),
            other => Some(UpstreamError::Stream(format!("Stream error: {}", other))),
        }
    }
}

impl Stream for EventStream {
    type Item = Result<ConversationEvent, UpstreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(rejected) = self.rejected.as_mut() {
            let error = ready!(rejected.as_mut().poll(cx));
            self.rejected = None;
            return Poll::Ready(Some(Err(error)));
        }

        if self.finished {
            return Poll::Ready(None);
        }

        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(Event::Message(msg))))
                    if msg.data.trim() == DONE_SENTINEL =>
                {
                    self.close();
                    return Poll::Ready(None);
                }
                Poll::Ready(Some(Ok(event))) => match Self::parse_event(event) {
                    Some(event) => return Poll::Ready(Some(Ok(event))),
                    None => continue,
                },
                Poll::Ready(Some(Err(reqwest_eventsource::Error::InvalidStatusCode(
                    status,
                    response,
                )))) => {
                    self.close();
                    self.rejected = Some(Self::read_rejection(status, response));
                    return self.poll_next(cx);
                }
                Poll::Ready(Some(Err(e))) => {
                    self.close();
                    return Poll::Ready(Self::classify_error(e).map(Err));
                }
                Poll::Ready(None) => {
                    self.finished = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

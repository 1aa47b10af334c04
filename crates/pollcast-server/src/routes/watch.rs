//! Server-sent event stream of one tenant's changes.
//!
//! Each connection holds one hub subscription. The subscription guard lives in
//! the response stream, so the client going away unsubscribes it.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use pollcast_proto::ChangeEvent;

use crate::error::AppError;
use crate::hub::Subscription;
use crate::AppState;

/// Longest accepted tenant id.
pub const MAX_TENANT_ID_LEN: usize = 128;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Watch routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/watch/:tenant_id", get(watch))
}

async fn watch(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<Sse<SubscriptionStream>, AppError> {
    validate_tenant_id(&tenant_id)?;

    let (subscription, rx) = state
        .hub
        .subscribe_channel(&tenant_id, state.config.subscriber_buffer);

    debug!(
        tenant = %tenant_id,
        subscriber_id = subscription.id(),
        "watch stream opened"
    );

    let stream = SubscriptionStream {
        events: ReceiverStream::new(rx),
        subscription,
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    ))
}

/// Reject tenant ids that are empty, too long or contain characters outside
/// `[A-Za-z0-9._-]`.
pub fn validate_tenant_id(tenant_id: &str) -> Result<(), AppError> {
    if tenant_id.is_empty() || tenant_id.len() > MAX_TENANT_ID_LEN {
        return Err(AppError::BadRequest(format!(
            "tenant id must be 1 to {} characters",
            MAX_TENANT_ID_LEN
        )));
    }
    if !tenant_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(AppError::BadRequest(format!(
            "invalid tenant id: {}",
            tenant_id
        )));
    }
    Ok(())
}

/// SSE stream backed by one hub subscription.
pub struct SubscriptionStream {
    events: ReceiverStream<ChangeEvent>,
    subscription: Subscription,
}

impl Stream for SubscriptionStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match ready!(Pin::new(&mut self.events).poll_next(cx)) {
                Some(event) => match event.to_json() {
                    Ok(json) => return Poll::Ready(Some(Ok(Event::default().data(json)))),
                    Err(e) => {
                        warn!(
                            tenant = %self.subscription.tenant(),
                            error = %e,
                            "dropping unserializable event"
                        );
                    }
                },
                None => return Poll::Ready(None),
            }
        }
    }
}

impl Drop for SubscriptionStream {
    fn drop(&mut self) {
        debug!(
            tenant = %self.subscription.tenant(),
            subscriber_id = self.subscription.id(),
            "watch stream closed"
        );
    }
}

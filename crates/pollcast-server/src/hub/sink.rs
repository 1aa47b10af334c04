//! Subscriber sinks.

use thiserror::Error;
use tokio::sync::mpsc;

use pollcast_proto::ChangeEvent;

/// Why a delivery to a sink failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    /// The sink's buffer is full.
    #[error("subscriber buffer full")]
    Full,

    /// The receiving side is gone.
    #[error("subscriber closed")]
    Closed,

    /// The sink rejected the event.
    #[error("subscriber rejected event: {0}")]
    Rejected(String),
}

/// Destination of events for one subscriber.
///
/// `deliver` must not block; the hub calls it for every subscriber in turn.
pub trait EventSink: Send + Sync {
    /// Hand one event to the subscriber.
    fn deliver(&self, event: &ChangeEvent) -> Result<(), SinkError>;
}

impl EventSink for mpsc::Sender<ChangeEvent> {
    fn deliver(&self, event: &ChangeEvent) -> Result<(), SinkError> {
        self.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

impl EventSink for mpsc::UnboundedSender<ChangeEvent> {
    fn deliver(&self, event: &ChangeEvent) -> Result<(), SinkError> {
        self.send(event.clone()).map_err(|_| SinkError::Closed)
    }
}

/// Sink backed by a closure.
pub struct FnSink<F>(pub F);

impl<F> EventSink for FnSink<F>
where
    F: Fn(&ChangeEvent) -> Result<(), SinkError> + Send + Sync,
{
    fn deliver(&self, event: &ChangeEvent) -> Result<(), SinkError> {
        (self.0)(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_sender_reports_full_and_closed() {
        let (tx, rx) = mpsc::channel(1);
        let event = ChangeEvent::heartbeat("t");

        assert!(tx.deliver(&event).is_ok());
        assert_eq!(tx.deliver(&event), Err(SinkError::Full));

        drop(rx);
        assert_eq!(tx.deliver(&event), Err(SinkError::Closed));
    }

    #[test]
    fn test_fn_sink() {
        let sink = FnSink(|e: &ChangeEvent| {
            if e.tenant_id.as_deref() == Some("bad") {
                Err(SinkError::Rejected("nope".into()))
            } else {
                Ok(())
            }
        });
        assert!(sink.deliver(&ChangeEvent::heartbeat("good")).is_ok());
        assert!(sink.deliver(&ChangeEvent::heartbeat("bad")).is_err());
    }
}

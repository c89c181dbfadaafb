use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::CheckOutcome;
use crate::server::store::Summary;
use crate::web::models::{OutcomeDto, WsMessage};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PushError {
    #[error("Failed to broadcast {event}: channel closed")]
    Closed { event: &'static str },
}

/// Where the engine pushes live results.
pub trait PushChannel: Send + Sync {
    fn status_update(&self, outcome: &CheckOutcome) -> Result<(), PushError>;

    fn summary(&self, summary: &Summary) -> Result<(), PushError>;
}

/// Fans results out to every websocket subscriber.
#[derive(Debug, Clone)]
pub struct ResultBroadcaster {
    tx: broadcast::Sender<WsMessage>,
}

impl ResultBroadcaster {
    pub fn new(tx: broadcast::Sender<WsMessage>) -> Self {
        Self { tx }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self::new(tx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WsMessage> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn send_message(&self, message: WsMessage) -> Result<(), PushError> {
        let event = message.event_name();
        let receiver_count = self.tx.receiver_count();
        if receiver_count == 0 {
            debug!(event, "No active receivers, skipping broadcast.");
            return Ok(());
        }
        self.tx
            .send(message)
            .map(|delivered| debug!(event, delivered, "Broadcasted update."))
            .map_err(|_| PushError::Closed { event })
    }
}

impl PushChannel for ResultBroadcaster {
    fn status_update(&self, outcome: &CheckOutcome) -> Result<(), PushError> {
        self.send_message(WsMessage::StatusUpdate(OutcomeDto::from(outcome)))
    }

    fn summary(&self, summary: &Summary) -> Result<(), PushError> {
        self.send_message(WsMessage::Summary(summary.clone()))
    }
}

use skyseat_shared::SeatUpdateEvent;

#[derive(Debug, thiserror::Error)]
pub enum EventSinkError {
    #[error("Event channel unavailable: {0}")]
    Unavailable(String),
}

/// Publishing half of the notification bus.
///
/// Managers only ever push into this; they never learn who is listening.
/// Delivery is at-most-once per subscriber with no retry. `Ok(n)` reports
/// how many live subscribers received the event (zero is not an error).
pub trait SeatEventSink: Send + Sync {
    fn publish(&self, event: SeatUpdateEvent) -> Result<usize, EventSinkError>;
}

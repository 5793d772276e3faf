pub mod broadcast;
pub mod bus;
pub mod hold;
pub mod lifecycle;
pub mod orchestrator;

#[cfg(test)]
mod testing;

pub use broadcast::SeatBroadcaster;
pub use bus::{Attachment, NotificationBus};
pub use hold::{HoldManager, HoldResult, HoldSettings, SweepReport};
pub use lifecycle::{BookingManager, BookingSettings};
pub use orchestrator::{MockOutcome, MockPaymentAdapter, PaymentOrchestrator};

use chrono::{DateTime, Utc};
use skyseat_core::{FlightId, SeatEventSink, SeatId};
use skyseat_shared::{SeatUpdateEvent, SeatUpdateKind};

/// Publishes one seat transition. Delivery problems are logged, never returned:
/// the transition has already been written.
pub(crate) fn emit(sink: &dyn SeatEventSink, flight_id: FlightId, seat_id: SeatId, kind: SeatUpdateKind, at: DateTime<Utc>) {
    let event = SeatUpdateEvent::new(flight_id.get(), seat_id.get(), kind, at);
    match sink.publish(event) {
        Ok(receivers) => {
            tracing::debug!(flight_id = %flight_id, seat_id = %seat_id, status = %kind, receivers, "Seat update published");
        }
        Err(e) => {
            tracing::error!(flight_id = %flight_id, seat_id = %seat_id, status = %kind, "Failed to publish seat update: {}", e);
        }
    }
}

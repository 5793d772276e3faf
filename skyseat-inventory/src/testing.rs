use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use skyseat_core::mailer::BookingMailer;
use skyseat_core::repository::SeatRepository;
use skyseat_core::{Booking, BoxError, EventSinkError, FlightId, Seat, SeatEventSink, SeatMapLayout};
use skyseat_shared::{SeatUpdateEvent, SeatUpdateKind};
use skyseat_store::{InMemoryBookingRepository, InMemorySeatRepository};

use crate::hold::{HoldManager, HoldSettings};
use crate::lifecycle::{BookingManager, BookingSettings};

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SeatUpdateEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SeatUpdateEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<SeatUpdateKind> {
        self.events().into_iter().map(|e| e.status).collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl SeatEventSink for RecordingSink {
    fn publish(&self, event: SeatUpdateEvent) -> Result<usize, EventSinkError> {
        self.events.lock().unwrap().push(event);
        Ok(1)
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(&'static str, i64)>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<(&'static str, i64)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl BookingMailer for RecordingMailer {
    async fn send_booking_confirmation(&self, booking: &Booking) -> Result<(), BoxError> {
        self.sent.lock().unwrap().push(("confirmation", booking.id.get()));
        Ok(())
    }

    async fn send_cancellation_notice(&self, booking: &Booking) -> Result<(), BoxError> {
        self.sent.lock().unwrap().push(("cancellation", booking.id.get()));
        Ok(())
    }

    async fn send_payment_timeout_notice(&self, booking: &Booking) -> Result<(), BoxError> {
        self.sent.lock().unwrap().push(("timeout", booking.id.get()));
        Ok(())
    }
}

pub struct Fixture {
    pub seats: Arc<InMemorySeatRepository>,
    pub bookings: Arc<InMemoryBookingRepository>,
    pub sink: Arc<RecordingSink>,
    pub mailer: Arc<RecordingMailer>,
    pub holds: HoldManager,
    pub manager: BookingManager,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_settings(HoldSettings::default())
    }

    pub fn with_settings(settings: HoldSettings) -> Self {
        let seats = Arc::new(InMemorySeatRepository::new());
        let bookings = Arc::new(InMemoryBookingRepository::new());
        let sink = Arc::new(RecordingSink::default());
        let mailer = Arc::new(RecordingMailer::default());

        let holds = HoldManager::new(seats.clone(), bookings.clone(), sink.clone(), settings);
        let manager = BookingManager::new(
            bookings.clone(),
            holds.clone(),
            sink.clone(),
            mailer.clone(),
            BookingSettings::default(),
        );

        Self { seats, bookings, sink, mailer, holds, manager }
    }

    /// Seeds a two-row flight (1A..2C) and clears the recorded events.
    pub async fn flight(&self, flight_id: i64) -> Vec<Seat> {
        let seats = self
            .holds
            .initialize_flight(FlightId(flight_id), &SeatMapLayout::new(2, "ABC"), 10_000)
            .await
            .unwrap();
        self.sink.clear();
        seats
    }

    pub async fn seat(&self, seat: &Seat) -> Seat {
        self.seats.get_seat(seat.id).await.unwrap().unwrap()
    }
}

/// Lets spawned fire-and-forget tasks run to completion.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

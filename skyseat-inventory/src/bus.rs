//! Client sessions and hold tracking for live seat-map viewers.
//!
//! A session lives from `connect` to `on_client_disconnect`. While it lives the
//! bus remembers which seats the client holds so they can be handed back when
//! the connection drops. The expiry sweep stays authoritative; this only makes
//! abandoned seats reappear sooner.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use skyseat_core::{FlightId, InventoryError, InventoryResult, SeatEventSink, SeatId, UserId};
use skyseat_shared::{SeatUpdateEvent, SeatUpdateKind};

use crate::broadcast::SeatBroadcaster;
use crate::hold::HoldManager;

#[derive(Debug, Clone, Copy)]
struct TrackedHold {
    flight_id: FlightId,
    holder_id: UserId,
}

#[derive(Debug, Default)]
struct ClientSession {
    flight_id: Option<FlightId>,
    holder_id: Option<UserId>,
    /// Bumped on every connect so a stale disconnect can be told apart.
    generation: u64,
    connected: bool,
    seats: HashMap<SeatId, TrackedHold>,
}

impl ClientSession {
    fn is_idle(&self) -> bool {
        !self.connected && self.seats.is_empty()
    }
}

/// One live connection of a client: its update stream and connection generation.
pub struct Attachment {
    pub receiver: broadcast::Receiver<SeatUpdateEvent>,
    pub generation: u64,
}

pub struct NotificationBus {
    broadcaster: Arc<SeatBroadcaster>,
    holds: HoldManager,
    clients: Mutex<HashMap<String, ClientSession>>,
}

impl NotificationBus {
    pub fn new(broadcaster: Arc<SeatBroadcaster>, holds: HoldManager) -> Self {
        Self {
            broadcaster,
            holds,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Opens a session and returns the flight's update stream.
    pub async fn connect(
        &self,
        client_id: &str,
        flight_id: FlightId,
        holder_id: Option<UserId>,
    ) -> InventoryResult<broadcast::Receiver<SeatUpdateEvent>> {
        Ok(self.attach(client_id, flight_id, holder_id).await?.receiver)
    }

    /// Like `connect`, but also hands back the connection generation to pass to `detach`.
    pub async fn attach(
        &self,
        client_id: &str,
        flight_id: FlightId,
        holder_id: Option<UserId>,
    ) -> InventoryResult<Attachment> {
        let receiver = self
            .broadcaster
            .subscribe(flight_id)
            .map_err(|e| InventoryError::Storage(e.to_string()))?;

        let mut clients = self.clients.lock().await;
        let session = clients.entry(client_id.to_string()).or_default();
        session.flight_id = Some(flight_id);
        session.connected = true;
        session.generation += 1;
        if holder_id.is_some() {
            session.holder_id = holder_id;
        }

        info!(client_id, flight_id = %flight_id, generation = session.generation, "Seat map viewer connected");
        Ok(Attachment { receiver, generation: session.generation })
    }

    pub fn publish_seat_update(&self, flight_id: FlightId, seat_id: SeatId, kind: SeatUpdateKind, at: DateTime<Utc>) -> usize {
        let event = SeatUpdateEvent::new(flight_id.get(), seat_id.get(), kind, at);
        match self.broadcaster.publish(event) {
            Ok(n) => n,
            Err(e) => {
                warn!(flight_id = %flight_id, seat_id = %seat_id, "Seat update dropped: {}", e);
                0
            }
        }
    }

    /// Remembers that `client_id` holds `seat_id`. The holder defaults to the
    /// session's authenticated user. Returns false when the client has no live
    /// connection or no holder is known.
    pub async fn track_hold(
        &self,
        client_id: &str,
        seat_id: SeatId,
        flight_id: FlightId,
        holder_id: Option<UserId>,
    ) -> bool {
        let mut clients = self.clients.lock().await;
        let Some(session) = clients.get_mut(client_id).filter(|session| session.connected) else {
            debug!(client_id, seat_id = %seat_id, "Not tracking hold for a client without a live connection");
            return false;
        };

        let Some(holder_id) = holder_id.or(session.holder_id) else {
            warn!(client_id, seat_id = %seat_id, "Cannot track hold without a holder");
            return false;
        };

        session.seats.insert(seat_id, TrackedHold { flight_id, holder_id });
        debug!(client_id, seat_id = %seat_id, flight_id = %flight_id, "Tracking hold");
        true
    }

    pub async fn untrack_hold(&self, client_id: &str, seat_id: SeatId) -> bool {
        let mut clients = self.clients.lock().await;
        let Some(session) = clients.get_mut(client_id) else {
            return false;
        };

        let removed = session.seats.remove(&seat_id).is_some();
        if session.is_idle() {
            clients.remove(client_id);
        }
        removed
    }

    pub async fn tracked_seats(&self, client_id: &str) -> Vec<SeatId> {
        let clients = self.clients.lock().await;
        let mut seats: Vec<SeatId> = clients
            .get(client_id)
            .map(|session| session.seats.keys().copied().collect())
            .unwrap_or_default();
        seats.sort();
        seats
    }

    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub fn subscriber_count(&self, flight_id: FlightId) -> usize {
        self.broadcaster.subscriber_count(flight_id)
    }

    /// Releases every seat the client still holds on `flight_id` and closes the
    /// session. Returns how many seats were released. Calling it again is a no-op.
    pub async fn on_client_disconnect(&self, client_id: &str, flight_id: FlightId) -> usize {
        self.close(client_id, flight_id, None).await
    }

    /// Disconnect for one specific connection. Does nothing when the client has
    /// reconnected since, so a late teardown cannot take seats from the new connection.
    pub async fn detach(&self, client_id: &str, flight_id: FlightId, generation: u64) -> usize {
        self.close(client_id, flight_id, Some(generation)).await
    }

    async fn close(&self, client_id: &str, flight_id: FlightId, generation: Option<u64>) -> usize {
        let orphaned: Vec<(SeatId, TrackedHold)> = {
            let mut clients = self.clients.lock().await;
            let Some(session) = clients.get_mut(client_id) else {
                return 0;
            };
            if let Some(generation) = generation {
                if session.generation != generation {
                    debug!(client_id, generation, current = session.generation, "Ignoring stale disconnect");
                    return 0;
                }
            }

            session.connected = false;
            let seats: Vec<SeatId> = session
                .seats
                .iter()
                .filter(|(_, tracked)| tracked.flight_id == flight_id)
                .map(|(seat_id, _)| *seat_id)
                .collect();
            let taken = seats
                .into_iter()
                .filter_map(|seat_id| session.seats.remove(&seat_id).map(|tracked| (seat_id, tracked)))
                .collect();

            if session.is_idle() {
                clients.remove(client_id);
            }
            taken
        };

        let mut released = 0;
        for (seat_id, tracked) in orphaned {
            match self.holds.release(seat_id, tracked.flight_id, tracked.holder_id).await {
                Ok(true) => released += 1,
                Ok(false) => debug!(client_id, seat_id = %seat_id, "Seat already moved on before disconnect"),
                Err(e) => warn!(client_id, seat_id = %seat_id, "Failed to release seat on disconnect: {}", e),
            }
        }

        self.broadcaster.prune_idle();
        info!(client_id, flight_id = %flight_id, released, "Seat map viewer disconnected");
        released
    }
}

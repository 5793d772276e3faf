//! Per-flight fan-out of seat updates.
//!
//! One tokio broadcast channel per flight, created on first subscription.
//! Publishing to a flight nobody watches is a no-op. Channels whose last
//! receiver went away are dropped by [`SeatBroadcaster::prune_idle`].

use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast;

use skyseat_core::{EventSinkError, FlightId, SeatEventSink};
use skyseat_shared::SeatUpdateEvent;

pub struct SeatBroadcaster {
    channels: RwLock<HashMap<FlightId, broadcast::Sender<SeatUpdateEvent>>>,
    capacity: usize,
}

impl SeatBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, flight_id: FlightId) -> Result<broadcast::Receiver<SeatUpdateEvent>, EventSinkError> {
        let mut channels = self
            .channels
            .write()
            .map_err(|_| EventSinkError::Unavailable("broadcaster lock poisoned".to_string()))?;
        let tx = channels
            .entry(flight_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        Ok(tx.subscribe())
    }

    pub fn subscriber_count(&self, flight_id: FlightId) -> usize {
        self.channels
            .read()
            .ok()
            .and_then(|channels| channels.get(&flight_id).map(|tx| tx.receiver_count()))
            .unwrap_or(0)
    }

    /// Drops channels without receivers. Returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        match self.channels.write() {
            Ok(mut channels) => {
                let before = channels.len();
                channels.retain(|_, tx| tx.receiver_count() > 0);
                before - channels.len()
            }
            Err(_) => 0,
        }
    }
}

impl Default for SeatBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl SeatEventSink for SeatBroadcaster {
    fn publish(&self, event: SeatUpdateEvent) -> Result<usize, EventSinkError> {
        let channels = self
            .channels
            .read()
            .map_err(|_| EventSinkError::Unavailable("broadcaster lock poisoned".to_string()))?;

        match channels.get(&FlightId(event.flight_id)) {
            // A send error only means every receiver is gone
            Some(tx) => Ok(tx.send(event).unwrap_or(0)),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use skyseat_shared::SeatUpdateKind;

    fn event(flight: i64, seat: i64) -> SeatUpdateEvent {
        SeatUpdateEvent::new(flight, seat, SeatUpdateKind::Held, Utc::now())
    }

    #[tokio::test]
    async fn test_updates_reach_only_that_flight() {
        let hub = SeatBroadcaster::new();
        let mut rx_500 = hub.subscribe(FlightId(500)).unwrap();
        let mut rx_501 = hub.subscribe(FlightId(501)).unwrap();

        assert_eq!(hub.publish(event(500, 7)).unwrap(), 1);

        assert_eq!(rx_500.recv().await.unwrap().seat_id, 7);
        assert!(rx_501.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_viewers_is_noop() {
        let hub = SeatBroadcaster::new();
        assert_eq!(hub.publish(event(500, 1)).unwrap(), 0);

        // Channel exists but its only receiver is gone
        drop(hub.subscribe(FlightId(500)).unwrap());
        assert_eq!(hub.publish(event(500, 1)).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prune_idle_channels() {
        let hub = SeatBroadcaster::new();
        let keep = hub.subscribe(FlightId(500)).unwrap();
        drop(hub.subscribe(FlightId(501)).unwrap());

        assert_eq!(hub.prune_idle(), 1);
        assert_eq!(hub.subscriber_count(FlightId(500)), 1);
        assert_eq!(hub.subscriber_count(FlightId(501)), 0);
        drop(keep);
    }
}

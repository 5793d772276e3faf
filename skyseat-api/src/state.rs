use std::sync::Arc;

use skyseat_core::mailer::BookingMailer;
use skyseat_core::payment::PaymentAdapter;
use skyseat_core::repository::{BookingRepository, SeatRepository};
use skyseat_inventory::{
    BookingManager, BookingSettings, HoldManager, HoldSettings, NotificationBus, PaymentOrchestrator, SeatBroadcaster,
};
use skyseat_store::app_config::{BusinessRules, SeatMapConfig};

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
    /// Expected `X-Webhook-Secret` value; empty rejects every webhook call.
    pub webhook_secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub holds: HoldManager,
    pub bookings: BookingManager,
    pub bus: Arc<NotificationBus>,
    /// `None` when payment results only arrive through the webhook.
    pub payments: Option<PaymentOrchestrator>,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
    /// Defaults for admin seat map initialization.
    pub seat_map: SeatMapConfig,
}

impl AppState {
    /// Wires the managers around one broadcaster so every transition reaches every viewer.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        seat_repo: Arc<dyn SeatRepository>,
        booking_repo: Arc<dyn BookingRepository>,
        mailer: Arc<dyn BookingMailer>,
        payment_adapter: Option<Arc<dyn PaymentAdapter>>,
        business_rules: BusinessRules,
        seat_map: SeatMapConfig,
        channel_capacity: usize,
        auth: AuthConfig,
    ) -> Self {
        let broadcaster = Arc::new(SeatBroadcaster::with_capacity(channel_capacity));

        let holds = HoldManager::new(
            seat_repo,
            booking_repo.clone(),
            broadcaster.clone(),
            HoldSettings {
                hold_ttl: business_rules.hold_ttl(),
                orphan_grace: business_rules.orphan_grace(),
                expiry_timers: business_rules.hold_expiry_timers,
            },
        );

        let bookings = BookingManager::new(
            booking_repo,
            holds.clone(),
            broadcaster.clone(),
            mailer,
            BookingSettings {
                payment_timeout: business_rules.payment_timeout(),
                currency: business_rules.currency.clone(),
            },
        );

        let bus = Arc::new(NotificationBus::new(broadcaster, holds.clone()));
        let payments = payment_adapter.map(|adapter| PaymentOrchestrator::new(adapter, bookings.clone()));

        Self { holds, bookings, bus, payments, auth, business_rules, seat_map }
    }
}

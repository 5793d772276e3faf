use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

use skyseat_inventory::{BookingManager, HoldManager};

/// Periodically releases lapsed holds and repairs orphan reservations.
pub fn start_hold_sweeper(holds: HoldManager, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = every.as_secs(), "Hold expiry sweeper started");

        loop {
            ticker.tick().await;
            match holds.run_expiry_sweep().await {
                Ok(report) if report.expired + report.repaired + report.failed > 0 => {
                    info!(
                        expired = report.expired,
                        repaired = report.repaired,
                        failed = report.failed,
                        "Hold sweep finished"
                    );
                }
                Ok(_) => {}
                Err(e) => error!("Hold sweep failed: {}", e),
            }
        }
    })
}

/// Periodically cancels bookings that stayed PENDING past the payment window.
pub fn start_payment_timeout_sweeper(bookings: BookingManager, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = every.as_secs(), "Payment timeout sweeper started");

        loop {
            ticker.tick().await;
            match bookings.run_payment_timeout_sweep().await {
                Ok(0) => {}
                Ok(cancelled) => info!(cancelled, "Payment timeout sweep finished"),
                Err(e) => error!("Payment timeout sweep failed: {}", e),
            }
        }
    })
}

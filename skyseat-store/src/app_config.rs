use serde::Deserialize;
use skyseat_core::SeatMapLayout;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
    pub realtime: RealtimeConfig,
    pub seat_map: SeatMapConfig,
    pub payment: PaymentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    pub seat_hold_seconds: u64,
    pub booking_payment_timeout_minutes: u64,
    pub hold_sweep_interval_seconds: u64,
    pub payment_sweep_interval_seconds: u64,
    /// Reserved/booked seats younger than this are left alone by the repair pass.
    pub orphan_grace_seconds: u64,
    pub currency: String,
    /// Spawn a per-hold timer in addition to the periodic sweep.
    #[serde(default)]
    pub hold_expiry_timers: bool,
}

impl BusinessRules {
    pub fn hold_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.seat_hold_seconds as i64)
    }

    pub fn payment_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.booking_payment_timeout_minutes as i64)
    }

    pub fn orphan_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.orphan_grace_seconds as i64)
    }
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            seat_hold_seconds: 300,
            booking_payment_timeout_minutes: 30,
            hold_sweep_interval_seconds: 60,
            payment_sweep_interval_seconds: 300,
            orphan_grace_seconds: 300,
            currency: "USD".to_string(),
            hold_expiry_timers: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

/// How the bundled mock gateway answers. `webhook` skips the gateway and
/// waits for `/v1/webhooks/payments` instead.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    Approve,
    Decline,
    Error,
    Webhook,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    pub mode: PaymentMode,
    /// Shared secret the provider sends with every webhook call.
    #[serde(default)]
    pub webhook_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RealtimeConfig {
    /// Per-flight broadcast buffer; slow viewers past this lag skip events.
    pub channel_capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeatMapConfig {
    pub rows: u32,
    pub letters: String,
    pub default_fare: i64,
    /// Flights whose seat map is created at start-up unless one already exists.
    #[serde(default)]
    pub demo_flights: Vec<i64>,
}

impl SeatMapConfig {
    pub fn layout(&self) -> SeatMapLayout {
        SeatMapLayout::new(self.rows, self.letters.clone())
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Developer overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `SKYSEAT__SERVER__PORT=9000`
            .add_source(config::Environment::with_prefix("SKYSEAT").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_TOML: &str = include_str!("../../config/default.toml");

    fn from_toml(extra: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_TOML, config::FileFormat::Toml))
            .add_source(config::File::from_str(extra, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_default_file_matches_documented_defaults() {
        let cfg = from_toml("");

        assert_eq!(cfg.business_rules.seat_hold_seconds, 300);
        assert_eq!(cfg.business_rules.booking_payment_timeout_minutes, 30);
        assert_eq!(cfg.business_rules.hold_sweep_interval_seconds, 60);
        assert_eq!(cfg.business_rules.payment_sweep_interval_seconds, 300);
        assert_eq!(cfg.realtime.channel_capacity, 256);
        assert_eq!(cfg.storage.backend, StorageBackend::Memory);
        assert_eq!(cfg.seat_map.layout().capacity(), 60);
        assert_eq!(cfg.payment.mode, PaymentMode::Approve);
        assert!(!cfg.payment.webhook_secret.is_empty());
    }

    #[test]
    fn test_later_sources_override() {
        let cfg = from_toml("[storage]\nbackend = \"postgres\"\n[business_rules]\nseat_hold_seconds = 90\n");

        assert_eq!(cfg.storage.backend, StorageBackend::Postgres);
        assert_eq!(cfg.business_rules.hold_ttl(), chrono::Duration::seconds(90));
        // Untouched keys survive the merge
        assert_eq!(cfg.business_rules.payment_timeout(), chrono::Duration::minutes(30));
    }
}

use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;
use serde_json::Value;

use crate::app_config::BusinessRules;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

#[derive(sqlx::FromRow)]
struct RuleRow {
    rule_key: String,
    rule_value: Value,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlays rows of the `business_rules` table onto the file/env configuration.
    pub async fn fetch_business_rules(&self, defaults: BusinessRules) -> Result<BusinessRules, sqlx::Error> {
        let rows: Vec<RuleRow> = sqlx::query_as("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        let mut rules = defaults;
        for row in rows {
            if let Some(v) = row.rule_value.get("value") {
                apply_rule(&mut rules, &row.rule_key, v);
            }
        }

        Ok(rules)
    }
}

fn apply_rule(rules: &mut BusinessRules, key: &str, v: &Value) {
    match key {
        "seat_hold_seconds" => {
            if let Some(u) = v.as_u64() {
                rules.seat_hold_seconds = u;
            }
        }
        "booking_payment_timeout_minutes" => {
            if let Some(u) = v.as_u64() {
                rules.booking_payment_timeout_minutes = u;
            }
        }
        "orphan_grace_seconds" => {
            if let Some(u) = v.as_u64() {
                rules.orphan_grace_seconds = u;
            }
        }
        "currency" => {
            if let Some(s) = v.as_str() {
                rules.currency = s.to_string();
            }
        }
        "hold_expiry_timers" => {
            if let Some(b) = v.as_bool() {
                rules.hold_expiry_timers = b;
            }
        }
        _ => {}
    }
}

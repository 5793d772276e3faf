use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use skyseat_core::repository::{BookingRepository, RepositoryResult};
use skyseat_core::{Booking, BookingId, BookingStatus, FlightId, Passenger, SeatId, UserId};
use skyseat_shared::pii::Masked;

const BOOKING_COLUMNS: &str = "id, user_id, flight_id, status, total_amount, currency, created_at, updated_at";

pub struct StoreBookingRepository {
    pool: PgPool,
}

impl StoreBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn hydrate(&self, row: BookingRow) -> RepositoryResult<Booking> {
        let seat_ids: Vec<(i64,)> =
            sqlx::query_as("SELECT seat_id FROM booking_seats WHERE booking_id = $1 ORDER BY position")
                .bind(row.id)
                .fetch_all(&self.pool)
                .await?;

        let passengers: Vec<PassengerRow> = sqlx::query_as(
            "SELECT seat_id, first_name, last_name, email, phone, age FROM passengers WHERE booking_id = $1 ORDER BY id",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;

        let status = BookingStatus::parse(&row.status)
            .ok_or_else(|| format!("booking {} has unknown status {}", row.id, row.status))?;

        Ok(Booking {
            id: BookingId(row.id),
            user_id: UserId(row.user_id),
            flight_id: FlightId(row.flight_id),
            seat_ids: seat_ids.into_iter().map(|(id,)| SeatId(id)).collect(),
            passengers: passengers.into_iter().map(Passenger::from).collect(),
            status,
            total_amount: row.total_amount,
            currency: row.currency,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    async fn hydrate_all(&self, rows: Vec<BookingRow>) -> RepositoryResult<Vec<Booking>> {
        let mut bookings = Vec::with_capacity(rows.len());
        for row in rows {
            bookings.push(self.hydrate(row).await?);
        }
        Ok(bookings)
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: i64,
    user_id: i64,
    flight_id: i64,
    status: String,
    total_amount: i64,
    currency: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct PassengerRow {
    seat_id: i64,
    first_name: String,
    last_name: String,
    email: Option<String>,
    phone: Option<String>,
    age: Option<i32>,
}

impl From<PassengerRow> for Passenger {
    fn from(row: PassengerRow) -> Self {
        Passenger {
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email.map(Masked::new),
            phone: row.phone.map(Masked::new),
            age: row.age.and_then(|a| u32::try_from(a).ok()),
            seat_id: SeatId(row.seat_id),
        }
    }
}

#[async_trait]
impl BookingRepository for StoreBookingRepository {
    async fn next_booking_id(&self) -> RepositoryResult<BookingId> {
        let (id,): (i64,) = sqlx::query_as("SELECT nextval(pg_get_serial_sequence('bookings', 'id'))")
            .fetch_one(&self.pool)
            .await?;

        Ok(BookingId(id))
    }

    async fn insert_booking(&self, booking: &Booking) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO bookings (id, user_id, flight_id, status, total_amount, currency, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(booking.id.get())
        .bind(booking.user_id.get())
        .bind(booking.flight_id.get())
        .bind(booking.status.as_str())
        .bind(booking.total_amount)
        .bind(&booking.currency)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await?;

        for (position, seat_id) in booking.seat_ids.iter().enumerate() {
            sqlx::query("INSERT INTO booking_seats (booking_id, seat_id, position) VALUES ($1, $2, $3)")
                .bind(booking.id.get())
                .bind(seat_id.get())
                .bind(position as i32)
                .execute(&mut *tx)
                .await?;
        }

        for passenger in &booking.passengers {
            sqlx::query(
                r#"
                INSERT INTO passengers (booking_id, seat_id, first_name, last_name, email, phone, age)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(booking.id.get())
            .bind(passenger.seat_id.get())
            .bind(&passenger.first_name)
            .bind(&passenger.last_name)
            .bind(passenger.email.as_ref().map(|e| e.expose().clone()))
            .bind(passenger.phone.as_ref().map(|p| p.expose().clone()))
            .bind(passenger.age.map(|a| a as i32))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_booking(&self, id: BookingId) -> RepositoryResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS);
        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn list_bookings_for_user(&self, user_id: UserId) -> RepositoryResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
            BOOKING_COLUMNS
        );
        let rows: Vec<BookingRow> = sqlx::query_as(&sql)
            .bind(user_id.get())
            .fetch_all(&self.pool)
            .await?;

        self.hydrate_all(rows).await
    }

    async fn transition_status(
        &self,
        id: BookingId,
        from: BookingStatus,
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE bookings SET status = $3, updated_at = $4 WHERE id = $1 AND status = $2")
            .bind(id.get())
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(at)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        if to == BookingStatus::Cancelled {
            sqlx::query("DELETE FROM passengers WHERE booking_id = $1")
                .bind(id.get())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn find_pending_created_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE status = 'PENDING' AND created_at < $1 ORDER BY created_at",
            BOOKING_COLUMNS
        );
        let rows: Vec<BookingRow> = sqlx::query_as(&sql).bind(cutoff).fetch_all(&self.pool).await?;

        self.hydrate_all(rows).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passenger_row_wraps_contact_details() {
        let passenger = Passenger::from(PassengerRow {
            seat_id: 12,
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            email: Some("grace@example.com".to_string()),
            phone: None,
            age: Some(-1),
        });

        assert_eq!(passenger.seat_id, SeatId(12));
        assert_eq!(passenger.email.as_ref().map(|e| e.expose().as_str()), Some("grace@example.com"));
        // Negative ages from legacy rows are dropped
        assert_eq!(passenger.age, None);
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use skyseat_core::repository::{RepositoryResult, SeatRepository};
use skyseat_core::{BookingId, FlightId, NewSeat, Seat, SeatId, SeatState, UserId};

const SEAT_COLUMNS: &str =
    "id, flight_id, seat_number, state, holder_id, hold_expires_at, booking_id, fare_amount, version, updated_at";

pub struct StoreSeatRepository {
    pool: PgPool,
}

impl StoreSeatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    id: i64,
    flight_id: i64,
    seat_number: String,
    state: String,
    holder_id: Option<i64>,
    hold_expires_at: Option<DateTime<Utc>>,
    booking_id: Option<i64>,
    fare_amount: i64,
    version: i64,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SeatRow> for Seat {
    type Error = Box<dyn std::error::Error + Send + Sync>;

    fn try_from(row: SeatRow) -> Result<Self, Self::Error> {
        let state = match (row.state.as_str(), row.holder_id, row.hold_expires_at, row.booking_id) {
            ("AVAILABLE", _, _, _) => SeatState::Available,
            ("HELD", Some(holder), Some(expires), _) => SeatState::Held {
                holder_id: UserId(holder),
                hold_expires_at: expires,
            },
            ("RESERVED", _, _, Some(booking)) => SeatState::Reserved { booking_id: BookingId(booking) },
            ("BOOKED", _, _, Some(booking)) => SeatState::Booked { booking_id: BookingId(booking) },
            (other, ..) => return Err(format!("seat {} has malformed state {}", row.id, other).into()),
        };

        Ok(Seat {
            id: SeatId(row.id),
            flight_id: FlightId(row.flight_id),
            seat_number: row.seat_number,
            state,
            fare_amount: row.fare_amount,
            version: row.version,
            updated_at: row.updated_at,
        })
    }
}

/// Column values for one claim tag: (state, holder_id, hold_expires_at, booking_id).
fn state_columns(state: &SeatState) -> (&'static str, Option<i64>, Option<DateTime<Utc>>, Option<i64>) {
    match state {
        SeatState::Available => ("AVAILABLE", None, None, None),
        SeatState::Held { holder_id, hold_expires_at } => ("HELD", Some(holder_id.get()), Some(*hold_expires_at), None),
        SeatState::Reserved { booking_id } => ("RESERVED", None, None, Some(booking_id.get())),
        SeatState::Booked { booking_id } => ("BOOKED", None, None, Some(booking_id.get())),
    }
}

fn into_seats(rows: Vec<SeatRow>) -> RepositoryResult<Vec<Seat>> {
    rows.into_iter().map(Seat::try_from).collect()
}

#[async_trait]
impl SeatRepository for StoreSeatRepository {
    async fn create_seats(&self, seats: &[NewSeat]) -> RepositoryResult<Vec<Seat>> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(seats.len());

        let sql = format!(
            "INSERT INTO seats (flight_id, seat_number, fare_amount) VALUES ($1, $2, $3) RETURNING {}",
            SEAT_COLUMNS
        );
        for seat in seats {
            let row: SeatRow = sqlx::query_as(&sql)
                .bind(seat.flight_id.get())
                .bind(&seat.seat_number)
                .bind(seat.fare_amount)
                .fetch_one(&mut *tx)
                .await?;
            created.push(Seat::try_from(row)?);
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn get_seat(&self, id: SeatId) -> RepositoryResult<Option<Seat>> {
        let sql = format!("SELECT {} FROM seats WHERE id = $1", SEAT_COLUMNS);
        let row: Option<SeatRow> = sqlx::query_as(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Seat::try_from).transpose()
    }

    async fn list_seats(&self, flight_id: FlightId) -> RepositoryResult<Vec<Seat>> {
        let sql = format!("SELECT {} FROM seats WHERE flight_id = $1 ORDER BY id", SEAT_COLUMNS);
        let rows: Vec<SeatRow> = sqlx::query_as(&sql)
            .bind(flight_id.get())
            .fetch_all(&self.pool)
            .await?;

        into_seats(rows)
    }

    async fn compare_and_set(
        &self,
        id: SeatId,
        expected_version: i64,
        state: &SeatState,
        at: DateTime<Utc>,
    ) -> RepositoryResult<Option<Seat>> {
        let (label, holder_id, hold_expires_at, booking_id) = state_columns(state);
        let sql = format!(
            r#"
            UPDATE seats
            SET state = $3, holder_id = $4, hold_expires_at = $5, booking_id = $6,
                version = version + 1, updated_at = $7
            WHERE id = $1 AND version = $2
            RETURNING {}
            "#,
            SEAT_COLUMNS
        );

        let row: Option<SeatRow> = sqlx::query_as(&sql)
            .bind(id.get())
            .bind(expected_version)
            .bind(label)
            .bind(holder_id)
            .bind(hold_expires_at)
            .bind(booking_id)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Seat::try_from).transpose()
    }

    async fn find_expired_holds(&self, now: DateTime<Utc>) -> RepositoryResult<Vec<Seat>> {
        let sql = format!(
            "SELECT {} FROM seats WHERE state = 'HELD' AND hold_expires_at < $1 ORDER BY id",
            SEAT_COLUMNS
        );
        let rows: Vec<SeatRow> = sqlx::query_as(&sql).bind(now).fetch_all(&self.pool).await?;

        into_seats(rows)
    }

    async fn find_claimed_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<Vec<Seat>> {
        let sql = format!(
            "SELECT {} FROM seats WHERE state IN ('RESERVED', 'BOOKED') AND updated_at < $1 ORDER BY id",
            SEAT_COLUMNS
        );
        let rows: Vec<SeatRow> = sqlx::query_as(&sql).bind(cutoff).fetch_all(&self.pool).await?;

        into_seats(rows)
    }

    async fn delete_flight(&self, flight_id: FlightId) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM seats WHERE flight_id = $1")
            .bind(flight_id.get())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

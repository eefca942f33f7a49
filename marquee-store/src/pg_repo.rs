use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marquee_core::{
    CatalogService, MovieId, ScreenId, Seat, SeatAvailability, SeatId, SeatSpec, SeatStore,
    Showtime, ShowtimeId, StoreError, StoreResult, TheaterId, Ticket, TicketId, TicketStore,
};
use marquee_shared::Masked;
use sqlx::PgPool;
use uuid::Uuid;

pub(crate) fn db_err(err: sqlx::Error) -> StoreError {
    StoreError::Database(Box::new(err))
}

/// PostgreSQL-backed catalog, seat and ticket store.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct ShowtimeRow {
    id: i64,
    theater_id: i64,
    movie_id: i64,
    screen_id: i64,
    starts_at: DateTime<Utc>,
    price_cents: i64,
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    id: i64,
    screen_id: i64,
    showtime_id: i64,
    label: String,
    accessible: bool,
    availability: String,
    ticket_id: Option<Uuid>,
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    showtime_id: i64,
    purchaser: String,
    price_cents: i64,
    issued_at: DateTime<Utc>,
    seat_ids: Vec<i64>,
}

impl From<ShowtimeRow> for Showtime {
    fn from(row: ShowtimeRow) -> Self {
        Showtime {
            id: ShowtimeId(row.id),
            theater_id: TheaterId(row.theater_id),
            movie_id: MovieId(row.movie_id),
            screen_id: ScreenId(row.screen_id),
            starts_at: row.starts_at,
            price_cents: row.price_cents,
        }
    }
}

impl TryFrom<SeatRow> for Seat {
    type Error = StoreError;

    fn try_from(row: SeatRow) -> Result<Self, Self::Error> {
        let availability = row
            .availability
            .parse::<SeatAvailability>()
            .map_err(|e| StoreError::Corrupt(format!("seat {}: {}", row.id, e)))?;

        Ok(Seat {
            id: SeatId(row.id),
            screen_id: ScreenId(row.screen_id),
            showtime_id: ShowtimeId(row.showtime_id),
            label: row.label,
            accessible: row.accessible,
            availability,
            ticket_id: row.ticket_id.map(TicketId),
        })
    }
}

impl From<TicketRow> for Ticket {
    fn from(row: TicketRow) -> Self {
        Ticket {
            id: TicketId(row.id),
            showtime_id: ShowtimeId(row.showtime_id),
            purchaser: Masked(row.purchaser),
            price_cents: row.price_cents,
            seat_ids: row.seat_ids.into_iter().map(SeatId).collect::<BTreeSet<_>>(),
            issued_at: row.issued_at,
        }
    }
}

const SEAT_COLUMNS: &str =
    "s.id, s.screen_id, s.showtime_id, s.label, s.accessible, s.availability, s.ticket_id";

#[async_trait]
impl CatalogService for PgStore {
    async fn showtime(&self, id: ShowtimeId) -> StoreResult<Option<Showtime>> {
        let row: Option<ShowtimeRow> = sqlx::query_as(
            "SELECT id, theater_id, movie_id, screen_id, starts_at, price_cents FROM showtimes WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(Showtime::from))
    }
}

#[async_trait]
impl SeatStore for PgStore {
    async fn seats_for_showtime(&self, showtime_id: ShowtimeId) -> StoreResult<Vec<Seat>> {
        let rows: Vec<SeatRow> = sqlx::query_as(&format!(
            "SELECT {} FROM seats s WHERE s.showtime_id = $1 ORDER BY s.id",
            SEAT_COLUMNS
        ))
        .bind(showtime_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(Seat::try_from).collect()
    }

    async fn insert_seats(&self, specs: &[SeatSpec]) -> StoreResult<Vec<Seat>> {
        let screen_ids: Vec<i64> = specs.iter().map(|s| s.screen_id.0).collect();
        let showtime_ids: Vec<i64> = specs.iter().map(|s| s.showtime_id.0).collect();
        let labels: Vec<String> = specs.iter().map(|s| s.label.clone()).collect();
        let accessible: Vec<bool> = specs.iter().map(|s| s.accessible).collect();
        let availability: Vec<String> =
            specs.iter().map(|s| s.availability.as_str().to_string()).collect();

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO seats (screen_id, showtime_id, label, accessible, availability)
            SELECT * FROM UNNEST($1::BIGINT[], $2::BIGINT[], $3::TEXT[], $4::BOOL[], $5::TEXT[])
            ON CONFLICT (screen_id, showtime_id, label) DO NOTHING
            "#,
        )
        .bind(&screen_ids)
        .bind(&showtime_ids)
        .bind(&labels)
        .bind(&accessible)
        .bind(&availability)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let rows: Vec<SeatRow> = sqlx::query_as(&format!(
            r#"
            SELECT DISTINCT {}
            FROM seats s
            JOIN UNNEST($1::BIGINT[], $2::BIGINT[], $3::TEXT[]) AS k(screen_id, showtime_id, label)
              ON s.screen_id = k.screen_id AND s.showtime_id = k.showtime_id AND s.label = k.label
            ORDER BY s.id
            "#,
            SEAT_COLUMNS
        ))
        .bind(&screen_ids)
        .bind(&showtime_ids)
        .bind(&labels)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        rows.into_iter().map(Seat::try_from).collect()
    }
}

#[async_trait]
impl TicketStore for PgStore {
    async fn commit_ticket(&self, ticket: &Ticket) -> StoreResult<()> {
        let seat_ids: Vec<i64> = ticket.seat_ids.iter().map(|id| id.0).collect();

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // 1. Serialize against other processes claiming seats for this showtime
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(ticket.showtime_id.0)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        // 2. Re-check availability under row locks
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT id, availability FROM seats WHERE showtime_id = $1 AND id = ANY($2) FOR UPDATE",
        )
        .bind(ticket.showtime_id.0)
        .bind(&seat_ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;

        let found: HashMap<i64, String> = rows.into_iter().collect();
        let conflicts: Vec<SeatId> = seat_ids
            .iter()
            .filter(|id| found.get(*id).map(String::as_str) != Some(SeatAvailability::Available.as_str()))
            .map(|id| SeatId(*id))
            .collect();

        if !conflicts.is_empty() {
            tx.rollback().await.map_err(db_err)?;
            return Err(StoreError::Conflict(conflicts));
        }

        // 3. Ticket row, then the claim
        sqlx::query(
            r#"
            INSERT INTO tickets (id, showtime_id, purchaser, price_cents, issued_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(ticket.id.0)
        .bind(ticket.showtime_id.0)
        .bind(ticket.purchaser.expose())
        .bind(ticket.price_cents)
        .bind(ticket.issued_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query("UPDATE seats SET availability = $1, ticket_id = $2 WHERE id = ANY($3)")
            .bind(SeatAvailability::Sold.as_str())
            .bind(ticket.id.0)
            .bind(&seat_ids)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn tickets_for_showtime(&self, showtime_id: ShowtimeId) -> StoreResult<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(
            r#"
            SELECT t.id, t.showtime_id, t.purchaser, t.price_cents, t.issued_at,
                   COALESCE(array_agg(s.id ORDER BY s.id) FILTER (WHERE s.id IS NOT NULL), '{}'::BIGINT[]) AS seat_ids
            FROM tickets t
            LEFT JOIN seats s ON s.ticket_id = t.id
            WHERE t.showtime_id = $1
            GROUP BY t.id
            ORDER BY t.issued_at, t.id
            "#,
        )
        .bind(showtime_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(Ticket::from).collect())
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skyhold_core::{LedgerError, LedgerResult, Seat, SeatId, SeatLedger, SeatLock, SeatStatus};

use crate::database::PgTx;

/// Seat ledger over the `seats` table.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgSeatLedger;

#[derive(sqlx::FromRow)]
struct SeatRow {
    id: i64,
    flight_id: i64,
    seat_number: String,
    status: String,
    locked_until: Option<DateTime<Utc>>,
}

impl TryFrom<SeatRow> for Seat {
    type Error = LedgerError;

    fn try_from(row: SeatRow) -> Result<Self, Self::Error> {
        Ok(Seat {
            id: row.id,
            flight_id: row.flight_id,
            seat_number: row.seat_number,
            status: row.status.parse().map_err(LedgerError::storage)?,
            locked_until: row.locked_until,
        })
    }
}

#[async_trait]
impl SeatLedger<PgTx> for PgSeatLedger {
    async fn acquire_lock(&self, tx: &mut PgTx, seat_id: SeatId, lock_until: DateTime<Utc>) -> LedgerResult<SeatLock> {
        // FOR UPDATE: a second reserve on this seat waits here until we commit or roll back.
        let row = sqlx::query_as::<_, SeatRow>(
            "SELECT id, flight_id, seat_number, status, locked_until FROM seats WHERE id = $1 FOR UPDATE",
        )
        .bind(seat_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(LedgerError::storage)?
        .ok_or(LedgerError::NotFound)?;

        let mut seat = Seat::try_from(row)?;
        if seat.status != SeatStatus::Available {
            return Ok(SeatLock::unchanged(seat));
        }

        sqlx::query("UPDATE seats SET status = $1, locked_until = $2 WHERE id = $3")
            .bind(SeatStatus::Locked.as_str())
            .bind(lock_until)
            .bind(seat_id)
            .execute(&mut **tx)
            .await
            .map_err(LedgerError::storage)?;

        seat.lock(lock_until);
        Ok(SeatLock::acquired(seat))
    }

    async fn get_by_id(&self, tx: &mut PgTx, seat_id: SeatId) -> LedgerResult<Seat> {
        let row = sqlx::query_as::<_, SeatRow>(
            "SELECT id, flight_id, seat_number, status, locked_until FROM seats WHERE id = $1",
        )
        .bind(seat_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(LedgerError::storage)?
        .ok_or(LedgerError::NotFound)?;

        Seat::try_from(row)
    }

    async fn release_expired(&self, tx: &mut PgTx, now: DateTime<Utc>) -> LedgerResult<()> {
        // Lock targets in id order so concurrent sweeps queue instead of deadlocking.
        let released = sqlx::query(
            r#"
            UPDATE seats SET status = $1, locked_until = NULL
            WHERE status = $2 AND id IN (
                SELECT id FROM seats
                WHERE status = $2 AND locked_until <= $3
                ORDER BY id
                FOR UPDATE
            )
            "#,
        )
        .bind(SeatStatus::Available.as_str())
        .bind(SeatStatus::Locked.as_str())
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(LedgerError::storage)?
        .rows_affected();

        tracing::debug!(released, "Released lapsed seat holds");
        Ok(())
    }

    async fn mark_booked(&self, tx: &mut PgTx, seat_id: SeatId) -> LedgerResult<()> {
        let result = sqlx::query("UPDATE seats SET status = $1, locked_until = NULL WHERE id = $2")
            .bind(SeatStatus::Booked.as_str())
            .bind(seat_id)
            .execute(&mut **tx)
            .await
            .map_err(LedgerError::storage)?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DbClient;
    use chrono::Duration;
    use skyhold_core::TransactionManager;

    async fn connect() -> DbClient {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = sqlx::PgPool::connect(&url).await.unwrap();
        let db = DbClient::from_pool(pool);
        db.migrate().await.unwrap();
        db
    }

    async fn seed_seat(db: &DbClient, status: SeatStatus) -> SeatId {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO seats (flight_id, seat_number, status) VALUES (100, md5(random()::text), $1) RETURNING id",
        )
        .bind(status.as_str())
        .fetch_one(&db.pool)
        .await
        .unwrap()
    }

    #[test]
    fn test_row_with_unknown_status_is_storage_error() {
        let row = SeatRow {
            id: 1,
            flight_id: 100,
            seat_number: "1A".into(),
            status: "HELD".into(),
            locked_until: None,
        };
        assert!(matches!(Seat::try_from(row), Err(LedgerError::Storage(_))));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_acquire_lock_then_release() {
        let db = connect().await;
        let seat_id = seed_seat(&db, SeatStatus::Available).await;
        let now = Utc::now();

        let mut tx = db.begin().await.unwrap();
        let lock = PgSeatLedger.acquire_lock(&mut tx, seat_id, now - Duration::seconds(1)).await.unwrap();
        assert!(lock.acquired);
        let again = PgSeatLedger.acquire_lock(&mut tx, seat_id, now).await.unwrap();
        assert!(!again.acquired);
        db.commit(tx).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        PgSeatLedger.release_expired(&mut tx, now).await.unwrap();
        let seat = PgSeatLedger.get_by_id(&mut tx, seat_id).await.unwrap();
        db.commit(tx).await.unwrap();

        assert_eq!(seat.status, SeatStatus::Available);
        assert_eq!(seat.locked_until, None);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_mark_booked_missing_seat() {
        let db = connect().await;
        let mut tx = db.begin().await.unwrap();

        assert!(matches!(
            PgSeatLedger.mark_booked(&mut tx, i64::MAX).await,
            Err(LedgerError::NotFound)
        ));
        db.rollback(tx).await.unwrap();
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skyhold_core::{
    LedgerError, LedgerResult, NewReservation, Reservation, ReservationId, ReservationLedger, ReservationStatus,
};

use crate::database::PgTx;

/// Reservation ledger over the `reservations` table.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgReservationLedger;

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: i64,
    user_id: i64,
    flight_id: i64,
    seat_id: i64,
    status: String,
    expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = LedgerError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        Ok(Reservation {
            id: row.id,
            user_id: row.user_id,
            flight_id: row.flight_id,
            seat_id: row.seat_id,
            status: row.status.parse().map_err(LedgerError::storage)?,
            expiry_time: row.expires_at,
        })
    }
}

const SELECT_RESERVATION: &str =
    "SELECT id, user_id, flight_id, seat_id, status, expires_at FROM reservations";

impl PgReservationLedger {
    async fn fetch_one(&self, tx: &mut PgTx, id: ReservationId, for_update: bool) -> LedgerResult<Reservation> {
        let sql = if for_update {
            format!("{SELECT_RESERVATION} WHERE id = $1 FOR UPDATE")
        } else {
            format!("{SELECT_RESERVATION} WHERE id = $1")
        };

        let row = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(LedgerError::storage)?
            .ok_or(LedgerError::NotFound)?;

        Reservation::try_from(row)
    }
}

#[async_trait]
impl ReservationLedger<PgTx> for PgReservationLedger {
    async fn create(&self, tx: &mut PgTx, reservation: &NewReservation) -> LedgerResult<ReservationId> {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO reservations (user_id, flight_id, seat_id, status, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(reservation.user_id)
        .bind(reservation.flight_id)
        .bind(reservation.seat_id)
        .bind(ReservationStatus::Pending.as_str())
        .bind(reservation.expiry_time)
        .fetch_one(&mut **tx)
        .await
        .map_err(LedgerError::storage)
    }

    async fn get_by_id(&self, tx: &mut PgTx, id: ReservationId) -> LedgerResult<Reservation> {
        self.fetch_one(tx, id, false).await
    }

    async fn lock_by_id(&self, tx: &mut PgTx, id: ReservationId) -> LedgerResult<Reservation> {
        self.fetch_one(tx, id, true).await
    }

    async fn find_expired(&self, tx: &mut PgTx, now: DateTime<Utc>) -> LedgerResult<Vec<Reservation>> {
        // Rows confirmed while we waited for their lock drop out of the result.
        let sql = format!("{SELECT_RESERVATION} WHERE status = $1 AND expires_at <= $2 ORDER BY id FOR UPDATE");

        let rows = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(ReservationStatus::Pending.as_str())
            .bind(now)
            .fetch_all(&mut **tx)
            .await
            .map_err(LedgerError::storage)?;

        rows.into_iter().map(Reservation::try_from).collect()
    }

    async fn update_status(&self, tx: &mut PgTx, id: ReservationId, status: ReservationStatus) -> LedgerResult<()> {
        let result = sqlx::query("UPDATE reservations SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
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

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_create_find_and_expire() {
        let db = connect().await;
        let seat_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO seats (flight_id, seat_number, status) VALUES (100, md5(random()::text), 'LOCKED') RETURNING id",
        )
        .fetch_one(&db.pool)
        .await;
        // The lock-consistency check rejects LOCKED without locked_until.
        assert!(seat_id.is_err());

        let seat_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO seats (flight_id, seat_number, status) VALUES (100, md5(random()::text), 'AVAILABLE') RETURNING id",
        )
        .fetch_one(&db.pool)
        .await
        .unwrap();

        let now = Utc::now();
        let mut tx = db.begin().await.unwrap();
        let id = PgReservationLedger
            .create(&mut tx, &NewReservation::pending(7, 100, seat_id, now - Duration::seconds(5)))
            .await
            .unwrap();
        db.commit(tx).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        let expired = PgReservationLedger.find_expired(&mut tx, now).await.unwrap();
        assert!(expired.iter().any(|r| r.id == id));
        PgReservationLedger
            .update_status(&mut tx, id, ReservationStatus::Expired)
            .await
            .unwrap();
        let reservation = PgReservationLedger.get_by_id(&mut tx, id).await.unwrap();
        db.commit(tx).await.unwrap();

        assert_eq!(reservation.status, ReservationStatus::Expired);
        assert_eq!(reservation.seat_id, seat_id);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_missing_reservation_is_not_found() {
        let db = connect().await;
        let mut tx = db.begin().await.unwrap();

        assert!(matches!(
            PgReservationLedger.get_by_id(&mut tx, i64::MAX).await,
            Err(LedgerError::NotFound)
        ));
        assert!(matches!(
            PgReservationLedger
                .update_status(&mut tx, i64::MAX, ReservationStatus::Expired)
                .await,
            Err(LedgerError::NotFound)
        ));
        db.rollback(tx).await.unwrap();
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::reservation::{NewReservation, Reservation, ReservationId, ReservationStatus};
use crate::seat::{Seat, SeatId};

/// Failure reported by a ledger or the transaction manager.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("record not found")]
    NotFound,
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl LedgerError {
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        LedgerError::Storage(Box::new(err))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Opens and finishes the transactions every ledger call is scoped to.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    type Tx: Send + 'static;

    async fn begin(&self) -> LedgerResult<Self::Tx>;

    async fn commit(&self, tx: Self::Tx) -> LedgerResult<()>;

    async fn rollback(&self, tx: Self::Tx) -> LedgerResult<()>;
}

/// Result of `SeatLedger::acquire_lock`.
///
/// `seat` is the state after the locked read; `acquired` tells whether this
/// call performed the Available -> Locked transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatLock {
    pub seat: Seat,
    pub acquired: bool,
}

impl SeatLock {
    pub fn acquired(seat: Seat) -> Self {
        Self { seat, acquired: true }
    }

    pub fn unchanged(seat: Seat) -> Self {
        Self { seat, acquired: false }
    }
}

/// Seat data access, scoped to a transaction.
#[async_trait]
pub trait SeatLedger<Tx>: Send + Sync
where
    Tx: Send + 'static,
{
    /// Reads the seat under an exclusive row lock held until the transaction
    /// ends, locking it until `lock_until` if it is Available.
    async fn acquire_lock(&self, tx: &mut Tx, seat_id: SeatId, lock_until: DateTime<Utc>) -> LedgerResult<SeatLock>;

    async fn get_by_id(&self, tx: &mut Tx, seat_id: SeatId) -> LedgerResult<Seat>;

    /// Moves every Locked seat whose hold ended at or before `now` back to Available.
    async fn release_expired(&self, tx: &mut Tx, now: DateTime<Utc>) -> LedgerResult<()>;

    /// Unconditional transition to Booked.
    async fn mark_booked(&self, tx: &mut Tx, seat_id: SeatId) -> LedgerResult<()>;
}

/// Reservation data access, scoped to a transaction.
#[async_trait]
pub trait ReservationLedger<Tx>: Send + Sync
where
    Tx: Send + 'static,
{
    async fn create(&self, tx: &mut Tx, reservation: &NewReservation) -> LedgerResult<ReservationId>;

    async fn get_by_id(&self, tx: &mut Tx, id: ReservationId) -> LedgerResult<Reservation>;

    /// Like `get_by_id` but holds the row lock until the transaction ends.
    async fn lock_by_id(&self, tx: &mut Tx, id: ReservationId) -> LedgerResult<Reservation>;

    /// Pending reservations with an expiry at or before `now`, row-locked.
    async fn find_expired(&self, tx: &mut Tx, now: DateTime<Utc>) -> LedgerResult<Vec<Reservation>>;

    /// Unconditional overwrite; callers enforce the transition rules.
    async fn update_status(&self, tx: &mut Tx, id: ReservationId, status: ReservationStatus) -> LedgerResult<()>;
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};

use crate::repository::{LedgerError, LedgerResult, ReservationLedger, SeatLedger, SeatLock, TransactionManager};
use crate::reservation::{NewReservation, Reservation, ReservationId, ReservationStatus};
use crate::seat::{Seat, SeatId, SeatStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Seat(SeatId),
    Reservation(ReservationId),
}

#[derive(Debug, Default)]
struct Tables {
    seats: BTreeMap<SeatId, Seat>,
    reservations: BTreeMap<ReservationId, Reservation>,
}

#[derive(Debug)]
struct Inner {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<RowKey, Arc<RowMutex<()>>>>,
    next_reservation_id: AtomicI64,
}

/// Process-local transactional store for seats and reservations.
///
/// Writes are staged on the transaction and applied in one step at commit.
/// Row locks are owned async mutex guards kept on the transaction, so a
/// second transaction touching the same row waits until the first commits or
/// rolls back, the way `SELECT ... FOR UPDATE` behaves in Postgres.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

/// Transaction handle for [`MemoryStore`]. Dropping it rolls back.
#[derive(Debug, Default)]
pub struct MemoryTransaction {
    guards: HashMap<RowKey, OwnedMutexGuard<()>>,
    seats: BTreeMap<SeatId, Seat>,
    reservations: BTreeMap<ReservationId, Reservation>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: Mutex::new(Tables::default()),
                row_locks: Mutex::new(HashMap::new()),
                next_reservation_id: AtomicI64::new(1),
            }),
        }
    }

    /// Seeds or replaces a seat outside of any transaction.
    pub fn insert_seat(&self, seat: Seat) {
        self.tables().seats.insert(seat.id, seat);
    }

    /// Committed state of a seat.
    pub fn seat(&self, id: SeatId) -> Option<Seat> {
        self.tables().seats.get(&id).cloned()
    }

    /// Committed state of a reservation.
    pub fn reservation(&self, id: ReservationId) -> Option<Reservation> {
        self.tables().reservations.get(&id).cloned()
    }

    pub fn seats(&self) -> Vec<Seat> {
        self.tables().seats.values().cloned().collect()
    }

    pub fn reservations(&self) -> Vec<Reservation> {
        self.tables().reservations.values().cloned().collect()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.inner.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn row_mutex(&self, key: RowKey) -> Arc<RowMutex<()>> {
        let mut locks = self.inner.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key).or_default().clone()
    }

    async fn lock_row(&self, tx: &mut MemoryTransaction, key: RowKey) {
        if tx.guards.contains_key(&key) {
            return;
        }
        let guard = self.row_mutex(key).lock_owned().await;
        tx.guards.insert(key, guard);
    }

    fn current_seat(&self, tx: &MemoryTransaction, id: SeatId) -> Option<Seat> {
        match tx.seats.get(&id) {
            Some(seat) => Some(seat.clone()),
            None => self.seat(id),
        }
    }

    fn current_reservation(&self, tx: &MemoryTransaction, id: ReservationId) -> Option<Reservation> {
        match tx.reservations.get(&id) {
            Some(reservation) => Some(reservation.clone()),
            None => self.reservation(id),
        }
    }

    fn lapsed_seat_ids(&self, tx: &MemoryTransaction, now: DateTime<Utc>) -> BTreeSet<SeatId> {
        let tables = self.tables();
        let ids = tables
            .seats
            .values()
            .filter(|seat| !tx.seats.contains_key(&seat.id))
            .chain(tx.seats.values())
            .filter(|seat| seat.hold_lapsed(now))
            .map(|seat| seat.id)
            .collect();
        ids
    }

    fn overdue_reservation_ids(&self, tx: &MemoryTransaction, now: DateTime<Utc>) -> BTreeSet<ReservationId> {
        let tables = self.tables();
        let ids = tables
            .reservations
            .values()
            .filter(|reservation| !tx.reservations.contains_key(&reservation.id))
            .chain(tx.reservations.values())
            .filter(|reservation| reservation.is_overdue(now))
            .map(|reservation| reservation.id)
            .collect();
        ids
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionManager for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> LedgerResult<MemoryTransaction> {
        Ok(MemoryTransaction::default())
    }

    async fn commit(&self, tx: MemoryTransaction) -> LedgerResult<()> {
        let MemoryTransaction {
            guards,
            seats,
            reservations,
        } = tx;
        {
            let mut tables = self.tables();
            tables.seats.extend(seats);
            tables.reservations.extend(reservations);
        }
        // Row locks are released only once the writes are visible.
        drop(guards);
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTransaction) -> LedgerResult<()> {
        drop(tx);
        Ok(())
    }
}

#[async_trait]
impl SeatLedger<MemoryTransaction> for MemoryStore {
    async fn acquire_lock(
        &self,
        tx: &mut MemoryTransaction,
        seat_id: SeatId,
        lock_until: DateTime<Utc>,
    ) -> LedgerResult<SeatLock> {
        self.lock_row(tx, RowKey::Seat(seat_id)).await;
        let mut seat = self.current_seat(tx, seat_id).ok_or(LedgerError::NotFound)?;

        if seat.status != SeatStatus::Available {
            return Ok(SeatLock::unchanged(seat));
        }

        seat.lock(lock_until);
        tx.seats.insert(seat_id, seat.clone());
        Ok(SeatLock::acquired(seat))
    }

    async fn get_by_id(&self, tx: &mut MemoryTransaction, seat_id: SeatId) -> LedgerResult<Seat> {
        self.current_seat(tx, seat_id).ok_or(LedgerError::NotFound)
    }

    async fn release_expired(&self, tx: &mut MemoryTransaction, now: DateTime<Utc>) -> LedgerResult<()> {
        for seat_id in self.lapsed_seat_ids(tx, now) {
            self.lock_row(tx, RowKey::Seat(seat_id)).await;
            // Re-check under the lock: another transaction may have booked or released it.
            if let Some(mut seat) = self.current_seat(tx, seat_id).filter(|seat| seat.hold_lapsed(now)) {
                seat.release();
                tx.seats.insert(seat_id, seat);
            }
        }
        Ok(())
    }

    async fn mark_booked(&self, tx: &mut MemoryTransaction, seat_id: SeatId) -> LedgerResult<()> {
        self.lock_row(tx, RowKey::Seat(seat_id)).await;
        let mut seat = self.current_seat(tx, seat_id).ok_or(LedgerError::NotFound)?;
        seat.book();
        tx.seats.insert(seat_id, seat);
        Ok(())
    }
}

#[async_trait]
impl ReservationLedger<MemoryTransaction> for MemoryStore {
    async fn create(&self, tx: &mut MemoryTransaction, reservation: &NewReservation) -> LedgerResult<ReservationId> {
        let id = self.inner.next_reservation_id.fetch_add(1, Ordering::SeqCst);
        self.lock_row(tx, RowKey::Reservation(id)).await;
        tx.reservations.insert(id, reservation.clone().into_reservation(id));
        Ok(id)
    }

    async fn get_by_id(&self, tx: &mut MemoryTransaction, id: ReservationId) -> LedgerResult<Reservation> {
        self.current_reservation(tx, id).ok_or(LedgerError::NotFound)
    }

    async fn lock_by_id(&self, tx: &mut MemoryTransaction, id: ReservationId) -> LedgerResult<Reservation> {
        self.lock_row(tx, RowKey::Reservation(id)).await;
        self.current_reservation(tx, id).ok_or(LedgerError::NotFound)
    }

    async fn find_expired(&self, tx: &mut MemoryTransaction, now: DateTime<Utc>) -> LedgerResult<Vec<Reservation>> {
        let mut expired = Vec::new();
        for id in self.overdue_reservation_ids(tx, now) {
            self.lock_row(tx, RowKey::Reservation(id)).await;
            if let Some(reservation) = self.current_reservation(tx, id).filter(|r| r.is_overdue(now)) {
                expired.push(reservation);
            }
        }
        Ok(expired)
    }

    async fn update_status(
        &self,
        tx: &mut MemoryTransaction,
        id: ReservationId,
        status: ReservationStatus,
    ) -> LedgerResult<()> {
        self.lock_row(tx, RowKey::Reservation(id)).await;
        let mut reservation = self.current_reservation(tx, id).ok_or(LedgerError::NotFound)?;
        reservation.status = status;
        tx.reservations.insert(id, reservation);
        Ok(())
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::repository::{LedgerError, ReservationLedger, SeatLedger, TransactionManager};
use crate::reservation::{FlightId, NewReservation, Reservation, ReservationId, ReservationStatus, UserId};
use crate::seat::SeatId;
use crate::{CoreResult, ReservationError};

/// Hold length applied by `reserve` unless configured otherwise.
pub const DEFAULT_HOLD_SECONDS: i64 = 600;

/// What one expiration sweep changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: Vec<Reservation>,
}

impl SweepReport {
    pub fn expired_count(&self) -> usize {
        self.expired.len()
    }
}

/// The operations exposed to the request-handling layer.
#[async_trait]
pub trait ReservationService: Send + Sync {
    async fn reserve(&self, user_id: UserId, flight_id: FlightId, seat_id: SeatId) -> CoreResult<Reservation>;

    async fn confirm_payment(&self, reservation_id: ReservationId) -> CoreResult<Reservation>;

    async fn get_reservation(&self, reservation_id: ReservationId) -> CoreResult<Reservation>;

    async fn expire_sweep(&self) -> CoreResult<SweepReport>;
}

/// Runs reserve, confirm, get and sweep against the seat and reservation
/// ledgers, one transaction per operation.
///
/// Lock order is always seat row before reservation row, in every operation,
/// so two coordinators sharing a store cannot deadlock each other.
pub struct ReservationCoordinator<T, S, R> {
    tx_manager: T,
    seats: S,
    reservations: R,
    hold_duration: Duration,
    clock: Arc<dyn Clock>,
}

impl<T, S, R> ReservationCoordinator<T, S, R>
where
    T: TransactionManager,
    S: SeatLedger<T::Tx>,
    R: ReservationLedger<T::Tx>,
{
    pub fn new(tx_manager: T, seats: S, reservations: R) -> Self {
        Self {
            tx_manager,
            seats,
            reservations,
            hold_duration: Duration::seconds(DEFAULT_HOLD_SECONDS),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_hold_duration(mut self, hold_duration: Duration) -> Self {
        self.hold_duration = hold_duration;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn hold_duration(&self) -> Duration {
        self.hold_duration
    }

    /// Places a hold on `seat_id` and records a pending reservation for it.
    pub async fn reserve(&self, user_id: UserId, flight_id: FlightId, seat_id: SeatId) -> CoreResult<Reservation> {
        let mut tx = self.begin().await?;
        let outcome = self.reserve_in(&mut tx, user_id, flight_id, seat_id).await;
        let reservation = self.finish(tx, outcome, "reserve").await?;

        info!(
            reservation_id = reservation.id,
            seat_id,
            user_id,
            "Seat held until {:?}",
            reservation.expiry_time
        );
        Ok(reservation)
    }

    async fn reserve_in(
        &self,
        tx: &mut T::Tx,
        user_id: UserId,
        flight_id: FlightId,
        seat_id: SeatId,
    ) -> CoreResult<Reservation> {
        let lock_until = self.clock.now() + self.hold_duration;

        // A missing seat is reported the same way as a taken one.
        let lock = match self.seats.acquire_lock(tx, seat_id, lock_until).await {
            Ok(lock) => lock,
            Err(LedgerError::NotFound) => return Err(ReservationError::SeatUnavailable),
            Err(err) => return Err(ReservationError::StorageFailure(err)),
        };

        if !lock.acquired {
            debug!(seat_id, status = %lock.seat.status, "Seat not available for hold");
            return Err(ReservationError::SeatUnavailable);
        }

        let pending = NewReservation::pending(user_id, flight_id, seat_id, lock_until);
        let id = self
            .reservations
            .create(tx, &pending)
            .await
            .map_err(ReservationError::StorageFailure)?;

        Ok(pending.into_reservation(id))
    }

    /// Converts a pending hold into a booking.
    pub async fn confirm_payment(&self, reservation_id: ReservationId) -> CoreResult<Reservation> {
        let mut tx = self.begin().await?;
        let outcome = self.confirm_in(&mut tx, reservation_id).await;
        let reservation = self.finish(tx, outcome, "confirm_payment").await?;

        info!(reservation_id, seat_id = reservation.seat_id, "Reservation confirmed");
        Ok(reservation)
    }

    async fn confirm_in(&self, tx: &mut T::Tx, reservation_id: ReservationId) -> CoreResult<Reservation> {
        let reservation = self
            .reservations
            .get_by_id(tx, reservation_id)
            .await
            .map_err(not_found("reservation", reservation_id))?;
        ensure_transition(&reservation, ReservationStatus::Confirmed)?;

        self.seats
            .mark_booked(tx, reservation.seat_id)
            .await
            .map_err(not_found("seat", reservation.seat_id))?;

        // The first read was unlocked; a sweep or another confirm may have
        // finished in between, so check again now that the row is ours.
        let mut locked = self
            .reservations
            .lock_by_id(tx, reservation_id)
            .await
            .map_err(not_found("reservation", reservation_id))?;
        ensure_transition(&locked, ReservationStatus::Confirmed)?;

        self.reservations
            .update_status(tx, reservation_id, ReservationStatus::Confirmed)
            .await
            .map_err(not_found("reservation", reservation_id))?;

        locked.status = ReservationStatus::Confirmed;
        Ok(locked)
    }

    pub async fn get_reservation(&self, reservation_id: ReservationId) -> CoreResult<Reservation> {
        let mut tx = self.begin().await?;
        let outcome = self
            .reservations
            .get_by_id(&mut tx, reservation_id)
            .await
            .map_err(not_found("reservation", reservation_id));
        self.finish(tx, outcome, "get_reservation").await
    }

    /// Reclaims every hold that lapsed at or before `now`.
    ///
    /// Seats and reservations are matched by their own time predicates, not
    /// joined on seat id. Both timestamps come from the same `lock_until` at
    /// reserve time and are checked against the same `now` inside one
    /// transaction, so they agree for every hold this coordinator creates.
    pub async fn expire_sweep_at(&self, now: DateTime<Utc>) -> CoreResult<SweepReport> {
        let mut tx = self.begin().await?;
        let outcome = self.sweep_in(&mut tx, now).await;
        let report = self.finish(tx, outcome, "expire_sweep").await?;

        if report.expired_count() > 0 {
            info!(expired = report.expired_count(), "Expired pending reservations");
        } else {
            debug!("Sweep found nothing to expire");
        }
        Ok(report)
    }

    async fn sweep_in(&self, tx: &mut T::Tx, now: DateTime<Utc>) -> CoreResult<SweepReport> {
        self.seats
            .release_expired(tx, now)
            .await
            .map_err(ReservationError::StorageFailure)?;

        let overdue = self
            .reservations
            .find_expired(tx, now)
            .await
            .map_err(ReservationError::StorageFailure)?;

        let mut report = SweepReport::default();
        for mut reservation in overdue {
            if !reservation.status.can_transition_to(ReservationStatus::Expired) {
                continue;
            }
            self.reservations
                .update_status(tx, reservation.id, ReservationStatus::Expired)
                .await
                .map_err(ReservationError::StorageFailure)?;
            reservation.status = ReservationStatus::Expired;
            report.expired.push(reservation);
        }

        Ok(report)
    }

    async fn begin(&self) -> CoreResult<T::Tx> {
        self.tx_manager.begin().await.map_err(ReservationError::StorageFailure)
    }

    /// Commits on success, rolls back on failure. A failed commit is a storage failure.
    async fn finish<O>(&self, tx: T::Tx, outcome: CoreResult<O>, operation: &'static str) -> CoreResult<O> {
        match outcome {
            Ok(value) => {
                self.tx_manager
                    .commit(tx)
                    .await
                    .map_err(ReservationError::StorageFailure)?;
                Ok(value)
            }
            Err(err) => {
                debug!(operation, error = %err, "Rolling back");
                if let Err(rollback_err) = self.tx_manager.rollback(tx).await {
                    warn!(operation, error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl<T, S, R> ReservationService for ReservationCoordinator<T, S, R>
where
    T: TransactionManager,
    S: SeatLedger<T::Tx>,
    R: ReservationLedger<T::Tx>,
{
    async fn reserve(&self, user_id: UserId, flight_id: FlightId, seat_id: SeatId) -> CoreResult<Reservation> {
        ReservationCoordinator::reserve(self, user_id, flight_id, seat_id).await
    }

    async fn confirm_payment(&self, reservation_id: ReservationId) -> CoreResult<Reservation> {
        ReservationCoordinator::confirm_payment(self, reservation_id).await
    }

    async fn get_reservation(&self, reservation_id: ReservationId) -> CoreResult<Reservation> {
        ReservationCoordinator::get_reservation(self, reservation_id).await
    }

    async fn expire_sweep(&self) -> CoreResult<SweepReport> {
        self.expire_sweep_at(self.clock.now()).await
    }
}

fn not_found(entity: &'static str, id: i64) -> impl FnOnce(LedgerError) -> ReservationError {
    move |err| match err {
        LedgerError::NotFound => ReservationError::NotFound(format!("{entity} {id} not found")),
        other => ReservationError::StorageFailure(other),
    }
}

fn ensure_transition(reservation: &Reservation, next: ReservationStatus) -> CoreResult<()> {
    if reservation.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(ReservationError::InvalidState(format!(
            "reservation {} is {}, cannot become {}",
            reservation.id, reservation.status, next
        )))
    }
}

pub mod clock;
pub mod coordinator;
pub mod memory;
pub mod repository;
pub mod reservation;
pub mod seat;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{ReservationCoordinator, ReservationService, SweepReport, DEFAULT_HOLD_SECONDS};
pub use memory::{MemoryStore, MemoryTransaction};
pub use repository::{LedgerError, LedgerResult, ReservationLedger, SeatLedger, SeatLock, TransactionManager};
pub use reservation::{FlightId, NewReservation, Reservation, ReservationId, ReservationStatus, UserId};
pub use seat::{Seat, SeatId, SeatStatus};

/// Domain outcomes surfaced to callers of the coordinator.
#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Seat is not available")]
    SeatUnavailable,
    #[error("Invalid reservation state: {0}")]
    InvalidState(String),
    // Display stays generic so storage details never reach a caller.
    #[error("Storage failure")]
    StorageFailure(#[source] LedgerError),
}

pub type CoreResult<T> = Result<T, ReservationError>;

/// A persisted status string that does not match any known variant.
#[derive(Debug, thiserror::Error)]
#[error("unknown {entity} status: {value}")]
pub struct UnknownStatus {
    pub entity: &'static str,
    pub value: String,
}

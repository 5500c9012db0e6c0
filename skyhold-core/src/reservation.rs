use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::seat::SeatId;
use crate::UnknownStatus;

pub type ReservationId = i64;
pub type UserId = i64;
pub type FlightId = i64;

/// Reservation lifecycle. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Expired,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Expired => "EXPIRED",
            ReservationStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Pending)
    }

    /// Legal moves are Pending -> {Confirmed, Expired, Cancelled}.
    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        *self == ReservationStatus::Pending && next.is_terminal()
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ReservationStatus::Pending),
            "CONFIRMED" => Ok(ReservationStatus::Confirmed),
            "EXPIRED" => Ok(ReservationStatus::Expired),
            "CANCELLED" => Ok(ReservationStatus::Cancelled),
            other => Err(UnknownStatus {
                entity: "reservation",
                value: other.to_string(),
            }),
        }
    }
}

/// One user's claim on one seat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reservation {
    pub id: ReservationId,
    pub user_id: UserId,
    pub flight_id: FlightId,
    pub seat_id: SeatId,
    pub status: ReservationStatus,
    pub expiry_time: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Still pending with an expiry at or before `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Pending && self.expiry_time.is_some_and(|at| at <= now)
    }
}

/// Input to `ReservationLedger::create`; the ledger assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub user_id: UserId,
    pub flight_id: FlightId,
    pub seat_id: SeatId,
    pub expiry_time: DateTime<Utc>,
}

impl NewReservation {
    pub fn pending(user_id: UserId, flight_id: FlightId, seat_id: SeatId, expiry_time: DateTime<Utc>) -> Self {
        Self {
            user_id,
            flight_id,
            seat_id,
            expiry_time,
        }
    }

    pub fn into_reservation(self, id: ReservationId) -> Reservation {
        Reservation {
            id,
            user_id: self.user_id,
            flight_id: self.flight_id,
            seat_id: self.seat_id,
            status: ReservationStatus::Pending,
            expiry_time: Some(self.expiry_time),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_terminal_states_never_move() {
        use ReservationStatus::*;
        let all = [Pending, Confirmed, Expired, Cancelled];

        for from in all {
            for to in all {
                let allowed = from == Pending && to != Pending;
                assert_eq!(from.can_transition_to(to), allowed, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_status_serializes_upper_case() {
        let json = serde_json::to_string(&ReservationStatus::Confirmed).unwrap();
        assert_eq!(json, "\"CONFIRMED\"");
        assert_eq!("EXPIRED".parse::<ReservationStatus>().unwrap(), ReservationStatus::Expired);
        assert!("pending".parse::<ReservationStatus>().is_err());
    }

    #[test]
    fn test_overdue_only_while_pending() {
        let now = Utc::now();
        let mut reservation = NewReservation::pending(7, 100, 1, now - Duration::seconds(1)).into_reservation(1);
        assert!(reservation.is_overdue(now));

        reservation.status = ReservationStatus::Confirmed;
        assert!(!reservation.is_overdue(now));
    }
}

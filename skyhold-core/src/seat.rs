use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::reservation::FlightId;
use crate::UnknownStatus;

pub type SeatId = i64;

/// Availability of a seat. Persisted as upper-case text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    Unavailable,
    Available,
    Locked,
    Booked,
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Unavailable => "UNAVAILABLE",
            SeatStatus::Available => "AVAILABLE",
            SeatStatus::Locked => "LOCKED",
            SeatStatus::Booked => "BOOKED",
        }
    }
}

impl fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeatStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNAVAILABLE" => Ok(SeatStatus::Unavailable),
            "AVAILABLE" => Ok(SeatStatus::Available),
            "LOCKED" => Ok(SeatStatus::Locked),
            "BOOKED" => Ok(SeatStatus::Booked),
            other => Err(UnknownStatus {
                entity: "seat",
                value: other.to_string(),
            }),
        }
    }
}

/// One bookable position on one flight.
///
/// `locked_until` is present exactly while the seat is `Locked`; the
/// transition helpers below are the only way this crate changes a seat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Seat {
    pub id: SeatId,
    pub flight_id: FlightId,
    pub seat_number: String,
    pub status: SeatStatus,
    pub locked_until: Option<DateTime<Utc>>,
}

impl Seat {
    pub fn available(id: SeatId, flight_id: FlightId, seat_number: impl Into<String>) -> Self {
        Self {
            id,
            flight_id,
            seat_number: seat_number.into(),
            status: SeatStatus::Available,
            locked_until: None,
        }
    }

    pub fn unavailable(id: SeatId, flight_id: FlightId, seat_number: impl Into<String>) -> Self {
        Self {
            status: SeatStatus::Unavailable,
            ..Self::available(id, flight_id, seat_number)
        }
    }

    /// True when the hold on this seat has lapsed at `now`.
    pub fn hold_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == SeatStatus::Locked && self.locked_until.is_some_and(|until| until <= now)
    }

    pub fn lock_invariant_holds(&self) -> bool {
        (self.status == SeatStatus::Locked) == self.locked_until.is_some()
    }

    pub fn lock(&mut self, until: DateTime<Utc>) {
        self.status = SeatStatus::Locked;
        self.locked_until = Some(until);
    }

    pub fn release(&mut self) {
        self.status = SeatStatus::Available;
        self.locked_until = None;
    }

    pub fn book(&mut self) {
        self.status = SeatStatus::Booked;
        self.locked_until = None;
    }
}

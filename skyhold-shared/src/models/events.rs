use serde::{Deserialize, Serialize};

/// What happened to a hold.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HoldEventKind {
    SeatHeld,
    SeatBooked,
    HoldExpired,
}

impl HoldEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HoldEventKind::SeatHeld => "seat_held",
            HoldEventKind::SeatBooked => "seat_booked",
            HoldEventKind::HoldExpired => "hold_expired",
        }
    }
}

/// Emitted after a reservation transaction commits. Never emitted for rolled back work.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HoldEvent {
    pub kind: HoldEventKind,
    pub reservation_id: i64,
    pub flight_id: i64,
    pub seat_id: i64,
    pub occurred_at: i64,
}

impl HoldEvent {
    pub fn new(kind: HoldEventKind, reservation_id: i64, flight_id: i64, seat_id: i64, occurred_at: i64) -> Self {
        Self {
            kind,
            reservation_id,
            flight_id,
            seat_id,
            occurred_at,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

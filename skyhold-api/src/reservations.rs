use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use skyhold_core::{FlightId, Reservation, ReservationId, SeatId, SweepReport, UserId};
use skyhold_shared::{HoldEvent, HoldEventKind};
use tracing::debug;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    pub user_id: UserId,
    pub flight_id: FlightId,
    pub seat_id: SeatId,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub reservation_id: ReservationId,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ExpireResponse {
    status: &'static str,
    expired_reservations: usize,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/reservations", post(reserve_seat))
        .route("/v1/reservations/confirm", post(confirm_by_body))
        .route("/v1/reservations/{id}", get(get_reservation))
        .route("/v1/reservations/{id}/confirm", post(confirm_by_path))
        .route("/v1/admin/expire", post(expire_holds))
}

async fn reserve_seat(
    State(state): State<AppState>,
    payload: Result<Json<ReserveRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Reservation>), AppError> {
    let Json(req) = payload.map_err(|rejection| AppError::ValidationError(rejection.body_text()))?;

    let reservation = state
        .reservations
        .reserve(req.user_id, req.flight_id, req.seat_id)
        .await?;

    publish(&state, HoldEventKind::SeatHeld, &reservation);
    Ok((StatusCode::CREATED, Json(reservation)))
}

async fn get_reservation(
    State(state): State<AppState>,
    id: Result<Path<ReservationId>, PathRejection>,
) -> Result<Json<Reservation>, AppError> {
    let Path(id) = id.map_err(|rejection| AppError::ValidationError(rejection.body_text()))?;
    let reservation = state.reservations.get_reservation(id).await?;
    Ok(Json(reservation))
}

async fn confirm_by_path(
    State(state): State<AppState>,
    id: Result<Path<ReservationId>, PathRejection>,
) -> Result<Json<StatusResponse>, AppError> {
    let Path(id) = id.map_err(|rejection| AppError::ValidationError(rejection.body_text()))?;
    confirm(&state, id).await
}

async fn confirm_by_body(
    State(state): State<AppState>,
    payload: Result<Json<ConfirmRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, AppError> {
    let Json(req) = payload.map_err(|rejection| AppError::ValidationError(rejection.body_text()))?;
    confirm(&state, req.reservation_id).await
}

async fn confirm(state: &AppState, id: ReservationId) -> Result<Json<StatusResponse>, AppError> {
    let reservation = state.reservations.confirm_payment(id).await?;
    publish(state, HoldEventKind::SeatBooked, &reservation);
    Ok(Json(StatusResponse { status: "ok" }))
}

async fn expire_holds(State(state): State<AppState>) -> Result<Json<ExpireResponse>, AppError> {
    let report = state.reservations.expire_sweep().await?;
    publish_expired(&state, &report);

    Ok(Json(ExpireResponse {
        status: "expired",
        expired_reservations: report.expired_count(),
    }))
}

/// Sends one `HoldExpired` per reservation the sweep moved to EXPIRED.
pub fn publish_expired(state: &AppState, report: &SweepReport) {
    for reservation in &report.expired {
        publish(state, HoldEventKind::HoldExpired, reservation);
    }
}

fn publish(state: &AppState, kind: HoldEventKind, reservation: &Reservation) {
    let event = HoldEvent::new(
        kind,
        reservation.id,
        reservation.flight_id,
        reservation.seat_id,
        Utc::now().timestamp(),
    );
    // No subscribers is fine.
    if state.events_tx.send(event).is_err() {
        debug!(reservation_id = reservation.id, kind = kind.as_str(), "No hold stream subscribers");
    }
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::query::{BookingFilter, BookingSortField, Ordering, Page, PageRequest, Params};
use uuid::Uuid;

use super::{AppState, CurrentUser};
use crate::error::{AppError, AppResult};
use crate::lifecycle::{BookingRequest, Transition};
use crate::models::*;
use crate::payments::{InitiatedPayment, VerifiedPayment};
use crate::repository::bookings::{self, BookingScope};

async fn search(state: &AppState, scope: BookingScope, params: &Params) -> AppResult<Page<Booking>> {
    let filter = BookingFilter::from_params(params);
    let ordering = Ordering::from_params(params, BookingSortField::newest_first());
    let page = PageRequest::from_params(params);

    let mut conn = state.pool.get().await?;
    bookings::search(&mut conn, scope, &filter, ordering, page).await
}

pub async fn list(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(params): Query<Params>,
) -> AppResult<Json<Page<Booking>>> {
    Ok(Json(search(&state, BookingScope::VisibleTo(actor), &params).await?))
}

pub async fn mine(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(params): Query<Params>,
) -> AppResult<Json<Page<Booking>>> {
    Ok(Json(search(&state, BookingScope::MadeBy(actor), &params).await?))
}

pub async fn for_my_listings(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(params): Query<Params>,
) -> AppResult<Json<Page<Booking>>> {
    Ok(Json(search(&state, BookingScope::ForListingsOf(actor), &params).await?))
}

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(request): Json<BookingRequest>,
) -> AppResult<(StatusCode, Json<Booking>)> {
    let booking = state.bookings.create(actor, request).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn retrieve(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Booking>> {
    let mut conn = state.pool.get().await?;
    let (booking, listing) = bookings::find_with_listing(&mut conn, id).await?;
    if !booking.parties(&listing).involves(actor) {
        return Err(AppError::not_found("Booking"));
    }
    Ok(Json(booking))
}

pub async fn update(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(changes): Json<BookingChanges>,
) -> AppResult<Json<Booking>> {
    Ok(Json(state.bookings.update(actor, id, changes).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.bookings.delete(actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn confirm(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Booking>> {
    Ok(Json(state.bookings.transition(actor, id, Transition::Confirm).await?))
}

pub async fn cancel(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Booking>> {
    Ok(Json(state.bookings.transition(actor, id, Transition::Cancel).await?))
}

pub async fn complete(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Booking>> {
    Ok(Json(state.bookings.transition(actor, id, Transition::Complete).await?))
}

pub async fn initiate_payment(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<InitiatedPayment>> {
    Ok(Json(state.payments.initiate(actor, id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyQuery {
    pub transaction_id: Option<String>,
}

pub async fn verify_payment(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Query(query): Query<VerifyQuery>,
) -> AppResult<Json<VerifiedPayment>> {
    Ok(Json(
        state
            .payments
            .verify(actor, id, query.transaction_id)
            .await?,
    ))
}

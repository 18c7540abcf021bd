use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use garde::Validate;
use serde::Deserialize;
use shared::booking::ensure_reviewable;
use shared::query::{Ordering, Page, PageRequest, Params, ReviewFilter, ReviewSortField};
use shared::DomainError;
use tracing::info;
use uuid::Uuid;

use super::{AppState, CurrentUser};
use crate::error::AppResult;
use crate::models::*;
use crate::repository::{bookings, reviews};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReviewRequest {
    #[garde(skip)]
    pub booking_id: Uuid,
    #[serde(default)]
    #[garde(length(max = 200))]
    pub title: String,
    #[serde(default)]
    #[garde(skip)]
    pub comment: String,
    #[garde(range(min = 1, max = 5))]
    pub rating: i32,
}

fn authorize_author(review: &Review, actor: Uuid) -> Result<(), DomainError> {
    if review.guest_id != actor {
        return Err(DomainError::PermissionDenied(
            "Only the author can modify this review",
        ));
    }
    Ok(())
}

async fn search(
    state: &AppState,
    author: Option<Uuid>,
    params: &Params,
) -> AppResult<Page<Review>> {
    let filter = ReviewFilter::from_params(params);
    let ordering = Ordering::from_params(params, ReviewSortField::newest_first());
    let page = PageRequest::from_params(params);

    let mut conn = state.pool.get().await?;
    reviews::search(&mut conn, &filter, author, ordering, page).await
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> AppResult<Json<Page<Review>>> {
    Ok(Json(search(&state, None, &params).await?))
}

pub async fn mine(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(params): Query<Params>,
) -> AppResult<Json<Page<Review>>> {
    Ok(Json(search(&state, Some(actor), &params).await?))
}

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(request): Json<CreateReviewRequest>,
) -> AppResult<(StatusCode, Json<Review>)> {
    request.validate(&())?;

    let mut conn = state.pool.get().await?;
    let booking = bookings::find(&mut conn, request.booking_id).await?;
    if booking.guest_id != actor {
        return Err(DomainError::PermissionDenied("Only the guest can review this booking").into());
    }
    ensure_reviewable(booking.status()?)?;

    let review = reviews::insert(
        &mut conn,
        &NewReview {
            id: Uuid::new_v4(),
            listing_id: booking.listing_id,
            booking_id: booking.id,
            guest_id: actor,
            title: request.title,
            comment: request.comment,
            rating: request.rating,
        },
    )
    .await?;

    info!(review_id = %review.id, booking_id = %booking.id, "Review created");
    Ok((StatusCode::CREATED, Json(review)))
}

pub async fn retrieve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Review>> {
    let mut conn = state.pool.get().await?;
    Ok(Json(reviews::find(&mut conn, id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(changes): Json<ReviewChanges>,
) -> AppResult<Json<Review>> {
    changes.validate(&())?;

    let mut conn = state.pool.get().await?;
    let review = reviews::find(&mut conn, id).await?;
    authorize_author(&review, actor)?;
    if changes.title.is_none() && changes.comment.is_none() && changes.rating.is_none() {
        return Ok(Json(review));
    }

    Ok(Json(reviews::update(&mut conn, id, &changes).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.pool.get().await?;
    let review = reviews::find(&mut conn, id).await?;
    authorize_author(&review, actor)?;
    reviews::delete(&mut conn, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

use chrono::NaiveDate;
use diesel_async::{AsyncConnection, AsyncPgConnection};
use garde::Validate;
use serde::Deserialize;
use shared::booking::{total_price, validate_guest_count};
use shared::{
    is_available, BookingStatus, DateRange, DomainError, DomainResult, ListingWindow,
    NotificationCommand, Parties,
};
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::outbox;
use crate::repository::{bookings, listings};
use crate::DbPool;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BookingRequest {
    #[garde(skip)]
    pub listing_id: Uuid,
    #[garde(skip)]
    pub check_in: NaiveDate,
    #[garde(skip)]
    pub check_out: NaiveDate,
    #[garde(range(min = 1))]
    pub number_of_guests: i32,
    #[serde(default)]
    #[garde(length(max = 2000))]
    pub special_requests: Option<String>,
}

/// A request priced against its listing, waiting to be admitted.
#[derive(Debug, Clone)]
pub struct BookingPlan {
    pub booking: NewBooking,
    pub stay: DateRange,
    pub window: ListingWindow,
}

impl BookingPlan {
    pub fn prepare(guest_id: Uuid, request: BookingRequest, listing: &Listing) -> DomainResult<Self> {
        let stay = DateRange::new(request.check_in, request.check_out)?;
        validate_guest_count(request.number_of_guests, listing.max_guests)?;

        Ok(Self {
            booking: NewBooking {
                id: Uuid::new_v4(),
                listing_id: listing.id,
                guest_id,
                check_in: stay.check_in,
                check_out: stay.check_out,
                number_of_guests: request.number_of_guests,
                total_price: total_price(&listing.price_per_night, &stay),
                status: BookingStatus::Pending.to_string(),
                special_requests: request.special_requests,
            },
            stay,
            window: listing.window(),
        })
    }

    /// `booked` holds the pending and confirmed stays overlapping this one.
    pub fn admit(&self, booked: &[DateRange]) -> DomainResult<()> {
        if !is_available(&self.window, booked, &self.stay) {
            return Err(DomainError::Unavailable);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Confirm,
    Cancel,
    Complete,
}

impl Transition {
    /// Checks that `actor` may perform the transition and returns the new status.
    pub fn apply(
        self,
        parties: &Parties,
        actor: Uuid,
        current: BookingStatus,
    ) -> Result<BookingStatus, DomainError> {
        match self {
            Transition::Confirm => {
                parties.authorize_confirm(actor)?;
                current.confirm()
            }
            Transition::Cancel => {
                parties.authorize_cancel(actor)?;
                current.cancel()
            }
            Transition::Complete => {
                parties.authorize_complete(actor)?;
                current.complete()
            }
        }
    }
}

/// Owns every write to a booking's status.
#[derive(Clone)]
pub struct BookingManager {
    pool: DbPool,
}

impl BookingManager {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, guest_id: Uuid, request: BookingRequest) -> AppResult<Booking> {
        request.validate(&())?;
        DateRange::new(request.check_in, request.check_out)?;
        let mut conn = self.pool.get().await?;

        let listing = listings::find(&mut conn, request.listing_id).await?;
        let plan = BookingPlan::prepare(guest_id, request, &listing)?;
        let nights = plan.stay.nights();

        // The overlap read and the insert must see the same snapshot, otherwise
        // two overlapping requests could both pass the check.
        let booking = conn
            .build_transaction()
            .serializable()
            .run::<_, AppError, _>(|conn| {
                Box::pin(async move {
                    let booked =
                        bookings::active_overlapping(conn, plan.booking.listing_id, &plan.stay)
                            .await?;
                    plan.admit(&booked)?;
                    let booking = bookings::insert(conn, &plan.booking).await?;
                    outbox::schedule(conn, NotificationCommand::booking_confirmation(booking.id))
                        .await;
                    Ok(booking)
                })
            })
            .await?;

        info!(
            booking_id = %booking.id,
            listing_id = %booking.listing_id,
            nights,
            "Booking created"
        );
        Ok(booking)
    }

    pub async fn transition(
        &self,
        actor: Uuid,
        booking_id: Uuid,
        transition: Transition,
    ) -> AppResult<Booking> {
        let mut conn = self.pool.get().await?;

        let booking = conn
            .transaction::<_, AppError, _>(|conn| {
                Box::pin(async move {
                    let booking = bookings::find_for_update(conn, booking_id).await?;
                    let listing = listings::find(conn, booking.listing_id).await?;
                    let next = transition.apply(&booking.parties(&listing), actor, booking.status()?)?;
                    bookings::set_status(conn, booking.id, next).await
                })
            })
            .await?;

        info!(booking_id = %booking.id, status = %booking.status, ?transition, "Booking transitioned");
        Ok(booking)
    }

    /// Guest-only edit of guest count and special requests.
    pub async fn update(
        &self,
        actor: Uuid,
        booking_id: Uuid,
        changes: BookingChanges,
    ) -> AppResult<Booking> {
        changes.validate(&())?;
        let mut conn = self.pool.get().await?;

        let (booking, listing) = bookings::find_with_listing(&mut conn, booking_id).await?;
        booking.parties(&listing).authorize_guest(actor)?;
        if let Some(number_of_guests) = changes.number_of_guests {
            validate_guest_count(number_of_guests, listing.max_guests)?;
        }
        if changes.number_of_guests.is_none() && changes.special_requests.is_none() {
            return Ok(booking);
        }

        bookings::update(&mut conn, booking.id, &changes).await
    }

    pub async fn delete(&self, actor: Uuid, booking_id: Uuid) -> AppResult<()> {
        let mut conn = self.pool.get().await?;

        let (booking, listing) = bookings::find_with_listing(&mut conn, booking_id).await?;
        booking.parties(&listing).authorize_guest(actor)?;
        bookings::delete(&mut conn, booking.id).await?;

        info!(booking_id = %booking.id, "Booking deleted");
        Ok(())
    }
}

/// Applies a completed payment to its booking inside the caller's transaction.
/// Terminal bookings are left untouched.
pub async fn confirm_from_payment(
    conn: &mut AsyncPgConnection,
    booking_id: Uuid,
) -> AppResult<Booking> {
    let booking = bookings::find_for_update(conn, booking_id).await?;
    let current = booking.status()?;

    match current.confirm_by_payment() {
        Some(next) if next != current => bookings::set_status(conn, booking.id, next).await,
        Some(_) => Ok(booking),
        None => {
            info!(booking_id = %booking.id, status = %current, "Payment completed on a closed booking");
            Ok(booking)
        }
    }
}

/// The payment confirmation owed once a payment has been applied; only a
/// booking that ended up confirmed gets one.
pub fn payment_confirmation(booking: &Booking) -> AppResult<Option<NotificationCommand>> {
    Ok((booking.status()? == BookingStatus::Confirmed)
        .then(|| NotificationCommand::payment_confirmation(booking.id)))
}

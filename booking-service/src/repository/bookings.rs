use diesel::pg::Pg;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use shared::query::{BookingFilter, BookingSortField, Ordering, Page, PageRequest, SortDirection};
use shared::{BookingStatus, DateRange};
use uuid::Uuid;

use super::listings::active_statuses;
use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::schema::*;

type BoxedBookings = bookings::BoxedQuery<'static, Pg>;

/// Which bookings a user may list.
#[derive(Debug, Clone, Copy)]
pub enum BookingScope {
    /// Bookings the user made or that are for listings they own.
    VisibleTo(Uuid),
    MadeBy(Uuid),
    ForListingsOf(Uuid),
}

pub async fn find(conn: &mut AsyncPgConnection, id: Uuid) -> AppResult<Booking> {
    bookings::table
        .find(id)
        .select(Booking::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| AppError::not_found("Booking"))
}

/// Row-locks the booking for the rest of the surrounding transaction.
pub async fn find_for_update(conn: &mut AsyncPgConnection, id: Uuid) -> AppResult<Booking> {
    bookings::table
        .find(id)
        .select(Booking::as_select())
        .for_update()
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| AppError::not_found("Booking"))
}

pub async fn find_with_listing(
    conn: &mut AsyncPgConnection,
    id: Uuid,
) -> AppResult<(Booking, Listing)> {
    bookings::table
        .inner_join(listings::table)
        .filter(bookings::id.eq(id))
        .select((Booking::as_select(), Listing::as_select()))
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| AppError::not_found("Booking"))
}

/// Stays of pending or confirmed bookings on `listing_id` that overlap `stay`.
pub async fn active_overlapping(
    conn: &mut AsyncPgConnection,
    listing_id: Uuid,
    stay: &DateRange,
) -> AppResult<Vec<DateRange>> {
    let rows = bookings::table
        .filter(bookings::listing_id.eq(listing_id))
        .filter(bookings::status.eq_any(active_statuses()))
        .filter(bookings::check_in.lt(stay.check_out))
        .filter(bookings::check_out.gt(stay.check_in))
        .select((bookings::check_in, bookings::check_out))
        .load::<(chrono::NaiveDate, chrono::NaiveDate)>(conn)
        .await?;
    Ok(rows
        .into_iter()
        .map(|(check_in, check_out)| DateRange { check_in, check_out })
        .collect())
}

pub async fn insert(conn: &mut AsyncPgConnection, booking: &NewBooking) -> AppResult<Booking> {
    Ok(diesel::insert_into(bookings::table)
        .values(booking)
        .returning(Booking::as_returning())
        .get_result(conn)
        .await?)
}

pub async fn set_status(
    conn: &mut AsyncPgConnection,
    id: Uuid,
    status: BookingStatus,
) -> AppResult<Booking> {
    Ok(diesel::update(bookings::table.find(id))
        .set((
            bookings::status.eq(status.as_str()),
            bookings::updated_at.eq(diesel::dsl::now),
        ))
        .returning(Booking::as_returning())
        .get_result(conn)
        .await?)
}

pub async fn update(
    conn: &mut AsyncPgConnection,
    id: Uuid,
    changes: &BookingChanges,
) -> AppResult<Booking> {
    Ok(diesel::update(bookings::table.find(id))
        .set((changes, bookings::updated_at.eq(diesel::dsl::now)))
        .returning(Booking::as_returning())
        .get_result(conn)
        .await?)
}

pub async fn delete(conn: &mut AsyncPgConnection, id: Uuid) -> AppResult<()> {
    diesel::delete(bookings::table.find(id)).execute(conn).await?;
    Ok(())
}

fn scoped(scope: BookingScope) -> BoxedBookings {
    let owned_listings = |owner: Uuid| {
        listings::table
            .filter(listings::owner_id.eq(owner))
            .select(listings::id)
    };
    let query = bookings::table.into_boxed();
    match scope {
        BookingScope::VisibleTo(user) => query.filter(
            bookings::guest_id
                .eq(user)
                .or(bookings::listing_id.eq_any(owned_listings(user))),
        ),
        BookingScope::MadeBy(user) => query.filter(bookings::guest_id.eq(user)),
        BookingScope::ForListingsOf(owner) => {
            query.filter(bookings::listing_id.eq_any(owned_listings(owner)))
        }
    }
}

fn filtered(scope: BookingScope, filter: &BookingFilter) -> BoxedBookings {
    let mut query = scoped(scope);

    if let Some(status) = filter.status {
        query = query.filter(bookings::status.eq(status.as_str()));
    }
    if let Some(guest_id) = filter.guest_id {
        query = query.filter(bookings::guest_id.eq(guest_id));
    }
    if let Some(listing_id) = filter.listing_id {
        query = query.filter(bookings::listing_id.eq(listing_id));
    }
    if let Some(from) = filter.check_in_from {
        query = query.filter(bookings::check_in.ge(from));
    }
    if let Some(to) = filter.check_in_to {
        query = query.filter(bookings::check_in.le(to));
    }

    query
}

fn ordered(query: BoxedBookings, ordering: Ordering<BookingSortField>) -> BoxedBookings {
    use SortDirection::*;
    let query = match (ordering.field, ordering.direction) {
        (BookingSortField::CheckIn, Asc) => query.order(bookings::check_in.asc()),
        (BookingSortField::CheckIn, Desc) => query.order(bookings::check_in.desc()),
        (BookingSortField::CheckOut, Asc) => query.order(bookings::check_out.asc()),
        (BookingSortField::CheckOut, Desc) => query.order(bookings::check_out.desc()),
        (BookingSortField::CreatedAt, Asc) => query.order(bookings::created_at.asc()),
        (BookingSortField::CreatedAt, Desc) => query.order(bookings::created_at.desc()),
    };
    query.then_order_by(bookings::id.asc())
}

pub async fn search(
    conn: &mut AsyncPgConnection,
    scope: BookingScope,
    filter: &BookingFilter,
    ordering: Ordering<BookingSortField>,
    page: PageRequest,
) -> AppResult<Page<Booking>> {
    let count = filtered(scope, filter)
        .count()
        .get_result::<i64>(conn)
        .await?;
    let rows = ordered(filtered(scope, filter), ordering)
        .limit(page.page_size)
        .offset(page.offset())
        .load::<Booking>(conn)
        .await?;
    Ok(Page::new(rows, count, page))
}

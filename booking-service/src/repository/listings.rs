use diesel::dsl::{avg, count_star, not};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use num_traits::ToPrimitive;
use shared::query::{ListingFilter, ListingSortField, Ordering, Page, PageRequest, SortDirection};
use shared::{BookingStatus, DateRange};
use uuid::Uuid;

use super::contains_pattern;
use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::schema::*;

type BoxedListings = listings::BoxedQuery<'static, Pg>;

pub async fn find(conn: &mut AsyncPgConnection, id: Uuid) -> AppResult<Listing> {
    listings::table
        .find(id)
        .select(Listing::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| AppError::not_found("Listing"))
}

pub async fn insert(conn: &mut AsyncPgConnection, listing: &NewListing) -> AppResult<Listing> {
    Ok(diesel::insert_into(listings::table)
        .values(listing)
        .returning(Listing::as_returning())
        .get_result(conn)
        .await?)
}

pub async fn update(
    conn: &mut AsyncPgConnection,
    id: Uuid,
    changes: &ListingChanges,
) -> AppResult<Listing> {
    Ok(diesel::update(listings::table.find(id))
        .set((changes, listings::updated_at.eq(diesel::dsl::now)))
        .returning(Listing::as_returning())
        .get_result(conn)
        .await?)
}

/// Listings are taken off the market rather than removed.
pub async fn deactivate(conn: &mut AsyncPgConnection, id: Uuid) -> AppResult<()> {
    diesel::update(listings::table.find(id))
        .set((
            listings::is_active.eq(false),
            listings::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

fn filtered(filter: &ListingFilter) -> BoxedListings {
    let mut query = listings::table.into_boxed();

    if let Some(city) = &filter.city {
        query = query.filter(listings::city.ilike(contains_pattern(city)));
    }
    if let Some(country) = &filter.country {
        query = query.filter(listings::country.ilike(contains_pattern(country)));
    }
    if let Some(property_type) = filter.property_type {
        query = query.filter(listings::property_type.eq(property_type.as_str()));
    }
    if let Some(min_price) = &filter.min_price {
        query = query.filter(listings::price_per_night.ge(min_price.clone()));
    }
    if let Some(max_price) = &filter.max_price {
        query = query.filter(listings::price_per_night.le(max_price.clone()));
    }
    if let Some(min_bedrooms) = filter.min_bedrooms {
        query = query.filter(listings::bedrooms.ge(min_bedrooms));
    }
    if let Some(min_guests) = filter.min_guests {
        query = query.filter(listings::max_guests.ge(min_guests));
    }
    if let Some(is_active) = filter.is_active {
        query = query.filter(listings::is_active.eq(is_active));
    }
    if let Some(search) = &filter.search {
        let pattern = contains_pattern(search);
        query = query.filter(
            listings::title
                .ilike(pattern.clone())
                .or(listings::description.ilike(pattern.clone()))
                .or(listings::city.ilike(pattern.clone()))
                .or(listings::country.ilike(pattern.clone()))
                .or(listings::location.ilike(pattern)),
        );
    }
    if let Some(stay) = filter.stay {
        query = covering(query, &stay);
    }

    query
}

fn covering(query: BoxedListings, stay: &DateRange) -> BoxedListings {
    query
        .filter(listings::is_active.eq(true))
        .filter(listings::available_from.le(stay.check_in))
        .filter(listings::available_to.ge(stay.check_out))
}

fn ordered(query: BoxedListings, ordering: Ordering<ListingSortField>) -> BoxedListings {
    use SortDirection::*;
    let query = match (ordering.field, ordering.direction) {
        (ListingSortField::PricePerNight, Asc) => query.order(listings::price_per_night.asc()),
        (ListingSortField::PricePerNight, Desc) => query.order(listings::price_per_night.desc()),
        (ListingSortField::Rating, Asc) => query.order(listings::rating.asc()),
        (ListingSortField::Rating, Desc) => query.order(listings::rating.desc()),
        (ListingSortField::CreatedAt, Asc) => query.order(listings::created_at.asc()),
        (ListingSortField::CreatedAt, Desc) => query.order(listings::created_at.desc()),
    };
    query.then_order_by(listings::id.asc())
}

async fn paginate(
    conn: &mut AsyncPgConnection,
    build: impl Fn() -> BoxedListings,
    ordering: Ordering<ListingSortField>,
    page: PageRequest,
) -> AppResult<Page<Listing>> {
    let count = build().count().get_result::<i64>(conn).await?;
    let rows = ordered(build(), ordering)
        .limit(page.page_size)
        .offset(page.offset())
        .load::<Listing>(conn)
        .await?;
    Ok(Page::new(rows, count, page))
}

pub async fn search(
    conn: &mut AsyncPgConnection,
    filter: &ListingFilter,
    ordering: Ordering<ListingSortField>,
    page: PageRequest,
) -> AppResult<Page<Listing>> {
    paginate(conn, || filtered(filter), ordering, page).await
}

pub async fn owned_by(
    conn: &mut AsyncPgConnection,
    owner_id: Uuid,
    page: PageRequest,
) -> AppResult<Page<Listing>> {
    paginate(
        conn,
        || listings::table.filter(listings::owner_id.eq(owner_id)).into_boxed(),
        ListingSortField::newest_first(),
        page,
    )
    .await
}

/// Active listings whose window covers `stay`, minus every listing holding a
/// pending or confirmed booking that overlaps it.
pub async fn available(
    conn: &mut AsyncPgConnection,
    stay: DateRange,
    page: PageRequest,
) -> AppResult<Page<Listing>> {
    let build = || {
        let conflicting = bookings::table
            .filter(bookings::status.eq_any(active_statuses()))
            .filter(bookings::check_in.lt(stay.check_out))
            .filter(bookings::check_out.gt(stay.check_in))
            .select(bookings::listing_id);
        covering(listings::table.into_boxed(), &stay)
            .filter(not(listings::id.eq_any(conflicting)))
    };
    paginate(conn, build, ListingSortField::newest_first(), page).await
}

pub(crate) fn active_statuses() -> Vec<&'static str> {
    BookingStatus::ACTIVE.iter().map(|s| s.as_str()).collect()
}

/// Review average and confirmed-booking count shown on the detail view.
pub struct ListingStats {
    pub average_rating: f64,
    pub review_count: i64,
    pub booking_count: i64,
}

pub async fn stats(conn: &mut AsyncPgConnection, id: Uuid) -> AppResult<ListingStats> {
    let (average, review_count) = reviews::table
        .filter(reviews::listing_id.eq(id))
        .select((avg(reviews::rating), count_star()))
        .first::<(Option<bigdecimal::BigDecimal>, i64)>(conn)
        .await?;
    let booking_count = bookings::table
        .filter(bookings::listing_id.eq(id))
        .filter(bookings::status.eq(BookingStatus::Confirmed.as_str()))
        .count()
        .get_result::<i64>(conn)
        .await?;

    Ok(ListingStats {
        average_rating: average.and_then(|a| a.to_f64()).unwrap_or(0.0),
        review_count,
        booking_count,
    })
}

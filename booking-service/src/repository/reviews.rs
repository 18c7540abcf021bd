use diesel::pg::Pg;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use shared::query::{Ordering, Page, PageRequest, ReviewFilter, ReviewSortField, SortDirection};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::schema::*;

type BoxedReviews = reviews::BoxedQuery<'static, Pg>;

pub async fn find(conn: &mut AsyncPgConnection, id: Uuid) -> AppResult<Review> {
    reviews::table
        .find(id)
        .select(Review::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| AppError::not_found("Review"))
}

pub async fn insert(conn: &mut AsyncPgConnection, review: &NewReview) -> AppResult<Review> {
    Ok(diesel::insert_into(reviews::table)
        .values(review)
        .returning(Review::as_returning())
        .get_result(conn)
        .await?)
}

pub async fn update(
    conn: &mut AsyncPgConnection,
    id: Uuid,
    changes: &ReviewChanges,
) -> AppResult<Review> {
    Ok(diesel::update(reviews::table.find(id))
        .set((changes, reviews::updated_at.eq(diesel::dsl::now)))
        .returning(Review::as_returning())
        .get_result(conn)
        .await?)
}

pub async fn delete(conn: &mut AsyncPgConnection, id: Uuid) -> AppResult<()> {
    diesel::delete(reviews::table.find(id)).execute(conn).await?;
    Ok(())
}

fn filtered(filter: &ReviewFilter, author: Option<Uuid>) -> BoxedReviews {
    let mut query = reviews::table.into_boxed();
    if let Some(listing_id) = filter.listing_id {
        query = query.filter(reviews::listing_id.eq(listing_id));
    }
    if let Some(booking_id) = filter.booking_id {
        query = query.filter(reviews::booking_id.eq(booking_id));
    }
    if let Some(guest_id) = author {
        query = query.filter(reviews::guest_id.eq(guest_id));
    }
    query
}

fn ordered(query: BoxedReviews, ordering: Ordering<ReviewSortField>) -> BoxedReviews {
    use SortDirection::*;
    let query = match (ordering.field, ordering.direction) {
        (ReviewSortField::Rating, Asc) => query.order(reviews::rating.asc()),
        (ReviewSortField::Rating, Desc) => query.order(reviews::rating.desc()),
        (ReviewSortField::CreatedAt, Asc) => query.order(reviews::created_at.asc()),
        (ReviewSortField::CreatedAt, Desc) => query.order(reviews::created_at.desc()),
    };
    query.then_order_by(reviews::id.asc())
}

/// `author` narrows the result to one guest's reviews.
pub async fn search(
    conn: &mut AsyncPgConnection,
    filter: &ReviewFilter,
    author: Option<Uuid>,
    ordering: Ordering<ReviewSortField>,
    page: PageRequest,
) -> AppResult<Page<Review>> {
    let count = filtered(filter, author)
        .count()
        .get_result::<i64>(conn)
        .await?;
    let rows = ordered(filtered(filter, author), ordering)
        .limit(page.page_size)
        .offset(page.offset())
        .load::<Review>(conn)
        .await?;
    Ok(Page::new(rows, count, page))
}

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::dispatcher::{BookingContext, BookingDirectory};
use crate::models::BookingRow;
use crate::schema::*;
use crate::DbPool;

/// Reads bookings straight from the marketplace database.
pub struct PgBookingDirectory {
    pool: DbPool,
}

impl PgBookingDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingDirectory for PgBookingDirectory {
    async fn load(&self, booking_id: Uuid) -> anyhow::Result<Option<BookingContext>> {
        let mut conn = self.pool.get().await?;

        let row = bookings::table
            .inner_join(listings::table)
            .inner_join(users::table)
            .filter(bookings::id.eq(booking_id))
            .select((
                bookings::id,
                bookings::listing_id,
                bookings::check_in,
                bookings::check_out,
                bookings::number_of_guests,
                bookings::total_price,
                listings::title,
                users::email,
                users::first_name,
                users::username,
            ))
            .first::<BookingRow>(&mut conn)
            .await
            .optional()?;

        Ok(row.map(BookingContext::from))
    }
}

use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde_json::Value;
use shared::PaymentStatus;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::*;
use crate::schema::*;

pub async fn insert(conn: &mut AsyncPgConnection, payment: &NewPayment) -> AppResult<Payment> {
    Ok(diesel::insert_into(payments::table)
        .values(payment)
        .returning(Payment::as_returning())
        .get_result(conn)
        .await?)
}

/// Most recent payment attempt for a booking; later attempts supersede earlier ones.
pub async fn latest_for_booking(
    conn: &mut AsyncPgConnection,
    booking_id: Uuid,
) -> AppResult<Option<Payment>> {
    Ok(payments::table
        .filter(payments::booking_id.eq(booking_id))
        .order((payments::created_at.desc(), payments::id.desc()))
        .select(Payment::as_select())
        .first(conn)
        .await
        .optional()?)
}

/// Stores what the gateway said about an initialization attempt.
pub async fn record_initialization(
    conn: &mut AsyncPgConnection,
    id: Uuid,
    transaction_id: Option<&str>,
    response: &Value,
) -> AppResult<()> {
    diesel::update(payments::table.find(id))
        .set((
            payments::transaction_id.eq(transaction_id),
            payments::gateway_response.eq(Some(response)),
            payments::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn record_outcome(
    conn: &mut AsyncPgConnection,
    id: Uuid,
    status: PaymentStatus,
    response: &Value,
) -> AppResult<Payment> {
    Ok(diesel::update(payments::table.find(id))
        .set((
            payments::status.eq(status.as_str()),
            payments::gateway_response.eq(Some(response)),
            payments::updated_at.eq(diesel::dsl::now),
        ))
        .returning(Payment::as_returning())
        .get_result(conn)
        .await?)
}

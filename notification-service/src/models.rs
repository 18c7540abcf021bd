use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use shared::NotificationCommand;

use crate::dispatcher::{BookingContext, Delivery};

/// One booking joined with its listing title and guest contact.
#[derive(Debug, Clone, Queryable)]
pub struct BookingRow {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub number_of_guests: i32,
    pub total_price: BigDecimal,
    pub listing_title: String,
    pub guest_email: String,
    pub guest_first_name: String,
    pub guest_username: String,
}

impl From<BookingRow> for BookingContext {
    fn from(row: BookingRow) -> Self {
        let guest_name = if row.guest_first_name.trim().is_empty() {
            row.guest_username
        } else {
            row.guest_first_name
        };
        Self {
            booking_id: row.id,
            listing_id: row.listing_id,
            listing_title: row.listing_title,
            guest_name,
            guest_email: row.guest_email,
            check_in: row.check_in,
            check_out: row.check_out,
            number_of_guests: row.number_of_guests,
            total_price: row.total_price,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::processed_notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProcessedNotification {
    pub idempotency_key: String,
    pub command_id: Uuid,
    pub kind: String,
    pub booking_id: Uuid,
    pub sent: bool,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedNotification {
    pub fn new(command: &NotificationCommand, delivery: Delivery) -> Self {
        Self {
            idempotency_key: command.idempotency_key.clone(),
            command_id: command.id,
            kind: command.kind.to_string(),
            booking_id: command.booking_id,
            sent: delivery.was_sent(),
            processed_at: Utc::now(),
        }
    }
}

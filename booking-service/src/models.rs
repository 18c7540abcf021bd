use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use garde::Validate;
use serde::{Deserialize, Serialize};
use shared::*;
use uuid::Uuid;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = crate::schema::listings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Listing {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub property_type: String,
    pub location: String,
    pub city: String,
    pub country: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub bedrooms: i32,
    pub bathrooms: i32,
    pub max_guests: i32,
    pub price_per_night: BigDecimal,
    pub available_from: NaiveDate,
    pub available_to: NaiveDate,
    pub amenities: Vec<String>,
    pub owner_id: Uuid,
    pub image_url: Option<String>,
    pub rating: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    pub fn window(&self) -> ListingWindow {
        ListingWindow {
            is_active: self.is_active,
            available_from: self.available_from,
            available_to: self.available_to,
        }
    }

    pub fn terms(&self) -> ListingTerms {
        ListingTerms {
            price_per_night: self.price_per_night.clone(),
            available_from: self.available_from,
            available_to: self.available_to,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::listings)]
pub struct NewListing {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub property_type: String,
    pub location: String,
    pub city: String,
    pub country: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub bedrooms: i32,
    pub bathrooms: i32,
    pub max_guests: i32,
    pub price_per_night: BigDecimal,
    pub available_from: NaiveDate,
    pub available_to: NaiveDate,
    pub amenities: Vec<String>,
    pub owner_id: Uuid,
    pub image_url: Option<String>,
    pub rating: f64,
    pub is_active: bool,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, AsChangeset, Deserialize, Validate)]
#[diesel(table_name = crate::schema::listings)]
pub struct ListingChanges {
    #[garde(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[garde(skip)]
    pub description: Option<String>,
    #[garde(skip)]
    pub property_type: Option<String>,
    #[garde(length(min = 1))]
    pub location: Option<String>,
    #[garde(length(min = 1))]
    pub city: Option<String>,
    #[garde(length(min = 1))]
    pub country: Option<String>,
    #[garde(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[garde(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    #[garde(range(min = 0))]
    pub bedrooms: Option<i32>,
    #[garde(range(min = 0))]
    pub bathrooms: Option<i32>,
    #[garde(range(min = 1))]
    pub max_guests: Option<i32>,
    #[garde(skip)]
    pub price_per_night: Option<BigDecimal>,
    #[garde(skip)]
    pub available_from: Option<NaiveDate>,
    #[garde(skip)]
    pub available_to: Option<NaiveDate>,
    #[garde(skip)]
    pub amenities: Option<Vec<String>>,
    #[garde(skip)]
    pub image_url: Option<String>,
    #[garde(range(min = 0.0, max = 5.0))]
    pub rating: Option<f64>,
    #[garde(skip)]
    pub is_active: Option<bool>,
}

impl ListingChanges {
    /// The terms the listing would have once these changes are applied.
    pub fn merged_terms(&self, current: &Listing) -> ListingTerms {
        let mut terms = current.terms();
        if let Some(v) = &self.price_per_night {
            terms.price_per_night = v.clone();
        }
        if let Some(v) = self.available_from {
            terms.available_from = v;
        }
        if let Some(v) = self.available_to {
            terms.available_to = v;
        }
        terms
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = crate::schema::bookings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Booking {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub guest_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub number_of_guests: i32,
    pub total_price: BigDecimal,
    pub status: String,
    pub special_requests: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn status(&self) -> anyhow::Result<BookingStatus> {
        self.status
            .parse()
            .map_err(|e: String| anyhow::anyhow!("booking {}: {}", self.id, e))
    }

    pub fn parties(&self, listing: &Listing) -> Parties {
        Parties {
            guest_id: self.guest_id,
            owner_id: listing.owner_id,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::bookings)]
pub struct NewBooking {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub guest_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub number_of_guests: i32,
    pub total_price: BigDecimal,
    pub status: String,
    pub special_requests: Option<String>,
}

#[derive(Debug, Clone, Default, AsChangeset, Deserialize, Validate)]
#[diesel(table_name = crate::schema::bookings)]
pub struct BookingChanges {
    #[garde(range(min = 1))]
    pub number_of_guests: Option<i32>,
    #[garde(length(max = 2000))]
    pub special_requests: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = crate::schema::reviews)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Review {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub booking_id: Uuid,
    pub guest_id: Uuid,
    pub title: String,
    pub comment: String,
    pub rating: i32,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::reviews)]
pub struct NewReview {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub booking_id: Uuid,
    pub guest_id: Uuid,
    pub title: String,
    pub comment: String,
    pub rating: i32,
}

#[derive(Debug, Clone, Default, AsChangeset, Deserialize, Validate)]
#[diesel(table_name = crate::schema::reviews)]
pub struct ReviewChanges {
    #[garde(length(max = 200))]
    pub title: Option<String>,
    #[garde(skip)]
    pub comment: Option<String>,
    #[garde(range(min = 1, max = 5))]
    pub rating: Option<i32>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = crate::schema::payments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: String,
    pub transaction_id: Option<String>,
    pub gateway_response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::payments)]
pub struct NewPayment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::outbox_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DbOutboxEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::outbox_events)]
pub struct NewOutboxEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
}

impl TryFrom<&NotificationCommand> for NewOutboxEvent {
    type Error = serde_json::Error;

    fn try_from(command: &NotificationCommand) -> Result<Self, Self::Error> {
        Ok(Self {
            id: command.id,
            aggregate_id: command.booking_id,
            event_type: command.kind.to_string(),
            event_data: serde_json::to_value(command)?,
        })
    }
}

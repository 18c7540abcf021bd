use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use garde::Validate;
use serde::{Deserialize, Serialize};
use shared::listing::normalize_amenities;
use shared::query::{
    required_stay, ListingFilter, ListingSortField, Ordering, Page, PageRequest, Params,
    ReviewFilter, ReviewSortField,
};
use shared::{DomainError, ListingTerms, PropertyType};
use tracing::info;
use uuid::Uuid;

use super::{AppState, CurrentUser};
use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::repository::{listings, reviews};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateListingRequest {
    #[garde(custom(not_blank), length(max = 200))]
    pub title: String,
    #[serde(default)]
    #[garde(skip)]
    pub description: String,
    #[serde(default)]
    #[garde(skip)]
    pub property_type: PropertyType,
    #[garde(length(min = 1))]
    pub location: String,
    #[garde(length(min = 1))]
    pub city: String,
    #[garde(length(min = 1))]
    pub country: String,
    #[garde(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[garde(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    #[serde(default)]
    #[garde(range(min = 0))]
    pub bedrooms: i32,
    #[serde(default)]
    #[garde(range(min = 0))]
    pub bathrooms: i32,
    #[garde(range(min = 1))]
    pub max_guests: i32,
    #[garde(skip)]
    pub price_per_night: BigDecimal,
    #[garde(skip)]
    pub available_from: NaiveDate,
    #[garde(skip)]
    pub available_to: NaiveDate,
    #[serde(default)]
    #[garde(skip)]
    pub amenities: Vec<String>,
    #[garde(skip)]
    pub image_url: Option<String>,
}

fn not_blank(value: &str, _: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("must not be blank"));
    }
    Ok(())
}

impl CreateListingRequest {
    fn into_new_listing(self, owner_id: Uuid) -> AppResult<NewListing> {
        self.validate(&())?;
        ListingTerms {
            price_per_night: self.price_per_night.clone(),
            available_from: self.available_from,
            available_to: self.available_to,
        }
        .validate()?;

        Ok(NewListing {
            id: Uuid::new_v4(),
            title: self.title.trim().to_string(),
            description: self.description,
            property_type: self.property_type.to_string(),
            location: self.location,
            city: self.city,
            country: self.country,
            latitude: self.latitude,
            longitude: self.longitude,
            bedrooms: self.bedrooms,
            bathrooms: self.bathrooms,
            max_guests: self.max_guests,
            price_per_night: self.price_per_night,
            available_from: self.available_from,
            available_to: self.available_to,
            amenities: normalize_amenities(&self.amenities),
            owner_id,
            image_url: self.image_url,
            rating: 0.0,
            is_active: true,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ListingDetail {
    #[serde(flatten)]
    pub listing: Listing,
    pub average_rating: f64,
    pub review_count: i64,
    pub booking_count: i64,
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> AppResult<Json<Page<Listing>>> {
    let filter = ListingFilter::from_params(&params);
    let ordering = Ordering::from_params(&params, ListingSortField::newest_first());
    let page = PageRequest::from_params(&params);

    let mut conn = state.pool.get().await?;
    Ok(Json(listings::search(&mut conn, &filter, ordering, page).await?))
}

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(owner_id): CurrentUser,
    Json(request): Json<CreateListingRequest>,
) -> AppResult<(StatusCode, Json<Listing>)> {
    let new_listing = request.into_new_listing(owner_id)?;

    let mut conn = state.pool.get().await?;
    let listing = listings::insert(&mut conn, &new_listing).await?;

    info!(listing_id = %listing.id, %owner_id, "Listing created");
    Ok((StatusCode::CREATED, Json(listing)))
}

pub async fn retrieve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ListingDetail>> {
    let mut conn = state.pool.get().await?;
    let listing = listings::find(&mut conn, id).await?;
    let stats = listings::stats(&mut conn, id).await?;

    Ok(Json(ListingDetail {
        listing,
        average_rating: stats.average_rating,
        review_count: stats.review_count,
        booking_count: stats.booking_count,
    }))
}

pub async fn update(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(mut changes): Json<ListingChanges>,
) -> AppResult<Json<Listing>> {
    changes.validate(&())?;
    if let Some(property_type) = &changes.property_type {
        property_type
            .parse::<PropertyType>()
            .map_err(AppError::Validation)?;
    }
    if let Some(amenities) = changes.amenities.take() {
        changes.amenities = Some(normalize_amenities(&amenities));
    }

    let mut conn = state.pool.get().await?;
    let listing = listings::find(&mut conn, id).await?;
    if listing.owner_id != actor {
        return Err(DomainError::PermissionDenied("Only the owner can modify this listing").into());
    }
    changes.merged_terms(&listing).validate()?;

    Ok(Json(listings::update(&mut conn, id, &changes).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.pool.get().await?;
    let listing = listings::find(&mut conn, id).await?;
    if listing.owner_id != actor {
        return Err(DomainError::PermissionDenied("Only the owner can delete this listing").into());
    }
    listings::deactivate(&mut conn, id).await?;

    info!(listing_id = %id, "Listing deactivated");
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/listings/available?check_in=..&check_out=..`
pub async fn available(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> AppResult<Json<Page<Listing>>> {
    let stay = required_stay(&params)?;
    let page = PageRequest::from_params(&params);

    let mut conn = state.pool.get().await?;
    Ok(Json(listings::available(&mut conn, stay, page).await?))
}

pub async fn mine(
    State(state): State<AppState>,
    CurrentUser(owner_id): CurrentUser,
    Query(params): Query<Params>,
) -> AppResult<Json<Page<Listing>>> {
    let page = PageRequest::from_params(&params);

    let mut conn = state.pool.get().await?;
    Ok(Json(listings::owned_by(&mut conn, owner_id, page).await?))
}

pub async fn reviews(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<Params>,
) -> AppResult<Json<Page<Review>>> {
    let filter = ReviewFilter {
        listing_id: Some(id),
        booking_id: None,
    };
    let ordering = Ordering::from_params(&params, ReviewSortField::newest_first());
    let page = PageRequest::from_params(&params);

    let mut conn = state.pool.get().await?;
    listings::find(&mut conn, id).await?;
    Ok(Json(reviews::search(&mut conn, &filter, None, ordering, page).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(overrides: serde_json::Value) -> CreateListingRequest {
        let mut body = json!({
            "title": "Lakeside cabin",
            "property_type": "cabin",
            "location": "12 Shore Rd",
            "city": "Bahir Dar",
            "country": "Ethiopia",
            "bedrooms": 2,
            "bathrooms": 1,
            "max_guests": 4,
            "price_per_night": "80.00",
            "available_from": "2024-05-01",
            "available_to": "2024-12-31",
            "amenities": ["WiFi", " wifi ", "Parking", ""]
        });
        if let (Some(body), Some(overrides)) = (body.as_object_mut(), overrides.as_object()) {
            for (k, v) in overrides {
                body.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn new_listing_is_active_with_clean_amenities() {
        let owner = Uuid::new_v4();
        let listing = request(json!({})).into_new_listing(owner).unwrap();
        assert!(listing.is_active);
        assert_eq!(listing.owner_id, owner);
        assert_eq!(listing.property_type, "cabin");
        assert_eq!(listing.amenities, vec!["WiFi", "Parking"]);
        assert_eq!(listing.rating, 0.0);
    }

    #[test]
    fn inverted_window_is_rejected() {
        let err = request(json!({"available_from": "2025-01-01"}))
            .into_new_listing(Uuid::new_v4())
            .unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::InvalidListing(_))));
    }

    #[test]
    fn field_bounds_are_checked() {
        for overrides in [
            json!({"title": "   "}),
            json!({"max_guests": 0}),
            json!({"bedrooms": -1}),
            json!({"city": ""}),
            json!({"latitude": 91.0}),
        ] {
            let err = request(overrides.clone())
                .into_new_listing(Uuid::new_v4())
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{}", overrides);
        }
    }

    #[test]
    fn listing_changes_keep_rating_in_range() {
        let changes: ListingChanges = serde_json::from_value(json!({"rating": 5.5})).unwrap();
        assert!(changes.validate(&()).is_err());

        let changes: ListingChanges =
            serde_json::from_value(json!({"rating": 4.5, "max_guests": 3})).unwrap();
        assert!(changes.validate(&()).is_ok());
    }

    #[test]
    fn zero_price_is_rejected() {
        assert!(request(json!({"price_per_night": "0.00"}))
            .into_new_listing(Uuid::new_v4())
            .is_err());
    }

    #[test]
    fn unknown_property_type_fails_to_deserialize() {
        let body = json!({
            "title": "x", "property_type": "castle", "location": "x", "city": "x",
            "country": "x", "max_guests": 1, "price_per_night": "10",
            "available_from": "2024-01-01", "available_to": "2024-01-02"
        });
        assert!(serde_json::from_value::<CreateListingRequest>(body).is_err());
    }
}

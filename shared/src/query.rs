//! Query-string parsing for list endpoints.
//!
//! Filters are optional and combine with AND. A value that does not parse is
//! dropped and the filter it belonged to is simply not applied.

use std::collections::HashMap;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::availability::DateRange;
use crate::booking::BookingStatus;
use crate::error::DomainError;
use crate::listing::PropertyType;

pub type Params = HashMap<String, String>;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

fn get<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(params: &Params, key: &str) -> Option<T> {
    get(params, key).and_then(|v| v.parse().ok())
}

fn parse_bool(params: &Params, key: &str) -> Option<bool> {
    match get(params, key)?.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
}

impl PageRequest {
    pub const DEFAULT_PAGE_SIZE: i64 = 10;
    pub const MAX_PAGE_SIZE: i64 = 100;
    /// Highest page whose offset still fits in an `i64` at any page size.
    pub const MAX_PAGE: i64 = i64::MAX / Self::MAX_PAGE_SIZE;

    pub fn from_params(params: &Params) -> Self {
        let page = parsed::<i64>(params, "page")
            .filter(|p| *p >= 1)
            .map(|p| p.min(Self::MAX_PAGE))
            .unwrap_or(1);
        let page_size = parsed::<i64>(params, "page_size")
            .filter(|s| *s >= 1)
            .map(|s| s.min(Self::MAX_PAGE_SIZE))
            .unwrap_or(Self::DEFAULT_PAGE_SIZE);
        Self { page, page_size }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub page: i64,
    pub page_size: i64,
    pub next: Option<i64>,
    pub previous: Option<i64>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>, count: i64, request: PageRequest) -> Self {
        let has_next = request.page.saturating_mul(request.page_size) < count;
        Self {
            count,
            page: request.page,
            page_size: request.page_size,
            next: has_next.then_some(request.page + 1),
            previous: (request.page > 1).then_some(request.page - 1),
            results,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            count: self.count,
            page: self.page,
            page_size: self.page_size,
            next: self.next,
            previous: self.previous,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ordering<F> {
    pub field: F,
    pub direction: SortDirection,
}

impl<F: FromStr> Ordering<F> {
    /// Reads `ordering=field` or `ordering=-field`. Unknown fields fall back to
    /// `default`.
    pub fn from_params(params: &Params, default: Ordering<F>) -> Self {
        let Some(raw) = get(params, "ordering") else {
            return default;
        };
        let (direction, name) = match raw.strip_prefix('-') {
            Some(name) => (SortDirection::Desc, name),
            None => (SortDirection::Asc, raw),
        };
        match name.parse() {
            Ok(field) => Ordering { field, direction },
            Err(_) => default,
        }
    }
}

macro_rules! sort_fields {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),+
        }

        impl FromStr for $name {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(()),
                }
            }
        }

        impl $name {
            pub fn newest_first() -> Ordering<Self> {
                Ordering {
                    field: $name::CreatedAt,
                    direction: SortDirection::Desc,
                }
            }
        }
    };
}

sort_fields!(ListingSortField {
    PricePerNight => "price_per_night",
    CreatedAt => "created_at",
    Rating => "rating",
});

sort_fields!(BookingSortField {
    CreatedAt => "created_at",
    CheckIn => "check_in",
    CheckOut => "check_out",
});

sort_fields!(ReviewSortField {
    CreatedAt => "created_at",
    Rating => "rating",
});

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingFilter {
    pub city: Option<String>,
    pub country: Option<String>,
    pub property_type: Option<PropertyType>,
    pub min_price: Option<BigDecimal>,
    pub max_price: Option<BigDecimal>,
    pub min_bedrooms: Option<i32>,
    /// Listings that sleep at least this many guests.
    pub min_guests: Option<i32>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
    /// Only listings whose availability window covers this stay.
    pub stay: Option<DateRange>,
}

impl ListingFilter {
    pub fn from_params(params: &Params) -> Self {
        let stay = match (
            get(params, "check_in").and_then(parse_date),
            get(params, "check_out").and_then(parse_date),
        ) {
            (Some(check_in), Some(check_out)) => DateRange::new(check_in, check_out).ok(),
            _ => None,
        };

        Self {
            city: get(params, "city").map(str::to_string),
            country: get(params, "country").map(str::to_string),
            property_type: parsed(params, "property_type"),
            min_price: parsed(params, "min_price"),
            max_price: parsed(params, "max_price"),
            min_bedrooms: parsed(params, "min_bedrooms"),
            min_guests: parsed(params, "max_guests"),
            is_active: parse_bool(params, "is_active"),
            search: get(params, "search").map(str::to_string),
            stay,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    pub guest_id: Option<Uuid>,
    pub listing_id: Option<Uuid>,
    pub check_in_from: Option<NaiveDate>,
    pub check_in_to: Option<NaiveDate>,
}

impl BookingFilter {
    pub fn from_params(params: &Params) -> Self {
        Self {
            status: parsed(params, "status"),
            guest_id: parsed(params, "guest"),
            listing_id: parsed(params, "listing"),
            check_in_from: get(params, "check_in_from").and_then(parse_date),
            check_in_to: get(params, "check_in_to").and_then(parse_date),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewFilter {
    pub listing_id: Option<Uuid>,
    pub booking_id: Option<Uuid>,
}

impl ReviewFilter {
    pub fn from_params(params: &Params) -> Self {
        Self {
            listing_id: parsed(params, "listing_id"),
            booking_id: parsed(params, "booking_id"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StayParamError {
    #[error("check_in and check_out parameters are required")]
    Missing,
    #[error("Invalid date format. Use YYYY-MM-DD")]
    Malformed,
    #[error(transparent)]
    Invalid(#[from] DomainError),
}

/// Strict variant used where the stay is mandatory.
pub fn required_stay(params: &Params) -> Result<DateRange, StayParamError> {
    let (Some(check_in), Some(check_out)) = (get(params, "check_in"), get(params, "check_out"))
    else {
        return Err(StayParamError::Missing);
    };
    let check_in = parse_date(check_in).ok_or(StayParamError::Malformed)?;
    let check_out = parse_date(check_out).ok_or(StayParamError::Malformed)?;
    Ok(DateRange::new(check_in, check_out)?)
}

diesel::table! {
    users (id) {
        id -> Uuid,
        username -> Varchar,
        email -> Varchar,
        first_name -> Varchar,
        last_name -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    listings (id) {
        id -> Uuid,
        title -> Varchar,
        description -> Text,
        property_type -> Varchar,
        location -> Varchar,
        city -> Varchar,
        country -> Varchar,
        latitude -> Nullable<Float8>,
        longitude -> Nullable<Float8>,
        bedrooms -> Int4,
        bathrooms -> Int4,
        max_guests -> Int4,
        price_per_night -> Numeric,
        available_from -> Date,
        available_to -> Date,
        amenities -> Array<Text>,
        owner_id -> Uuid,
        image_url -> Nullable<Varchar>,
        rating -> Float8,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    bookings (id) {
        id -> Uuid,
        listing_id -> Uuid,
        guest_id -> Uuid,
        check_in -> Date,
        check_out -> Date,
        number_of_guests -> Int4,
        total_price -> Numeric,
        status -> Varchar,
        special_requests -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    reviews (id) {
        id -> Uuid,
        listing_id -> Uuid,
        booking_id -> Uuid,
        guest_id -> Uuid,
        title -> Varchar,
        comment -> Text,
        rating -> Int4,
        is_verified -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    payments (id) {
        id -> Uuid,
        booking_id -> Uuid,
        amount -> Numeric,
        currency -> Varchar,
        status -> Varchar,
        transaction_id -> Nullable<Varchar>,
        gateway_response -> Nullable<Jsonb>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    outbox_events (id) {
        id -> Uuid,
        aggregate_id -> Uuid,
        event_type -> Varchar,
        event_data -> Jsonb,
        processed -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(bookings -> listings (listing_id));
diesel::joinable!(payments -> bookings (booking_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    listings,
    bookings,
    reviews,
    payments,
    outbox_events,
);

// Read-only views of tables owned by booking-service. Only the columns used
// to compose messages are declared.
diesel::table! {
    users (id) {
        id -> Uuid,
        username -> Varchar,
        email -> Varchar,
        first_name -> Varchar,
    }
}

diesel::table! {
    listings (id) {
        id -> Uuid,
        title -> Varchar,
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
    }
}

diesel::table! {
    processed_notifications (idempotency_key) {
        idempotency_key -> Varchar,
        command_id -> Uuid,
        kind -> Varchar,
        booking_id -> Uuid,
        sent -> Bool,
        processed_at -> Timestamptz,
    }
}

diesel::joinable!(bookings -> listings (listing_id));
diesel::joinable!(bookings -> users (guest_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    listings,
    bookings,
    processed_notifications,
);

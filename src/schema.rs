diesel::table! {
    users (id) {
        id -> Uuid,
        name -> Text,
        email -> Text,
        role -> Text,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    appointments (id) {
        id -> Uuid,
        client -> Uuid,
        designer -> Uuid,
        project -> Nullable<Uuid>,
        title -> Text,
        description -> Nullable<Text>,
        kind -> Text,
        scheduled_date -> Timestamptz,
        duration -> Int4,
        ends_at -> Timestamptz,
        location_kind -> Text,
        address -> Nullable<Text>,
        meeting_link -> Nullable<Text>,
        status -> Text,
        notes_before -> Nullable<Text>,
        notes_after -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(users, appointments);

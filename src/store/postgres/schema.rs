diesel::table! {
    users (id) {
        id -> Uuid,
        #[max_length = 100]
        name -> Varchar,
        #[max_length = 255]
        email -> Varchar,
        password_hash -> Varchar,
    }
}

diesel::table! {
    polls (id) {
        id -> Uuid,
        #[max_length = 300]
        name -> Varchar,
        deadline -> Timestamptz,
        owner_id -> Uuid,
        workshop_id -> Nullable<Uuid>,
        subjects -> Jsonb,
        version -> Int8,
    }
}

diesel::table! {
    workshops (id) {
        id -> Uuid,
        #[max_length = 300]
        name -> Varchar,
        #[max_length = 300]
        subject -> Varchar,
        date -> Timestamptz,
        room -> Varchar,
        owner_id -> Uuid,
        poll_id -> Uuid,
    }
}

diesel::joinable!(polls -> users (owner_id));
diesel::joinable!(workshops -> polls (poll_id));

diesel::allow_tables_to_appear_in_same_query!(users, polls, workshops,);

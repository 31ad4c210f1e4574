diesel::table! {
    processed_messages (message_id) {
        #[max_length = 255]
        message_id -> Varchar,
        product_id -> Text,
        processed_at -> Timestamptz,
    }
}

diesel::table! {
    products (id) {
        #[max_length = 10]
        id -> Varchar,
        #[max_length = 100]
        name -> Varchar,
        stock -> Int4,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    processed_messages,
    products,
);

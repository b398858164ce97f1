//! Esquema Diesel (mantenido a mano, espejo de la migración SQL).
//! Reemplazable con `diesel print-schema`.

diesel::table! {
    stores (id) {
        id -> Uuid,
        name -> Text,
        location -> Text,
        region -> Nullable<Text>,
        manager_id -> Nullable<Uuid>,
        store_size -> Text,
        target_metrics -> Nullable<Jsonb>,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    users (id) {
        id -> Uuid,
        email -> Text,
        password_hash -> Text,
        role -> Text,
        store_id -> Nullable<Uuid>,
        experience_level -> Int4,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    personas (id) {
        id -> Uuid,
        name -> Text,
        description -> Nullable<Text>,
        profile -> Jsonb,
        scenarios -> Nullable<Jsonb>,
        difficulty_mapping -> Nullable<Jsonb>,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    training_scenarios (id) {
        id -> Uuid,
        persona_id -> Uuid,
        title -> Text,
        description -> Nullable<Text>,
        difficulty_level -> Text,
        kpi_focus -> Nullable<Text>,
        scenario_data -> Jsonb,
        response_guidelines -> Nullable<Jsonb>,
        evaluation_criteria -> Nullable<Jsonb>,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    training_sessions (id) {
        id -> Uuid,
        user_id -> Uuid,
        persona_type -> Text,
        difficulty_level -> Text,
        scenario_data -> Nullable<Jsonb>,
        responses -> Nullable<Jsonb>,
        scores -> Nullable<Jsonb>,
        completion_time -> Nullable<Int4>,
        session_status -> Text,
        started_at -> Timestamptz,
        completed_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    training_interactions (id) {
        id -> Uuid,
        session_id -> Uuid,
        scenario_id -> Nullable<Uuid>,
        question -> Text,
        user_response -> Text,
        ai_evaluation -> Nullable<Jsonb>,
        feedback -> Nullable<Text>,
        interaction_order -> Int4,
        response_time -> Nullable<Int4>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    training_transcripts (id) {
        id -> Uuid,
        session_id -> Uuid,
        full_transcript -> Jsonb,
        summary -> Nullable<Text>,
        word_count -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    kpi_data (id) {
        id -> Uuid,
        user_id -> Uuid,
        store_id -> Uuid,
        date -> Date,
        conversion_rate -> Nullable<Float8>,
        avg_bill_value -> Nullable<Float8>,
        footfall -> Nullable<Int4>,
        sales_target -> Nullable<Float8>,
        actual_sales -> Nullable<Float8>,
        return_rate -> Nullable<Float8>,
        customer_satisfaction -> Nullable<Float8>,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(users -> stores (store_id));
diesel::joinable!(training_scenarios -> personas (persona_id));
diesel::joinable!(training_sessions -> users (user_id));
diesel::joinable!(training_interactions -> training_sessions (session_id));
diesel::joinable!(training_interactions -> training_scenarios (scenario_id));
diesel::joinable!(training_transcripts -> training_sessions (session_id));
diesel::joinable!(kpi_data -> users (user_id));
diesel::joinable!(kpi_data -> stores (store_id));

diesel::allow_tables_to_appear_in_same_query!(
    stores,
    users,
    personas,
    training_scenarios,
    training_sessions,
    training_interactions,
    training_transcripts,
    kpi_data,
);

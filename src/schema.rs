// Kept in sync by hand with src/migrations.

diesel::table! {
    job_inputs (id) {
        id -> Text,
        case_id -> Text,
        tumor_id -> Text,
        normal_id -> Text,
        tumor_url -> Text,
        normal_url -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    job_status (job_id) {
        job_id -> Text,
        input_id -> Nullable<Text>,
        case_id -> Nullable<Text>,
        tumor_id -> Nullable<Text>,
        normal_id -> Nullable<Text>,
        identifiers -> Text,
        status -> Text,
        location -> Nullable<Text>,
        datetime_start -> Text,
        datetime_end -> Nullable<Text>,
        checksum -> Nullable<Text>,
        size -> Nullable<BigInt>,
        host -> Nullable<Text>,
        elapsed_by_phase -> Text,
    }
}

diesel::table! {
    job_metrics (job_id) {
        job_id -> Text,
        case_id -> Nullable<Text>,
        status -> Text,
        thread_count -> Integer,
        block_count -> Integer,
        download_seconds -> Double,
        upload_seconds -> Double,
        total_seconds -> Double,
        user_time -> Nullable<Double>,
        system_time -> Nullable<Double>,
        wall_clock -> Nullable<Double>,
        percent_of_cpu -> Nullable<Double>,
        maximum_resident_set_size -> Nullable<Double>,
        created_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(job_inputs, job_status, job_metrics,);

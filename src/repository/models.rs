//! Diesel row types for the job tables.

use diesel::prelude::*;

use crate::schema;

/// Row of `job_inputs`.
#[derive(Queryable, QueryableByName, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = schema::job_inputs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct JobInputRecord {
    pub id: String,
    pub case_id: String,
    pub tumor_id: String,
    pub normal_id: String,
    pub tumor_url: String,
    pub normal_url: String,
    pub created_at: String,
}

/// Row of `job_status`.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::job_status)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct JobStatusRecord {
    pub job_id: String,
    pub input_id: Option<String>,
    pub case_id: Option<String>,
    pub tumor_id: Option<String>,
    pub normal_id: Option<String>,
    pub identifiers: String,
    pub status: String,
    pub location: Option<String>,
    pub datetime_start: String,
    pub datetime_end: Option<String>,
    pub checksum: Option<String>,
    pub size: Option<i64>,
    pub host: Option<String>,
    pub elapsed_by_phase: String,
}

/// New `job_status` row.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::job_status)]
pub struct NewJobStatus<'a> {
    pub job_id: &'a str,
    pub input_id: Option<&'a str>,
    pub case_id: Option<&'a str>,
    pub tumor_id: Option<&'a str>,
    pub normal_id: Option<&'a str>,
    pub identifiers: &'a str,
    pub status: &'a str,
    pub location: Option<&'a str>,
    pub datetime_start: &'a str,
    pub datetime_end: Option<&'a str>,
    pub checksum: Option<&'a str>,
    pub size: Option<i64>,
    pub host: Option<&'a str>,
    pub elapsed_by_phase: &'a str,
}

/// Row of `job_metrics`.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = schema::job_metrics)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct JobMetricsRecord {
    pub job_id: String,
    pub case_id: Option<String>,
    pub status: String,
    pub thread_count: i32,
    pub block_count: i32,
    pub download_seconds: f64,
    pub upload_seconds: f64,
    pub total_seconds: f64,
    pub user_time: Option<f64>,
    pub system_time: Option<f64>,
    pub wall_clock: Option<f64>,
    pub percent_of_cpu: Option<f64>,
    pub maximum_resident_set_size: Option<f64>,
    pub created_at: String,
}

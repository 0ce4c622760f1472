use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0001_job_tables")
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    r#"CREATE TABLE job_inputs (
    id TEXT PRIMARY KEY NOT NULL,
    case_id TEXT NOT NULL,
    tumor_id TEXT NOT NULL,
    normal_id TEXT NOT NULL,
    tumor_url TEXT NOT NULL,
    normal_url TEXT NOT NULL,
    created_at TEXT NOT NULL
)"#,
                )
                .for_backend(
                    "postgres",
                    r#"CREATE TABLE job_inputs (
    id TEXT PRIMARY KEY NOT NULL,
    case_id TEXT NOT NULL,
    tumor_id TEXT NOT NULL,
    normal_id TEXT NOT NULL,
    tumor_url TEXT NOT NULL,
    normal_url TEXT NOT NULL,
    created_at TEXT NOT NULL
)"#,
                ),
        )
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    r#"CREATE TABLE job_status (
    job_id TEXT PRIMARY KEY NOT NULL,
    input_id TEXT,
    case_id TEXT,
    tumor_id TEXT,
    normal_id TEXT,
    identifiers TEXT NOT NULL DEFAULT '{}',
    status TEXT NOT NULL,
    location TEXT,
    datetime_start TEXT NOT NULL,
    datetime_end TEXT,
    checksum TEXT,
    size INTEGER,
    host TEXT,
    elapsed_by_phase TEXT NOT NULL DEFAULT '{}'
)"#,
                )
                .for_backend(
                    "postgres",
                    r#"CREATE TABLE job_status (
    job_id TEXT PRIMARY KEY NOT NULL,
    input_id TEXT,
    case_id TEXT,
    tumor_id TEXT,
    normal_id TEXT,
    identifiers TEXT NOT NULL DEFAULT '{}',
    status TEXT NOT NULL,
    location TEXT,
    datetime_start TEXT NOT NULL,
    datetime_end TEXT,
    checksum TEXT,
    size BIGINT,
    host TEXT,
    elapsed_by_phase TEXT NOT NULL DEFAULT '{}'
)"#,
                ),
        )
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    "CREATE INDEX idx_job_status_pair ON job_status(tumor_id, normal_id, status)",
                )
                .for_backend(
                    "postgres",
                    "CREATE INDEX idx_job_status_pair ON job_status(tumor_id, normal_id, status)",
                ),
        )
}

use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0002_job_metrics")
        .depends_on(&["0001_job_tables"])
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    r#"CREATE TABLE job_metrics (
    job_id TEXT PRIMARY KEY NOT NULL,
    case_id TEXT,
    status TEXT NOT NULL,
    thread_count INTEGER NOT NULL,
    block_count INTEGER NOT NULL,
    download_seconds REAL NOT NULL,
    upload_seconds REAL NOT NULL,
    total_seconds REAL NOT NULL,
    user_time REAL,
    system_time REAL,
    wall_clock REAL,
    percent_of_cpu REAL,
    maximum_resident_set_size REAL,
    created_at TEXT NOT NULL
)"#,
                )
                .for_backend(
                    "postgres",
                    r#"CREATE TABLE job_metrics (
    job_id TEXT PRIMARY KEY NOT NULL,
    case_id TEXT,
    status TEXT NOT NULL,
    thread_count INTEGER NOT NULL,
    block_count INTEGER NOT NULL,
    download_seconds DOUBLE PRECISION NOT NULL,
    upload_seconds DOUBLE PRECISION NOT NULL,
    total_seconds DOUBLE PRECISION NOT NULL,
    user_time DOUBLE PRECISION,
    system_time DOUBLE PRECISION,
    wall_clock DOUBLE PRECISION,
    percent_of_cpu DOUBLE PRECISION,
    maximum_resident_set_size DOUBLE PRECISION,
    created_at TEXT NOT NULL
)"#,
                ),
        )
}

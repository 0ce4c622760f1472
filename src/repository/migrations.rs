//! Schema migrations from the cetane registry.
//!
//! Statements are planned per backend in dependency order. Each pending
//! migration is applied in its own transaction together with the row that
//! marks it applied.

use std::collections::HashSet;
use std::path::Path;

use tracing::info;

use super::pool::{sqlite_path, DieselError};
use super::util::{is_postgres_url, to_diesel_error as migration_error};

/// Applied migration names are tracked here.
const STATE_TABLE: &str = "varscan_schema_migrations";

/// `(name, statements)` in the order they must run.
type Plan = Vec<(String, Vec<String>)>;

/// Resolve the registry for one cetane backend.
macro_rules! plan_for {
    ($backend:expr) => {{
        let registry = crate::migrations::registry();
        let backend = $backend;
        let order = registry
            .resolve_order()
            .map_err(|e| migration_error(format!("Cannot order migrations: {:?}", e)))?;

        let mut plan: Plan = Vec::new();
        for name in order {
            let key = name.to_string();
            let migration = registry
                .get(name)
                .ok_or_else(|| migration_error(format!("Migration {} is not registered", key)))?;
            let statements = migration
                .forward_sql(&backend)
                .iter()
                .map(|stmt| stmt.to_string())
                .filter(|stmt| !stmt.trim().is_empty())
                .collect();
            plan.push((key, statements));
        }
        plan
    }};
}

fn sqlite_plan() -> Result<Plan, DieselError> {
    Ok(plan_for!(cetane::backend::Sqlite))
}

#[cfg(feature = "postgres")]
fn postgres_plan() -> Result<Plan, DieselError> {
    Ok(plan_for!(cetane::backend::Postgres))
}

/// Apply pending migrations. Returns the names that were applied.
pub async fn run_migrations(database_url: &str) -> Result<Vec<String>, DieselError> {
    let applied = if is_postgres_url(database_url) {
        postgres_forward(database_url).await?
    } else {
        let path = sqlite_path(database_url).to_path_buf();
        tokio::task::spawn_blocking(move || sqlite_forward(&path))
            .await
            .map_err(migration_error)??
    };

    if applied.is_empty() {
        info!("Status store schema is current");
    }
    for name in &applied {
        info!("Applied migration {}", name);
    }
    Ok(applied)
}

fn sqlite_forward(path: &Path) -> Result<Vec<String>, DieselError> {
    let mut conn = rusqlite::Connection::open(path).map_err(migration_error)?;
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {STATE_TABLE} (\
            name TEXT PRIMARY KEY NOT NULL, \
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP)"
    ))
    .map_err(migration_error)?;

    let done = sqlite_applied(&conn).map_err(migration_error)?;
    let mut applied = Vec::new();

    for (name, statements) in sqlite_plan()? {
        if done.contains(&name) {
            continue;
        }
        let tx = conn.transaction().map_err(migration_error)?;
        for stmt in &statements {
            tx.execute_batch(stmt)
                .map_err(|e| migration_error(format!("{}: {}", name, e)))?;
        }
        tx.execute(
            &format!("INSERT INTO {STATE_TABLE} (name) VALUES (?1)"),
            [&name],
        )
        .map_err(migration_error)?;
        tx.commit().map_err(migration_error)?;
        applied.push(name);
    }

    Ok(applied)
}

fn sqlite_applied(conn: &rusqlite::Connection) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("SELECT name FROM {STATE_TABLE}"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    rows.collect()
}

#[cfg(not(feature = "postgres"))]
async fn postgres_forward(_database_url: &str) -> Result<Vec<String>, DieselError> {
    Err(DieselError::QueryBuilderError(
        "PostgreSQL support not compiled. Use --features postgres".into(),
    ))
}

#[cfg(feature = "postgres")]
async fn postgres_forward(database_url: &str) -> Result<Vec<String>, DieselError> {
    let plan = postgres_plan()?;

    let (mut client, connection) = tokio_postgres::connect(database_url, tokio_postgres::NoTls)
        .await
        .map_err(migration_error)?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Migration connection closed: {}", e);
        }
    });

    client
        .batch_execute(&format!(
            "CREATE TABLE IF NOT EXISTS {STATE_TABLE} (\
                name TEXT PRIMARY KEY NOT NULL, \
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW())"
        ))
        .await
        .map_err(migration_error)?;

    let done: HashSet<String> = client
        .query(&format!("SELECT name FROM {STATE_TABLE}"), &[])
        .await
        .map_err(migration_error)?
        .iter()
        .map(|row| row.get::<_, String>(0))
        .collect();

    let mut applied = Vec::new();
    for (name, statements) in plan {
        if done.contains(&name) {
            continue;
        }
        let tx = client.transaction().await.map_err(migration_error)?;
        for stmt in &statements {
            tx.batch_execute(stmt)
                .await
                .map_err(|e| migration_error(format!("{}: {}", name, e)))?;
        }
        tx.execute(
            &format!("INSERT INTO {STATE_TABLE} (name) VALUES ($1)"),
            &[&name],
        )
        .await
        .map_err(migration_error)?;
        tx.commit().await.map_err(migration_error)?;
        applied.push(name);
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_follows_dependencies() {
        let plan = sqlite_plan().unwrap();
        let names: Vec<_> = plan.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["0001_job_tables", "0002_job_metrics"]);
        assert!(plan.iter().all(|(_, statements)| !statements.is_empty()));
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("m.db").display());

        let first = run_migrations(&url).await.unwrap();
        assert_eq!(first, vec!["0001_job_tables", "0002_job_metrics"]);

        let second = run_migrations(&url).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_state_table_records_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.db");
        run_migrations(&path.display().to_string()).await.unwrap();

        let conn = rusqlite::Connection::open(&path).unwrap();
        let recorded = sqlite_applied(&conn).unwrap();
        assert!(recorded.contains("0001_job_tables"));
        assert!(recorded.contains("0002_job_metrics"));
    }
}

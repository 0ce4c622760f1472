//! Status store connections.
//!
//! Every job launched from one `generate` batch usually writes to the same
//! SQLite file, so SQLite connections are opened per checkout with a busy
//! timeout. PostgreSQL goes through a small deadpool.

use std::path::{Path, PathBuf};

use diesel::sqlite::SqliteConnection;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, SimpleAsyncConnection};

#[cfg(feature = "postgres")]
use diesel_async::pooled_connection::deadpool::Pool as DeadPool;
#[cfg(feature = "postgres")]
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
#[cfg(feature = "postgres")]
use diesel_async::AsyncPgConnection;

use super::util::{is_postgres_url, to_diesel_error};

pub type DieselError = diesel::result::Error;

pub type SqliteConn = SyncConnectionWrapper<SqliteConnection>;

#[cfg(feature = "postgres")]
pub type PgConn = deadpool::managed::Object<AsyncDieselConnectionManager<AsyncPgConnection>>;

// No WAL: status files commonly live on NFS.
const SQLITE_PRAGMAS: &str = "PRAGMA busy_timeout = 30000; PRAGMA foreign_keys = ON;";

#[cfg(feature = "postgres")]
const POSTGRES_POOL_SIZE: usize = 4;

/// Filesystem path named by a SQLite URL. The `sqlite:` scheme is optional.
pub fn sqlite_path(url: &str) -> &Path {
    Path::new(url.strip_prefix("sqlite:").unwrap_or(url))
}

/// A SQLite status file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(url: &str) -> Self {
        Self {
            path: sqlite_path(url).to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the directory holding the database file.
    pub fn ensure_parent(&self) -> std::io::Result<()> {
        match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => std::fs::create_dir_all(parent),
            None => Ok(()),
        }
    }

    pub async fn get(&self) -> Result<SqliteConn, DieselError> {
        let mut conn = SqliteConn::establish(&self.path.to_string_lossy())
            .await
            .map_err(to_diesel_error)?;
        conn.batch_execute(SQLITE_PRAGMAS).await?;
        Ok(conn)
    }
}

#[cfg(feature = "postgres")]
#[derive(Clone)]
pub struct PgStore {
    pool: DeadPool<AsyncPgConnection>,
}

#[cfg(feature = "postgres")]
impl PgStore {
    pub fn new(database_url: &str) -> Result<Self, DieselError> {
        let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = DeadPool::builder(config)
            .max_size(POSTGRES_POOL_SIZE)
            .build()
            .map_err(to_diesel_error)?;
        Ok(Self { pool })
    }

    pub async fn get(&self) -> Result<PgConn, DieselError> {
        self.pool.get().await.map_err(to_diesel_error)
    }
}

/// Status store handle for either backend.
#[derive(Clone)]
pub enum DbPool {
    Sqlite(SqliteStore),
    #[cfg(feature = "postgres")]
    Postgres(PgStore),
}

impl DbPool {
    /// `postgres://` and `postgresql://` URLs select PostgreSQL (when
    /// compiled in); anything else is a SQLite path.
    pub fn from_url(url: &str) -> Result<Self, DieselError> {
        if is_postgres_url(url) {
            #[cfg(feature = "postgres")]
            {
                return Ok(DbPool::Postgres(PgStore::new(url)?));
            }
            #[cfg(not(feature = "postgres"))]
            {
                return Err(DieselError::QueryBuilderError(
                    "PostgreSQL support not compiled. Use --features postgres".into(),
                ));
            }
        }

        Ok(DbPool::Sqlite(SqliteStore::new(url)))
    }

    /// Like [`from_url`](Self::from_url), also creating a SQLite file's
    /// directory so migrations can open it.
    pub fn open(url: &str) -> Result<Self, DieselError> {
        let pool = Self::from_url(url)?;
        if let DbPool::Sqlite(store) = &pool {
            store.ensure_parent().map_err(to_diesel_error)?;
        }
        Ok(pool)
    }

    pub fn backend(&self) -> &'static str {
        match self {
            DbPool::Sqlite(_) => "sqlite",
            #[cfg(feature = "postgres")]
            DbPool::Postgres(_) => "postgres",
        }
    }
}

/// Run a block against whichever backend the pool holds.
///
/// ```ignore
/// with_conn!(self.pool, conn, {
///     job_status::table.load::<JobStatusRecord>(&mut conn).await
/// })
/// ```
#[macro_export]
macro_rules! with_conn {
    ($pool:expr, $conn:ident, $body:block) => {{
        match &$pool {
            $crate::repository::pool::DbPool::Sqlite(store) => {
                let mut $conn = store.get().await?;
                $body
            }
            #[cfg(feature = "postgres")]
            $crate::repository::pool::DbPool::Postgres(store) => {
                let mut $conn = store.get().await?;
                $body
            }
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_path_strips_scheme() {
        assert_eq!(sqlite_path("sqlite:/data/jobs.db"), Path::new("/data/jobs.db"));
        assert_eq!(sqlite_path("jobs.db"), Path::new("jobs.db"));
    }

    #[test]
    fn test_open_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested/state/jobs.db");
        let pool = DbPool::open(&format!("sqlite:{}", db.display())).unwrap();
        assert_eq!(pool.backend(), "sqlite");
        assert!(db.parent().unwrap().is_dir());
    }

    #[cfg(not(feature = "postgres"))]
    #[test]
    fn test_postgres_requires_feature() {
        assert!(DbPool::from_url("postgres://u@h/db").is_err());
    }

    #[tokio::test]
    async fn test_checkout_applies_pragmas() {
        use diesel::sql_types::Integer;
        use diesel_async::RunQueryDsl;

        #[derive(diesel::QueryableByName)]
        struct Timeout {
            #[diesel(sql_type = Integer)]
            timeout: i32,
        }

        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(&dir.path().join("t.db").display().to_string());
        let mut conn = store.get().await.unwrap();
        let row: Timeout = diesel::sql_query("PRAGMA busy_timeout")
            .get_result(&mut conn)
            .await
            .unwrap();
        assert_eq!(row.timeout, 30000);
    }
}

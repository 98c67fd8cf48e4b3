//! Throwaway PostgreSQL databases for plangate integration tests.
//!
//! All tests in a binary share one server: the one at `PLANGATE_TEST_PG_URL`
//! when that is set (any database path in it is ignored), otherwise a
//! `postgres:16` container started on first use. Every [`TestDb`] is a fresh
//! database on that server and is dropped again by [`TestDb::cleanup`].

use sqlx::{Executor, PgPool};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use plangate_store::DbTarget;
use plangate_store::pool;
use plangate_store::postgres::PgStore;

/// Environment variable naming an external server to test against.
pub const TEST_PG_URL_ENV: &str = "PLANGATE_TEST_PG_URL";

enum Server {
    External(DbTarget),
    /// The container handle keeps the server alive for the whole binary.
    Container(DbTarget, ContainerAsync<Postgres>),
}

impl Server {
    fn target(&self) -> &DbTarget {
        match self {
            Self::External(target) | Self::Container(target, _) => target,
        }
    }
}

static SERVER: OnceCell<Server> = OnceCell::const_new();

async fn start_server() -> Server {
    if let Ok(url) = std::env::var(TEST_PG_URL_ENV) {
        // Accept a bare server URL as well as one that names a database.
        let url = if DbTarget::parse(&url).is_ok() {
            url
        } else {
            format!("{}/postgres", url.trim_end_matches('/'))
        };
        let target = DbTarget::parse(&url)
            .unwrap_or_else(|e| panic!("{TEST_PG_URL_ENV} is not usable: {e}"));
        return Server::External(target);
    }

    let container = Postgres::default()
        .with_tag("16")
        .start()
        .await
        .expect("PostgreSQL container should start");
    let host = container.get_host().await.expect("container host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("container port mapping");
    let url = format!("postgresql://postgres:postgres@{host}:{port}/postgres");
    let target = DbTarget::parse(&url).expect("container URL parses");
    Server::Container(target, container)
}

async fn server() -> &'static DbTarget {
    SERVER.get_or_init(start_server).await.target()
}

async fn maintenance() -> PgPool {
    PgPool::connect(&server().await.maintenance_url())
        .await
        .expect("maintenance database should accept connections")
}

/// A temporary database owned by one test.
pub struct TestDb {
    pub pool: PgPool,
    target: DbTarget,
}

impl TestDb {
    /// A fresh database with no schema.
    pub async fn empty() -> Self {
        let url = server()
            .await
            .with_database(&format!("plangate_test_{}", Uuid::new_v4().simple()));
        let target = DbTarget::parse(&url).expect("test database URL parses");

        let created = pool::ensure_database(&target)
            .await
            .expect("test database should be created");
        assert!(created, "{} already existed", target.database());

        let pool = pool::connect(&target)
            .await
            .expect("test database should accept connections");
        Self { pool, target }
    }

    /// A fresh database with the plangate schema applied.
    pub async fn migrated() -> Self {
        let db = Self::empty().await;
        pool::run_migrations(&db.pool)
            .await
            .expect("migrations should apply to a fresh database");
        db
    }

    pub fn name(&self) -> &str {
        self.target.database()
    }

    pub fn target(&self) -> &DbTarget {
        &self.target
    }

    /// A document store on this database.
    pub fn store(&self) -> PgStore {
        PgStore::new(self.pool.clone())
    }

    /// Close the pool and drop the database, cutting off any connection a
    /// test leaked.
    pub async fn cleanup(self) {
        self.pool.close().await;

        let maint = maintenance().await;
        let name = self.target.database();
        let _ = sqlx::query(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
             WHERE datname = $1 AND pid <> pg_backend_pid()",
        )
        .bind(name)
        .execute(&maint)
        .await;
        let _ = maint
            .execute(format!("DROP DATABASE IF EXISTS \"{name}\"").as_str())
            .await;
        maint.close().await;
    }
}

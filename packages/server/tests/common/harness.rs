//! Test harness with testcontainers for the Postgres and Redis backed tests.
//!
//! Containers are started once and reused by every test in the binary.
//! Tests using it are `#[ignore]` because they need a Docker daemon:
//! run them with `cargo test -- --ignored`.

use std::sync::Arc;

use anyhow::{Context, Result};
use jsonwebtoken::Algorithm;
use rand::Rng;
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;
use wallet_auth::config::AuthSettings;
use wallet_auth::db::PostgresUserDb;
use wallet_auth::domains::sessions::{RevocableSessions, SessionKind, StatelessSessions};
use wallet_auth::kernel::test_dependencies::{FixedGenerator, RecordingNotifier};
use wallet_auth::kernel::{RedisKvStore, ServerDeps};

/// Shared test infrastructure that persists across all tests.
struct SharedTestInfra {
    db_url: String,
    redis_url: String,
    // Keep containers alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
    _redis: ContainerAsync<Redis>,
}

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        super::init_tracing();

        let postgres = Postgres::default()
            .with_tag("16")
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let pg_host = postgres.get_host().await?;
        let pg_port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!(
            "postgresql://postgres:postgres@{}:{}/postgres",
            pg_host, pg_port
        );

        let redis = Redis::default()
            .start()
            .await
            .context("Failed to start Redis container")?;

        let redis_host = redis.get_host().await?;
        let redis_port = redis.get_host_port_ipv4(6379).await?;
        let redis_url = format!("redis://{}:{}", redis_host, redis_port);

        // Run migrations once on the shared database
        let pool = PgPool::connect(&db_url)
            .await
            .context("Failed to connect to Postgres for migrations")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            db_url,
            redis_url,
            _postgres: postgres,
            _redis: redis,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared test infrastructure")
            })
            .await
    }
}

/// Dependencies backed by real Postgres and Redis, with recording doubles
/// for the notifier and the generator.
///
/// ```ignore
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// #[ignore = "requires docker"]
/// async fn my_test(ctx: &mut TestHarness) {
///     let flows = AuthFlows::new(&ctx.deps);
/// }
/// ```
pub struct TestHarness {
    pub db_pool: PgPool,
    pub notifier: RecordingNotifier,
    pub generator: FixedGenerator,
    pub deps: ServerDeps,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new().await.expect("Failed to create test harness")
    }

    async fn teardown(self) {
        self.db_pool.close().await;
    }
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        let infra = SharedTestInfra::get().await;

        let db_pool = PgPool::connect(&infra.db_url)
            .await
            .context("Failed to connect to test database")?;
        let kv = Arc::new(
            RedisKvStore::connect(&infra.redis_url)
                .await
                .context("Failed to connect to test redis")?,
        );

        let auth = AuthSettings {
            session_kind: SessionKind::StatelessRevocable,
            jwt_secret: Some("integration-secret".to_string()),
            retry_delay: None,
            ..AuthSettings::default()
        };
        let sessions = Arc::new(RevocableSessions::new(
            StatelessSessions::new("integration-secret", Algorithm::HS256, None),
            kv.clone(),
        ));

        let notifier = RecordingNotifier::new();
        let generator = FixedGenerator::new(super::CODE, super::TOKEN);
        let deps = ServerDeps::new(
            Arc::new(PostgresUserDb::new(db_pool.clone())),
            kv,
            Arc::new(notifier.clone()),
            Arc::new(generator.clone()),
            sessions,
            auth,
        );

        Ok(Self {
            db_pool,
            notifier,
            generator,
            deps,
        })
    }
}

/// A phone no other test in the shared database uses
pub fn unique_phone() -> String {
    let digits: u64 = rand::thread_rng().gen_range(1_000_000_000..10_000_000_000);
    format!("+7{}", digits)
}

use sqlx::migrate::Migrator;
use vidtube_api::test_support::{TestDatabase, TestDatabaseError};

static TEST_MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn users_tables(pool: &sqlx::PgPool) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = 'public' AND table_name = 'users'",
    )
    .fetch_one(pool)
    .await
    .expect("lookup succeeded")
}

#[tokio::test]
async fn migrations_apply_and_revert_cleanly() {
    let test_db = match TestDatabase::new().await {
        Ok(db) => db,
        Err(TestDatabaseError::Container(err)) => {
            eprintln!("skipping migration revert test: container unavailable: {err}");
            return;
        }
        Err(err) => panic!("failed to provision test database: {err:?}"),
    };

    let pool = test_db.pool_clone();

    TEST_MIGRATOR.run(&pool).await.expect("migrations run");
    assert_eq!(users_tables(&pool).await, 1);

    TEST_MIGRATOR.undo(&pool, 0).await.expect("migrations revert");
    assert_eq!(users_tables(&pool).await, 0, "users should be dropped after revert");

    TEST_MIGRATOR.run(&pool).await.expect("migrations rerun");
    assert_eq!(users_tables(&pool).await, 1);

    test_db.close().await;
}

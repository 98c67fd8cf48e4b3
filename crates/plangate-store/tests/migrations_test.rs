//! Integration tests for the embedded migrations and `db-init` reporting.
//!
//! Uses the shared PostgreSQL from `plangate-test-utils`; each test runs in a
//! fresh temporary database.

use sqlx::Row;

use plangate_store::pool::{self, CollectionStats};
use plangate_store::{CollectionPath, DocumentStore, WriteFields};
use plangate_test_utils::TestDb;

#[tokio::test]
async fn migrations_create_documents_table() {
    let db = TestDb::empty().await;

    pool::run_migrations(&db.pool)
        .await
        .expect("migrations should succeed");

    let columns: Vec<String> = sqlx::query(
        "SELECT column_name::text FROM information_schema.columns \
         WHERE table_name = 'documents' ORDER BY ordinal_position",
    )
    .fetch_all(&db.pool)
    .await
    .expect("column query should succeed")
    .iter()
    .map(|row| row.get::<String, _>(0))
    .collect();

    for expected in ["collection", "id", "data", "timestamps", "seq", "created_at"] {
        assert!(
            columns.iter().any(|c| c == expected),
            "documents should have column {expected}, got {columns:?}"
        );
    }

    db.cleanup().await;
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let db = TestDb::empty().await;

    pool::run_migrations(&db.pool).await.expect("first run");
    pool::run_migrations(&db.pool).await.expect("second run");

    let stats = pool::collection_stats(&db.pool).await.expect("stats");
    assert!(stats.is_empty(), "fresh schema has no documents: {stats:?}");

    db.cleanup().await;
}

#[tokio::test]
async fn collection_stats_group_by_collection_kind() {
    let db = TestDb::migrated().await;
    let store = db.store();

    for uid in ["alice", "bob"] {
        let plans = CollectionPath::root("users").doc(uid).collection("plans");
        let plan = store.create(&plans, &WriteFields::new()).await.unwrap();
        store
            .set_merge(
                &plan.collection("details").doc("main"),
                &WriteFields::new().with("k", "v"),
            )
            .await
            .unwrap();
    }
    let alice = CollectionPath::root("users").doc("alice").collection("plans");
    store.create(&alice, &WriteFields::new()).await.unwrap();

    let stats = pool::collection_stats(&db.pool).await.expect("stats");
    assert_eq!(
        stats,
        vec![
            CollectionStats {
                kind: "details".to_owned(),
                collections: 2,
                documents: 2,
            },
            CollectionStats {
                kind: "plans".to_owned(),
                collections: 2,
                documents: 3,
            },
        ]
    );

    db.cleanup().await;
}

#[tokio::test]
async fn ensure_database_leaves_existing_database_alone() {
    let db = TestDb::empty().await;

    let created = pool::ensure_database(db.target()).await.unwrap();
    assert!(!created, "{} exists already", db.name());

    db.cleanup().await;
}

//! End-to-end gateway tests against the PostgreSQL document store.

use std::sync::Arc;

use chrono::DateTime;
use serde_json::json;

use plangate_core::gateway::{ErrorKind, PlanGateway};
use plangate_core::identity::Identity;
use plangate_test_utils::TestDb;

fn timestamp(value: &serde_json::Value) -> DateTime<chrono::FixedOffset> {
    let text = value.as_str().expect("timestamp should be text");
    DateTime::parse_from_rfc3339(text).expect("timestamp should be RFC 3339")
}

#[tokio::test]
async fn plan_lifecycle() {
    let db = TestDb::migrated().await;
    let gw = PlanGateway::new(Arc::new(db.store()));
    let caller = Identity::new("alice");

    let created = gw
        .create_plan(
            Some(&caller),
            json!({"planType": "budget", "formData": {"income": 4200}}),
        )
        .await
        .expect("create should succeed");

    let read = gw
        .read_plan(Some(&caller), json!({"planId": created.plan_id}))
        .await
        .expect("read should succeed");
    assert_eq!(read.plan["planName"], json!("Untitled Plan"));
    assert_eq!(read.plan["planType"], json!("budget"));
    assert_eq!(read.plan["formData"], json!({"income": 4200}));
    assert!(read.plan.get("details").is_none());
    let first_update = timestamp(&read.plan["lastUpdated"]);

    gw.update_plan(
        Some(&caller),
        json!({"planId": created.plan_id, "planName": "Household", "details": {"currency": "EUR"}}),
    )
    .await
    .expect("first update should succeed");
    gw.update_plan(
        Some(&caller),
        json!({
            "planId": created.plan_id,
            "planName": "Household",
            "details": {"period": "monthly"},
        }),
    )
    .await
    .expect("second update should succeed");

    let read = gw
        .read_plan(Some(&caller), json!({"planId": created.plan_id}))
        .await
        .expect("read should succeed");
    assert_eq!(read.plan["planName"], json!("Household"));
    assert_eq!(
        read.plan["details"],
        json!({"currency": "EUR", "period": "monthly"})
    );
    assert!(timestamp(&read.plan["lastUpdated"]) > first_update);

    let listed = gw.list_plans(Some(&caller)).await.expect("list should succeed");
    assert_eq!(listed.plans.len(), 1);
    assert_eq!(listed.plans[0].id, created.plan_id);
    assert!(timestamp(&listed.plans[0].last_updated) > first_update);

    gw.delete_plan(Some(&caller), json!({"planId": created.plan_id}))
        .await
        .expect("delete should succeed");
    gw.delete_plan(Some(&caller), json!({"planId": created.plan_id}))
        .await
        .expect("second delete should succeed");

    let err = gw
        .read_plan(Some(&caller), json!({"planId": created.plan_id}))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(count, 0, "plan and details should both be gone");

    db.cleanup().await;
}

#[tokio::test]
async fn update_of_missing_plan_is_internal() {
    let db = TestDb::migrated().await;
    let gw = PlanGateway::new(Arc::new(db.store()));

    let err = gw
        .update_plan(
            Some(&Identity::new("alice")),
            json!({"planId": "missing", "planName": "X"}),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Internal);
    assert_eq!(err.message, "Error updating plan.");

    db.cleanup().await;
}

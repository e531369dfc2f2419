mod common;

use common::stack;
use serde_json::json;

#[tokio::test]
async fn memories_recorded_under_one_project_path_are_invisible_to_another() {
    let (dispatcher, _branches) = stack().await;

    dispatcher
        .dispatch(
            "memory_record",
            json!({"project_path": "/home/dev/alpha", "content": "use a mutex here"}),
        )
        .await
        .unwrap();

    let own = dispatcher
        .dispatch(
            "memory_search",
            json!({"project_path": "/home/dev/alpha", "query": "mutex"}),
        )
        .await
        .unwrap();
    assert_eq!(own["count"], 1);

    let other = dispatcher
        .dispatch(
            "memory_search",
            json!({"project_path": "/home/dev/beta", "query": "mutex"}),
        )
        .await
        .unwrap();
    assert_eq!(other["count"], 0);
}

#[tokio::test]
async fn explicit_tenant_triple_isolates_independently_of_project_path() {
    let (dispatcher, _branches) = stack().await;

    dispatcher
        .dispatch(
            "memory_record",
            json!({
                "project_path": "/home/dev/shared",
                "tenant_id": "acme",
                "content": "rotate credentials monthly",
            }),
        )
        .await
        .unwrap();

    let same_tenant = dispatcher
        .dispatch(
            "memory_search",
            json!({
                "project_path": "/home/dev/shared",
                "tenant_id": "acme",
                "query": "rotate",
            }),
        )
        .await
        .unwrap();
    assert_eq!(same_tenant["count"], 1);

    let different_tenant = dispatcher
        .dispatch(
            "memory_search",
            json!({
                "project_path": "/home/dev/shared",
                "tenant_id": "other-co",
                "query": "rotate",
            }),
        )
        .await
        .unwrap();
    assert_eq!(different_tenant["count"], 0);
}

#[tokio::test]
async fn missing_project_path_fails_invalid_input_not_a_sentinel_tenant() {
    let (dispatcher, _branches) = stack().await;
    let err = dispatcher
        .dispatch("memory_search", json!({"query": "anything"}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        contextd::errors::ContextdError::InvalidInput { .. }
    ));
}

#[tokio::test]
async fn path_traversal_in_tenant_fields_is_rejected() {
    let (dispatcher, _branches) = stack().await;
    let err = dispatcher
        .dispatch(
            "memory_search",
            json!({"project_path": "/p", "team_id": "../../etc", "query": "x"}),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        contextd::errors::ContextdError::InvalidTenant(_)
    ));
}

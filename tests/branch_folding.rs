mod common;

use common::stack;
use serde_json::json;

#[tokio::test]
async fn nesting_past_max_depth_is_rejected() {
    let (dispatcher, _branches) = stack().await;

    let b0 = dispatcher
        .dispatch(
            "branch_create",
            json!({"session_id": "s", "description": "depth 0"}),
        )
        .await
        .unwrap();
    assert_eq!(b0["depth"], 0);

    let b1 = dispatcher
        .dispatch(
            "branch_create",
            json!({"session_id": "s", "description": "depth 1"}),
        )
        .await
        .unwrap();
    assert_eq!(b1["depth"], 1);

    let b2 = dispatcher
        .dispatch(
            "branch_create",
            json!({"session_id": "s", "description": "depth 2"}),
        )
        .await
        .unwrap();
    assert_eq!(b2["depth"], 2);

    let err = dispatcher
        .dispatch(
            "branch_create",
            json!({"session_id": "s", "description": "depth 3"}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, contextd::errors::ContextdError::DepthExceeded { .. }));
}

#[tokio::test]
async fn returning_a_parent_force_returns_its_children() {
    let (dispatcher, _branches) = stack().await;

    let parent = dispatcher
        .dispatch(
            "branch_create",
            json!({"session_id": "s2", "description": "parent", "budget": 1000}),
        )
        .await
        .unwrap();
    let parent_id = parent["id"].as_str().unwrap().to_string();

    let child = dispatcher
        .dispatch(
            "branch_create",
            json!({"session_id": "s2", "description": "child"}),
        )
        .await
        .unwrap();
    let child_id = child["id"].as_str().unwrap().to_string();
    assert_eq!(child["depth"], 1);

    dispatcher
        .dispatch(
            "branch_return",
            json!({"branch_id": parent_id, "message": "parent done"}),
        )
        .await
        .unwrap();

    let child_status = dispatcher
        .dispatch("branch_status", json!({"branch_id": child_id}))
        .await
        .unwrap();
    assert_eq!(child_status["status"], "force_returned");
}

#[tokio::test]
async fn unknown_branch_id_is_not_found() {
    let (dispatcher, _branches) = stack().await;
    let err = dispatcher
        .dispatch("branch_status", json!({"branch_id": "nope"}))
        .await
        .unwrap_err();
    assert!(matches!(err, contextd::errors::ContextdError::NotFound(_)));
}

#[tokio::test]
async fn shutdown_force_returns_every_active_branch() {
    let (dispatcher, branches) = stack().await;
    let created = dispatcher
        .dispatch(
            "branch_create",
            json!({"session_id": "s3", "description": "outstanding"}),
        )
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    branches.shutdown().await;

    let status = dispatcher
        .dispatch("branch_status", json!({"branch_id": id}))
        .await
        .unwrap();
    assert_eq!(status["status"], "force_returned");
}

mod common;

use common::stack;
use serde_json::json;

#[tokio::test]
async fn unknown_content_mode_is_rejected() {
    let (dispatcher, _branches) = stack().await;
    let err = dispatcher
        .dispatch(
            "repository_search",
            json!({
                "project_path": "/home/dev/repo-content-mode",
                "query": "do_work",
                "content_mode": "verbose",
            }),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        contextd::errors::ContextdError::InvalidInput { .. }
    ));
}

#[tokio::test]
async fn content_mode_parsing_is_case_sensitive() {
    let (dispatcher, _branches) = stack().await;
    let err = dispatcher
        .dispatch(
            "repository_search",
            json!({
                "project_path": "/home/dev/repo-content-mode",
                "query": "anything",
                "content_mode": "Full",
            }),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        contextd::errors::ContextdError::InvalidInput { .. }
    ));
}

#[tokio::test]
async fn omitted_content_mode_defaults_to_minimal_and_is_accepted() {
    let (dispatcher, _branches) = stack().await;
    let result = dispatcher
        .dispatch(
            "repository_search",
            json!({"project_path": "/home/dev/repo-content-mode", "query": "anything"}),
        )
        .await
        .unwrap();
    assert_eq!(result["count"], 0);
}

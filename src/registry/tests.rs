use super::*;

fn descriptor(name: &str, description: &str, keywords: &[&str]) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        category: ToolCategory::Memory,
        defer_loading: true,
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        input_schema: serde_json::json!({}),
    }
}

#[tokio::test]
async fn register_rejects_empty_name_and_description() {
    let registry = ToolRegistry::new();
    let bad_name = descriptor("", "desc", &[]);
    assert!(registry.register(bad_name).await.is_err());

    let bad_desc = ToolDescriptor {
        description: String::new(),
        ..descriptor("tool", "desc", &[])
    };
    assert!(registry.register(bad_desc).await.is_err());
}

#[tokio::test]
async fn register_overwrites_duplicate_silently() {
    let registry = ToolRegistry::new();
    registry.register(descriptor("memory_search", "v1", &[])).await.unwrap();
    registry.register(descriptor("memory_search", "v2", &[])).await.unwrap();
    let got = registry.get("memory_search").await.unwrap();
    assert_eq!(got.description, "v2");
    assert_eq!(registry.count().await, 1);
}

#[tokio::test]
async fn register_all_rejects_batch_with_existing_duplicate() {
    let registry = ToolRegistry::new();
    registry.register(descriptor("memory_search", "v1", &[])).await.unwrap();
    let result = registry
        .register_all(vec![descriptor("memory_search", "v2", &[]), descriptor("other", "d", &[])])
        .await;
    assert!(result.is_err());
    assert_eq!(registry.count().await, 1);
}

#[tokio::test]
async fn register_all_rejects_in_batch_duplicate() {
    let registry = ToolRegistry::new();
    let result = registry
        .register_all(vec![descriptor("a", "d", &[]), descriptor("a", "d2", &[])])
        .await;
    assert!(result.is_err());
    assert_eq!(registry.count().await, 0);
}

async fn memory_registry() -> ToolRegistry {
    let registry = ToolRegistry::new();
    registry
        .register_all(vec![
            descriptor("memory_search", "search stored memories", &["memory", "recall"]),
            descriptor("memory_record", "record a new memory", &["memory"]),
            descriptor("memory_feedback", "rate a memory result", &["memory"]),
            descriptor("memory_outcome", "report memory outcome", &["memory"]),
            descriptor("recall_similar", "find similar prior context", &["memory"]),
            descriptor("get_user_data", "fetch user data", &[]),
            descriptor("get_project_data", "fetch project data", &[]),
        ])
        .await
        .unwrap();
    registry
}

#[tokio::test]
async fn search_empty_query_returns_no_results() {
    let registry = memory_registry().await;
    assert!(registry.search("").await.is_empty());
}

#[tokio::test]
async fn search_memory_scores_five_results() {
    let registry = memory_registry().await;
    let results = registry.search("memory").await;
    let scores: Vec<u8> = results.iter().map(|r| r.score).collect();
    assert_eq!(results.len(), 5);
    assert_eq!(scores, vec![2, 2, 2, 2, 1]);
}

#[tokio::test]
async fn search_exact_name_scores_highest() {
    let registry = memory_registry().await;
    let results = registry.search("memory_search").await;
    assert_eq!(results[0].score, 3);
    assert_eq!(results[0].match_reason, MatchReason::ExactNameMatch);
}

#[tokio::test]
async fn search_regex_pattern_matches_two_get_tools() {
    let registry = memory_registry().await;
    let results = registry.search("get_.*_data").await;
    assert_eq!(results.len(), 2);
    for r in &results {
        assert_eq!(r.score, 2);
        assert_eq!(r.match_reason, MatchReason::NameMatchesPattern);
    }
}

#[tokio::test]
async fn search_is_deterministic_across_repeated_calls() {
    let registry = memory_registry().await;
    let first = registry.search("memory").await;
    let second = registry.search("memory").await;
    let first_names: Vec<_> = first.iter().map(|r| r.tool_descriptor.name.clone()).collect();
    let second_names: Vec<_> = second.iter().map(|r| r.tool_descriptor.name.clone()).collect();
    assert_eq!(first_names, second_names);
}

#[tokio::test]
async fn search_degrades_to_literal_on_invalid_regex() {
    let registry = memory_registry().await;
    // Unbalanced paren is invalid regex; degrades to literal-contains scan.
    let results = registry.search("memory(").await;
    assert!(results.is_empty());
}

#[tokio::test]
async fn search_by_category_filters_out_other_categories() {
    let registry = ToolRegistry::new();
    registry
        .register(ToolDescriptor {
            category: ToolCategory::Checkpoint,
            ..descriptor("checkpoint_save", "save a checkpoint", &["memory"])
        })
        .await
        .unwrap();
    registry.register(descriptor("memory_search", "search memories", &["memory"])).await.unwrap();

    let results = registry.search_by_category("memory", ToolCategory::Memory).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].tool_descriptor.name, "memory_search");
}

#[tokio::test]
async fn list_deferred_and_non_deferred_partition_the_catalogue() {
    let registry = ToolRegistry::new();
    registry.register(descriptor("tool_search", "discover tools", &[])).await.unwrap();
    registry
        .register(ToolDescriptor {
            defer_loading: false,
            ..descriptor("memory_search", "search memories", &[])
        })
        .await
        .unwrap();

    let deferred = registry.list_deferred().await;
    let non_deferred = registry.list_non_deferred().await;
    assert_eq!(deferred.len() + non_deferred.len(), registry.count().await);
    assert!(non_deferred.iter().any(|d| d.name == "memory_search"));
}

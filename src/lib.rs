#![warn(clippy::pedantic)]
// Noisy doc/signature lints — would require annotating hundreds of pub functions.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// Intentional casts throughout the scoring/metrics/token-budget paths (scores,
// byte offsets, token counts).
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::module_name_repetitions)]

pub mod branch;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod metrics;
pub mod registry;
pub mod security;
pub mod storage;
pub mod tenant;
pub mod transport;
pub mod validation;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wire up the full in-process stack: registry populated with the built-in
/// catalogue, a branch manager, and a dispatcher over the given storage
/// collaborators. Shared by `main.rs` and every transport's integration
/// tests so there is exactly one place that assembles these pieces.
pub async fn build_dispatcher(
    config: &config::Config,
    store: std::sync::Arc<dyn storage::VectorStore>,
    embedder: std::sync::Arc<dyn storage::EmbeddingProvider>,
) -> anyhow::Result<(dispatch::Dispatcher, branch::BranchManager)> {
    let registry = std::sync::Arc::new(registry::ToolRegistry::new());
    dispatch::catalogue::populate_defaults(&registry).await?;

    let scrubber = std::sync::Arc::new(security::SecretScrubber::new());
    let branch_config = branch::BranchManagerConfig {
        default_budget: config.branch.default_budget,
        default_timeout_seconds: config.branch.default_timeout_seconds,
        max_depth: config.branch.max_depth,
    };
    let branches = branch::BranchManager::new(branch_config, scrubber.clone());

    let dispatcher = dispatch::Dispatcher::new(
        registry,
        branches.clone(),
        store,
        embedder,
        scrubber,
        config.server_name.clone(),
        config.server_version.clone(),
    );

    Ok((dispatcher, branches))
}

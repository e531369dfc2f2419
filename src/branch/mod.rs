//! Context-folding branch manager (spec.md §4.G).
//!
//! Grounded on the teacher's `agent::subagent::SubagentManager`: a shared
//! manager owning all mutable branch state, background tasks racing a
//! timeout against a cancellation signal (teacher's `tokio::time::timeout`
//! around `run_subagent`), and an `Arc`-shared inner config. Unlike the
//! teacher, which enforces a *concurrency* cap with a semaphore, contextd
//! enforces a *depth* cap per spec.md §4.G — the nesting discipline, not
//! the number of in-flight branches, is what's bounded here.
//!
//! Per design note §9 and §5, a single `tokio::sync::Mutex` linearises every
//! state transition: the state space is small and operations on distinct
//! branches still interleave freely since the lock is held only across the
//! synchronous bookkeeping, never across an `.await` for I/O.

use crate::errors::{ContextdError, ContextdResult};
use crate::security::SecretScrubber;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

#[cfg(test)]
mod tests;

pub type BranchId = String;

/// Terminal or in-flight lifecycle state of a branch (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchStatus {
    Active,
    Completed,
    Failed,
    Timeout,
    ForceReturned,
}

impl BranchStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, BranchStatus::Active)
    }
}

/// A context-folding branch (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub session_id: String,
    pub parent_id: Option<BranchId>,
    pub depth: usize,
    pub status: BranchStatus,
    pub budget_total: u64,
    /// Authoritative only once `status` is terminal; while `Active`, the
    /// budget tracker is authoritative (spec.md §3).
    pub budget_used: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub deadline: chrono::DateTime<chrono::Utc>,
    pub description: String,
    pub prompt: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BranchCreateRequest {
    pub session_id: String,
    pub description: String,
    pub prompt: Option<String>,
    pub budget: Option<u64>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchCreateResponse {
    pub id: BranchId,
    pub budget_allocated: u64,
    pub depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchReturnResponse {
    pub success: bool,
    pub tokens_used: u64,
    pub scrubbed_message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BranchHealth {
    pub healthy: bool,
    pub active_count: usize,
    pub is_shutdown: bool,
}

/// Configuration the manager needs from `config::BranchConfig`, decoupled
/// from the config module so branch tests don't depend on it.
#[derive(Debug, Clone, Copy)]
pub struct BranchManagerConfig {
    pub default_budget: u64,
    pub default_timeout_seconds: u64,
    pub max_depth: usize,
}

impl Default for BranchManagerConfig {
    fn default() -> Self {
        Self {
            default_budget: 8192,
            default_timeout_seconds: 300,
            max_depth: 3,
        }
    }
}

struct State {
    branches: HashMap<BranchId, Branch>,
    /// Per-session, per-depth index of the currently active branch — used
    /// both to find "the parent" on `create` and to enforce "at most one
    /// active branch per session per depth" (spec.md §3).
    active_by_session_depth: HashMap<(String, usize), BranchId>,
    /// Monotonic token consumption per branch, authoritative while `Active`
    /// (spec.md §3's "budget tracker entry").
    budget_tracker: HashMap<BranchId, u64>,
    /// Cancellation handle for each branch's timeout task, fired on an
    /// explicit `return`/`force_return` so the background timer never races
    /// a terminal transition it no longer needs to make.
    timer_cancels: HashMap<BranchId, oneshot::Sender<()>>,
    is_shutdown: bool,
}

impl State {
    fn new() -> Self {
        Self {
            branches: HashMap::new(),
            active_by_session_depth: HashMap::new(),
            budget_tracker: HashMap::new(),
            timer_cancels: HashMap::new(),
            is_shutdown: false,
        }
    }

    fn children_of(&self, branch_id: &str) -> Vec<BranchId> {
        let mut out: Vec<BranchId> = self
            .branches
            .values()
            .filter(|b| b.parent_id.as_deref() == Some(branch_id) && b.status == BranchStatus::Active)
            .map(|b| b.id.clone())
            .collect();
        out.sort();
        out
    }

    /// Transition a single branch to a terminal status, syncing its
    /// `budget_used` from the tracker and clearing the active-branch index
    /// entry and timer. Does not recurse into descendants — callers handle
    /// that (parent-before-children ordering differs by call site).
    fn terminate_one(&mut self, branch_id: &str, status: BranchStatus) {
        let Some(branch) = self.branches.get_mut(branch_id) else {
            return;
        };
        if branch.status.is_terminal() {
            return;
        }
        let used = self.budget_tracker.get(branch_id).copied().unwrap_or(0);
        branch.budget_used = used;
        branch.status = status;
        self.active_by_session_depth
            .remove(&(branch.session_id.clone(), branch.depth));
        if let Some(cancel) = self.timer_cancels.remove(branch_id) {
            let _ = cancel.send(());
        }
    }
}

/// Owns all mutable branch state (spec.md §4.G, §5). Cheap to clone (an
/// `Arc` around the inner mutex) so it can be shared with spawned timeout
/// tasks the same way the teacher shares `SubagentManager`'s config.
#[derive(Clone)]
pub struct BranchManager {
    state: Arc<Mutex<State>>,
    config: BranchManagerConfig,
    scrubber: Arc<SecretScrubber>,
}

impl BranchManager {
    pub fn new(config: BranchManagerConfig, scrubber: Arc<SecretScrubber>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::new())),
            config,
            scrubber,
        }
    }

    /// Create a new branch (spec.md §4.G). The parent is the session's
    /// currently-active branch, if any; a fresh budget is always allocated
    /// from the request, never inherited (spec.md §9's resolved open
    /// question).
    pub async fn create(&self, request: BranchCreateRequest) -> ContextdResult<BranchCreateResponse> {
        if request.description.trim().is_empty() {
            return Err(ContextdError::InvalidInput {
                field: "description".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        let mut state = self.state.lock().await;
        if state.is_shutdown {
            return Err(ContextdError::Conflict(
                "branch manager is shut down".to_string(),
            ));
        }

        let parent = state
            .active_by_session_depth
            .iter()
            .filter(|((session, _), _)| *session == request.session_id)
            .max_by_key(|((_, depth), _)| *depth)
            .map(|(_, id)| id.clone());

        let depth = match &parent {
            Some(parent_id) => state.branches[parent_id].depth + 1,
            None => 0,
        };

        if depth >= self.config.max_depth {
            return Err(ContextdError::DepthExceeded {
                max_depth: self.config.max_depth,
            });
        }

        let id = uuid::Uuid::new_v4().to_string();
        let budget_total = request.budget.unwrap_or(self.config.default_budget);
        let timeout_secs = request
            .timeout_seconds
            .unwrap_or(self.config.default_timeout_seconds);
        let now = chrono::Utc::now();
        let deadline = now + chrono::Duration::seconds(timeout_secs as i64);

        let branch = Branch {
            id: id.clone(),
            session_id: request.session_id.clone(),
            parent_id: parent,
            depth,
            status: BranchStatus::Active,
            budget_total,
            budget_used: 0,
            created_at: now,
            deadline,
            description: request.description,
            prompt: request.prompt,
        };

        state.branches.insert(id.clone(), branch);
        state
            .active_by_session_depth
            .insert((request.session_id.clone(), depth), id.clone());
        state.budget_tracker.insert(id.clone(), 0);

        let (cancel_tx, cancel_rx) = oneshot::channel();
        state.timer_cancels.insert(id.clone(), cancel_tx);
        drop(state);

        self.spawn_timeout_watcher(id.clone(), Duration::from_secs(timeout_secs), cancel_rx);

        info!(branch_id = %id, session_id = %request.session_id, depth, "branch_created");

        Ok(BranchCreateResponse {
            id,
            budget_allocated: budget_total,
            depth,
        })
    }

    fn spawn_timeout_watcher(
        &self,
        branch_id: BranchId,
        timeout: Duration,
        cancel: oneshot::Receiver<()>,
    ) {
        let manager = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    manager.handle_timeout(&branch_id).await;
                }
                _ = cancel => {
                    debug!(branch_id = %branch_id, "branch timer cancelled");
                }
            }
        });
    }

    async fn handle_timeout(&self, branch_id: &str) {
        let mut state = self.state.lock().await;
        let Some(branch) = state.branches.get(branch_id) else {
            return;
        };
        if branch.status.is_terminal() {
            return;
        }
        self.force_return_descendants(&mut state, branch_id);
        state.terminate_one(branch_id, BranchStatus::Timeout);
        warn!(branch_id = %branch_id, "branch_timeout");
    }

    /// Return from a branch (spec.md §4.G). Force-returns active
    /// descendants depth-first before completing the branch itself, so a
    /// parent never observes a child still `active` once its own `return`
    /// resolves.
    pub async fn return_branch(
        &self,
        branch_id: &str,
        message: &str,
    ) -> ContextdResult<BranchReturnResponse> {
        let mut state = self.state.lock().await;
        let branch = state
            .branches
            .get(branch_id)
            .ok_or_else(|| ContextdError::NotFound(format!("branch '{branch_id}'")))?;
        if branch.status.is_terminal() {
            return Err(ContextdError::Conflict(format!(
                "branch '{branch_id}' already in terminal state {:?}",
                branch.status
            )));
        }

        self.force_return_descendants(&mut state, branch_id);
        let budget_total = state.branches[branch_id].budget_total;

        // Budget enforcement is advisory while `Active`; it becomes
        // authoritative only here, at terminal commit (spec.md §4.G, §8).
        // An overrun still terminates the branch — as `Failed`, not
        // `Completed` — and `budget_used` is clamped to `budget_total` so
        // the "budget_used <= budget_total at terminal state" invariant
        // holds for every branch that reaches a terminal state.
        let raw_used = state.budget_tracker.get(branch_id).copied().unwrap_or(0);
        let overrun = raw_used > budget_total;
        let status = if overrun {
            BranchStatus::Failed
        } else {
            BranchStatus::Completed
        };
        state.terminate_one(branch_id, status);
        if overrun {
            state.branches.get_mut(branch_id).unwrap().budget_used = budget_total;
        }
        let tokens_used = state.branches[branch_id].budget_used;
        drop(state);

        let scrub_result = self.scrubber.scrub(message);

        if overrun {
            warn!(branch_id = %branch_id, raw_used, budget_total, "branch_budget_exceeded");
            return Err(ContextdError::BudgetExceeded {
                used: raw_used,
                total: budget_total,
            });
        }

        info!(branch_id = %branch_id, tokens_used, "branch_returned");

        Ok(BranchReturnResponse {
            success: true,
            tokens_used,
            scrubbed_message: scrub_result.scrubbed,
        })
    }

    /// Depth-first force-return of every active descendant of `branch_id`.
    /// Called with the lock already held.
    fn force_return_descendants(&self, state: &mut State, branch_id: &str) {
        let children = state.children_of(branch_id);
        for child in children {
            self.force_return_descendants(state, &child);
            state.terminate_one(&child, BranchStatus::ForceReturned);
            debug!(branch_id = %child, "branch_force_returned");
        }
    }

    pub async fn get(&self, branch_id: &str) -> Option<Branch> {
        self.state.lock().await.branches.get(branch_id).cloned()
    }

    /// The deepest active branch for a session, if any (spec.md §4.G).
    pub async fn get_active(&self, session_id: &str) -> Option<Branch> {
        let state = self.state.lock().await;
        let id = state
            .active_by_session_depth
            .iter()
            .filter(|((session, _), _)| session == session_id)
            .max_by_key(|((_, depth), _)| *depth)
            .map(|(_, id)| id.clone())?;
        state.branches.get(&id).cloned()
    }

    /// Increment a branch's consumed-token count. Succeeds even past
    /// `budget_total` — enforcement is advisory while `Active`, authoritative
    /// only at terminal commit (spec.md §4.G).
    pub async fn consume_tokens(&self, branch_id: &str, n: u64) -> ContextdResult<u64> {
        let mut state = self.state.lock().await;
        let branch = state
            .branches
            .get(branch_id)
            .ok_or_else(|| ContextdError::NotFound(format!("branch '{branch_id}'")))?;
        if branch.status.is_terminal() {
            return Err(ContextdError::Conflict(format!(
                "branch '{branch_id}' is not active"
            )));
        }
        let entry = state.budget_tracker.entry(branch_id.to_string()).or_insert(0);
        *entry += n;
        Ok(*entry)
    }

    pub async fn health(&self) -> BranchHealth {
        let state = self.state.lock().await;
        let active_count = state
            .branches
            .values()
            .filter(|b| b.status == BranchStatus::Active)
            .count();
        BranchHealth {
            healthy: true,
            active_count,
            is_shutdown: state.is_shutdown,
        }
    }

    /// Refuse new `create` calls, force-return every active branch
    /// depth-first (deepest first), then flush timers (spec.md §5).
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        state.is_shutdown = true;
        let mut active: Vec<Branch> = state
            .branches
            .values()
            .filter(|b| b.status == BranchStatus::Active)
            .cloned()
            .collect();
        active.sort_by(|a, b| b.depth.cmp(&a.depth));
        for branch in active {
            state.terminate_one(&branch.id, BranchStatus::ForceReturned);
        }
        info!("branch manager shutdown complete");
    }
}

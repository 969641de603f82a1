//! In-process deduping scheduler.
//!
//! Remembers every (suite, build, board, pool) it has accepted and refuses
//! to accept the same combination twice unless forced. The binary uses it
//! for dry runs; tests use it as a well-behaved scheduler. Only the most
//! recent accepted requests are kept for inspection.

use async_trait::async_trait;
use buildwatch_core::Result;
use buildwatch_core::ports::{DedupingScheduler, SuiteRequest};
use std::collections::{HashSet, VecDeque};
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SuiteKey {
    suite: String,
    build: String,
    board: String,
    pool: Option<String>,
}

impl From<&SuiteRequest> for SuiteKey {
    fn from(request: &SuiteRequest) -> Self {
        Self {
            suite: request.suite.clone(),
            build: request.build.clone(),
            board: request.board.clone(),
            pool: request.pool.clone(),
        }
    }
}

const DEFAULT_ACCEPTED_LIMIT: usize = 1024;

#[derive(Default)]
struct State {
    seen: HashSet<SuiteKey>,
    accepted: VecDeque<SuiteRequest>,
}

/// Deduping scheduler that records accepted requests in memory.
pub struct InMemoryDedupingScheduler {
    state: RwLock<State>,
    accepted_limit: usize,
}

impl Default for InMemoryDedupingScheduler {
    fn default() -> Self {
        Self {
            state: RwLock::default(),
            accepted_limit: DEFAULT_ACCEPTED_LIMIT,
        }
    }
}

impl InMemoryDedupingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `limit` accepted requests around for [`accepted`](Self::accepted).
    pub fn with_accepted_limit(mut self, limit: usize) -> Self {
        self.accepted_limit = limit;
        self
    }

    /// The most recently accepted requests, oldest first.
    pub async fn accepted(&self) -> Vec<SuiteRequest> {
        self.state.read().await.accepted.iter().cloned().collect()
    }
}

#[async_trait]
impl DedupingScheduler for InMemoryDedupingScheduler {
    async fn schedule_suite(&self, request: &SuiteRequest) -> Result<bool> {
        let mut state = self.state.write().await;
        let fresh = state.seen.insert(SuiteKey::from(request));
        if !fresh && !request.force {
            return Ok(false);
        }

        info!(
            suite = %request.suite,
            build = %request.build,
            board = %request.board,
            pool = request.pool.as_deref().unwrap_or("-"),
            priority = ?request.priority,
            force = request.force,
            "Accepted suite"
        );
        if state.accepted.len() >= self.accepted_limit {
            state.accepted.pop_front();
        }
        if self.accepted_limit > 0 {
            state.accepted.push_back(request.clone());
        }
        Ok(true)
    }
}

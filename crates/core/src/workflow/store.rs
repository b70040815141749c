//! Run persistence contract.
//!
//! The engine talks to its storage through [`RunStore`] so the same
//! claim-execute-advance loop drives both the SQL-backed store and the
//! in-memory [`MemoryRunStore`] used in tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use libris_shared::types::WorkflowRunId;

use crate::workflow::error::WorkflowError;
use crate::workflow::types::{ProcessKind, RunCursor, RunStatus, WorkflowRun};

/// A run about to be inserted.
#[derive(Debug, Clone)]
pub struct NewRun {
    /// Which workflow the run executes.
    pub kind: ProcessKind,
    /// Kind-specific payload captured at trigger time.
    pub payload: serde_json::Value,
    /// First step to execute.
    pub cursor: RunCursor,
    /// When the first step should fire.
    pub wake_at: DateTime<Utc>,
}

/// Persistence operations the engine needs.
///
/// Implementations must make `claim_due` exclusive: a run handed to one
/// caller must not be handed to another until the lease expires. The
/// lease doubles as the retry delay for failed steps, since a claimed
/// run that never advances becomes due again once the lease runs out.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Inserts a new scheduled run and returns its ID.
    async fn insert(&self, run: NewRun) -> Result<WorkflowRunId, WorkflowError>;

    /// Claims up to `limit` scheduled runs whose wake time has passed,
    /// ordered by wake time. Claimed runs have their wake time pushed
    /// to `now + lease`; the returned snapshots carry the pre-claim
    /// values.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        limit: u64,
    ) -> Result<Vec<WorkflowRun>, WorkflowError>;

    /// Whether `step_key` has already been recorded for `run`.
    async fn step_is_done(
        &self,
        run: WorkflowRunId,
        step_key: &str,
    ) -> Result<bool, WorkflowError>;

    /// Records `step_key` for `run`. Returns true if this call recorded
    /// it, false if it was already there.
    async fn mark_step_done(
        &self,
        run: WorkflowRunId,
        step_key: &str,
    ) -> Result<bool, WorkflowError>;

    /// Moves `run` to its next step and wake time.
    async fn advance(
        &self,
        run: WorkflowRunId,
        cursor: RunCursor,
        wake_at: DateTime<Utc>,
    ) -> Result<(), WorkflowError>;

    /// Deletes a finished run and its step records.
    async fn complete(&self, run: WorkflowRunId) -> Result<(), WorkflowError>;

    /// Bumps the failure counter for `run`.
    async fn record_failure(&self, run: WorkflowRunId) -> Result<(), WorkflowError>;

    /// Marks `run` retired so it is never claimed again. Returns false
    /// if no such run exists.
    async fn retire(&self, run: WorkflowRunId) -> Result<bool, WorkflowError>;

    /// Finds the scheduled run of `kind` whose payload email matches.
    async fn find_scheduled_for(
        &self,
        kind: ProcessKind,
        email: &str,
    ) -> Result<Option<WorkflowRunId>, WorkflowError>;

    /// Looks up a run by ID.
    async fn find(&self, run: WorkflowRunId) -> Result<Option<WorkflowRun>, WorkflowError>;
}

/// In-memory run store for tests.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    runs: DashMap<WorkflowRunId, WorkflowRun>,
    steps: DashMap<(WorkflowRunId, String), ()>,
}

impl MemoryRunStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Whether the store holds no runs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn insert(&self, run: NewRun) -> Result<WorkflowRunId, WorkflowError> {
        let id = WorkflowRunId::new();
        self.runs.insert(
            id,
            WorkflowRun {
                id,
                kind: run.kind,
                payload: run.payload,
                cursor: run.cursor,
                wake_at: run.wake_at,
                status: RunStatus::Scheduled,
                attempts: 0,
            },
        );
        Ok(id)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        limit: u64,
    ) -> Result<Vec<WorkflowRun>, WorkflowError> {
        let mut due: Vec<(DateTime<Utc>, WorkflowRunId)> = self
            .runs
            .iter()
            .filter(|r| r.status == RunStatus::Scheduled && r.wake_at <= now)
            .map(|r| (r.wake_at, r.id))
            .collect();
        due.sort_by_key(|(wake_at, _)| *wake_at);
        due.truncate(usize::try_from(limit).unwrap_or(usize::MAX));

        let mut claimed = Vec::with_capacity(due.len());
        for (_, id) in due {
            if let Some(mut entry) = self.runs.get_mut(&id) {
                // Re-check under the entry lock; another claimer may
                // have leased this run between the scan and here.
                if entry.status == RunStatus::Scheduled && entry.wake_at <= now {
                    let snapshot = entry.clone();
                    entry.wake_at = now + lease;
                    claimed.push(snapshot);
                }
            }
        }
        Ok(claimed)
    }

    async fn step_is_done(
        &self,
        run: WorkflowRunId,
        step_key: &str,
    ) -> Result<bool, WorkflowError> {
        Ok(self.steps.contains_key(&(run, step_key.to_string())))
    }

    async fn mark_step_done(
        &self,
        run: WorkflowRunId,
        step_key: &str,
    ) -> Result<bool, WorkflowError> {
        Ok(self.steps.insert((run, step_key.to_string()), ()).is_none())
    }

    async fn advance(
        &self,
        run: WorkflowRunId,
        cursor: RunCursor,
        wake_at: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        let mut entry = self
            .runs
            .get_mut(&run)
            .ok_or(WorkflowError::RunNotFound(run))?;
        entry.cursor = cursor;
        entry.wake_at = wake_at;
        Ok(())
    }

    async fn complete(&self, run: WorkflowRunId) -> Result<(), WorkflowError> {
        self.runs.remove(&run);
        self.steps.retain(|(id, _), ()| *id != run);
        Ok(())
    }

    async fn record_failure(&self, run: WorkflowRunId) -> Result<(), WorkflowError> {
        if let Some(mut entry) = self.runs.get_mut(&run) {
            entry.attempts += 1;
        }
        Ok(())
    }

    async fn retire(&self, run: WorkflowRunId) -> Result<bool, WorkflowError> {
        match self.runs.get_mut(&run) {
            Some(mut entry) => {
                entry.status = RunStatus::Retired;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_scheduled_for(
        &self,
        kind: ProcessKind,
        email: &str,
    ) -> Result<Option<WorkflowRunId>, WorkflowError> {
        Ok(self
            .runs
            .iter()
            .find(|r| {
                r.status == RunStatus::Scheduled
                    && r.kind == kind
                    && r.payload.get("email").and_then(serde_json::Value::as_str) == Some(email)
            })
            .map(|r| r.id))
    }

    async fn find(&self, run: WorkflowRunId) -> Result<Option<WorkflowRun>, WorkflowError> {
        Ok(self.runs.get(&run).map(|r| r.value().clone()))
    }
}

//! SQL-backed run store for the durable workflow engine.
//!
//! Implements the core [`RunStore`] contract on top of the
//! `workflow_runs` and `workflow_steps` tables. Claiming is exclusive
//! across processes: a claim is a conditional update that pushes the
//! wake time forward, and only the poller whose update lands owns the
//! run until that lease expires.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use libris_core::workflow::{
    NewRun, ProcessKind, RunCursor, RunStatus, RunStore, WorkflowError, WorkflowRun,
};
use libris_shared::types::WorkflowRunId;

use crate::entities::{sea_orm_active_enums, workflow_runs, workflow_steps};

/// Run store backed by Postgres.
#[derive(Debug, Clone)]
pub struct SeaOrmRunStore {
    db: DatabaseConnection,
}

impl SeaOrmRunStore {
    /// Creates a new run store.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RunStore for SeaOrmRunStore {
    async fn insert(&self, run: NewRun) -> Result<WorkflowRunId, WorkflowError> {
        let id = WorkflowRunId::new();
        let now = Utc::now().into();

        workflow_runs::ActiveModel {
            id: Set(id.into_inner()),
            kind: Set(kind_to_db(run.kind)),
            payload: Set(run.payload),
            step_cursor: Set(run.cursor.to_string()),
            wake_at: Set(run.wake_at.into()),
            status: Set(sea_orm_active_enums::WorkflowRunStatus::Scheduled),
            attempts: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await
        .map_err(db_err)?;

        Ok(id)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        limit: u64,
    ) -> Result<Vec<WorkflowRun>, WorkflowError> {
        let candidates = workflow_runs::Entity::find()
            .filter(
                workflow_runs::Column::Status.eq(sea_orm_active_enums::WorkflowRunStatus::Scheduled),
            )
            .filter(workflow_runs::Column::WakeAt.lte(now))
            .order_by_asc(workflow_runs::Column::WakeAt)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(db_err)?;

        let leased_until: sea_orm::prelude::DateTimeWithTimeZone = (now + lease).into();
        let mut claimed = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            // The wake_at equality guard makes the claim exclusive: if a
            // concurrent poller already pushed the lease, zero rows match.
            let result = workflow_runs::Entity::update_many()
                .col_expr(workflow_runs::Column::WakeAt, Expr::value(leased_until))
                .filter(workflow_runs::Column::Id.eq(candidate.id))
                .filter(
                    workflow_runs::Column::Status
                        .eq(sea_orm_active_enums::WorkflowRunStatus::Scheduled),
                )
                .filter(workflow_runs::Column::WakeAt.eq(candidate.wake_at))
                .exec(&self.db)
                .await
                .map_err(db_err)?;

            if result.rows_affected == 1 {
                match run_to_core(candidate) {
                    Ok(run) => claimed.push(run),
                    // A row we cannot decode stays leased and is retried
                    // after the lease expires; do not wedge the batch.
                    Err(err) => tracing::error!(error = %err, "skipping undecodable run"),
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
        let count = workflow_steps::Entity::find()
            .filter(workflow_steps::Column::RunId.eq(run.into_inner()))
            .filter(workflow_steps::Column::StepKey.eq(step_key))
            .count(&self.db)
            .await
            .map_err(db_err)?;

        Ok(count > 0)
    }

    async fn mark_step_done(
        &self,
        run: WorkflowRunId,
        step_key: &str,
    ) -> Result<bool, WorkflowError> {
        let step = workflow_steps::ActiveModel {
            id: Set(Uuid::new_v4()),
            run_id: Set(run.into_inner()),
            step_key: Set(step_key.to_string()),
            completed_at: Set(Utc::now().into()),
        };

        // Unique (run_id, step_key) turns a repeat into a no-op.
        let inserted = workflow_steps::Entity::insert(step)
            .on_conflict(
                OnConflict::columns([
                    workflow_steps::Column::RunId,
                    workflow_steps::Column::StepKey,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(db_err)?;

        Ok(inserted == 1)
    }

    async fn advance(
        &self,
        run: WorkflowRunId,
        cursor: RunCursor,
        wake_at: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        let wake: sea_orm::prelude::DateTimeWithTimeZone = wake_at.into();
        let result = workflow_runs::Entity::update_many()
            .col_expr(
                workflow_runs::Column::StepCursor,
                Expr::value(cursor.to_string()),
            )
            .col_expr(workflow_runs::Column::WakeAt, Expr::value(wake))
            .filter(workflow_runs::Column::Id.eq(run.into_inner()))
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        if result.rows_affected == 0 {
            return Err(WorkflowError::RunNotFound(run));
        }

        Ok(())
    }

    async fn complete(&self, run: WorkflowRunId) -> Result<(), WorkflowError> {
        // Step records go with the run via ON DELETE CASCADE.
        workflow_runs::Entity::delete_by_id(run.into_inner())
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn record_failure(&self, run: WorkflowRunId) -> Result<(), WorkflowError> {
        workflow_runs::Entity::update_many()
            .col_expr(
                workflow_runs::Column::Attempts,
                Expr::col(workflow_runs::Column::Attempts).add(1),
            )
            .filter(workflow_runs::Column::Id.eq(run.into_inner()))
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn retire(&self, run: WorkflowRunId) -> Result<bool, WorkflowError> {
        let Some(model) = workflow_runs::Entity::find_by_id(run.into_inner())
            .one(&self.db)
            .await
            .map_err(db_err)?
        else {
            return Ok(false);
        };

        let mut active: workflow_runs::ActiveModel = model.into();
        active.status = Set(sea_orm_active_enums::WorkflowRunStatus::Retired);
        active.updated_at = Set(Utc::now().into());
        active.update(&self.db).await.map_err(db_err)?;

        Ok(true)
    }

    async fn find_scheduled_for(
        &self,
        kind: ProcessKind,
        email: &str,
    ) -> Result<Option<WorkflowRunId>, WorkflowError> {
        let run = workflow_runs::Entity::find()
            .filter(workflow_runs::Column::Kind.eq(kind_to_db(kind)))
            .filter(
                workflow_runs::Column::Status.eq(sea_orm_active_enums::WorkflowRunStatus::Scheduled),
            )
            .filter(Expr::cust_with_values("payload->>'email' = ?", [email]))
            .one(&self.db)
            .await
            .map_err(db_err)?;

        Ok(run.map(|r| WorkflowRunId::from_uuid(r.id)))
    }

    async fn find(&self, run: WorkflowRunId) -> Result<Option<WorkflowRun>, WorkflowError> {
        let model = workflow_runs::Entity::find_by_id(run.into_inner())
            .one(&self.db)
            .await
            .map_err(db_err)?;

        model.map(run_to_core).transpose()
    }
}

// ============================================================================
// Conversion helpers
// ============================================================================

/// Converts a stored run row to the core run snapshot.
fn run_to_core(model: workflow_runs::Model) -> Result<WorkflowRun, WorkflowError> {
    let id = WorkflowRunId::from_uuid(model.id);
    let cursor = RunCursor::parse(&model.step_cursor).ok_or_else(|| {
        WorkflowError::UnknownCursor {
            run: id,
            cursor: model.step_cursor.clone(),
        }
    })?;

    Ok(WorkflowRun {
        id,
        kind: kind_to_core(&model.kind),
        payload: model.payload,
        cursor,
        wake_at: model.wake_at.with_timezone(&Utc),
        status: status_to_core(&model.status),
        attempts: u32::try_from(model.attempts).unwrap_or(0),
    })
}

/// Converts a core process kind to the database kind.
const fn kind_to_db(kind: ProcessKind) -> sea_orm_active_enums::WorkflowKind {
    match kind {
        ProcessKind::DueReminder => sea_orm_active_enums::WorkflowKind::DueReminder,
        ProcessKind::Nurture => sea_orm_active_enums::WorkflowKind::Nurture,
    }
}

/// Converts a database kind to the core process kind.
const fn kind_to_core(kind: &sea_orm_active_enums::WorkflowKind) -> ProcessKind {
    match kind {
        sea_orm_active_enums::WorkflowKind::DueReminder => ProcessKind::DueReminder,
        sea_orm_active_enums::WorkflowKind::Nurture => ProcessKind::Nurture,
    }
}

/// Converts a database run status to the core run status.
const fn status_to_core(status: &sea_orm_active_enums::WorkflowRunStatus) -> RunStatus {
    match status {
        sea_orm_active_enums::WorkflowRunStatus::Scheduled => RunStatus::Scheduled,
        sea_orm_active_enums::WorkflowRunStatus::Retired => RunStatus::Retired,
    }
}

fn db_err(e: DbErr) -> WorkflowError {
    WorkflowError::Database(e.to_string())
}

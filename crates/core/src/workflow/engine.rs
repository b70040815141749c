//! Claim, execute, and advance driver for workflow runs.
//!
//! Each tick claims the runs whose wake time has passed and performs
//! exactly one step per run. A step sends at most one email, guarded by
//! a per-run step record so a re-claimed or crashed-and-retried run
//! never resends. A failed step leaves the cursor where it was; the
//! claim lease expires and the scheduler picks the run up again.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use libris_shared::types::WorkflowRunId;
use libris_shared::Mailer;

use crate::workflow::error::WorkflowError;
use crate::workflow::store::{NewRun, RunStore};
use crate::workflow::types::{
    NextState, NurturePayload, NurtureStep, ProcessKind, ReminderPayload, ReminderStep, RunCursor,
    StepOutcome, WorkflowRun,
};
use crate::workflow::{nurture, reminder};

/// How long a claimed run stays invisible to other claimers. Also the
/// retry delay after a failed step.
pub const CLAIM_LEASE_SECS: i64 = 60;

/// Read-side lookup the nurture check-in needs.
#[async_trait]
pub trait ActivityLookup: Send + Sync {
    /// Date of the member's last recorded visit, if any.
    async fn last_activity(&self, email: &str) -> Result<Option<NaiveDate>, WorkflowError>;
}

/// What one tick accomplished.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    /// Runs that performed their step and moved forward or finished.
    pub advanced: u64,
    /// Runs whose step failed and will retry after the lease.
    pub failed: u64,
}

/// Drives workflow runs forward.
pub struct WorkflowEngine {
    store: Arc<dyn RunStore>,
    mailer: Arc<dyn Mailer>,
    activity: Arc<dyn ActivityLookup>,
}

impl WorkflowEngine {
    /// Creates an engine over the given store, mailer, and activity
    /// lookup.
    #[must_use]
    pub fn new(
        store: Arc<dyn RunStore>,
        mailer: Arc<dyn Mailer>,
        activity: Arc<dyn ActivityLookup>,
    ) -> Self {
        Self {
            store,
            mailer,
            activity,
        }
    }

    /// Schedules a due-reminder run for a fresh loan.
    ///
    /// The run wakes two days before the due date, or immediately when
    /// the loan is already closer than that.
    ///
    /// # Errors
    ///
    /// Returns an error if the run cannot be stored.
    pub async fn trigger_due_reminder(
        &self,
        payload: ReminderPayload,
        now: DateTime<Utc>,
    ) -> Result<WorkflowRunId, WorkflowError> {
        let wake_at = reminder::initial_wake(payload.due_date, now);
        let payload = serde_json::to_value(&payload)
            .map_err(|e| WorkflowError::Database(e.to_string()))?;
        let id = self
            .store
            .insert(NewRun {
                kind: ProcessKind::DueReminder,
                payload,
                cursor: RunCursor::Reminder(ReminderStep::Send),
                wake_at,
            })
            .await?;
        tracing::info!(run = %id, %wake_at, "scheduled due reminder");
        Ok(id)
    }

    /// Schedules a nurture run for a new member. The welcome step fires
    /// on the next tick.
    ///
    /// # Errors
    ///
    /// Returns an error if the run cannot be stored.
    pub async fn trigger_nurture(
        &self,
        payload: NurturePayload,
        now: DateTime<Utc>,
    ) -> Result<WorkflowRunId, WorkflowError> {
        let payload = serde_json::to_value(&payload)
            .map_err(|e| WorkflowError::Database(e.to_string()))?;
        let id = self
            .store
            .insert(NewRun {
                kind: ProcessKind::Nurture,
                payload,
                cursor: RunCursor::Nurture(NurtureStep::SendWelcome),
                wake_at: now,
            })
            .await?;
        tracing::info!(run = %id, "scheduled nurture sequence");
        Ok(id)
    }

    /// Claims up to `batch` due runs and performs one step on each.
    ///
    /// A failing run is logged, counted, and left for the lease to
    /// expire; it never stops the rest of the batch.
    ///
    /// # Errors
    ///
    /// Returns an error only when claiming itself fails.
    pub async fn tick(
        &self,
        now: DateTime<Utc>,
        batch: u64,
    ) -> Result<TickSummary, WorkflowError> {
        let lease = Duration::seconds(CLAIM_LEASE_SECS);
        let runs = self.store.claim_due(now, lease, batch).await?;

        let mut summary = TickSummary::default();
        for run in runs {
            match self.advance_run(&run, now).await {
                Ok(()) => summary.advanced += 1,
                Err(e) => {
                    tracing::warn!(run = %run.id, error = %e, "workflow step failed");
                    summary.failed += 1;
                    if let Err(e) = self.store.record_failure(run.id).await {
                        tracing::error!(run = %run.id, error = %e, "failed to record attempt");
                    }
                }
            }
        }
        Ok(summary)
    }

    /// Retires a run by ID.
    ///
    /// # Errors
    ///
    /// Returns `RunNotFound` if no such run exists.
    pub async fn retire(&self, run: WorkflowRunId) -> Result<(), WorkflowError> {
        if self.store.retire(run).await? {
            tracing::info!(run = %run, "retired workflow run");
            Ok(())
        } else {
            Err(WorkflowError::RunNotFound(run))
        }
    }

    /// Retires the scheduled nurture run for `email`, if one exists.
    /// Called when the account goes away.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lookup or update fails.
    pub async fn retire_nurture_for(&self, email: &str) -> Result<(), WorkflowError> {
        if let Some(id) = self
            .store
            .find_scheduled_for(ProcessKind::Nurture, email)
            .await?
        {
            self.store.retire(id).await?;
            tracing::info!(run = %id, email, "retired nurture sequence");
        }
        Ok(())
    }

    /// Performs the step `run.cursor` points at, then moves the run.
    ///
    /// Order matters: the email goes out (guarded by the step record)
    /// before the cursor moves, so a crash between the two leaves a run
    /// that will skip the duplicate send and still advance.
    async fn advance_run(&self, run: &WorkflowRun, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        let outcome = self.outcome_for(run, now).await?;

        if let Some(send) = &outcome.message {
            if self.store.step_is_done(run.id, &outcome.step_key).await? {
                tracing::debug!(run = %run.id, step = %outcome.step_key, "step already done, skipping send");
            } else {
                self.mailer
                    .send(&send.to, &send.content.subject, &send.content.body)
                    .await
                    .map_err(|e| WorkflowError::Send(e.to_string()))?;
                self.store.mark_step_done(run.id, &outcome.step_key).await?;
                tracing::debug!(run = %run.id, step = %outcome.step_key, to = %send.to, "step email sent");
            }
        }

        match outcome.next {
            NextState::Sleep { cursor, wake_at } => {
                self.store.advance(run.id, cursor, wake_at).await
            }
            NextState::Complete => self.store.complete(run.id).await,
        }
    }

    async fn outcome_for(
        &self,
        run: &WorkflowRun,
        now: DateTime<Utc>,
    ) -> Result<StepOutcome, WorkflowError> {
        match run.cursor {
            RunCursor::Reminder(ReminderStep::Send) => {
                let payload: ReminderPayload = decode_payload(run)?;
                Ok(reminder::decide(&payload))
            }
            RunCursor::Nurture(NurtureStep::SendWelcome) => {
                let payload: NurturePayload = decode_payload(run)?;
                Ok(nurture::decide_welcome(&payload, now))
            }
            RunCursor::Nurture(NurtureStep::Evaluate { cycle }) => {
                let payload: NurturePayload = decode_payload(run)?;
                let last_visit = self.activity.last_activity(&payload.email).await?;
                let activity = nurture::classify_activity(last_visit, now.date_naive());
                Ok(nurture::decide_evaluate(cycle, &payload, activity, now))
            }
        }
    }
}

fn decode_payload<T: DeserializeOwned>(run: &WorkflowRun) -> Result<T, WorkflowError> {
    serde_json::from_value(run.payload.clone()).map_err(|e| WorkflowError::MalformedPayload {
        run: run.id,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::store::MemoryRunStore;
    use crate::workflow::types::RunStatus;
    use chrono::TimeZone;
    use libris_shared::MemoryMailer;

    struct FixedActivity(Option<NaiveDate>);

    #[async_trait]
    impl ActivityLookup for FixedActivity {
        async fn last_activity(&self, _email: &str) -> Result<Option<NaiveDate>, WorkflowError> {
            Ok(self.0)
        }
    }

    struct Harness {
        engine: WorkflowEngine,
        store: Arc<MemoryRunStore>,
        mailer: Arc<MemoryMailer>,
    }

    fn harness_with_activity(last_visit: Option<NaiveDate>) -> Harness {
        let store = Arc::new(MemoryRunStore::new());
        let mailer = Arc::new(MemoryMailer::new());
        let engine = WorkflowEngine::new(
            store.clone(),
            mailer.clone(),
            Arc::new(FixedActivity(last_visit)),
        );
        Harness {
            engine,
            store,
            mailer,
        }
    }

    fn harness() -> Harness {
        harness_with_activity(None)
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn reminder_payload(due: DateTime<Utc>) -> ReminderPayload {
        ReminderPayload {
            email: "ada@example.com".to_string(),
            full_name: "Ada".to_string(),
            book_title: "Dune".to_string(),
            due_date: due,
        }
    }

    fn nurture_payload() -> NurturePayload {
        NurturePayload {
            email: "ada@example.com".to_string(),
            full_name: "Ada".to_string(),
        }
    }

    #[tokio::test]
    async fn reminder_waits_for_the_lead_time() {
        let h = harness();
        let now = at(2026, 3, 1, 10);
        let due = at(2026, 3, 8, 10);
        h.engine
            .trigger_due_reminder(reminder_payload(due), now)
            .await
            .unwrap();

        // Too early: two days before due is March 6.
        let summary = h.engine.tick(at(2026, 3, 5, 10), 10).await.unwrap();
        assert_eq!(summary.advanced, 0);
        assert_eq!(h.mailer.sent().len(), 0);

        let summary = h.engine.tick(at(2026, 3, 6, 10), 10).await.unwrap();
        assert_eq!(summary.advanced, 1);
        assert_eq!(h.mailer.sent_to("ada@example.com"), 1);
        // One shot: the run deletes itself after its single send.
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn reminder_fires_immediately_for_a_tight_due_date() {
        let h = harness();
        let now = at(2026, 3, 1, 10);
        let due = at(2026, 3, 2, 10);
        h.engine
            .trigger_due_reminder(reminder_payload(due), now)
            .await
            .unwrap();

        let summary = h.engine.tick(now, 10).await.unwrap();
        assert_eq!(summary.advanced, 1);
        assert_eq!(h.mailer.sent_to("ada@example.com"), 1);
    }

    #[tokio::test]
    async fn reinvocation_of_a_done_step_does_not_resend() {
        let h = harness();
        let now = at(2026, 6, 1, 9);
        let id = h
            .engine
            .trigger_nurture(nurture_payload(), now)
            .await
            .unwrap();

        // The send happened on a previous invocation that crashed
        // before the cursor moved.
        h.store.mark_step_done(id, "send-welcome").await.unwrap();

        let summary = h.engine.tick(now, 10).await.unwrap();
        assert_eq!(summary.advanced, 1);
        assert_eq!(h.mailer.sent().len(), 0);

        // The run still moved on to the first check-in.
        let run = h.store.find(id).await.unwrap().unwrap();
        assert_eq!(
            run.cursor,
            RunCursor::Nurture(NurtureStep::Evaluate { cycle: 1 })
        );
        assert_eq!(run.wake_at, now + Duration::days(nurture::WELCOME_WAIT_DAYS));
    }

    #[tokio::test]
    async fn nurture_cycles_with_distinct_step_keys() {
        let h = harness();
        let t0 = at(2026, 6, 1, 9);
        let id = h.engine.trigger_nurture(nurture_payload(), t0).await.unwrap();

        h.engine.tick(t0, 10).await.unwrap();
        let t1 = t0 + Duration::days(3);
        h.engine.tick(t1, 10).await.unwrap();
        let t2 = t1 + Duration::days(30);
        h.engine.tick(t2, 10).await.unwrap();

        assert_eq!(h.mailer.sent_to("ada@example.com"), 3);
        let subjects: Vec<_> = h.mailer.sent().iter().map(|m| m.subject.clone()).collect();
        assert!(subjects[0].contains("Welcome"));
        // No activity on record, so both check-ins read inactive.
        assert!(subjects[1].contains("miss you"));
        assert!(subjects[2].contains("miss you"));

        let run = h.store.find(id).await.unwrap().unwrap();
        assert_eq!(
            run.cursor,
            RunCursor::Nurture(NurtureStep::Evaluate { cycle: 3 })
        );
        assert!(h.store.step_is_done(id, "notify-cycle-1").await.unwrap());
        assert!(h.store.step_is_done(id, "notify-cycle-2").await.unwrap());
    }

    #[tokio::test]
    async fn active_member_gets_the_active_check_in() {
        let t0 = at(2026, 6, 1, 9);
        let recent = (t0 + Duration::days(2)).date_naive();
        let h = harness_with_activity(Some(recent));
        h.engine.trigger_nurture(nurture_payload(), t0).await.unwrap();

        h.engine.tick(t0, 10).await.unwrap();
        let t1 = t0 + Duration::days(3);
        h.engine.tick(t1, 10).await.unwrap();

        let subjects: Vec<_> = h.mailer.sent().iter().map(|m| m.subject.clone()).collect();
        assert!(subjects[1].contains("Thanks"));
    }

    #[tokio::test]
    async fn retired_runs_never_fire() {
        let h = harness();
        let now = at(2026, 6, 1, 9);
        let id = h
            .engine
            .trigger_nurture(nurture_payload(), now)
            .await
            .unwrap();

        h.engine.retire(id).await.unwrap();
        let summary = h.engine.tick(now, 10).await.unwrap();
        assert_eq!(summary.advanced, 0);
        assert_eq!(h.mailer.sent().len(), 0);

        let run = h.store.find(id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Retired);
    }

    #[tokio::test]
    async fn retiring_a_missing_run_is_an_error() {
        let h = harness();
        let err = h.engine.retire(WorkflowRunId::new()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::RunNotFound(_)));
    }

    #[tokio::test]
    async fn retire_nurture_for_stops_the_sequence_by_email() {
        let h = harness();
        let now = at(2026, 6, 1, 9);
        let id = h
            .engine
            .trigger_nurture(nurture_payload(), now)
            .await
            .unwrap();

        h.engine.retire_nurture_for("ada@example.com").await.unwrap();
        let run = h.store.find(id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Retired);

        // No scheduled run for an unknown address; still fine.
        h.engine.retire_nurture_for("bob@example.com").await.unwrap();
    }

    #[tokio::test]
    async fn failed_send_keeps_the_cursor_and_retries_after_the_lease() {
        let h = harness();
        let now = at(2026, 6, 1, 9);
        let id = h
            .engine
            .trigger_nurture(nurture_payload(), now)
            .await
            .unwrap();

        h.mailer.fail_sends(true);
        let summary = h.engine.tick(now, 10).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.advanced, 0);
        assert_eq!(h.mailer.sent().len(), 0);

        let run = h.store.find(id).await.unwrap().unwrap();
        assert_eq!(run.cursor, RunCursor::Nurture(NurtureStep::SendWelcome));
        assert_eq!(run.attempts, 1);

        // Still leased: nothing to do yet.
        let summary = h
            .engine
            .tick(now + Duration::seconds(30), 10)
            .await
            .unwrap();
        assert_eq!(summary.advanced + summary.failed, 0);

        // Lease expired and the mailer recovered.
        h.mailer.fail_sends(false);
        let retry_at = now + Duration::seconds(CLAIM_LEASE_SECS + 1);
        let summary = h.engine.tick(retry_at, 10).await.unwrap();
        assert_eq!(summary.advanced, 1);
        assert_eq!(h.mailer.sent_to("ada@example.com"), 1);

        let run = h.store.find(id).await.unwrap().unwrap();
        assert_eq!(
            run.cursor,
            RunCursor::Nurture(NurtureStep::Evaluate { cycle: 1 })
        );
    }

    #[tokio::test]
    async fn malformed_payload_counts_as_a_failure() {
        let h = harness();
        let now = at(2026, 6, 1, 9);
        h.store
            .insert(NewRun {
                kind: ProcessKind::Nurture,
                payload: serde_json::json!({"email": 42}),
                cursor: RunCursor::Nurture(NurtureStep::SendWelcome),
                wake_at: now,
            })
            .await
            .unwrap();

        let summary = h.engine.tick(now, 10).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(h.mailer.sent().len(), 0);
    }

    #[tokio::test]
    async fn tick_respects_the_batch_limit() {
        let h = harness();
        let now = at(2026, 6, 1, 9);
        for _ in 0..3 {
            h.engine
                .trigger_nurture(nurture_payload(), now)
                .await
                .unwrap();
        }

        let summary = h.engine.tick(now, 2).await.unwrap();
        assert_eq!(summary.advanced, 2);
        let summary = h.engine.tick(now, 2).await.unwrap();
        assert_eq!(summary.advanced, 1);
    }
}

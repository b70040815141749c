//! Due-reminder step logic.
//!
//! A reminder run has a single step: wake two days before the loan is
//! due and send one email. Loans shorter than the lead time get their
//! reminder immediately rather than in the past.

use chrono::{DateTime, Duration, Utc};

use crate::notifications;
use crate::workflow::types::{NextState, PendingSend, ReminderPayload, StepOutcome};

/// Days before the due date the reminder goes out.
pub const REMINDER_LEAD_DAYS: i64 = 2;

/// First wake time for a reminder scheduled at `now` for a loan due at
/// `due`. Never in the past.
#[must_use]
pub fn initial_wake(due: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let target = due - Duration::days(REMINDER_LEAD_DAYS);
    target.max(now)
}

/// Executes the send step of a reminder run.
#[must_use]
pub fn decide(payload: &ReminderPayload) -> StepOutcome {
    let content =
        notifications::due_reminder(&payload.full_name, &payload.book_title, payload.due_date);
    StepOutcome {
        step_key: "send-reminder".to_string(),
        message: Some(PendingSend {
            to: payload.email.clone(),
            content,
        }),
        next: NextState::Complete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn wake_is_two_days_before_due() {
        let now = at(2026, 3, 1, 10);
        let due = at(2026, 3, 8, 10);
        assert_eq!(initial_wake(due, now), at(2026, 3, 6, 10));
    }

    #[test]
    fn wake_clamps_to_now_when_due_is_close() {
        let now = at(2026, 3, 7, 10);
        let due = at(2026, 3, 8, 10);
        assert_eq!(initial_wake(due, now), now);
    }

    #[test]
    fn wake_clamps_to_now_when_due_is_past() {
        let now = at(2026, 3, 10, 10);
        let due = at(2026, 3, 8, 10);
        assert_eq!(initial_wake(due, now), now);
    }

    #[test]
    fn send_step_completes_the_run() {
        let payload = ReminderPayload {
            email: "ada@example.com".to_string(),
            full_name: "Ada".to_string(),
            book_title: "Dune".to_string(),
            due_date: at(2026, 3, 8, 10),
        };
        let outcome = decide(&payload);
        assert_eq!(outcome.step_key, "send-reminder");
        assert_eq!(outcome.next, NextState::Complete);

        let send = outcome.message.unwrap();
        assert_eq!(send.to, "ada@example.com");
        assert!(send.content.body.contains("Dune"));
        assert!(send.content.body.contains("March 08, 2026"));
    }

    proptest! {
        #[test]
        fn wake_is_never_before_now(due_offset_hours in -200i64..200) {
            let now = at(2026, 3, 1, 0);
            let due = now + Duration::hours(due_offset_hours);
            let wake = initial_wake(due, now);
            prop_assert!(wake >= now);
            // When there is room, the full lead time is honored.
            if due - Duration::days(REMINDER_LEAD_DAYS) >= now {
                prop_assert_eq!(wake, due - Duration::days(REMINDER_LEAD_DAYS));
            }
        }
    }
}

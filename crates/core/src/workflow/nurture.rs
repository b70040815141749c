//! Nurture sequence step logic.
//!
//! Every member gets a welcome email three days after sign-up, then a
//! check-in every thirty days for as long as the account exists. Each
//! check-in classifies the member by their last visit and picks the
//! matching email.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::notifications;
use crate::workflow::types::{
    NextState, NurturePayload, NurtureStep, PendingSend, RunCursor, StepOutcome,
};

/// Days between the welcome email and the first check-in.
pub const WELCOME_WAIT_DAYS: i64 = 3;

/// Days between check-ins.
pub const CYCLE_WAIT_DAYS: i64 = 30;

/// A member is inactive once their last visit is older than this.
pub const INACTIVE_AFTER_DAYS: i64 = 3;

/// A last visit older than this falls out of the inactive window.
pub const INACTIVE_WINDOW_DAYS: i64 = 30;

/// How a member's recent activity reads at check-in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityState {
    /// Visited recently, or so long ago the inactive window has passed.
    Active,
    /// Last visit falls inside the inactive window.
    Inactive,
}

/// Classifies a member by the age of their last recorded visit.
///
/// A member with no recorded visit at all is inactive. Otherwise the
/// member is inactive only while the last visit sits inside the window
/// of more than [`INACTIVE_AFTER_DAYS`] and at most
/// [`INACTIVE_WINDOW_DAYS`] days ago; a visit older than the window
/// reads as active again.
#[must_use]
pub fn classify_activity(last_visit: Option<NaiveDate>, today: NaiveDate) -> ActivityState {
    let Some(last) = last_visit else {
        return ActivityState::Inactive;
    };
    let age_days = (today - last).num_days();
    if age_days > INACTIVE_AFTER_DAYS && age_days <= INACTIVE_WINDOW_DAYS {
        ActivityState::Inactive
    } else {
        ActivityState::Active
    }
}

/// Executes the welcome step: send the welcome email, then park until
/// the first check-in.
#[must_use]
pub fn decide_welcome(payload: &NurturePayload, now: DateTime<Utc>) -> StepOutcome {
    StepOutcome {
        step_key: "send-welcome".to_string(),
        message: Some(PendingSend {
            to: payload.email.clone(),
            content: notifications::welcome(&payload.full_name),
        }),
        next: NextState::Sleep {
            cursor: RunCursor::Nurture(NurtureStep::Evaluate { cycle: 1 }),
            wake_at: now + Duration::days(WELCOME_WAIT_DAYS),
        },
    }
}

/// Executes check-in `cycle`: send the email matching `activity`, then
/// park until the next check-in.
#[must_use]
pub fn decide_evaluate(
    cycle: u32,
    payload: &NurturePayload,
    activity: ActivityState,
    now: DateTime<Utc>,
) -> StepOutcome {
    let content = match activity {
        ActivityState::Inactive => notifications::we_miss_you(&payload.full_name),
        ActivityState::Active => notifications::active_reader(&payload.full_name),
    };
    StepOutcome {
        step_key: format!("notify-cycle-{cycle}"),
        message: Some(PendingSend {
            to: payload.email.clone(),
            content,
        }),
        next: NextState::Sleep {
            cursor: RunCursor::Nurture(NurtureStep::Evaluate { cycle: cycle + 1 }),
            wake_at: now + Duration::days(CYCLE_WAIT_DAYS),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn payload() -> NurturePayload {
        NurturePayload {
            email: "ada@example.com".to_string(),
            full_name: "Ada".to_string(),
        }
    }

    #[rstest]
    #[case(0, ActivityState::Active)]
    #[case(3, ActivityState::Active)]
    #[case(4, ActivityState::Inactive)]
    #[case(30, ActivityState::Inactive)]
    #[case(31, ActivityState::Active)]
    #[case(365, ActivityState::Active)]
    fn classification_boundaries(#[case] age_days: i64, #[case] expected: ActivityState) {
        let today = day(2026, 6, 30);
        let last = today - Duration::days(age_days);
        assert_eq!(classify_activity(Some(last), today), expected);
    }

    #[test]
    fn no_recorded_visit_is_inactive() {
        assert_eq!(
            classify_activity(None, day(2026, 6, 30)),
            ActivityState::Inactive
        );
    }

    #[test]
    fn welcome_sends_then_parks_until_first_check_in() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap();
        let outcome = decide_welcome(&payload(), now);

        assert_eq!(outcome.step_key, "send-welcome");
        let send = outcome.message.unwrap();
        assert_eq!(send.to, "ada@example.com");
        assert!(send.content.subject.contains("Welcome"));

        // The first check-in comes sooner than the steady thirty-day cycle.
        assert_eq!(
            outcome.next,
            NextState::Sleep {
                cursor: RunCursor::Nurture(NurtureStep::Evaluate { cycle: 1 }),
                wake_at: now + Duration::days(WELCOME_WAIT_DAYS),
            }
        );
    }

    #[test]
    fn check_in_picks_the_email_by_activity() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap();

        let outcome = decide_evaluate(1, &payload(), ActivityState::Inactive, now);
        assert!(outcome.message.unwrap().content.subject.contains("miss you"));

        let outcome = decide_evaluate(1, &payload(), ActivityState::Active, now);
        assert!(outcome.message.unwrap().content.subject.contains("Thanks"));
    }

    #[test]
    fn check_ins_loop_with_distinct_step_keys() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap();

        let first = decide_evaluate(1, &payload(), ActivityState::Active, now);
        let second = decide_evaluate(2, &payload(), ActivityState::Active, now);

        assert_eq!(first.step_key, "notify-cycle-1");
        assert_eq!(second.step_key, "notify-cycle-2");
        assert_eq!(
            first.next,
            NextState::Sleep {
                cursor: RunCursor::Nurture(NurtureStep::Evaluate { cycle: 2 }),
                wake_at: now + Duration::days(CYCLE_WAIT_DAYS),
            }
        );
    }
}

//! Email subjects and bodies for every notification the system sends.
//!
//! Templates are plain text. Handlers and the workflow engine build a
//! [`MailContent`] here and hand it to whatever `Mailer` is wired in, so
//! the wording lives in one place.

use chrono::{DateTime, Utc};

/// A rendered email, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailContent {
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

fn format_date(date: DateTime<Utc>) -> String {
    date.format("%B %d, %Y").to_string()
}

/// Verification code email sent during sign-up.
#[must_use]
pub fn otp_code(full_name: &str, code: &str) -> MailContent {
    MailContent {
        subject: "Your verification code - Libris".to_string(),
        body: format!(
            r"Hi {full_name},

Your Libris verification code is:

{code}

This code expires in 5 minutes. If you didn't request it, you can safely ignore this email.

Best regards,
The Libris Team"
        ),
    }
}

/// First email of the nurture sequence, sent shortly after sign-up.
#[must_use]
pub fn welcome(full_name: &str) -> MailContent {
    MailContent {
        subject: "Welcome to Libris".to_string(),
        body: format!(
            r"Hi {full_name},

Welcome to Libris! Your account is ready and the whole catalog is waiting for you.

Browse the collection, borrow up to one copy of any title, and keep it for a week.

Happy reading,
The Libris Team"
        ),
    }
}

/// Nurture email for members who have gone quiet.
#[must_use]
pub fn we_miss_you(full_name: &str) -> MailContent {
    MailContent {
        subject: "We miss you at Libris".to_string(),
        body: format!(
            r"Hi {full_name},

It's been a while since your last visit. New titles have arrived since then, and your library card still works just fine.

Come have a look when you get a moment.

Best regards,
The Libris Team"
        ),
    }
}

/// Nurture email for members who keep coming back.
#[must_use]
pub fn active_reader(full_name: &str) -> MailContent {
    MailContent {
        subject: "Thanks for reading with us".to_string(),
        body: format!(
            r"Hi {full_name},

Thanks for being a regular at Libris. Readers like you are why the shelves stay busy.

Here's to the next book.

Best regards,
The Libris Team"
        ),
    }
}

/// Confirmation sent right after a successful borrow.
#[must_use]
pub fn borrow_confirmation(full_name: &str, title: &str, due: DateTime<Utc>) -> MailContent {
    let due = format_date(due);
    MailContent {
        subject: format!("You borrowed \"{title}\""),
        body: format!(
            r"Hi {full_name},

You've borrowed {title}. It's due back on {due}.

We'll send a reminder before the due date.

Happy reading,
The Libris Team"
        ),
    }
}

/// Reminder sent ahead of a loan's due date.
#[must_use]
pub fn due_reminder(full_name: &str, title: &str, due: DateTime<Utc>) -> MailContent {
    let due = format_date(due);
    MailContent {
        subject: format!("\"{title}\" is due soon"),
        body: format!(
            r"Hi {full_name},

Just a reminder that {title} is due back on {due}.

If you've already returned it, you can ignore this email.

Best regards,
The Libris Team"
        ),
    }
}

/// Confirmation sent after a return is processed.
#[must_use]
pub fn return_confirmation(full_name: &str, title: &str) -> MailContent {
    MailContent {
        subject: format!("You returned \"{title}\""),
        body: format!(
            r"Hi {full_name},

Thanks for returning {title}. It's back on the shelf for the next reader.

See you soon,
The Libris Team"
        ),
    }
}

/// Sent when an administrator approves a pending account.
#[must_use]
pub fn account_approved(full_name: &str) -> MailContent {
    MailContent {
        subject: "Your Libris account is approved".to_string(),
        body: format!(
            r"Hi {full_name},

Good news: your Libris account has been approved. You can now sign in and start borrowing.

Welcome aboard,
The Libris Team"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn otp_body_contains_the_code() {
        let content = otp_code("Ada", "123456");
        assert!(content.subject.contains("verification code"));
        assert!(content.body.contains("Hi Ada,"));
        assert!(content.body.contains("123456"));
        assert!(content.body.contains("5 minutes"));
    }

    #[test]
    fn dates_render_as_long_form() {
        let due = Utc.with_ymd_and_hms(2026, 3, 8, 10, 0, 0).unwrap();
        let content = due_reminder("Ada", "Dune", due);
        assert!(content.subject.contains("Dune"));
        assert!(content.body.contains("March 08, 2026"));
    }

    #[test]
    fn borrow_confirmation_names_the_title_and_due_date() {
        let due = Utc.with_ymd_and_hms(2026, 12, 1, 0, 0, 0).unwrap();
        let content = borrow_confirmation("Ada", "Dune", due);
        assert!(content.body.contains("Dune"));
        assert!(content.body.contains("December 01, 2026"));
    }

    #[test]
    fn nurture_bodies_greet_by_name() {
        assert!(welcome("Ada").body.starts_with("Hi Ada,"));
        assert!(we_miss_you("Ada").body.starts_with("Hi Ada,"));
        assert!(active_reader("Ada").body.starts_with("Hi Ada,"));
        assert!(account_approved("Ada").body.starts_with("Hi Ada,"));
    }
}

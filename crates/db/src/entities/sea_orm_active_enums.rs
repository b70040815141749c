//! `SeaORM` active enums mapping the Postgres enum types.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Account role, mirrors the `user_role` database enum.
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "user_role")]
pub enum UserRole {
    /// Regular member.
    #[sea_orm(string_value = "user")]
    User,
    /// Administrator.
    #[sea_orm(string_value = "admin")]
    Admin,
}

/// Account approval state, mirrors the `account_status` database enum.
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "account_status")]
pub enum AccountStatus {
    /// Awaiting admin review.
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Approved, may borrow.
    #[sea_orm(string_value = "approved")]
    Approved,
    /// Rejected by an admin.
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

/// Loan lifecycle state, mirrors the `loan_status` database enum.
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "loan_status")]
pub enum LoanStatus {
    /// Copy is out with the borrower.
    #[sea_orm(string_value = "active")]
    Active,
    /// Returned on or before the due date.
    #[sea_orm(string_value = "returned")]
    Returned,
    /// Returned after the due date.
    #[sea_orm(string_value = "returned_late")]
    ReturnedLate,
}

/// Workflow process kind, mirrors the `workflow_kind` database enum.
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "workflow_kind")]
pub enum WorkflowKind {
    /// Single due-date reminder.
    #[sea_orm(string_value = "due-reminder")]
    DueReminder,
    /// Engagement nurture loop.
    #[sea_orm(string_value = "nurture")]
    Nurture,
}

/// Workflow run state, mirrors the `workflow_run_status` database enum.
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "workflow_run_status")]
pub enum WorkflowRunStatus {
    /// Waiting for its wake time.
    #[sea_orm(string_value = "scheduled")]
    Scheduled,
    /// Permanently stopped; never picked up again.
    #[sea_orm(string_value = "retired")]
    Retired,
}

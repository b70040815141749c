//! Initial database migration.
//!
//! Creates the enums, tables, indexes, and triggers for the lending schema:
//! users, books, borrow records, and the durable workflow run/step log.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: ENUMS
        // ============================================================
        db.execute_unprepared(ENUMS_SQL).await?;

        // ============================================================
        // PART 2: ACCOUNTS
        // ============================================================
        db.execute_unprepared(USERS_SQL).await?;

        // ============================================================
        // PART 3: CATALOG
        // ============================================================
        db.execute_unprepared(BOOKS_SQL).await?;

        // ============================================================
        // PART 4: LENDING
        // ============================================================
        db.execute_unprepared(BORROW_RECORDS_SQL).await?;

        // ============================================================
        // PART 5: DURABLE WORKFLOWS
        // ============================================================
        db.execute_unprepared(WORKFLOW_RUNS_SQL).await?;
        db.execute_unprepared(WORKFLOW_STEPS_SQL).await?;

        // ============================================================
        // PART 6: TRIGGERS & FUNCTIONS
        // ============================================================
        db.execute_unprepared(TRIGGERS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

// ============================================================
// SQL CONSTANTS
// ============================================================

const ENUMS_SQL: &str = r"
-- Account roles
CREATE TYPE user_role AS ENUM (
    'user',
    'admin'
);

-- Account approval states
CREATE TYPE account_status AS ENUM (
    'pending',
    'approved',
    'rejected'
);

-- Loan lifecycle states
CREATE TYPE loan_status AS ENUM (
    'active',
    'returned',
    'returned_late'
);

-- Durable workflow process kinds
CREATE TYPE workflow_kind AS ENUM (
    'due-reminder',
    'nurture'
);

-- Durable workflow run states
CREATE TYPE workflow_run_status AS ENUM (
    'scheduled',
    'retired'
);
";

const USERS_SQL: &str = r"
CREATE TABLE users (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    email VARCHAR(255) NOT NULL UNIQUE,
    password_hash VARCHAR(255) NOT NULL,
    full_name VARCHAR(255) NOT NULL,
    role user_role NOT NULL DEFAULT 'user',
    status account_status NOT NULL DEFAULT 'pending',
    last_activity_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_users_email ON users(email);
CREATE INDEX idx_users_pending ON users(created_at) WHERE status = 'pending';
";

const BOOKS_SQL: &str = r"
CREATE TABLE books (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    title VARCHAR(255) NOT NULL,
    author VARCHAR(255) NOT NULL,
    genre VARCHAR(100) NOT NULL,
    rating INTEGER NOT NULL DEFAULT 1,
    description TEXT NOT NULL DEFAULT '',
    summary TEXT NOT NULL DEFAULT '',
    cover_url VARCHAR(500),
    cover_color VARCHAR(7),
    total_copies INTEGER NOT NULL DEFAULT 1,
    available_copies INTEGER NOT NULL DEFAULT 1,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_rating CHECK (rating BETWEEN 1 AND 5),
    CONSTRAINT chk_total_copies CHECK (total_copies >= 0),
    CONSTRAINT chk_available_copies CHECK (
        available_copies >= 0 AND available_copies <= total_copies
    )
);

CREATE INDEX idx_books_title ON books(title);
CREATE INDEX idx_books_author ON books(author);
CREATE INDEX idx_books_created ON books(created_at);
";

const BORROW_RECORDS_SQL: &str = r"
CREATE TABLE borrow_records (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    book_id UUID NOT NULL REFERENCES books(id) ON DELETE CASCADE,
    status loan_status NOT NULL DEFAULT 'active',
    borrowed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    due_date TIMESTAMPTZ NOT NULL,
    returned_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_borrow_records_user ON borrow_records(user_id, status);
CREATE INDEX idx_borrow_records_book_active ON borrow_records(book_id)
    WHERE status = 'active';
CREATE INDEX idx_borrow_records_borrowed ON borrow_records(borrowed_at);
";

const WORKFLOW_RUNS_SQL: &str = r"
CREATE TABLE workflow_runs (
    id UUID PRIMARY KEY,
    kind workflow_kind NOT NULL,
    payload JSONB NOT NULL,
    step_cursor VARCHAR(100) NOT NULL,
    wake_at TIMESTAMPTZ NOT NULL,
    status workflow_run_status NOT NULL DEFAULT 'scheduled',
    attempts INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

-- The poller scans for due runs; only scheduled rows are candidates
CREATE INDEX idx_workflow_runs_due ON workflow_runs(wake_at)
    WHERE status = 'scheduled';
CREATE INDEX idx_workflow_runs_email ON workflow_runs((payload->>'email'))
    WHERE status = 'scheduled';
";

const WORKFLOW_STEPS_SQL: &str = r"
CREATE TABLE workflow_steps (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    run_id UUID NOT NULL REFERENCES workflow_runs(id) ON DELETE CASCADE,
    step_key VARCHAR(100) NOT NULL,
    completed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_workflow_steps_run_step UNIQUE (run_id, step_key)
);
";

const TRIGGERS_SQL: &str = r"
-- ============================================================
-- FUNCTION: touch_updated_at
-- Keeps updated_at current on every row update
-- ============================================================
CREATE OR REPLACE FUNCTION touch_updated_at()
RETURNS TRIGGER AS $$
BEGIN
    NEW.updated_at = now();
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_users_touch
    BEFORE UPDATE ON users
    FOR EACH ROW EXECUTE FUNCTION touch_updated_at();

CREATE TRIGGER trg_books_touch
    BEFORE UPDATE ON books
    FOR EACH ROW EXECUTE FUNCTION touch_updated_at();

CREATE TRIGGER trg_borrow_records_touch
    BEFORE UPDATE ON borrow_records
    FOR EACH ROW EXECUTE FUNCTION touch_updated_at();

CREATE TRIGGER trg_workflow_runs_touch
    BEFORE UPDATE ON workflow_runs
    FOR EACH ROW EXECUTE FUNCTION touch_updated_at();
";

const DROP_ALL_SQL: &str = r"
-- ============================================================
-- DROP ALL: Rollback migration
-- Order matters due to foreign key constraints
-- ============================================================

-- Drop triggers
DROP TRIGGER IF EXISTS trg_workflow_runs_touch ON workflow_runs;
DROP TRIGGER IF EXISTS trg_borrow_records_touch ON borrow_records;
DROP TRIGGER IF EXISTS trg_books_touch ON books;
DROP TRIGGER IF EXISTS trg_users_touch ON users;

-- Drop functions
DROP FUNCTION IF EXISTS touch_updated_at();

-- Drop tables (children first)
DROP TABLE IF EXISTS workflow_steps CASCADE;
DROP TABLE IF EXISTS workflow_runs CASCADE;
DROP TABLE IF EXISTS borrow_records CASCADE;
DROP TABLE IF EXISTS books CASCADE;
DROP TABLE IF EXISTS users CASCADE;

-- Drop enums
DROP TYPE IF EXISTS workflow_run_status;
DROP TYPE IF EXISTS workflow_kind;
DROP TYPE IF EXISTS loan_status;
DROP TYPE IF EXISTS account_status;
DROP TYPE IF EXISTS user_role;
";

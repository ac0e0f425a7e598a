//! SQL schema for the thesis-workflow SQLite store.
//!
//! Executed once at connection startup. The seat invariants are restated
//! here so that no writer, whatever its code path, can commit a roster that
//! breaks them.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS people (
    person_id     TEXT PRIMARY KEY,
    full_name     TEXT NOT NULL,
    email         TEXT NOT NULL UNIQUE,   -- trimmed, lowercased
    career        TEXT NOT NULL DEFAULT '',
    role          TEXT NOT NULL CHECK (role IN ('alumno', 'docente', 'coordinador')),
    advisor_id    TEXT REFERENCES people(person_id),
    password_hash TEXT NOT NULL,          -- argon2 PHC string
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS proposals (
    proposal_id        TEXT PRIMARY KEY,
    title              TEXT NOT NULL,
    objective          TEXT NOT NULL DEFAULT '',
    description        TEXT NOT NULL DEFAULT '',
    area               TEXT NOT NULL DEFAULT '',
    career             TEXT NOT NULL DEFAULT '',
    seats_requested    INTEGER NOT NULL CHECK (seats_requested >= 1),
    companion_emails   TEXT NOT NULL DEFAULT '[]',   -- JSON array of strings
    preferred_advisors TEXT NOT NULL DEFAULT '[]',   -- JSON array of uuids
    seats_authorized   INTEGER CHECK (seats_authorized IS NULL OR seats_authorized >= 1),
    decision_comment   TEXT,
    state              TEXT NOT NULL,
    student_id         TEXT REFERENCES people(person_id),
    advisor_id         TEXT REFERENCES people(person_id),
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS topics (
    topic_id     TEXT PRIMARY KEY,
    title        TEXT NOT NULL,
    career       TEXT NOT NULL DEFAULT '',
    area         TEXT NOT NULL DEFAULT '',
    description  TEXT NOT NULL DEFAULT '',
    requirements TEXT NOT NULL DEFAULT '[]',         -- JSON array of strings
    seats        INTEGER NOT NULL CHECK (seats >= 1),
    created_by   TEXT REFERENCES people(person_id),
    advisor_id   TEXT REFERENCES people(person_id),
    proposal_id  TEXT UNIQUE REFERENCES proposals(proposal_id),
    created_at   TEXT NOT NULL,
    closed_at    TEXT
);

-- Enrollments are never deleted; leaving a topic clears `active`.
CREATE TABLE IF NOT EXISTS enrollments (
    enrollment_id TEXT PRIMARY KEY,
    topic_id      TEXT NOT NULL REFERENCES topics(topic_id),
    student_id    TEXT NOT NULL REFERENCES people(person_id),
    active        INTEGER NOT NULL DEFAULT 1 CHECK (active IN (0, 1)),
    responsible   INTEGER NOT NULL DEFAULT 0 CHECK (responsible IN (0, 1)),
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    UNIQUE (topic_id, student_id)
);

CREATE UNIQUE INDEX IF NOT EXISTS enrollments_one_responsible
    ON enrollments(topic_id) WHERE active = 1 AND responsible = 1;

CREATE UNIQUE INDEX IF NOT EXISTS enrollments_one_active_seat
    ON enrollments(student_id) WHERE active = 1;

CREATE TRIGGER IF NOT EXISTS enrollments_capacity_insert
BEFORE INSERT ON enrollments
WHEN NEW.active = 1
 AND (SELECT COUNT(*) FROM enrollments WHERE topic_id = NEW.topic_id AND active = 1)
     >= (SELECT seats FROM topics WHERE topic_id = NEW.topic_id)
BEGIN
    SELECT RAISE(ABORT, 'seat capacity exceeded');
END;

CREATE TRIGGER IF NOT EXISTS enrollments_capacity_update
BEFORE UPDATE OF active ON enrollments
WHEN NEW.active = 1 AND OLD.active = 0
 AND (SELECT COUNT(*) FROM enrollments WHERE topic_id = NEW.topic_id AND active = 1)
     >= (SELECT seats FROM topics WHERE topic_id = NEW.topic_id)
BEGIN
    SELECT RAISE(ABORT, 'seat capacity exceeded');
END;

-- Only `read` is ever updated.
CREATE TABLE IF NOT EXISTS notifications (
    notification_id TEXT PRIMARY KEY,
    recipient_id    TEXT NOT NULL REFERENCES people(person_id),
    title           TEXT NOT NULL,
    message         TEXT NOT NULL,
    kind            TEXT NOT NULL,
    metadata        TEXT NOT NULL DEFAULT '{}',
    read            INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS proposals_state_idx        ON proposals(state);
CREATE INDEX IF NOT EXISTS enrollments_student_idx    ON enrollments(student_id);
CREATE INDEX IF NOT EXISTS notifications_recipient_idx ON notifications(recipient_id);

PRAGMA user_version = 1;
";

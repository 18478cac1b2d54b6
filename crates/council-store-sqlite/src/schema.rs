//! SQL schema for the council SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- All lookup tables share one shape, keyed by dimension.
CREATE TABLE IF NOT EXISTS reference_rows (
    dimension       TEXT    NOT NULL,   -- 'faculty' | 'year' | 'semester' | ...
    id              INTEGER NOT NULL,
    name            TEXT    NOT NULL DEFAULT '',
    intake_key      TEXT,               -- '|'-separated intake tokens
    old_council_key TEXT,               -- '|'-separated old council tokens
    code            TEXT,
    is_current      INTEGER NOT NULL DEFAULT 0,
    university_id   INTEGER,
    family_id       INTEGER,
    PRIMARY KEY (dimension, id)
);

-- external_id is not UNIQUE: the repeated-record cleanup exists because
-- duplicates have reached this table before.
CREATE TABLE IF NOT EXISTS students (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    unique_id        TEXT    NOT NULL,
    external_id      TEXT,
    old_council_id   TEXT,
    status           INTEGER NOT NULL,
    full_name        TEXT    NOT NULL,
    national_id      TEXT,
    passport         TEXT,
    birth_date       TEXT,              -- YYYY-MM-DD
    gender_id        INTEGER,
    nationality_id   INTEGER,
    religion_id      INTEGER,
    birth_place_id   INTEGER,
    address_place_id INTEGER,
    phone            TEXT,
    email            TEXT,
    address          TEXT,
    notes            TEXT,
    created_at       TEXT    NOT NULL,  -- RFC 3339 UTC
    created_by       INTEGER NOT NULL,
    updated_at       TEXT,
    updated_by       INTEGER
);

CREATE TABLE IF NOT EXISTS secondary_education (
    student_id          INTEGER PRIMARY KEY REFERENCES students(id) ON DELETE CASCADE,
    certificate_id      INTEGER,
    certificate_year_id INTEGER,
    seat_number         TEXT,
    total               TEXT,
    equivalent_total    TEXT,
    sport_degree        TEXT,
    complaint_gain      TEXT,
    school              TEXT,
    department          TEXT,
    department_code_id  INTEGER,
    governorate_id      INTEGER,
    school_type_id      INTEGER,
    study_group_id      INTEGER
);

CREATE TABLE IF NOT EXISTS university_enrollment (
    student_id             INTEGER PRIMARY KEY REFERENCES students(id) ON DELETE CASCADE,
    faculty_id             INTEGER,
    university_id          INTEGER,
    enroll_year_id         INTEGER,
    enroll_semester_id     INTEGER,
    enroll_stage_id        INTEGER,
    registration_type_id   INTEGER,
    total                  TEXT,
    level_id               INTEGER,
    total_equivalent_hours TEXT,
    transfer_date          TEXT,
    path_shift_date        TEXT
);

CREATE TABLE IF NOT EXISTS accepted_applications (
    student_id           INTEGER PRIMARY KEY REFERENCES students(id) ON DELETE CASCADE,
    faculty_id           INTEGER,
    university_id        INTEGER,
    year_id              INTEGER,
    semester_id          INTEGER,
    stage_id             INTEGER,
    registration_type_id INTEGER,
    total                TEXT,
    manual_addition      INTEGER NOT NULL DEFAULT 0,
    decided_by           TEXT,
    decided_at           TEXT
);

-- Keyed by unique id, not student id: entries outlive deleted rows.
CREATE TABLE IF NOT EXISTS transactions (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    unique_id     TEXT    NOT NULL,
    kind          INTEGER NOT NULL,
    original_data TEXT,
    updated_data  TEXT,
    created_at    TEXT    NOT NULL,
    created_by    INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS students_external_idx    ON students(external_id);
CREATE INDEX IF NOT EXISTS students_national_idx    ON students(national_id);
CREATE INDEX IF NOT EXISTS students_passport_idx    ON students(passport);
CREATE INDEX IF NOT EXISTS students_old_council_idx ON students(old_council_id);
CREATE INDEX IF NOT EXISTS secondary_seat_idx       ON secondary_education(seat_number, certificate_year_id);
CREATE INDEX IF NOT EXISTS transactions_unique_idx  ON transactions(unique_id);

PRAGMA user_version = 1;
";

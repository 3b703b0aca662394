//! SQLite schema for the test pipeline and the usage ledger.
//!
//! Tables:
//! - `providers` / `models`: the provider catalog
//! - `test_runs` / `results`: the simple task shape
//! - `prompt_test_tasks` / `prompt_test_units` / `prompt_test_experiments`:
//!   the richer multi-unit shape
//! - `usage_logs`: append-only ledger, one row per successful external call

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS providers (
    id            INTEGER PRIMARY KEY,
    provider_name TEXT NOT NULL,
    provider_key  TEXT,
    api_key       TEXT NOT NULL,
    base_url      TEXT,
    created_at    TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS models (
    id          INTEGER PRIMARY KEY,
    provider_id INTEGER NOT NULL REFERENCES providers(id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    UNIQUE(provider_id, name)
);

CREATE TABLE IF NOT EXISTS test_runs (
    id          INTEGER PRIMARY KEY,
    model_name  TEXT NOT NULL,
    temperature REAL NOT NULL DEFAULT 0.7,
    top_p       REAL NOT NULL DEFAULT 1.0,
    repetitions INTEGER NOT NULL DEFAULT 1,
    config      TEXT,
    status      TEXT NOT NULL DEFAULT 'pending',
    last_error  TEXT,
    metrics     TEXT,
    created_at  TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per repetition; immutable after insert.
CREATE TABLE IF NOT EXISTS results (
    id                INTEGER PRIMARY KEY,
    test_run_id       INTEGER NOT NULL REFERENCES test_runs(id) ON DELETE CASCADE,
    run_index         INTEGER NOT NULL,
    output            TEXT NOT NULL,
    parsed_output     TEXT,
    prompt_tokens     INTEGER,
    completion_tokens INTEGER,
    total_tokens      INTEGER,
    latency_ms        INTEGER,
    created_at        TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(test_run_id, run_index)
);

CREATE TABLE IF NOT EXISTS prompt_test_tasks (
    id         INTEGER PRIMARY KEY,
    name       TEXT NOT NULL DEFAULT '',
    status     TEXT NOT NULL DEFAULT 'pending',
    last_error TEXT,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS prompt_test_units (
    id              INTEGER PRIMARY KEY,
    task_id         INTEGER NOT NULL REFERENCES prompt_test_tasks(id) ON DELETE CASCADE,
    model_name      TEXT NOT NULL,
    temperature     REAL NOT NULL DEFAULT 0.7,
    top_p           REAL NOT NULL DEFAULT 1.0,
    rounds          INTEGER NOT NULL DEFAULT 1,
    prompt_snapshot TEXT,
    config          TEXT
);

-- One execution attempt of a unit; `sequence` is max+1 per unit.
CREATE TABLE IF NOT EXISTS prompt_test_experiments (
    id          INTEGER PRIMARY KEY,
    unit_id     INTEGER NOT NULL REFERENCES prompt_test_units(id) ON DELETE CASCADE,
    sequence    INTEGER NOT NULL,
    status      TEXT NOT NULL DEFAULT 'pending',
    error       TEXT,
    outputs     TEXT,
    metrics     TEXT,
    started_at  TEXT,
    finished_at TEXT,
    UNIQUE(unit_id, sequence)
);

-- Append-only; provider/model references may outlive the referenced rows.
CREATE TABLE IF NOT EXISTS usage_logs (
    id                INTEGER PRIMARY KEY,
    provider_id       INTEGER REFERENCES providers(id) ON DELETE SET NULL,
    model_id          INTEGER REFERENCES models(id) ON DELETE SET NULL,
    model_name        TEXT NOT NULL,
    source            TEXT NOT NULL DEFAULT 'quick_test',
    messages          TEXT,
    parameters        TEXT,
    response_text     TEXT,
    temperature       REAL,
    latency_ms        INTEGER,
    prompt_tokens     INTEGER,
    completion_tokens INTEGER,
    total_tokens      INTEGER,
    created_at        TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_results_test_run_id
    ON results(test_run_id);
CREATE INDEX IF NOT EXISTS idx_experiments_unit_id
    ON prompt_test_experiments(unit_id);
CREATE INDEX IF NOT EXISTS idx_usage_logs_source_created
    ON usage_logs(source, created_at);
CREATE INDEX IF NOT EXISTS idx_usage_logs_model
    ON usage_logs(model_name, provider_id);
"#;

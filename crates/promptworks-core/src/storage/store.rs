//! SQLite-backed store for tasks, rounds and the usage ledger.
//!
//! One connection behind a mutex; each queue worker commits at well-defined
//! boundaries (per round for results/usage, once at the end for the final
//! status). `Clone` shares the connection.

use super::rows::{
    parse_config, parse_json_opt, parse_metrics, parse_status, to_json_text, ExperimentRow,
    ModelRow, NewResult, NewUsageLog, PromptTestTaskRow, PromptTestUnitRow, ProviderRow,
    ResultRow, TestRunRow, UsageLogRow,
};
use super::schema::SCHEMA;
use crate::error::StoreError;
use crate::metrics::MetricsSummary;
use crate::model::{RunConfig, RunStatus};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl Store {
    /// Open a file-backed store.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_connection(conn: &Connection) -> Result<(), StoreError> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        // WAL mode for file-backed DBs (no-op for in-memory)
        let _ = conn.execute("PRAGMA journal_mode = WAL", []);
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    // --- provider catalog ------------------------------------------------

    pub fn create_provider(
        &self,
        provider_name: &str,
        provider_key: Option<&str>,
        api_key: &str,
        base_url: Option<&str>,
    ) -> Result<i64, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO providers (provider_name, provider_key, api_key, base_url)
             VALUES (?1, ?2, ?3, ?4)",
            params![provider_name, provider_key, api_key, base_url],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_provider(&self, id: i64) -> Result<Option<ProviderRow>, StoreError> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, provider_name, provider_key, api_key, base_url
                 FROM providers WHERE id = ?1",
                params![id],
                provider_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn find_provider_by_name(&self, name: &str) -> Result<Option<ProviderRow>, StoreError> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, provider_name, provider_key, api_key, base_url
                 FROM providers WHERE provider_name = ?1",
                params![name],
                provider_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_providers(&self) -> Result<Vec<ProviderRow>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, provider_name, provider_key, api_key, base_url
             FROM providers ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], provider_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn create_model(&self, provider_id: i64, name: &str) -> Result<i64, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO models (provider_id, name) VALUES (?1, ?2)",
            params![provider_id, name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_model(&self, id: i64) -> Result<Option<ModelRow>, StoreError> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, provider_id, name FROM models WHERE id = ?1",
                params![id],
                model_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_models(&self, provider_id: i64) -> Result<Vec<ModelRow>, StoreError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, provider_id, name FROM models WHERE provider_id = ?1 ORDER BY id ASC")?;
        let rows = stmt.query_map(params![provider_id], model_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Join lookup: model name → its provider, for name-based resolution.
    pub fn find_model_by_name(
        &self,
        name: &str,
    ) -> Result<Option<(ProviderRow, ModelRow)>, StoreError> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT p.id, p.provider_name, p.provider_key, p.api_key, p.base_url,
                        m.id, m.provider_id, m.name
                 FROM models m JOIN providers p ON p.id = m.provider_id
                 WHERE m.name = ?1
                 ORDER BY m.id ASC LIMIT 1",
                params![name],
                |row| {
                    Ok((
                        ProviderRow {
                            id: row.get(0)?,
                            provider_name: row.get(1)?,
                            provider_key: row.get(2)?,
                            api_key: row.get(3)?,
                            base_url: row.get(4)?,
                        },
                        ModelRow {
                            id: row.get(5)?,
                            provider_id: row.get(6)?,
                            name: row.get(7)?,
                        },
                    ))
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn find_model_for_provider(
        &self,
        provider_id: i64,
        name: &str,
    ) -> Result<Option<ModelRow>, StoreError> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, provider_id, name FROM models
                 WHERE provider_id = ?1 AND name = ?2",
                params![provider_id, name],
                model_from_row,
            )
            .optional()?;
        Ok(row)
    }

    // --- test runs (simple shape) ----------------------------------------

    pub fn create_test_run(
        &self,
        model_name: &str,
        temperature: f64,
        top_p: f64,
        repetitions: u32,
        config: &RunConfig,
    ) -> Result<i64, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO test_runs (model_name, temperature, top_p, repetitions, config, status)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending')",
            params![model_name, temperature, top_p, repetitions, to_json_text(config)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_test_run(&self, id: i64) -> Result<Option<TestRunRow>, StoreError> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, model_name, temperature, top_p, repetitions, config, status,
                        last_error, metrics, created_at
                 FROM test_runs WHERE id = ?1",
                params![id],
                |row| {
                    Ok(TestRunRow {
                        id: row.get(0)?,
                        model_name: row.get(1)?,
                        temperature: row.get(2)?,
                        top_p: row.get(3)?,
                        repetitions: row.get(4)?,
                        config: parse_config(5, row.get(5)?)?,
                        status: parse_status(6, row.get(6)?)?,
                        last_error: row.get(7)?,
                        metrics: parse_metrics(8, row.get(8)?)?,
                        created_at: row.get(9)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn set_test_run_status(
        &self,
        id: i64,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE test_runs SET status = ?2, last_error = ?3, updated_at = ?4 WHERE id = ?1",
            params![id, status.as_str(), error, now_rfc3339()],
        )?;
        Ok(())
    }

    pub fn set_test_run_metrics(
        &self,
        id: i64,
        metrics: Option<&MetricsSummary>,
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE test_runs SET metrics = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, metrics.and_then(to_json_text), now_rfc3339()],
        )?;
        Ok(())
    }

    /// Persist one round's result together with its usage ledger entry, in a
    /// single transaction. A mid-batch failure leaves earlier rounds intact.
    pub fn insert_result_with_usage(
        &self,
        test_run_id: i64,
        result: &NewResult,
        usage: &NewUsageLog,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO results (test_run_id, run_index, output, parsed_output,
                                  prompt_tokens, completion_tokens, total_tokens, latency_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                test_run_id,
                result.run_index,
                result.output,
                result.parsed_output.as_ref().map(|v| v.to_string()),
                result.prompt_tokens,
                result.completion_tokens,
                result.total_tokens,
                result.latency_ms,
            ],
        )?;
        insert_usage_in(&tx, usage)?;
        tx.commit()?;
        Ok(())
    }

    pub fn list_results(&self, test_run_id: i64) -> Result<Vec<ResultRow>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, test_run_id, run_index, output, parsed_output, prompt_tokens,
                    completion_tokens, total_tokens, latency_ms, created_at
             FROM results WHERE test_run_id = ?1 ORDER BY run_index ASC",
        )?;
        let rows = stmt.query_map(params![test_run_id], |row| {
            Ok(ResultRow {
                id: row.get(0)?,
                test_run_id: row.get(1)?,
                run_index: row.get(2)?,
                output: row.get(3)?,
                parsed_output: parse_json_opt(4, row.get(4)?)?,
                prompt_tokens: row.get(5)?,
                completion_tokens: row.get(6)?,
                total_tokens: row.get(7)?,
                latency_ms: row.get(8)?,
                created_at: row.get(9)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Purge a run's rounds (explicit retry resets history).
    pub fn delete_results(&self, test_run_id: i64) -> Result<usize, StoreError> {
        let conn = self.conn();
        Ok(conn.execute(
            "DELETE FROM results WHERE test_run_id = ?1",
            params![test_run_id],
        )?)
    }

    // --- prompt tests (richer shape) --------------------------------------

    pub fn create_prompt_test_task(&self, name: &str) -> Result<i64, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO prompt_test_tasks (name, status) VALUES (?1, 'pending')",
            params![name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_task(&self, id: i64) -> Result<Option<PromptTestTaskRow>, StoreError> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, name, status, last_error, is_deleted, created_at
                 FROM prompt_test_tasks WHERE id = ?1",
                params![id],
                |row| {
                    Ok(PromptTestTaskRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        status: parse_status(2, row.get(2)?)?,
                        last_error: row.get(3)?,
                        is_deleted: row.get::<_, i64>(4)? != 0,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn set_task_status(
        &self,
        id: i64,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE prompt_test_tasks SET status = ?2, last_error = ?3 WHERE id = ?1",
            params![id, status.as_str(), error],
        )?;
        Ok(())
    }

    pub fn soft_delete_task(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE prompt_test_tasks SET is_deleted = 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    pub fn add_unit(
        &self,
        task_id: i64,
        model_name: &str,
        temperature: f64,
        top_p: f64,
        rounds: u32,
        prompt_snapshot: Option<&str>,
        config: &RunConfig,
    ) -> Result<i64, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO prompt_test_units
                 (task_id, model_name, temperature, top_p, rounds, prompt_snapshot, config)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                task_id,
                model_name,
                temperature,
                top_p,
                rounds,
                prompt_snapshot,
                to_json_text(config)
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_units(&self, task_id: i64) -> Result<Vec<PromptTestUnitRow>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, task_id, model_name, temperature, top_p, rounds, prompt_snapshot, config
             FROM prompt_test_units WHERE task_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![task_id], |row| {
            Ok(PromptTestUnitRow {
                id: row.get(0)?,
                task_id: row.get(1)?,
                model_name: row.get(2)?,
                temperature: row.get(3)?,
                top_p: row.get(4)?,
                rounds: row.get(5)?,
                prompt_snapshot: row.get(6)?,
                config: parse_config(7, row.get(7)?)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Create a fresh PENDING experiment for a unit with `sequence = max + 1`.
    pub fn create_experiment(&self, unit_id: i64) -> Result<ExperimentRow, StoreError> {
        let conn = self.conn();
        let sequence: i64 = conn.query_row(
            "SELECT COALESCE(MAX(sequence), 0) + 1 FROM prompt_test_experiments WHERE unit_id = ?1",
            params![unit_id],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT INTO prompt_test_experiments (unit_id, sequence, status)
             VALUES (?1, ?2, 'pending')",
            params![unit_id, sequence],
        )?;
        Ok(ExperimentRow {
            id: conn.last_insert_rowid(),
            unit_id,
            sequence,
            status: RunStatus::Pending,
            error: None,
            outputs: None,
            metrics: None,
            started_at: None,
            finished_at: None,
        })
    }

    pub fn get_experiment(&self, id: i64) -> Result<Option<ExperimentRow>, StoreError> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, unit_id, sequence, status, error, outputs, metrics,
                        started_at, finished_at
                 FROM prompt_test_experiments WHERE id = ?1",
                params![id],
                |row| {
                    Ok(ExperimentRow {
                        id: row.get(0)?,
                        unit_id: row.get(1)?,
                        sequence: row.get(2)?,
                        status: parse_status(3, row.get(3)?)?,
                        error: row.get(4)?,
                        outputs: parse_json_opt(5, row.get(5)?)?,
                        metrics: parse_metrics(6, row.get(6)?)?,
                        started_at: row.get(7)?,
                        finished_at: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_experiments(&self, unit_id: i64) -> Result<Vec<ExperimentRow>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, unit_id, sequence, status, error, outputs, metrics,
                    started_at, finished_at
             FROM prompt_test_experiments WHERE unit_id = ?1 ORDER BY sequence ASC",
        )?;
        let rows = stmt.query_map(params![unit_id], |row| {
            Ok(ExperimentRow {
                id: row.get(0)?,
                unit_id: row.get(1)?,
                sequence: row.get(2)?,
                status: parse_status(3, row.get(3)?)?,
                error: row.get(4)?,
                outputs: parse_json_opt(5, row.get(5)?)?,
                metrics: parse_metrics(6, row.get(6)?)?,
                started_at: row.get(7)?,
                finished_at: row.get(8)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn start_experiment(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE prompt_test_experiments
             SET status = 'running', error = NULL, started_at = ?2
             WHERE id = ?1",
            params![id, now_rfc3339()],
        )?;
        Ok(())
    }

    pub fn finish_experiment(
        &self,
        id: i64,
        status: RunStatus,
        error: Option<&str>,
        outputs: Option<&serde_json::Value>,
        metrics: Option<&MetricsSummary>,
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE prompt_test_experiments
             SET status = ?2, error = ?3, outputs = ?4, metrics = ?5, finished_at = ?6
             WHERE id = ?1",
            params![
                id,
                status.as_str(),
                error,
                outputs.map(|v| v.to_string()),
                metrics.and_then(to_json_text),
                now_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Purge all experiments under a task's units (explicit retry).
    pub fn delete_experiments_for_task(&self, task_id: i64) -> Result<usize, StoreError> {
        let conn = self.conn();
        Ok(conn.execute(
            "DELETE FROM prompt_test_experiments
             WHERE unit_id IN (SELECT id FROM prompt_test_units WHERE task_id = ?1)",
            params![task_id],
        )?)
    }

    // --- usage ledger -----------------------------------------------------

    pub fn insert_usage_log(&self, usage: &NewUsageLog) -> Result<i64, StoreError> {
        let conn = self.conn();
        insert_usage_in(&conn, usage)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_usage_logs(&self, source: Option<&str>) -> Result<Vec<UsageLogRow>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, provider_id, model_id, model_name, source, messages, parameters,
                    response_text, temperature, latency_ms, prompt_tokens, completion_tokens,
                    total_tokens, created_at
             FROM usage_logs
             WHERE (?1 IS NULL OR source = ?1)
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![source], usage_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Recent quick-test calls, newest first.
    pub fn quick_test_history(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<UsageLogRow>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, provider_id, model_id, model_name, source, messages, parameters,
                    response_text, temperature, latency_ms, prompt_tokens, completion_tokens,
                    total_tokens, created_at
             FROM usage_logs
             WHERE source = 'quick_test'
             ORDER BY created_at DESC, id DESC
             LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![limit, offset], usage_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn provider_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProviderRow> {
    Ok(ProviderRow {
        id: row.get(0)?,
        provider_name: row.get(1)?,
        provider_key: row.get(2)?,
        api_key: row.get(3)?,
        base_url: row.get(4)?,
    })
}

fn model_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ModelRow> {
    Ok(ModelRow {
        id: row.get(0)?,
        provider_id: row.get(1)?,
        name: row.get(2)?,
    })
}

fn usage_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UsageLogRow> {
    Ok(UsageLogRow {
        id: row.get(0)?,
        provider_id: row.get(1)?,
        model_id: row.get(2)?,
        model_name: row.get(3)?,
        source: row.get(4)?,
        messages: parse_json_opt(5, row.get(5)?)?,
        parameters: parse_json_opt(6, row.get(6)?)?,
        response_text: row.get(7)?,
        temperature: row.get(8)?,
        latency_ms: row.get(9)?,
        prompt_tokens: row.get(10)?,
        completion_tokens: row.get(11)?,
        total_tokens: row.get(12)?,
        created_at: row.get(13)?,
    })
}

fn insert_usage_in(conn: &Connection, usage: &NewUsageLog) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO usage_logs
             (provider_id, model_id, model_name, source, messages, parameters, response_text,
              temperature, latency_ms, prompt_tokens, completion_tokens, total_tokens)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            usage.provider_id,
            usage.model_id,
            usage.model_name,
            usage.source.as_str(),
            usage.messages.as_ref().map(|v| v.to_string()),
            usage.parameters.as_ref().map(|v| v.to_string()),
            usage.response_text,
            usage.temperature,
            usage.latency_ms,
            usage.prompt_tokens,
            usage.completion_tokens,
            usage.total_tokens,
        ],
    )?;
    Ok(())
}

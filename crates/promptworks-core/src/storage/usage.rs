//! Aggregation queries over the usage ledger.
//!
//! Token totals always read `COALESCE(total_tokens, prompt + completion, 0)`
//! so partial rows still count what they can.

use super::store::Store;
use crate::error::StoreError;
use chrono::NaiveDate;
use rusqlite::params;
use serde::Serialize;

/// Optional inclusive day bounds. `None` on either side leaves it open.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    fn bounds(&self) -> (Option<String>, Option<String>) {
        let fmt = |d: &NaiveDate| d.format("%Y-%m-%d").to_string();
        (self.start.as_ref().map(fmt), self.end.as_ref().map(fmt))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageTotals {
    pub total_tokens: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub call_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelUsageSummary {
    pub model_name: String,
    pub provider_id: Option<i64>,
    pub provider_name: Option<String>,
    pub total_tokens: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub call_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageDay {
    pub day: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub call_count: i64,
}

const TOTAL_EXPR: &str =
    "COALESCE(total_tokens, COALESCE(prompt_tokens, 0) + COALESCE(completion_tokens, 0), 0)";

impl Store {
    /// Overall totals for the range, or `None` when nothing was recorded.
    pub fn usage_overview(&self, range: DateRange) -> Result<Option<UsageTotals>, StoreError> {
        let (start, end) = range.bounds();
        let conn = self.conn();
        let sql = format!(
            "SELECT COALESCE(SUM({TOTAL_EXPR}), 0),
                    COALESCE(SUM(COALESCE(prompt_tokens, 0)), 0),
                    COALESCE(SUM(COALESCE(completion_tokens, 0)), 0),
                    COUNT(*)
             FROM usage_logs
             WHERE (?1 IS NULL OR date(created_at) >= ?1)
               AND (?2 IS NULL OR date(created_at) <= ?2)"
        );
        let totals = conn.query_row(&sql, params![start, end], |row| {
            Ok(UsageTotals {
                total_tokens: row.get(0)?,
                input_tokens: row.get(1)?,
                output_tokens: row.get(2)?,
                call_count: row.get(3)?,
            })
        })?;
        if totals.call_count == 0 {
            return Ok(None);
        }
        Ok(Some(totals))
    }

    /// Per-model breakdown, heaviest consumers first.
    pub fn usage_by_model(&self, range: DateRange) -> Result<Vec<ModelUsageSummary>, StoreError> {
        let (start, end) = range.bounds();
        let conn = self.conn();
        let sql = format!(
            "SELECT u.model_name, u.provider_id, p.provider_name,
                    COALESCE(SUM({TOTAL_EXPR}), 0),
                    COALESCE(SUM(COALESCE(u.prompt_tokens, 0)), 0),
                    COALESCE(SUM(COALESCE(u.completion_tokens, 0)), 0),
                    COUNT(*)
             FROM usage_logs u
             LEFT JOIN providers p ON p.id = u.provider_id
             WHERE (?1 IS NULL OR date(u.created_at) >= ?1)
               AND (?2 IS NULL OR date(u.created_at) <= ?2)
             GROUP BY u.model_name, u.provider_id
             ORDER BY 4 DESC, u.model_name ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![start, end], |row| {
            Ok(ModelUsageSummary {
                model_name: row.get(0)?,
                provider_id: row.get(1)?,
                provider_name: row.get(2)?,
                total_tokens: row.get(3)?,
                input_tokens: row.get(4)?,
                output_tokens: row.get(5)?,
                call_count: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Daily series for one model. A `None` provider matches ledger rows
    /// whose provider reference was severed.
    pub fn usage_timeseries(
        &self,
        provider_id: Option<i64>,
        model_name: &str,
        range: DateRange,
    ) -> Result<Vec<UsageDay>, StoreError> {
        let (start, end) = range.bounds();
        let conn = self.conn();
        let sql = "SELECT date(created_at),
                    COALESCE(SUM(COALESCE(prompt_tokens, 0)), 0),
                    COALESCE(SUM(COALESCE(completion_tokens, 0)), 0),
                    COUNT(*)
             FROM usage_logs
             WHERE model_name = ?1
               AND ((?2 IS NULL AND provider_id IS NULL) OR provider_id = ?2)
               AND (?3 IS NULL OR date(created_at) >= ?3)
               AND (?4 IS NULL OR date(created_at) <= ?4)
             GROUP BY date(created_at)
             ORDER BY date(created_at) ASC";
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![model_name, provider_id, start, end], |row| {
            Ok(UsageDay {
                day: row.get(0)?,
                input_tokens: row.get(1)?,
                output_tokens: row.get(2)?,
                call_count: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UsageSource;
    use crate::storage::rows::NewUsageLog;

    fn log(model: &str, prompt: Option<i64>, completion: Option<i64>, total: Option<i64>) -> NewUsageLog {
        NewUsageLog {
            provider_id: None,
            model_id: None,
            model_name: model.into(),
            source: UsageSource::QuickTest,
            messages: None,
            parameters: None,
            response_text: None,
            temperature: None,
            latency_ms: None,
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: total,
        }
    }

    #[test]
    fn overview_coalesces_missing_totals() {
        let store = Store::memory().unwrap();
        store.insert_usage_log(&log("a", Some(3), Some(4), Some(10))).unwrap();
        store.insert_usage_log(&log("a", Some(1), Some(2), None)).unwrap();
        store.insert_usage_log(&log("b", None, None, None)).unwrap();

        let totals = store.usage_overview(DateRange::default()).unwrap().unwrap();
        // 10 reported, 1+2 summed, 0 for the fully-null row
        assert_eq!(totals.total_tokens, 13);
        assert_eq!(totals.input_tokens, 4);
        assert_eq!(totals.output_tokens, 6);
        assert_eq!(totals.call_count, 3);
    }

    #[test]
    fn empty_ledger_reports_none() {
        let store = Store::memory().unwrap();
        assert!(store.usage_overview(DateRange::default()).unwrap().is_none());
    }

    #[test]
    fn by_model_orders_heaviest_first() {
        let store = Store::memory().unwrap();
        store.insert_usage_log(&log("small", Some(1), Some(1), None)).unwrap();
        store.insert_usage_log(&log("big", None, None, Some(100))).unwrap();

        let rows = store.usage_by_model(DateRange::default()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].model_name, "big");
        assert_eq!(rows[0].total_tokens, 100);
        assert_eq!(rows[1].model_name, "small");
        assert_eq!(rows[1].total_tokens, 2);
    }

    #[test]
    fn timeseries_groups_by_day_and_matches_null_provider() {
        let store = Store::memory().unwrap();
        store.insert_usage_log(&log("m", Some(2), Some(3), None)).unwrap();
        store.insert_usage_log(&log("m", Some(4), Some(5), None)).unwrap();
        store.insert_usage_log(&log("other", Some(9), Some(9), None)).unwrap();

        let days = store
            .usage_timeseries(None, "m", DateRange::default())
            .unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].input_tokens, 6);
        assert_eq!(days[0].output_tokens, 8);
        assert_eq!(days[0].call_count, 2);
    }

    #[test]
    fn date_bounds_filter_rows() {
        let store = Store::memory().unwrap();
        store.insert_usage_log(&log("m", Some(1), Some(1), None)).unwrap();

        let today = chrono::Utc::now().date_naive();
        let closed = DateRange {
            start: Some(today),
            end: Some(today),
        };
        assert!(store.usage_overview(closed).unwrap().is_some());

        let future = DateRange {
            start: Some(today + chrono::Days::new(1)),
            end: None,
        };
        assert!(store.usage_overview(future).unwrap().is_none());
    }
}

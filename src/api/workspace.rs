use super::{ApiError, ApiResult, ClubApi};
use crate::db;
use crate::options::athlete_type_label;
use crate::model::{
    Athlete, AthleteId, AthleteQuery, AthleteStats, AttendanceQuery, AttendanceRecord,
    BulkAttendanceRequest, BulkAttendanceResult, Evaluation, EvaluationId, EvaluationInput, Page,
    TestId, TestMetrics, TestPayload, TestRecord,
};
use chrono::{NaiveDate, NaiveTime};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde::Deserialize;
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Serves the club REST contract from a local SQLite workspace.
pub struct WorkspaceClubApi {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAthlete {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub type_athlete: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

fn parse_date(raw: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| ApiError::Decode(format!("stored date {:?}: {}", raw, e)))
}

fn parse_time(raw: Option<String>) -> ApiResult<Option<NaiveTime>> {
    raw.map(|t| {
        NaiveTime::parse_from_str(&t, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(&t, "%H:%M"))
            .map_err(|e| ApiError::Decode(format!("stored time {:?}: {}", t, e)))
    })
    .transpose()
}

fn fmt_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn fmt_time(t: Option<NaiveTime>) -> Option<String> {
    t.map(|t| t.format("%H:%M:%S").to_string())
}

fn unprocessable(message: impl Into<String>, errors: Option<serde_json::Value>) -> ApiError {
    ApiError::Rejected {
        status: 422,
        message: message.into(),
        errors,
    }
}

/// Name search and type filter. The roster and attendance queries must
/// select the same athletes for a given filter.
fn push_athlete_filters(
    alias: &str,
    search: Option<&str>,
    type_athlete: Option<&str>,
    where_sql: &mut Vec<String>,
    bind: &mut Vec<Value>,
) {
    if let Some(s) = search.map(str::trim).filter(|s| !s.is_empty()) {
        where_sql.push(format!(
            "(LOWER({a}first_name || ' ' || {a}last_name) LIKE ? OR LOWER({a}last_name || ', ' || {a}first_name) LIKE ?)",
            a = alias
        ));
        let pattern = format!("%{}%", s.to_lowercase());
        bind.push(Value::Text(pattern.clone()));
        bind.push(Value::Text(pattern));
    }
    if let Some(t) = type_athlete.map(str::trim).filter(|t| !t.is_empty()) {
        where_sql.push(format!("{}type_athlete = ?", alias));
        bind.push(Value::Text(t.to_ascii_lowercase()));
    }
}

fn athlete_from_row(r: &Row<'_>) -> rusqlite::Result<Athlete> {
    Ok(Athlete {
        id: r.get(0)?,
        first_name: r.get(1)?,
        last_name: r.get(2)?,
        type_athlete: r.get(3)?,
        is_active: r.get::<_, i64>(4)? != 0,
    })
}

type EvaluationRow = (i64, String, String, Option<String>, Option<String>, Option<String>, i64);

fn evaluation_from_row(row: EvaluationRow) -> ApiResult<Evaluation> {
    let (id, name, date, time, location, observations, user_id) = row;
    Ok(Evaluation {
        id,
        name,
        date: parse_date(&date)?,
        time: parse_time(time)?,
        location,
        observations,
        user_id,
    })
}

type TestRow = (i64, i64, i64, String, Option<String>, String);

fn test_from_row(row: TestRow) -> ApiResult<TestRecord> {
    let (id, evaluation_id, athlete_id, date, observations, metrics_json) = row;
    let metrics: TestMetrics = serde_json::from_str(&metrics_json)
        .map_err(|e| ApiError::Decode(format!("test {} metrics: {}", id, e)))?;
    Ok(TestRecord {
        id,
        evaluation_id,
        athlete_id,
        date: parse_date(&date)?,
        observations,
        metrics,
    })
}

fn check_evaluation_input(input: &EvaluationInput) -> ApiResult<()> {
    if input.name.trim().is_empty() {
        return Err(unprocessable(
            "name is required",
            Some(json!({ "name": "name is required" })),
        ));
    }
    Ok(())
}

impl WorkspaceClubApi {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        let conn = db::open_db(workspace)?;
        Ok(Self {
            path: Some(workspace.to_path_buf()),
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        db::init_schema(&conn)?;
        Ok(Self {
            path: None,
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> ApiResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ApiError::Transport("workspace connection poisoned".into()))
    }

    pub fn import_athletes(&self, athletes: &[NewAthlete]) -> ApiResult<Vec<Athlete>> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let mut out = Vec::with_capacity(athletes.len());
        for (i, a) in athletes.iter().enumerate() {
            if a.first_name.trim().is_empty() && a.last_name.trim().is_empty() {
                return Err(unprocessable(
                    format!("athlete at index {} has no name", i),
                    None,
                ));
            }
            let type_athlete = match a.type_athlete.as_deref().map(str::trim) {
                None | Some("") => None,
                Some(t) if athlete_type_label(t).is_some() => Some(t.to_ascii_lowercase()),
                Some(t) => {
                    return Err(unprocessable(
                        format!("athlete at index {} has unknown type {:?}", i, t),
                        Some(json!({ "type_athlete": t })),
                    ));
                }
            };
            tx.execute(
                "INSERT INTO athletes(first_name, last_name, type_athlete, is_active)
                 VALUES(?, ?, ?, ?)",
                (
                    a.first_name.trim(),
                    a.last_name.trim(),
                    &type_athlete,
                    a.is_active as i64,
                ),
            )?;
            out.push(Athlete {
                id: tx.last_insert_rowid(),
                first_name: a.first_name.trim().to_string(),
                last_name: a.last_name.trim().to_string(),
                type_athlete,
                is_active: a.is_active,
            });
        }
        tx.commit()?;
        Ok(out)
    }

    fn athlete_exists(conn: &Connection, id: AthleteId) -> ApiResult<bool> {
        Ok(conn
            .query_row("SELECT 1 FROM athletes WHERE id = ?", [id], |r| {
                r.get::<_, i64>(0)
            })
            .optional()?
            .is_some())
    }

    fn load_evaluation(conn: &Connection, id: EvaluationId) -> ApiResult<Evaluation> {
        let row: Option<EvaluationRow> = conn
            .query_row(
                "SELECT id, name, date, time, location, observations, user_id
                 FROM evaluations WHERE id = ?",
                [id],
                |r| {
                    Ok((
                        r.get(0)?,
                        r.get(1)?,
                        r.get(2)?,
                        r.get(3)?,
                        r.get(4)?,
                        r.get(5)?,
                        r.get(6)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some(row) => evaluation_from_row(row),
            None => Err(ApiError::NotFound(format!("evaluation {} not found", id))),
        }
    }

    fn load_test(conn: &Connection, id: TestId) -> ApiResult<TestRecord> {
        let row: Option<TestRow> = conn
            .query_row(
                "SELECT id, evaluation_id, athlete_id, date, observations, metrics_json
                 FROM tests WHERE id = ?",
                [id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?)),
            )
            .optional()?;
        match row {
            Some(row) => test_from_row(row),
            None => Err(ApiError::NotFound(format!("test {} not found", id))),
        }
    }

    fn check_test_refs(conn: &Connection, payload: &TestPayload) -> ApiResult<Evaluation> {
        let evaluation = Self::load_evaluation(conn, payload.evaluation_id)?;
        if !Self::athlete_exists(conn, payload.athlete_id)? {
            return Err(ApiError::NotFound(format!(
                "athlete {} not found",
                payload.athlete_id
            )));
        }
        Ok(evaluation)
    }
}

impl ClubApi for WorkspaceClubApi {
    fn describe(&self) -> String {
        match &self.path {
            Some(p) => format!("workspace {}", p.to_string_lossy()),
            None => "workspace (memory)".to_string(),
        }
    }

    fn list_athletes(&self, query: &AthleteQuery) -> ApiResult<Page<Athlete>> {
        let conn = self.conn()?;
        let mut where_sql = vec!["1 = 1".to_string()];
        let mut bind: Vec<Value> = Vec::new();
        push_athlete_filters(
            "",
            query.search.as_deref(),
            query.type_athlete.as_deref(),
            &mut where_sql,
            &mut bind,
        );
        if let Some(active) = query.is_active {
            where_sql.push("is_active = ?".to_string());
            bind.push(Value::Integer(active as i64));
        }
        let where_clause = where_sql.join(" AND ");

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM athletes WHERE {}", where_clause),
            params_from_iter(bind.iter()),
            |r| r.get(0),
        )?;

        let limit = query.limit.max(1) as i64;
        let offset = (query.page.max(1) as i64 - 1) * limit;
        let mut page_bind = bind.clone();
        page_bind.push(Value::Integer(limit));
        page_bind.push(Value::Integer(offset));
        let mut stmt = conn.prepare(&format!(
            "SELECT id, first_name, last_name, type_athlete, is_active
             FROM athletes WHERE {}
             ORDER BY last_name, first_name, id
             LIMIT ? OFFSET ?",
            where_clause
        ))?;
        let items = stmt
            .query_map(params_from_iter(page_bind.iter()), athlete_from_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        Ok(Page {
            items,
            total: total.max(0) as u64,
        })
    }

    fn athlete_stats(&self, athlete_id: AthleteId) -> ApiResult<AthleteStats> {
        let conn = self.conn()?;
        if !Self::athlete_exists(&conn, athlete_id)? {
            return Err(ApiError::NotFound(format!("athlete {} not found", athlete_id)));
        }
        let mut stmt = conn.prepare(
            "SELECT test_type, COUNT(*), MAX(date) FROM tests
             WHERE athlete_id = ? GROUP BY test_type",
        )?;
        let rows = stmt
            .query_map([athlete_id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, i64>(1)?,
                    r.get::<_, String>(2)?,
                ))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        let mut by_type = BTreeMap::new();
        let mut test_count = 0u64;
        let mut last: Option<NaiveDate> = None;
        for (test_type, count, max_date) in rows {
            test_count += count as u64;
            by_type.insert(test_type, count as u64);
            let d = parse_date(&max_date)?;
            last = Some(last.map_or(d, |cur| cur.max(d)));
        }
        Ok(AthleteStats {
            athlete_id,
            test_count,
            by_type,
            last_test_date: last,
        })
    }

    fn list_attendance(&self, query: &AttendanceQuery) -> ApiResult<Vec<AttendanceRecord>> {
        let conn = self.conn()?;
        let mut where_sql = vec!["a.date = ?".to_string()];
        let mut bind: Vec<Value> = vec![Value::Text(fmt_date(query.date))];
        push_athlete_filters(
            "p.",
            query.search.as_deref(),
            query.type_athlete.as_deref(),
            &mut where_sql,
            &mut bind,
        );
        let mut stmt = conn.prepare(&format!(
            "SELECT a.athlete_id, a.date, a.time, a.is_present, a.justification
             FROM attendances a JOIN athletes p ON p.id = a.athlete_id
             WHERE {}
             ORDER BY a.athlete_id",
            where_sql.join(" AND ")
        ))?;
        let rows = stmt
            .query_map(params_from_iter(bind.iter()), |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Option<String>>(2)?,
                    r.get::<_, i64>(3)?,
                    r.get::<_, Option<String>>(4)?,
                ))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        rows.into_iter()
            .map(|(athlete_id, date, time, present, justification)| -> ApiResult<AttendanceRecord> {
                Ok(AttendanceRecord {
                    athlete_id,
                    date: parse_date(&date)?,
                    time: parse_time(time)?,
                    is_present: present != 0,
                    justification,
                })
            })
            .collect()
    }

    fn bulk_upsert_attendance(
        &self,
        req: &BulkAttendanceRequest,
    ) -> ApiResult<BulkAttendanceResult> {
        let conn = self.conn()?;
        let date = fmt_date(req.date);
        let time = fmt_time(req.time)
            .unwrap_or_else(|| chrono::Local::now().time().format("%H:%M:%S").to_string());

        let mut seen: HashSet<AthleteId> = HashSet::new();
        let mut unknown: Vec<AthleteId> = Vec::new();
        for rec in &req.records {
            if !seen.insert(rec.athlete_id) {
                return Err(unprocessable(
                    format!("athlete {} appears more than once", rec.athlete_id),
                    None,
                ));
            }
            if !Self::athlete_exists(&conn, rec.athlete_id)? {
                unknown.push(rec.athlete_id);
            }
        }
        if !unknown.is_empty() {
            return Err(unprocessable(
                "unknown athletes in batch",
                Some(json!({ "athlete_ids": unknown })),
            ));
        }

        let tx = conn.unchecked_transaction()?;
        let mut created = 0u64;
        let mut updated = 0u64;
        for rec in &req.records {
            let exists = tx
                .query_row(
                    "SELECT 1 FROM attendances WHERE athlete_id = ? AND date = ?",
                    (rec.athlete_id, &date),
                    |r| r.get::<_, i64>(0),
                )
                .optional()?
                .is_some();
            tx.execute(
                "INSERT INTO attendances(athlete_id, date, time, is_present, justification)
                 VALUES(?, ?, ?, ?, ?)
                 ON CONFLICT(athlete_id, date) DO UPDATE SET
                   time = excluded.time,
                   is_present = excluded.is_present,
                   justification = excluded.justification",
                (
                    rec.athlete_id,
                    &date,
                    &time,
                    rec.is_present as i64,
                    &rec.justification,
                ),
            )?;
            if exists {
                updated += 1;
            } else {
                created += 1;
            }
        }
        tx.commit()?;
        Ok(BulkAttendanceResult {
            created_count: created,
            updated_count: updated,
        })
    }

    fn list_evaluations(&self) -> ApiResult<Vec<Evaluation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, date, time, location, observations, user_id
             FROM evaluations ORDER BY date DESC, id DESC",
        )?;
        let rows: Vec<EvaluationRow> = stmt
            .query_map([], |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                    r.get(6)?,
                ))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        rows.into_iter().map(evaluation_from_row).collect()
    }

    fn get_evaluation(&self, id: EvaluationId) -> ApiResult<Evaluation> {
        let conn = self.conn()?;
        Self::load_evaluation(&conn, id)
    }

    fn create_evaluation(&self, input: &EvaluationInput) -> ApiResult<Evaluation> {
        check_evaluation_input(input)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO evaluations(name, date, time, location, observations, user_id)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                input.name.trim(),
                fmt_date(input.date),
                fmt_time(input.time),
                &input.location,
                &input.observations,
                input.user_id,
            ),
        )?;
        let id = conn.last_insert_rowid();
        Self::load_evaluation(&conn, id)
    }

    fn update_evaluation(
        &self,
        id: EvaluationId,
        input: &EvaluationInput,
    ) -> ApiResult<Evaluation> {
        check_evaluation_input(input)?;
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE evaluations
             SET name = ?, date = ?, time = ?, location = ?, observations = ?
             WHERE id = ?",
            (
                input.name.trim(),
                fmt_date(input.date),
                fmt_time(input.time),
                &input.location,
                &input.observations,
                id,
            ),
        )?;
        if changed == 0 {
            return Err(ApiError::NotFound(format!("evaluation {} not found", id)));
        }
        Self::load_evaluation(&conn, id)
    }

    fn list_evaluation_tests(&self, id: EvaluationId) -> ApiResult<Vec<TestRecord>> {
        let conn = self.conn()?;
        Self::load_evaluation(&conn, id)?;
        let mut stmt = conn.prepare(
            "SELECT id, evaluation_id, athlete_id, date, observations, metrics_json
             FROM tests WHERE evaluation_id = ? ORDER BY id",
        )?;
        let rows: Vec<TestRow> = stmt
            .query_map([id], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        rows.into_iter().map(test_from_row).collect()
    }

    fn create_test(&self, payload: &TestPayload) -> ApiResult<TestRecord> {
        let conn = self.conn()?;
        let evaluation = Self::check_test_refs(&conn, payload)?;
        let metrics_json = serde_json::to_string(&payload.metrics)
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        conn.execute(
            "INSERT INTO tests(evaluation_id, athlete_id, test_type, date, observations, metrics_json)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                payload.evaluation_id,
                payload.athlete_id,
                payload.test_type().as_str(),
                fmt_date(payload.date.unwrap_or(evaluation.date)),
                &payload.observations,
                &metrics_json,
            ),
        )?;
        let id = conn.last_insert_rowid();
        Self::load_test(&conn, id)
    }

    fn update_test(&self, test_id: TestId, payload: &TestPayload) -> ApiResult<TestRecord> {
        let conn = self.conn()?;
        let existing = Self::load_test(&conn, test_id)?;
        if existing.test_type() != payload.test_type() {
            return Err(unprocessable(
                format!(
                    "test {} is a {} test, not {}",
                    test_id,
                    existing.test_type().as_str(),
                    payload.test_type().as_str()
                ),
                None,
            ));
        }
        Self::check_test_refs(&conn, payload)?;
        let metrics_json = serde_json::to_string(&payload.metrics)
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        conn.execute(
            "UPDATE tests SET evaluation_id = ?, athlete_id = ?, date = ?, observations = ?, metrics_json = ?
             WHERE id = ?",
            (
                payload.evaluation_id,
                payload.athlete_id,
                fmt_date(payload.date.unwrap_or(existing.date)),
                &payload.observations,
                &metrics_json,
                test_id,
            ),
        )?;
        Self::load_test(&conn, test_id)
    }
}

//! Attendance draft for one date and the reconcile/submit cycle around it.

use crate::api::{ApiError, ClubApi};
use crate::model::{
    Athlete, AthleteId, AthleteQuery, AttendanceQuery, AttendanceRecord, BulkAttendanceEntry,
    BulkAttendanceRequest, BulkAttendanceResult,
};
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use thiserror::Error;

pub const ATTENDANCE_BULK_MAX_RECORDS: usize = 5000;
const ROSTER_PAGE_LIMIT: u32 = 100;

#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("load a roster first")]
    NoDraft,

    #[error("athlete {0} is not in the loaded roster")]
    NotInRoster(AthleteId),

    #[error("justification only applies to absent athletes")]
    JustificationWhilePresent(AthleteId),

    #[error("the roster is empty, nothing to submit")]
    EmptyRoster,

    #[error("bulk payload exceeds max records: {0} > {max}", max = ATTENDANCE_BULK_MAX_RECORDS)]
    TooManyRecords(usize),

    #[error("could not load attendance: {0}")]
    Load(#[source] ApiError),

    #[error("could not save attendance: {0}")]
    Submission(#[source] ApiError),
}

impl AttendanceError {
    pub fn code(&self) -> &'static str {
        match self {
            AttendanceError::NoDraft => "no_draft",
            AttendanceError::NotInRoster(_) => "not_found",
            AttendanceError::JustificationWhilePresent(_) => "bad_params",
            AttendanceError::EmptyRoster => "empty_roster",
            AttendanceError::TooManyRecords(_) => "too_many_records",
            AttendanceError::Load(ApiError::Unauthorized)
            | AttendanceError::Submission(ApiError::Unauthorized) => "unauthorized",
            AttendanceError::Load(_) => "load_failed",
            AttendanceError::Submission(_) => "submission_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftEntry {
    pub is_present: bool,
    /// `None` only when a fetched record carried no justification.
    pub justification: Option<String>,
}

impl DraftEntry {
    fn default_absent() -> Self {
        Self {
            is_present: false,
            justification: Some(String::new()),
        }
    }

    fn present() -> Self {
        Self {
            is_present: true,
            justification: Some(String::new()),
        }
    }

    fn from_record(rec: &AttendanceRecord) -> Self {
        Self {
            is_present: rec.is_present,
            justification: rec.justification.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceFilter {
    pub date: NaiveDate,
    pub search: Option<String>,
    pub type_athlete: Option<String>,
}

impl AttendanceFilter {
    pub fn new(date: NaiveDate, search: Option<String>, type_athlete: Option<String>) -> Self {
        let clean = |v: Option<String>| {
            v.map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        Self {
            date,
            search: clean(search),
            type_athlete: clean(type_athlete),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftCounts {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
}

/// Present/absent state for every athlete of the loaded roster.
#[derive(Debug, Clone)]
pub struct AttendanceDraft {
    filter: AttendanceFilter,
    roster: Vec<Athlete>,
    entries: HashMap<AthleteId, DraftEntry>,
}

impl AttendanceDraft {
    /// Seeds one entry per roster athlete: the fetched record when there is
    /// one, otherwise absent. Unmarked attendance never counts as present.
    pub fn seed(
        filter: AttendanceFilter,
        roster: Vec<Athlete>,
        existing: &[AttendanceRecord],
    ) -> Self {
        let existing_by_athlete: HashMap<AthleteId, &AttendanceRecord> = existing
            .iter()
            .filter(|r| r.date == filter.date)
            .map(|r| (r.athlete_id, r))
            .collect();
        let entries = roster
            .iter()
            .map(|a| {
                let entry = existing_by_athlete
                    .get(&a.id)
                    .map(|r| DraftEntry::from_record(r))
                    .unwrap_or_else(DraftEntry::default_absent);
                (a.id, entry)
            })
            .collect();
        Self {
            filter,
            roster,
            entries,
        }
    }

    pub fn filter(&self) -> &AttendanceFilter {
        &self.filter
    }

    pub fn roster(&self) -> &[Athlete] {
        &self.roster
    }

    pub fn entry(&self, athlete_id: AthleteId) -> Option<&DraftEntry> {
        self.entries.get(&athlete_id)
    }

    fn entry_mut(&mut self, athlete_id: AthleteId) -> Result<&mut DraftEntry, AttendanceError> {
        self.entries
            .get_mut(&athlete_id)
            .ok_or(AttendanceError::NotInRoster(athlete_id))
    }

    /// Marking present wipes the justification; marking absent keeps
    /// whatever was typed before.
    pub fn set_present(&mut self, athlete_id: AthleteId, present: bool) -> Result<(), AttendanceError> {
        let entry = self.entry_mut(athlete_id)?;
        entry.is_present = present;
        if present {
            entry.justification = Some(String::new());
        }
        Ok(())
    }

    pub fn set_justification(
        &mut self,
        athlete_id: AthleteId,
        text: &str,
    ) -> Result<(), AttendanceError> {
        let entry = self.entry_mut(athlete_id)?;
        if entry.is_present {
            return Err(AttendanceError::JustificationWhilePresent(athlete_id));
        }
        entry.justification = Some(text.to_string());
        Ok(())
    }

    /// Only the athletes on screen are touched.
    pub fn mark_all_present(&mut self) {
        for a in &self.roster {
            self.entries.insert(a.id, DraftEntry::present());
        }
    }

    pub fn counts(&self) -> DraftCounts {
        let present = self.entries.values().filter(|e| e.is_present).count();
        DraftCounts {
            total: self.roster.len(),
            present,
            absent: self.roster.len() - present,
        }
    }

    pub fn build_request(&self, time: Option<NaiveTime>) -> BulkAttendanceRequest {
        let records = self
            .roster
            .iter()
            .map(|a| {
                let entry = self
                    .entries
                    .get(&a.id)
                    .cloned()
                    .unwrap_or_else(DraftEntry::default_absent);
                let justification = if entry.is_present {
                    None
                } else {
                    entry
                        .justification
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                };
                BulkAttendanceEntry {
                    athlete_id: a.id,
                    is_present: entry.is_present,
                    justification,
                }
            })
            .collect();
        BulkAttendanceRequest {
            date: self.filter.date,
            time,
            records,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let rows: Vec<serde_json::Value> = self
            .roster
            .iter()
            .map(|a| {
                let entry = self.entries.get(&a.id);
                json!({
                    "athleteId": a.id,
                    "displayName": a.display_name(),
                    "typeAthlete": a.type_athlete,
                    "isPresent": entry.map(|e| e.is_present).unwrap_or(false),
                    "justification": entry.and_then(|e| e.justification.clone()),
                })
            })
            .collect();
        json!({
            "date": self.filter.date,
            "search": self.filter.search,
            "typeAthlete": self.filter.type_athlete,
            "rows": rows,
            "counts": self.counts(),
        })
    }
}

/// Identifies one roster load. Results of a load that has since been
/// superseded are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
    filter: AttendanceFilter,
}

impl LoadTicket {
    pub fn filter(&self) -> &AttendanceFilter {
        &self.filter
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSummary {
    pub created_count: u64,
    pub updated_count: u64,
    pub message: String,
}

impl BulkSummary {
    fn from_result(r: BulkAttendanceResult) -> Self {
        let message = match (r.created_count, r.updated_count) {
            (0, 0) => "Attendance saved: no changes".to_string(),
            (c, u) => format!("Attendance saved: {} created, {} updated", c, u),
        };
        Self {
            created_count: r.created_count,
            updated_count: r.updated_count,
            message,
        }
    }
}

#[derive(Debug, Default)]
pub struct BulkReconciler {
    generation: u64,
    draft: Option<AttendanceDraft>,
}

pub fn fetch_roster(
    api: &dyn ClubApi,
    filter: &AttendanceFilter,
) -> Result<Vec<Athlete>, ApiError> {
    let mut roster = Vec::new();
    let mut page = 1u32;
    loop {
        let batch = api.list_athletes(&AthleteQuery {
            page,
            limit: ROSTER_PAGE_LIMIT,
            search: filter.search.clone(),
            type_athlete: filter.type_athlete.clone(),
            is_active: Some(true),
        })?;
        let fetched = batch.items.len();
        roster.extend(batch.items);
        if fetched == 0 || roster.len() as u64 >= batch.total {
            break;
        }
        page += 1;
    }
    Ok(roster)
}

impl BulkReconciler {
    pub fn draft(&self) -> Option<&AttendanceDraft> {
        self.draft.as_ref()
    }

    pub fn draft_mut(&mut self) -> Result<&mut AttendanceDraft, AttendanceError> {
        self.draft.as_mut().ok_or(AttendanceError::NoDraft)
    }

    pub fn begin_load(&mut self, filter: AttendanceFilter) -> LoadTicket {
        self.generation += 1;
        LoadTicket {
            generation: self.generation,
            filter,
        }
    }

    /// Replaces the draft wholesale. Returns `false` when `ticket` is no
    /// longer the latest load.
    pub fn apply_load(
        &mut self,
        ticket: LoadTicket,
        roster: Vec<Athlete>,
        existing: &[AttendanceRecord],
    ) -> bool {
        if ticket.generation != self.generation {
            log::warn!(
                "dropping stale attendance load {} (latest {})",
                ticket.generation,
                self.generation
            );
            return false;
        }
        self.draft = Some(AttendanceDraft::seed(ticket.filter, roster, existing));
        true
    }

    /// Fetches roster and existing records side by side.
    pub fn fetch(
        api: &dyn ClubApi,
        ticket: &LoadTicket,
    ) -> Result<(Vec<Athlete>, Vec<AttendanceRecord>), AttendanceError> {
        let filter = ticket.filter();
        let query = AttendanceQuery {
            date: filter.date,
            type_athlete: filter.type_athlete.clone(),
            search: filter.search.clone(),
        };
        let (roster, existing) = rayon::join(
            || fetch_roster(api, filter),
            || api.list_attendance(&query),
        );
        Ok((
            roster.map_err(AttendanceError::Load)?,
            existing.map_err(AttendanceError::Load)?,
        ))
    }

    pub fn refresh(
        &mut self,
        api: &dyn ClubApi,
        filter: AttendanceFilter,
    ) -> Result<&AttendanceDraft, AttendanceError> {
        let ticket = self.begin_load(filter);
        let (roster, existing) = Self::fetch(api, &ticket)?;
        log::info!(
            "attendance loaded for {}: {} athletes, {} existing records",
            ticket.filter().date,
            roster.len(),
            existing.len()
        );
        self.apply_load(ticket, roster, &existing);
        self.draft.as_ref().ok_or(AttendanceError::NoDraft)
    }

    /// One bulk call for the whole roster. On failure the draft is left
    /// exactly as it was; on success it is kept for further editing.
    pub fn submit(
        &mut self,
        api: &dyn ClubApi,
        time: Option<NaiveTime>,
    ) -> Result<BulkSummary, AttendanceError> {
        let draft = self.draft.as_ref().ok_or(AttendanceError::NoDraft)?;
        if draft.roster().is_empty() {
            return Err(AttendanceError::EmptyRoster);
        }
        if draft.roster().len() > ATTENDANCE_BULK_MAX_RECORDS {
            return Err(AttendanceError::TooManyRecords(draft.roster().len()));
        }
        let req = draft.build_request(time);
        match api.bulk_upsert_attendance(&req) {
            Ok(result) => {
                let summary = BulkSummary::from_result(result);
                log::info!("attendance {}: {}", req.date, summary.message);
                Ok(summary)
            }
            Err(e) => {
                log::warn!("attendance bulk submit for {} failed: {}", req.date, e);
                Err(AttendanceError::Submission(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::FakeApi;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).expect("date")
    }

    fn athlete(id: AthleteId, last: &str) -> Athlete {
        Athlete {
            id,
            first_name: "X".into(),
            last_name: last.into(),
            type_athlete: Some("student".into()),
            is_active: true,
        }
    }

    fn record(athlete_id: AthleteId, present: bool, why: Option<&str>) -> AttendanceRecord {
        AttendanceRecord {
            athlete_id,
            date: day(),
            time: None,
            is_present: present,
            justification: why.map(|s| s.to_string()),
        }
    }

    fn filter() -> AttendanceFilter {
        AttendanceFilter::new(day(), None, None)
    }

    #[test]
    fn seeding_merges_existing_and_defaults_absent() {
        let draft = AttendanceDraft::seed(
            filter(),
            vec![athlete(1, "A"), athlete(2, "B")],
            &[record(1, true, None)],
        );
        assert_eq!(
            draft.entry(1),
            Some(&DraftEntry {
                is_present: true,
                justification: None
            })
        );
        assert_eq!(
            draft.entry(2),
            Some(&DraftEntry {
                is_present: false,
                justification: Some(String::new())
            })
        );
    }

    #[test]
    fn seeding_keeps_existing_justification() {
        let draft = AttendanceDraft::seed(
            filter(),
            vec![athlete(1, "A")],
            &[record(1, false, Some("sick"))],
        );
        let e = draft.entry(1).expect("entry");
        assert!(!e.is_present);
        assert_eq!(e.justification.as_deref(), Some("sick"));
        assert_eq!(draft.to_json()["rows"][0]["justification"], "sick");
    }

    #[test]
    fn records_outside_the_roster_are_ignored() {
        let draft = AttendanceDraft::seed(
            filter(),
            vec![athlete(1, "A")],
            &[record(1, true, None), record(9, true, None)],
        );
        assert!(draft.entry(9).is_none());
        assert_eq!(draft.counts().total, 1);
    }

    #[test]
    fn present_clears_justification_and_absent_keeps_it() {
        let mut draft = AttendanceDraft::seed(filter(), vec![athlete(1, "A")], &[]);
        draft.set_justification(1, "injury").expect("absent may justify");
        draft.set_present(1, false).expect("stay absent");
        assert_eq!(draft.entry(1).and_then(|e| e.justification.as_deref()), Some("injury"));

        draft.set_present(1, true).expect("mark present");
        assert_eq!(draft.entry(1).and_then(|e| e.justification.as_deref()), Some(""));
        assert!(matches!(
            draft.set_justification(1, "late"),
            Err(AttendanceError::JustificationWhilePresent(1))
        ));
        assert!(matches!(
            draft.set_present(3, true),
            Err(AttendanceError::NotInRoster(3))
        ));
    }

    #[test]
    fn mark_all_present_is_bounded_to_loaded_roster() {
        let mut draft = AttendanceDraft::seed(
            filter(),
            vec![athlete(1, "A"), athlete(2, "B")],
            &[record(2, false, Some("travel")), record(5, false, None)],
        );
        draft.mark_all_present();
        for id in [1, 2] {
            let e = draft.entry(id).expect("entry");
            assert!(e.is_present);
            assert_eq!(e.justification.as_deref(), Some(""));
        }
        assert!(draft.entry(5).is_none());
        assert_eq!(
            draft.counts(),
            DraftCounts {
                total: 2,
                present: 2,
                absent: 0
            }
        );
    }

    #[test]
    fn request_has_one_record_per_roster_athlete() {
        let mut draft = AttendanceDraft::seed(
            filter(),
            vec![athlete(1, "A"), athlete(2, "B"), athlete(3, "C")],
            &[record(3, false, Some("  "))],
        );
        draft.set_present(1, true).expect("present");
        draft.set_justification(2, "sick").expect("justify");
        let req = draft.build_request(None);
        assert_eq!(req.records.len(), 3);
        assert_eq!(req.date, day());
        assert!(req.time.is_none());
        assert_eq!(req.records[0].justification, None);
        assert!(req.records[0].is_present);
        assert_eq!(req.records[1].justification.as_deref(), Some("sick"));
        assert_eq!(req.records[2].justification, None);
    }

    #[test]
    fn submit_reports_counts_and_keeps_draft() {
        let api = FakeApi::with(|s| {
            s.athletes = vec![athlete(1, "A"), athlete(2, "B")];
            s.attendance = vec![record(1, true, None)];
            s.bulk_result = Some(BulkAttendanceResult {
                created_count: 1,
                updated_count: 1,
            });
        });
        let mut rec = BulkReconciler::default();
        rec.refresh(&api, filter()).expect("load");
        rec.draft_mut()
            .and_then(|d| d.set_present(2, true))
            .expect("toggle");
        let summary = rec.submit(&api, None).expect("submit");
        assert_eq!(summary.created_count, 1);
        assert_eq!(summary.updated_count, 1);
        assert_eq!(summary.message, "Attendance saved: 1 created, 1 updated");
        let draft = rec.draft().expect("draft kept");
        assert!(draft.entry(2).map(|e| e.is_present).unwrap_or(false));

        let st = api.state.lock().expect("fake state");
        assert_eq!(st.bulk_requests.len(), 1);
        assert_eq!(st.bulk_requests[0].records.len(), 2);
    }

    #[test]
    fn failed_submit_leaves_draft_verbatim() {
        let api = FakeApi::with(|s| {
            s.athletes = vec![athlete(1, "A")];
            s.fail_writes = true;
        });
        let mut rec = BulkReconciler::default();
        rec.refresh(&api, filter()).expect("load");
        rec.draft_mut()
            .and_then(|d| d.set_justification(1, "dentist"))
            .expect("justify");
        let before = rec.draft().map(|d| d.to_json());
        let err = rec.submit(&api, None).expect_err("server down");
        assert_eq!(err.code(), "submission_failed");
        assert_eq!(rec.draft().map(|d| d.to_json()), before);
    }

    #[test]
    fn refresh_rebuilds_from_scratch() {
        let api = FakeApi::with(|s| {
            s.athletes = vec![athlete(1, "A"), athlete(2, "B")];
        });
        let mut rec = BulkReconciler::default();
        rec.refresh(&api, filter()).expect("load");
        rec.draft_mut().expect("draft").mark_all_present();

        rec.refresh(&api, AttendanceFilter::new(day(), Some("b".into()), None))
            .expect("reload");
        let draft = rec.draft().expect("draft");
        assert_eq!(draft.roster().len(), 1);
        assert_eq!(draft.entry(2).map(|e| e.is_present), Some(false));
        assert!(draft.entry(1).is_none());
    }

    #[test]
    fn stale_load_is_dropped() {
        let mut rec = BulkReconciler::default();
        let old = rec.begin_load(filter());
        let new = rec.begin_load(AttendanceFilter::new(day(), Some("b".into()), None));
        assert!(rec.apply_load(new, vec![athlete(2, "B")], &[]));
        assert!(!rec.apply_load(old, vec![athlete(1, "A")], &[]));
        let draft = rec.draft().expect("draft");
        assert_eq!(draft.roster()[0].id, 2);
    }

    #[test]
    fn roster_fetch_walks_every_page() {
        let api = FakeApi::with(|s| {
            s.athletes = (1..=250).map(|i| athlete(i, "N")).collect();
        });
        let roster = fetch_roster(&api, &filter()).expect("roster");
        assert_eq!(roster.len(), 250);
        let pages = api
            .calls()
            .iter()
            .filter(|c| c.as_str() == "list_athletes")
            .count();
        assert_eq!(pages, 3);
    }

    fn reconciler_with_roster(size: usize) -> BulkReconciler {
        let roster: Vec<Athlete> = (1..=size as AthleteId)
            .map(|id| athlete(id, "Bulk"))
            .collect();
        let mut rec = BulkReconciler::default();
        let ticket = rec.begin_load(filter());
        assert!(rec.apply_load(ticket, roster, &[]));
        rec
    }

    #[test]
    fn oversized_batch_is_rejected_before_any_call() {
        let api = FakeApi::default();
        let mut rec = reconciler_with_roster(ATTENDANCE_BULK_MAX_RECORDS + 1);
        assert!(matches!(
            rec.submit(&api, None),
            Err(AttendanceError::TooManyRecords(5001))
        ));
        assert!(!api.calls().iter().any(|c| c == "bulk_upsert_attendance"));
        assert_eq!(rec.draft().map(|d| d.roster().len()), Some(5001));
    }

    #[test]
    fn batch_at_the_limit_is_sent_in_one_call() {
        let api = FakeApi::default();
        let mut rec = reconciler_with_roster(ATTENDANCE_BULK_MAX_RECORDS);
        let summary = rec.submit(&api, None).expect("submit 5000");
        assert_eq!(summary.created_count, 5000);
        assert_eq!(
            api.calls()
                .iter()
                .filter(|c| *c == "bulk_upsert_attendance")
                .count(),
            1
        );
    }

    #[test]
    fn submit_without_roster_is_rejected() {
        let api = FakeApi::default();
        let mut rec = BulkReconciler::default();
        assert!(matches!(rec.submit(&api, None), Err(AttendanceError::NoDraft)));
        rec.refresh(&api, filter()).expect("empty load");
        assert!(matches!(
            rec.submit(&api, None),
            Err(AttendanceError::EmptyRoster)
        ));
    }
}

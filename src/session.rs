//! Capture session for one evaluation: which test-type tab is open, which
//! athlete the form is bound to, and whether we are creating or editing.

use crate::api::{ApiError, ClubApi};
use crate::cache::{self, Mutation, QueryKey};
use crate::model::{Athlete, AthleteId, Evaluation, EvaluationId, TestId, TestPayload, TestRecord};
use crate::options::TestType;
use crate::schema::{self, FieldErrors, RawForm};
use crate::selection::AthleteSelection;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CapturePhase {
    NoAthlete,
    Ready,
    Submitting,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureMode {
    Create,
    Edit {
        test_id: TestId,
        evaluation_id: EvaluationId,
        athlete_id: AthleteId,
        date: NaiveDate,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Toast-level message for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("open an evaluation first")]
    NoEvaluation,

    #[error("select an athlete first")]
    NoAthleteSelected,

    #[error("a submission is already in progress")]
    Busy,

    #[error("test type is fixed while editing a {} test", .0.as_str())]
    EditLocksTestType(TestType),

    #[error("check the highlighted fields: {0}")]
    Validation(FieldErrors),

    #[error("could not save test: {0}")]
    Submission(#[source] ApiError),
}

impl CaptureError {
    pub fn code(&self) -> &'static str {
        match self {
            CaptureError::NoEvaluation => "no_evaluation",
            CaptureError::NoAthleteSelected => "no_athlete_selected",
            CaptureError::Busy => "busy",
            CaptureError::EditLocksTestType(_) => "edit_locked",
            CaptureError::Validation(_) => "validation_failed",
            CaptureError::Submission(ApiError::Unauthorized) => "unauthorized",
            CaptureError::Submission(_) => "submission_failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub record: TestRecord,
    pub created: bool,
    pub invalidate: BTreeSet<QueryKey>,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct CaptureSession {
    evaluation_id: Option<EvaluationId>,
    evaluation_date: Option<NaiveDate>,
    test_type: TestType,
    selection: AthleteSelection,
    mode: CaptureMode,
    submitting: bool,
    field_errors: FieldErrors,
    notice: Option<Notice>,
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self {
            evaluation_id: None,
            evaluation_date: None,
            test_type: TestType::Sprint,
            selection: AthleteSelection::default(),
            mode: CaptureMode::Create,
            submitting: false,
            field_errors: FieldErrors::default(),
            notice: None,
        }
    }
}

impl CaptureSession {
    pub fn evaluation_id(&self) -> Option<EvaluationId> {
        self.evaluation_id
    }

    pub fn test_type(&self) -> TestType {
        self.test_type
    }

    pub fn selected(&self) -> Option<&Athlete> {
        self.selection.current()
    }

    pub fn mode(&self) -> &CaptureMode {
        &self.mode
    }

    pub fn field_errors(&self) -> &FieldErrors {
        &self.field_errors
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn phase(&self) -> CapturePhase {
        if self.submitting {
            return CapturePhase::Submitting;
        }
        match self.mode {
            CaptureMode::Edit { .. } => CapturePhase::Ready,
            CaptureMode::Create if self.selection.current().is_some() => CapturePhase::Ready,
            CaptureMode::Create => CapturePhase::NoAthlete,
        }
    }

    pub fn form_enabled(&self) -> bool {
        self.phase() == CapturePhase::Ready
    }
}

#[derive(Debug, Default)]
pub struct EvaluationSessionController {
    session: CaptureSession,
}

impl EvaluationSessionController {
    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    /// Starts capturing against `evaluation`. Selection and edit state from a
    /// previous evaluation do not carry over.
    pub fn open(&mut self, evaluation: &Evaluation, test_type: Option<TestType>) {
        self.session = CaptureSession {
            evaluation_id: Some(evaluation.id),
            evaluation_date: Some(evaluation.date),
            test_type: test_type.unwrap_or(self.session.test_type),
            ..CaptureSession::default()
        };
        log::info!(
            "capture opened for evaluation {} ({})",
            evaluation.id,
            self.session.test_type.as_str()
        );
    }

    /// Switches the tab. The selected athlete stays so several test types can
    /// be entered for the same person in a row.
    pub fn set_test_type(&mut self, test_type: TestType) -> Result<(), CaptureError> {
        if let CaptureMode::Edit { .. } = self.session.mode {
            if test_type != self.session.test_type {
                return Err(CaptureError::EditLocksTestType(self.session.test_type));
            }
        }
        if test_type != self.session.test_type {
            self.session.field_errors = FieldErrors::default();
        }
        self.session.test_type = test_type;
        Ok(())
    }

    pub fn select_athlete(&mut self, athlete: Athlete) {
        if self.session.selection.athlete_id() != Some(athlete.id) {
            self.session.field_errors = FieldErrors::default();
        }
        self.session.selection.select(athlete);
    }

    pub fn clear_athlete(&mut self) {
        self.session.selection.clear();
    }

    /// Switches to editing `record` in place. Its ids and test type are fixed
    /// for the rest of the edit and live only in the edit mode; the opened
    /// evaluation is what creates go to once the edit ends.
    pub fn begin_edit(&mut self, record: &TestRecord) {
        self.session.test_type = record.test_type();
        self.session.mode = CaptureMode::Edit {
            test_id: record.id,
            evaluation_id: record.evaluation_id,
            athlete_id: record.athlete_id,
            date: record.date,
        };
        self.session.field_errors = FieldErrors::default();
        self.session.notice = None;
    }

    pub fn cancel_edit(&mut self) {
        self.session.mode = CaptureMode::Create;
        self.session.field_errors = FieldErrors::default();
    }

    /// Runs the schema with the ids the session dictates. Pure.
    pub fn prepare(&self, raw: &RawForm, today: NaiveDate) -> Result<TestPayload, CaptureError> {
        let (evaluation_id, athlete_id, default_date) = match &self.session.mode {
            CaptureMode::Edit {
                evaluation_id,
                athlete_id,
                date,
                ..
            } => (*evaluation_id, *athlete_id, *date),
            CaptureMode::Create => {
                let evaluation_id = self
                    .session
                    .evaluation_id
                    .ok_or(CaptureError::NoEvaluation)?;
                let athlete_id = self
                    .session
                    .selection
                    .athlete_id()
                    .ok_or(CaptureError::NoAthleteSelected)?;
                (
                    evaluation_id,
                    athlete_id,
                    self.session.evaluation_date.unwrap_or(today),
                )
            }
        };

        let mut form = raw.clone();
        form.insert("evaluation_id".into(), evaluation_id.to_string());
        form.insert("athlete_id".into(), athlete_id.to_string());
        let mut payload =
            schema::validate(self.session.test_type, &form).map_err(CaptureError::Validation)?;
        if payload.date.is_none() {
            payload.date = Some(default_date);
        }
        Ok(payload)
    }

    pub fn submit(
        &mut self,
        api: &dyn ClubApi,
        raw: &RawForm,
        today: NaiveDate,
    ) -> Result<SubmitOutcome, CaptureError> {
        if self.session.submitting {
            return Err(CaptureError::Busy);
        }
        self.session.submitting = true;
        let result = self.submit_inner(api, raw, today);
        self.session.submitting = false;

        match &result {
            Ok(outcome) => {
                self.session.field_errors = FieldErrors::default();
                self.session.notice = Some(Notice {
                    level: NoticeLevel::Success,
                    message: outcome.message.clone(),
                });
            }
            Err(CaptureError::Validation(errors)) => {
                self.session.field_errors = errors.clone();
                self.session.notice = None;
            }
            Err(e) => {
                log::warn!("test submission failed: {}", e);
                self.session.notice = Some(Notice {
                    level: NoticeLevel::Error,
                    message: e.to_string(),
                });
            }
        }
        result
    }

    fn submit_inner(
        &mut self,
        api: &dyn ClubApi,
        raw: &RawForm,
        today: NaiveDate,
    ) -> Result<SubmitOutcome, CaptureError> {
        let payload = self.prepare(raw, today)?;
        let test_type = payload.test_type();

        let (record, created) = match &self.session.mode {
            CaptureMode::Edit { test_id, .. } => {
                let record = api
                    .update_test(*test_id, &payload)
                    .map_err(CaptureError::Submission)?;
                (record, false)
            }
            CaptureMode::Create => {
                let record = api.create_test(&payload).map_err(CaptureError::Submission)?;
                (record, true)
            }
        };

        let mutation = if created {
            Mutation::TestCreated {
                evaluation_id: payload.evaluation_id,
                athlete_id: Some(payload.athlete_id),
            }
        } else {
            Mutation::TestUpdated {
                evaluation_id: payload.evaluation_id,
                athlete_id: Some(payload.athlete_id),
            }
        };
        let invalidate = cache::on_mutation(&mutation);

        let who = self
            .session
            .selection
            .current()
            .filter(|a| a.id == payload.athlete_id)
            .map(|a| a.display_name())
            .unwrap_or_else(|| format!("athlete #{}", payload.athlete_id));
        let message = format!(
            "{} test {} for {}",
            test_type.label(),
            if created { "saved" } else { "updated" },
            who
        );
        log::info!(
            "{} test {} (evaluation {}, athlete {})",
            test_type.as_str(),
            record.id,
            payload.evaluation_id,
            payload.athlete_id
        );

        if !created {
            self.session.mode = CaptureMode::Create;
        }

        Ok(SubmitOutcome {
            record,
            created,
            invalidate,
            message,
        })
    }

    pub fn state_json(&self) -> serde_json::Value {
        let s = &self.session;
        let mode = match s.mode() {
            CaptureMode::Create => json!({ "kind": "create" }),
            CaptureMode::Edit {
                test_id,
                evaluation_id,
                athlete_id,
                date,
            } => json!({
                "kind": "edit",
                "testId": test_id,
                "evaluationId": evaluation_id,
                "athleteId": athlete_id,
                "date": date,
            }),
        };
        json!({
            "evaluationId": s.evaluation_id(),
            "testType": s.test_type().as_str(),
            "phase": s.phase(),
            "formEnabled": s.form_enabled(),
            "selectedAthlete": s.selected(),
            "mode": mode,
            "fieldErrors": s.field_errors(),
            "notice": s.notice(),
        })
    }
}

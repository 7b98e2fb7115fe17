//! Triage session controller.
//!
//! Owns the admit → interview → review lifecycle for one signed-in nurse
//! and is the only writer of the case list. View layers interact strictly
//! through intent methods and read snapshots; state transitions are
//! announced on a broadcast channel.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{Datelike, Utc};
use shared::{
    domain::{
        CaseId, CaseOrigin, CaseRecord, CaseStatus, ChatMessage, ChatRole, EncounterId, SoapNote,
        Urgency,
    },
    protocol::{CreatePatientRequest, NoteRecord, UserProfile},
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    case_list::{CaseFilter, CaseList, CaseView},
    export, reconcile, AuthApi, GatewayError, PatientApi, TriageApi,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Admitting,
    Interviewing,
    Reviewing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    PhaseChanged(SessionPhase),
    TranscriptAppended(ChatMessage),
    CaseListChanged,
    Notice {
        level: NoticeLevel,
        message: String,
    },
    /// The cached credential was rejected; local session data has been
    /// discarded and the user must sign in again.
    AuthExpired,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("not signed in")]
    NotAuthenticated,
    #[error("admission form incomplete: missing {0}")]
    IncompleteAdmission(String),
    #[error("a reply is still pending")]
    ExchangeInFlight,
    #[error("unknown case {0}")]
    UnknownCase(CaseId),
    #[error("nothing to review")]
    NothingToReview,
    #[error("operation not valid while {0:?}")]
    WrongPhase(SessionPhase),
}

/// Draft of the admission form. Birth date is captured as separate parts,
/// the way the intake form collects it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdmissionForm {
    pub first_name: String,
    pub last_name: String,
    pub birth_year: String,
    pub birth_month: String,
    pub birth_day: String,
    pub gender: String,
    pub complaint: String,
}

impl AdmissionForm {
    fn validate(&self) -> Result<(), SessionError> {
        let mut missing = Vec::new();
        if self.first_name.trim().is_empty() {
            missing.push("first name");
        }
        if self.last_name.trim().is_empty() {
            missing.push("last name");
        }
        if self.birth_year.trim().is_empty() {
            missing.push("birth year");
        }
        if self.birth_month.trim().is_empty() {
            missing.push("birth month");
        }
        if self.birth_day.trim().is_empty() {
            missing.push("birth day");
        }
        if self.complaint.trim().is_empty() {
            missing.push("chief complaint");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SessionError::IncompleteAdmission(missing.join(", ")))
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    /// Assembles an ISO date, defaulting unparseable parts the same way
    /// the intake form always has.
    pub fn date_of_birth(&self) -> String {
        let year = if self.birth_year.trim().is_empty() {
            "1990".to_string()
        } else {
            self.birth_year.trim().to_string()
        };
        let day_raw = self.birth_day.trim();
        let day = if day_raw.is_empty() {
            "01".to_string()
        } else {
            format!("{day_raw:0>2}")
        };
        format!("{year}-{}-{day}", month_number(&self.birth_month))
    }

    /// Age in whole years from the birth-year field, or `fallback` when
    /// the field does not parse.
    pub fn age_years(&self, current_year: i32, fallback: u32) -> u32 {
        self.birth_year
            .trim()
            .parse::<i32>()
            .ok()
            .map(|year| (current_year - year).max(0) as u32)
            .unwrap_or(fallback)
    }

    /// Pre-populates the form from a stored case: the last whitespace
    /// token becomes the last name, and the birth year is back-computed
    /// from the recorded age.
    pub fn from_case(case: &CaseRecord, current_year: i32) -> Self {
        let mut parts: Vec<&str> = case.patient_name.split_whitespace().collect();
        let last_name = if parts.len() > 1 {
            parts.pop().unwrap_or("").to_string()
        } else {
            String::new()
        };
        Self {
            first_name: parts.join(" "),
            last_name,
            birth_year: (current_year - case.age as i32).to_string(),
            birth_month: "January".to_string(),
            birth_day: "1".to_string(),
            gender: case.gender.clone(),
            complaint: case.chief_complaint.clone(),
        }
    }
}

fn month_number(month: &str) -> &'static str {
    let lowered = month.trim().to_ascii_lowercase();
    match lowered.get(..3) {
        Some("jan") => "01",
        Some("feb") => "02",
        Some("mar") => "03",
        Some("apr") => "04",
        Some("may") => "05",
        Some("jun") => "06",
        Some("jul") => "07",
        Some("aug") => "08",
        Some("sep") => "09",
        Some("oct") => "10",
        Some("nov") => "11",
        Some("dec") => "12",
        _ => "01",
    }
}

fn note_from_record(record: NoteRecord, urgency: Urgency) -> SoapNote {
    SoapNote {
        subjective: record.subjective.unwrap_or_default(),
        objective: record.objective.unwrap_or_default(),
        assessment: record.assessment.unwrap_or_default(),
        plan: record.plan.unwrap_or_default(),
        urgency,
    }
}

struct ControllerState {
    profile: Option<UserProfile>,
    phase: SessionPhase,
    form: AdmissionForm,
    transcript: Vec<ChatMessage>,
    active_encounter: Option<EncounterId>,
    draft_note: Option<SoapNote>,
    editing_case: Option<CaseId>,
    exchange_in_flight: bool,
    cases: CaseList,
}

impl ControllerState {
    fn new() -> Self {
        Self {
            profile: None,
            phase: SessionPhase::Idle,
            form: AdmissionForm::default(),
            transcript: Vec::new(),
            active_encounter: None,
            draft_note: None,
            editing_case: None,
            exchange_in_flight: false,
            cases: CaseList::default(),
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn clear_session_draft(&mut self) {
        self.form = AdmissionForm::default();
        self.transcript.clear();
        self.active_encounter = None;
        self.draft_note = None;
        self.editing_case = None;
        self.exchange_in_flight = false;
    }
}

pub struct SessionController {
    auth: Arc<dyn AuthApi>,
    patients: Arc<dyn PatientApi>,
    triage: Arc<dyn TriageApi>,
    inner: Mutex<ControllerState>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(
        auth: Arc<dyn AuthApi>,
        patients: Arc<dyn PatientApi>,
        triage: Arc<dyn TriageApi>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            auth,
            patients,
            triage,
            inner: Mutex::new(ControllerState::new()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn notice(&self, level: NoticeLevel, message: impl Into<String>) {
        self.emit(SessionEvent::Notice {
            level,
            message: message.into(),
        });
    }

    /// Discards credentials and every piece of local session data. Called
    /// whenever the backend rejects the cached bearer token.
    async fn fail_unauthenticated(&self) {
        warn!("session unauthenticated; discarding local state");
        self.auth.clear_credentials().await;
        self.inner.lock().await.reset();
        self.emit(SessionEvent::AuthExpired);
        self.emit(SessionEvent::PhaseChanged(SessionPhase::Idle));
    }

    // ---- identity -------------------------------------------------------

    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile> {
        let profile = self.auth.login(username, password).await?;
        self.inner.lock().await.profile = Some(profile.clone());
        Ok(profile)
    }

    /// Resumes a previously authenticated session if the cached credential
    /// is still accepted.
    pub async fn resume(&self) -> Result<UserProfile> {
        match self.auth.current_user().await {
            Ok(profile) => {
                self.inner.lock().await.profile = Some(profile.clone());
                Ok(profile)
            }
            Err(err) => {
                self.auth.clear_credentials().await;
                Err(err.into())
            }
        }
    }

    pub async fn logout(&self) {
        self.auth.clear_credentials().await;
        self.inner.lock().await.reset();
        self.emit(SessionEvent::PhaseChanged(SessionPhase::Idle));
    }

    pub async fn profile(&self) -> Option<UserProfile> {
        self.inner.lock().await.profile.clone()
    }

    // ---- snapshots ------------------------------------------------------

    pub async fn phase(&self) -> SessionPhase {
        self.inner.lock().await.phase
    }

    pub async fn form(&self) -> AdmissionForm {
        self.inner.lock().await.form.clone()
    }

    pub async fn set_form(&self, form: AdmissionForm) {
        self.inner.lock().await.form = form;
    }

    pub async fn transcript(&self) -> Vec<ChatMessage> {
        self.inner.lock().await.transcript.clone()
    }

    pub async fn draft_note(&self) -> Option<SoapNote> {
        self.inner.lock().await.draft_note.clone()
    }

    /// Review-screen edits override the locally held draft; nothing is
    /// sent back to regenerate the note.
    pub async fn set_draft_note(&self, note: SoapNote) -> Result<(), SessionError> {
        let mut state = self.inner.lock().await;
        if state.phase != SessionPhase::Reviewing {
            return Err(SessionError::WrongPhase(state.phase));
        }
        state.draft_note = Some(note);
        Ok(())
    }

    pub async fn cases(&self) -> Vec<CaseRecord> {
        self.inner.lock().await.cases.all().to_vec()
    }

    pub async fn case(&self, id: &CaseId) -> Option<CaseRecord> {
        self.inner.lock().await.cases.get(id).cloned()
    }

    pub async fn cases_in_view(&self, view: CaseView) -> Vec<CaseRecord> {
        self.inner.lock().await.cases.view(view)
    }

    pub async fn filtered_cases(&self, view: CaseView, filter: &CaseFilter) -> Vec<CaseRecord> {
        self.inner.lock().await.cases.filtered(view, filter)
    }

    pub async fn queue_len(&self) -> usize {
        self.inner.lock().await.cases.active_count()
    }

    pub async fn export_csv(&self) -> String {
        export::cases_to_csv(self.inner.lock().await.cases.all())
    }

    // ---- admission ------------------------------------------------------

    pub async fn open_admission(&self) -> Result<(), SessionError> {
        let mut state = self.inner.lock().await;
        if state.phase != SessionPhase::Idle {
            return Err(SessionError::WrongPhase(state.phase));
        }
        state.clear_session_draft();
        state.phase = SessionPhase::Admitting;
        drop(state);
        self.emit(SessionEvent::PhaseChanged(SessionPhase::Admitting));
        Ok(())
    }

    pub async fn cancel_admission(&self) -> Result<(), SessionError> {
        let mut state = self.inner.lock().await;
        if state.phase != SessionPhase::Admitting {
            return Err(SessionError::WrongPhase(state.phase));
        }
        state.phase = SessionPhase::Idle;
        drop(state);
        self.emit(SessionEvent::PhaseChanged(SessionPhase::Idle));
        Ok(())
    }

    /// Admission submit: validates the form, then creates the patient, the
    /// encounter, and the interview session in sequence. A failure at any
    /// step leaves a single synthetic assistant message in the transcript
    /// and the session cancelable; there is no retry.
    pub async fn start_interview(&self) -> Result<(), SessionError> {
        let form = {
            let mut state = self.inner.lock().await;
            if state.phase != SessionPhase::Admitting {
                return Err(SessionError::WrongPhase(state.phase));
            }
            if state.profile.is_none() {
                return Err(SessionError::NotAuthenticated);
            }
            state.form.validate()?;

            state.phase = SessionPhase::Interviewing;
            state.transcript.clear();
            state.active_encounter = None;
            state.draft_note = None;
            state.editing_case = None;
            state.form.clone()
        };
        self.emit(SessionEvent::PhaseChanged(SessionPhase::Interviewing));

        let request = CreatePatientRequest {
            national_id: placeholder_national_id(),
            first_name: form.first_name.trim().to_string(),
            last_name: form.last_name.trim().to_string(),
            date_of_birth: form.date_of_birth(),
            contact_number: None,
        };

        let patient = match self.patients.create_patient(request).await {
            Ok(patient) => patient,
            Err(err) => return self.fail_interview_start("registering the patient", err).await,
        };

        let encounter = match self
            .patients
            .create_encounter(&patient.id, Some(form.complaint.trim().to_string()))
            .await
        {
            Ok(encounter) => encounter,
            Err(err) => return self.fail_interview_start("opening the encounter", err).await,
        };
        self.inner.lock().await.active_encounter = Some(encounter.id.clone());

        match self.triage.start_interview(&encounter.id).await {
            Ok(opening) => {
                info!(encounter_id = %encounter.id, "interview started");
                self.append_message(ChatRole::Assistant, opening.ai_message)
                    .await;
                Ok(())
            }
            Err(err) => self.fail_interview_start("starting the interview", err).await,
        }
    }

    async fn fail_interview_start(
        &self,
        stage: &str,
        err: GatewayError,
    ) -> Result<(), SessionError> {
        if err.is_unauthorized() {
            self.fail_unauthenticated().await;
            return Ok(());
        }
        warn!(stage, error = %err, "interview start failed");
        self.append_message(
            ChatRole::Assistant,
            format!("Something went wrong while {stage}: {err}. You can cancel and try again."),
        )
        .await;
        Ok(())
    }

    async fn append_message(&self, role: ChatRole, text: impl Into<String>) -> ChatMessage {
        let message = ChatMessage::new(role, text);
        self.inner.lock().await.transcript.push(message.clone());
        self.emit(SessionEvent::TranscriptAppended(message.clone()));
        message
    }

    // ---- interview ------------------------------------------------------

    /// One chat exchange. The nurse message is appended optimistically and
    /// exactly one request may be outstanding; the compose affordance must
    /// stay disabled until it resolves. A completed interview transitions
    /// straight to review with the generated note seeded.
    pub async fn send_chat_message(&self, text: &str) -> Result<(), SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let encounter = {
            let mut state = self.inner.lock().await;
            if state.phase != SessionPhase::Interviewing {
                return Err(SessionError::WrongPhase(state.phase));
            }
            if state.exchange_in_flight {
                return Err(SessionError::ExchangeInFlight);
            }
            state.exchange_in_flight = true;
            state.active_encounter.clone()
        };

        self.append_message(ChatRole::Nurse, text).await;

        let Some(encounter) = encounter else {
            // Start-up never produced an encounter; nothing to call.
            self.inner.lock().await.exchange_in_flight = false;
            self.append_message(
                ChatRole::Assistant,
                "Backend not connected. Please ensure the API server is running.",
            )
            .await;
            return Ok(());
        };

        let result = self.triage.send_message(&encounter, text).await;
        self.inner.lock().await.exchange_in_flight = false;

        match result {
            Ok(turn) => {
                self.append_message(ChatRole::Assistant, turn.ai_message).await;

                if turn.is_interview_complete {
                    if let Some(payload) = turn.soap_note {
                        let note = SoapNote {
                            subjective: payload.subjective,
                            objective: payload.objective,
                            assessment: payload.assessment,
                            plan: payload.plan,
                            urgency: Urgency::from_risk(payload.risk_score),
                        };
                        let mut state = self.inner.lock().await;
                        state.draft_note = Some(note);
                        state.editing_case = None;
                        state.phase = SessionPhase::Reviewing;
                        drop(state);
                        info!(encounter_id = %encounter, "interview complete; note seeded");
                        self.emit(SessionEvent::PhaseChanged(SessionPhase::Reviewing));
                    }
                }
                Ok(())
            }
            Err(err) if err.is_unauthorized() => {
                self.fail_unauthenticated().await;
                Ok(())
            }
            Err(err) => {
                warn!(encounter_id = %encounter, error = %err, "chat exchange failed");
                self.append_message(
                    ChatRole::Assistant,
                    "An error occurred communicating with the server. Please try again.",
                )
                .await;
                Ok(())
            }
        }
    }

    /// Manual "end & report". When the interview never produced a note,
    /// makes one best-effort fetch for a server-held note and otherwise
    /// seeds the empty shell; review fields are never left undefined.
    pub async fn finish_interview(&self) -> Result<(), SessionError> {
        let (needs_note, encounter) = {
            let mut state = self.inner.lock().await;
            if state.phase != SessionPhase::Interviewing {
                return Err(SessionError::WrongPhase(state.phase));
            }
            if state.exchange_in_flight {
                return Err(SessionError::ExchangeInFlight);
            }
            state.phase = SessionPhase::Reviewing;
            state.editing_case = None;
            (state.draft_note.is_none(), state.active_encounter.clone())
        };
        self.emit(SessionEvent::PhaseChanged(SessionPhase::Reviewing));

        if needs_note {
            let note = match encounter {
                Some(encounter) => match self.triage.fetch_note(&encounter).await {
                    Ok(record) => note_from_record(record, Urgency::Urgent),
                    Err(err) => {
                        debug!(encounter_id = %encounter, error = %err, "no note available on manual end");
                        SoapNote::empty()
                    }
                },
                None => SoapNote::empty(),
            };
            let mut state = self.inner.lock().await;
            if state.draft_note.is_none() {
                state.draft_note = Some(note);
            }
        }
        Ok(())
    }

    /// Abandons the interview: transcript discarded, no note fetched, no
    /// case recorded. The orphaned server-side encounter is acceptable.
    pub async fn cancel_interview(&self) -> Result<(), SessionError> {
        let mut state = self.inner.lock().await;
        if state.phase != SessionPhase::Interviewing {
            return Err(SessionError::WrongPhase(state.phase));
        }
        state.clear_session_draft();
        state.phase = SessionPhase::Idle;
        drop(state);
        info!("interview canceled");
        self.emit(SessionEvent::PhaseChanged(SessionPhase::Idle));
        Ok(())
    }

    // ---- review ---------------------------------------------------------

    /// Re-enters review for an existing case, pre-populating the form from
    /// its stored fields. The latest server-held note is fetched only for
    /// server-origin cases; any failure falls back to the cached note or
    /// the empty shell without surfacing an error.
    pub async fn begin_edit(&self, id: &CaseId) -> Result<(), SessionError> {
        let case = {
            let mut state = self.inner.lock().await;
            if state.phase != SessionPhase::Idle {
                return Err(SessionError::WrongPhase(state.phase));
            }
            let case = state
                .cases
                .get(id)
                .cloned()
                .ok_or_else(|| SessionError::UnknownCase(id.clone()))?;

            state.clear_session_draft();
            state.form = AdmissionForm::from_case(&case, Utc::now().year());
            state.editing_case = Some(case.id.clone());
            state.phase = SessionPhase::Reviewing;
            case
        };
        self.emit(SessionEvent::PhaseChanged(SessionPhase::Reviewing));

        let fallback = || case.note.clone().unwrap_or_else(SoapNote::empty);
        let note = if case.origin == CaseOrigin::Server {
            let urgency = if case.status == CaseStatus::Urgent {
                Urgency::Immediate
            } else {
                Urgency::Routine
            };
            match self
                .triage
                .fetch_note(&EncounterId(case.id.as_str().to_string()))
                .await
            {
                Ok(record) => note_from_record(record, urgency),
                Err(err) => {
                    debug!(case_id = %case.id, error = %err, "note fetch failed; using cached note");
                    fallback()
                }
            }
        } else {
            fallback()
        };

        self.inner.lock().await.draft_note = Some(note);
        Ok(())
    }

    /// Commits the reviewed note and merged form fields into the case
    /// list. A new admission becomes a local-origin case at the top of the
    /// queue; an edit replaces the stored record. Only an `Immediate` note
    /// promotes the status to `Urgent`; nothing auto-reverts it.
    pub async fn submit_review(&self) -> Result<CaseRecord, SessionError> {
        let mut state = self.inner.lock().await;
        if state.phase != SessionPhase::Reviewing {
            return Err(SessionError::WrongPhase(state.phase));
        }
        let note = state
            .draft_note
            .clone()
            .ok_or(SessionError::NothingToReview)?;
        let form = state.form.clone();
        let current_year = Utc::now().year();

        let committed = if let Some(editing) = state.editing_case.clone() {
            let original = state
                .cases
                .get(&editing)
                .cloned()
                .ok_or_else(|| SessionError::UnknownCase(editing.clone()))?;
            let updated = CaseRecord {
                patient_name: form.full_name(),
                age: form.age_years(current_year, original.age),
                gender: form.gender.clone(),
                chief_complaint: form.complaint.clone(),
                status: if note.urgency == Urgency::Immediate {
                    CaseStatus::Urgent
                } else {
                    original.status
                },
                note: Some(note),
                ..original
            };
            state.cases.replace_by_id(updated.clone());
            self.notice(
                NoticeLevel::Success,
                format!("Updated record for {}", updated.patient_name),
            );
            updated
        } else {
            let nurse_id = state
                .profile
                .as_ref()
                .map(|profile| profile.id.clone())
                .ok_or(SessionError::NotAuthenticated)?;
            let new_case = CaseRecord {
                id: CaseId::mint_local(),
                origin: CaseOrigin::Local,
                patient_name: form.full_name(),
                age: form.age_years(current_year, 30),
                gender: form.gender.clone(),
                chief_complaint: form.complaint.clone(),
                nurse_id,
                admitted_at: Utc::now(),
                status: if note.urgency == Urgency::Immediate {
                    CaseStatus::Urgent
                } else {
                    CaseStatus::Waiting
                },
                note: Some(note),
                transcript: std::mem::take(&mut state.transcript),
            };
            state.cases.append(new_case.clone());
            self.notice(
                NoticeLevel::Success,
                format!("Admitted {} to queue", new_case.patient_name),
            );
            new_case
        };

        state.clear_session_draft();
        state.phase = SessionPhase::Idle;
        drop(state);
        self.emit(SessionEvent::CaseListChanged);
        self.emit(SessionEvent::PhaseChanged(SessionPhase::Idle));
        Ok(committed)
    }

    /// Drops the draft without touching the case list, whether editing or
    /// creating.
    pub async fn discard_review(&self) -> Result<(), SessionError> {
        let mut state = self.inner.lock().await;
        if state.phase != SessionPhase::Reviewing {
            return Err(SessionError::WrongPhase(state.phase));
        }
        state.clear_session_draft();
        state.phase = SessionPhase::Idle;
        drop(state);
        self.emit(SessionEvent::PhaseChanged(SessionPhase::Idle));
        Ok(())
    }

    // ---- case list ------------------------------------------------------

    pub async fn mark_treated(&self, id: &CaseId) -> Result<(), SessionError> {
        self.mark_case(id, CaseStatus::Treated, "Patient marked as treated")
            .await
    }

    pub async fn mark_removed(&self, id: &CaseId) -> Result<(), SessionError> {
        self.mark_case(id, CaseStatus::Removed, "Patient removed from queue")
            .await
    }

    async fn mark_case(
        &self,
        id: &CaseId,
        status: CaseStatus,
        message: &str,
    ) -> Result<(), SessionError> {
        let mut state = self.inner.lock().await;
        if !state.cases.mark_status(id, status) {
            return Err(SessionError::UnknownCase(id.clone()));
        }
        drop(state);
        self.emit(SessionEvent::CaseListChanged);
        self.notice(NoticeLevel::Info, message);
        Ok(())
    }

    /// Replaces the case list with the merged queue + history listings.
    /// On failure the list is left empty rather than partially populated
    /// and a warning notice is emitted.
    pub async fn sync_cases(&self) -> Result<usize> {
        let fetched = async {
            let queue = self.triage.fetch_queue().await?;
            let history = self.triage.fetch_history().await?;
            Ok::<_, GatewayError>((queue, history))
        }
        .await;

        match fetched {
            Ok((queue, history)) => {
                let merged = reconcile::merge_server_lists(queue, history, Utc::now());
                let count = merged.len();
                self.inner.lock().await.cases = CaseList::hydrate(merged);
                info!(count, "case list synced");
                self.emit(SessionEvent::CaseListChanged);
                Ok(count)
            }
            Err(err) if err.is_unauthorized() => {
                self.fail_unauthenticated().await;
                Err(err.into())
            }
            Err(err) => {
                warn!(error = %err, "case list sync failed");
                self.inner.lock().await.cases = CaseList::default();
                self.emit(SessionEvent::CaseListChanged);
                self.notice(
                    NoticeLevel::Warning,
                    format!("Failed to sync dashboard data: {err}"),
                );
                Err(err.into())
            }
        }
    }

    /// On-demand transcript for a stored case. Local cases answer from
    /// memory; server cases fetch their stored interaction log.
    pub async fn load_case_transcript(&self, id: &CaseId) -> Result<Vec<ChatMessage>> {
        let case = self
            .case(id)
            .await
            .ok_or_else(|| anyhow!("unknown case {id}"))?;

        if case.origin == CaseOrigin::Local {
            return Ok(case.transcript);
        }

        let now = Utc::now();
        let stored = self
            .triage
            .fetch_messages(&EncounterId(case.id.as_str().to_string()))
            .await?;
        Ok(stored
            .into_iter()
            .map(|message| ChatMessage {
                id: message.id,
                role: if message.sender_type == "AI" {
                    ChatRole::Assistant
                } else {
                    ChatRole::Nurse
                },
                text: message.message_content,
                sent_at: reconcile::parse_utc_lenient(&message.timestamp, now),
            })
            .collect())
    }
}

fn placeholder_national_id() -> String {
    let tail: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(6)
        .collect();
    format!("NIC-{}", tail.to_ascii_uppercase())
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;

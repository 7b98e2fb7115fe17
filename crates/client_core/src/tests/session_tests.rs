use super::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use shared::{
    domain::{PatientId, RiskScore, UserId},
    error::{ApiError, ErrorCode},
    protocol::{
        ChatTurnResponse, EncounterRef, PatientRecord, QueueEntry, SoapNotePayload,
        StartInterviewResponse, StoredMessage,
    },
};
use tokio::sync::Semaphore;

use crate::GatewayResult;

struct FakeBackend {
    calls: Arc<Mutex<Vec<&'static str>>>,
    credentials_cleared: AtomicBool,
    fail_create_patient: bool,
    send_failures: StdMutex<u32>,
    completion_risk: Option<RiskScore>,
    fail_fetch_note: bool,
    note_record: Option<NoteRecord>,
    queue_entries: Vec<QueueEntry>,
    history_entries: Vec<QueueEntry>,
    fail_lists: bool,
    unauthorized_lists: bool,
    send_gate: Option<Arc<Semaphore>>,
}

impl FakeBackend {
    fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            credentials_cleared: AtomicBool::new(false),
            fail_create_patient: false,
            send_failures: StdMutex::new(0),
            completion_risk: None,
            fail_fetch_note: false,
            note_record: None,
            queue_entries: Vec::new(),
            history_entries: Vec::new(),
            fail_lists: false,
            unauthorized_lists: false,
            send_gate: None,
        }
    }

    fn with_failing_create_patient(mut self) -> Self {
        self.fail_create_patient = true;
        self
    }

    fn with_send_failures(self, count: u32) -> Self {
        *self.send_failures.lock().unwrap() = count;
        self
    }

    fn with_completion(mut self, risk: RiskScore) -> Self {
        self.completion_risk = Some(risk);
        self
    }

    fn with_failing_note_fetch(mut self) -> Self {
        self.fail_fetch_note = true;
        self
    }

    fn with_note(mut self, record: NoteRecord) -> Self {
        self.note_record = Some(record);
        self
    }

    fn with_queue(mut self, entries: Vec<QueueEntry>) -> Self {
        self.queue_entries = entries;
        self
    }

    fn with_failing_lists(mut self) -> Self {
        self.fail_lists = true;
        self
    }

    fn with_unauthorized_lists(mut self) -> Self {
        self.unauthorized_lists = true;
        self
    }

    fn with_send_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.send_gate = Some(gate);
        self
    }

    async fn record(&self, name: &'static str) {
        self.calls.lock().await.push(name);
    }

    async fn called(&self, name: &'static str) -> bool {
        self.calls.lock().await.iter().any(|call| *call == name)
    }
}

fn backend_down() -> GatewayError {
    GatewayError::Api(ApiError::new(ErrorCode::Internal, "backend unavailable"))
}

fn profile() -> UserProfile {
    UserProfile {
        id: UserId("user-7".to_string()),
        username: "nina".to_string(),
        email: "nina@clinic.example".to_string(),
        full_name: "Nina Nurse".to_string(),
        role: shared::domain::UserRole::Nurse,
        license_number: None,
        is_active: true,
        created_at: "2024-01-01T00:00:00".to_string(),
    }
}

fn stored_note() -> NoteRecord {
    NoteRecord {
        id: "note-1".to_string(),
        encounter_id: EncounterId("enc-1".to_string()),
        subjective: Some("Persistent cough for a week".to_string()),
        objective: Some("No fever".to_string()),
        assessment: Some("Likely viral".to_string()),
        plan: Some("Rest and fluids".to_string()),
        is_finalized: false,
        version: 1,
        created_at: "2024-01-01T10:00:00".to_string(),
        updated_at: "2024-01-01T10:05:00".to_string(),
    }
}

fn server_entry(id: &str, status: &str, risk: Option<RiskScore>) -> QueueEntry {
    QueueEntry {
        id: CaseId(id.to_string()),
        patient_id: PatientId("pat-1".to_string()),
        nurse_id: UserId("user-7".to_string()),
        doctor_id: None,
        status: status.to_string(),
        risk_score: risk,
        chief_complaint: Some("Chest pain".to_string()),
        encounter_timestamp: "2024-01-01T10:00:00".to_string(),
        patient_name: "Jane Doe".to_string(),
        patient_age: 54,
        patient_gender: "Female".to_string(),
        created_at: "2024-01-01T10:00:00".to_string(),
    }
}

#[async_trait]
impl AuthApi for FakeBackend {
    async fn login(&self, _username: &str, _password: &str) -> GatewayResult<UserProfile> {
        self.record("login").await;
        Ok(profile())
    }

    async fn current_user(&self) -> GatewayResult<UserProfile> {
        self.record("current_user").await;
        Ok(profile())
    }

    async fn clear_credentials(&self) {
        self.credentials_cleared.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PatientApi for FakeBackend {
    async fn create_patient(
        &self,
        _request: CreatePatientRequest,
    ) -> GatewayResult<PatientRecord> {
        self.record("create_patient").await;
        if self.fail_create_patient {
            return Err(backend_down());
        }
        Ok(PatientRecord {
            id: PatientId("pat-1".to_string()),
            national_id: "NIC-TEST01".to_string(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            date_of_birth: "1970-03-07".to_string(),
            contact_number: None,
            created_at: "2024-01-01T00:00:00".to_string(),
            updated_at: "2024-01-01T00:00:00".to_string(),
        })
    }

    async fn create_encounter(
        &self,
        _patient_id: &PatientId,
        _chief_complaint: Option<String>,
    ) -> GatewayResult<EncounterRef> {
        self.record("create_encounter").await;
        Ok(EncounterRef {
            id: EncounterId("enc-1".to_string()),
        })
    }

    async fn search_patients(
        &self,
        _nic: Option<&str>,
        _name: Option<&str>,
    ) -> GatewayResult<Vec<PatientRecord>> {
        self.record("search_patients").await;
        Ok(Vec::new())
    }
}

#[async_trait]
impl TriageApi for FakeBackend {
    async fn start_interview(
        &self,
        encounter_id: &EncounterId,
    ) -> GatewayResult<StartInterviewResponse> {
        self.record("start_interview").await;
        Ok(StartInterviewResponse {
            encounter_id: encounter_id.clone(),
            ai_message: "Hello, what brings you in today?".to_string(),
            status: "TRIAGE_IN_PROGRESS".to_string(),
        })
    }

    async fn send_message(
        &self,
        _encounter_id: &EncounterId,
        _message: &str,
    ) -> GatewayResult<ChatTurnResponse> {
        self.record("send_message").await;

        if let Some(gate) = self.send_gate.clone() {
            let _permit = gate.acquire().await.expect("gate closed");
        }

        {
            let mut failures = self.send_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(backend_down());
            }
        }

        if let Some(risk) = self.completion_risk {
            return Ok(ChatTurnResponse {
                ai_message: "Thank you, the interview is complete.".to_string(),
                is_interview_complete: true,
                soap_note: Some(SoapNotePayload {
                    subjective: "Headache since morning".to_string(),
                    objective: "Alert".to_string(),
                    assessment: "Tension headache".to_string(),
                    plan: "Hydration".to_string(),
                    risk_score: risk,
                }),
            });
        }

        Ok(ChatTurnResponse {
            ai_message: "Tell me more.".to_string(),
            is_interview_complete: false,
            soap_note: None,
        })
    }

    async fn fetch_note(&self, _encounter_id: &EncounterId) -> GatewayResult<NoteRecord> {
        self.record("fetch_note").await;
        if self.fail_fetch_note {
            return Err(backend_down());
        }
        Ok(self.note_record.clone().unwrap_or_else(stored_note))
    }

    async fn fetch_messages(
        &self,
        _encounter_id: &EncounterId,
    ) -> GatewayResult<Vec<StoredMessage>> {
        self.record("fetch_messages").await;
        Ok(Vec::new())
    }

    async fn fetch_queue(&self) -> GatewayResult<Vec<QueueEntry>> {
        self.record("fetch_queue").await;
        if self.unauthorized_lists {
            return Err(GatewayError::Unauthorized);
        }
        if self.fail_lists {
            return Err(backend_down());
        }
        Ok(self.queue_entries.clone())
    }

    async fn fetch_history(&self) -> GatewayResult<Vec<QueueEntry>> {
        self.record("fetch_history").await;
        if self.fail_lists {
            return Err(backend_down());
        }
        Ok(self.history_entries.clone())
    }
}

fn valid_form() -> AdmissionForm {
    AdmissionForm {
        first_name: "Jane".to_string(),
        last_name: "Doe".to_string(),
        birth_year: "1985".to_string(),
        birth_month: "March".to_string(),
        birth_day: "7".to_string(),
        gender: "Female".to_string(),
        complaint: "Chest pain".to_string(),
    }
}

async fn signed_in(fake: Arc<FakeBackend>) -> Arc<SessionController> {
    let controller = SessionController::new(fake.clone(), fake.clone(), fake);
    controller.login("nina", "secret").await.expect("login");
    controller
}

async fn start_interview_ok(controller: &SessionController) {
    controller.open_admission().await.expect("open admission");
    controller.set_form(valid_form()).await;
    controller.start_interview().await.expect("start interview");
}

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[test]
fn dob_is_assembled_with_intake_defaults() {
    let form = valid_form();
    assert_eq!(form.date_of_birth(), "1985-03-07");

    let sparse = AdmissionForm {
        birth_year: String::new(),
        birth_month: "not-a-month".to_string(),
        birth_day: String::new(),
        ..valid_form()
    };
    assert_eq!(sparse.date_of_birth(), "1990-01-01");
}

#[test]
fn edit_prefill_splits_name_and_back_computes_birth_year() {
    let case = CaseRecord {
        id: CaseId("case-1".to_string()),
        origin: CaseOrigin::Server,
        patient_name: "Mary Jane Watson".to_string(),
        age: 30,
        gender: "Female".to_string(),
        chief_complaint: "Sprained ankle".to_string(),
        nurse_id: UserId("user-7".to_string()),
        admitted_at: Utc::now(),
        status: CaseStatus::Waiting,
        note: None,
        transcript: Vec::new(),
    };

    let form = AdmissionForm::from_case(&case, 2026);
    assert_eq!(form.first_name, "Mary Jane");
    assert_eq!(form.last_name, "Watson");
    assert_eq!(form.birth_year, "1996");
    assert_eq!(form.complaint, "Sprained ankle");
}

#[tokio::test]
async fn resume_restores_the_profile_from_a_cached_credential() {
    let fake = Arc::new(FakeBackend::new());
    let controller = SessionController::new(fake.clone(), fake.clone(), fake.clone());

    let profile = controller.resume().await.expect("resume");
    assert_eq!(profile.username, "nina");
    assert!(fake.called("current_user").await);
    assert!(controller.profile().await.is_some());
}

#[tokio::test]
async fn empty_names_are_rejected_before_any_network_call() {
    let fake = Arc::new(FakeBackend::new());
    let controller = signed_in(fake.clone()).await;

    controller.open_admission().await.expect("open admission");
    controller
        .set_form(AdmissionForm {
            first_name: "   ".to_string(),
            last_name: String::new(),
            ..valid_form()
        })
        .await;

    let err = controller.start_interview().await.expect_err("must reject");
    assert!(matches!(err, SessionError::IncompleteAdmission(_)));
    assert!(!fake.called("create_patient").await);
    assert!(!fake.called("create_encounter").await);
    assert!(!fake.called("start_interview").await);
    assert_eq!(controller.phase().await, SessionPhase::Admitting);
}

#[tokio::test]
async fn start_failure_leaves_one_synthetic_message_and_stays_cancelable() {
    let fake = Arc::new(FakeBackend::new().with_failing_create_patient());
    let controller = signed_in(fake.clone()).await;

    start_interview_ok(&controller).await;

    let transcript = controller.transcript().await;
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].role, ChatRole::Assistant);
    assert!(transcript[0].text.contains("registering the patient"));
    assert_eq!(controller.phase().await, SessionPhase::Interviewing);

    controller.cancel_interview().await.expect("cancel");
    assert_eq!(controller.phase().await, SessionPhase::Idle);
    assert!(controller.cases().await.is_empty());
}

#[tokio::test]
async fn successful_start_seeds_the_opening_assistant_message() {
    let fake = Arc::new(FakeBackend::new());
    let controller = signed_in(fake).await;

    start_interview_ok(&controller).await;

    let transcript = controller.transcript().await;
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].text, "Hello, what brings you in today?");
}

#[tokio::test]
async fn completion_with_low_risk_enters_review_without_manual_end() {
    let fake = Arc::new(FakeBackend::new().with_completion(RiskScore::Low));
    let controller = signed_in(fake.clone()).await;
    start_interview_ok(&controller).await;

    controller
        .send_chat_message("I have a mild headache")
        .await
        .expect("send");

    assert_eq!(controller.phase().await, SessionPhase::Reviewing);
    let note = controller.draft_note().await.expect("note seeded");
    assert_eq!(note.urgency, Urgency::Routine);
    assert_ne!(note.urgency, Urgency::Immediate);
    // Completion came from the exchange itself; the manual end path with
    // its note fetch was never taken.
    assert!(!fake.called("fetch_note").await);
}

#[tokio::test]
async fn exchange_failure_appends_synthetic_reply_and_allows_retry() {
    let fake = Arc::new(FakeBackend::new().with_send_failures(1));
    let controller = signed_in(fake).await;
    start_interview_ok(&controller).await;

    controller.send_chat_message("first try").await.expect("send");
    let transcript = controller.transcript().await;
    assert_eq!(transcript.len(), 3);
    assert!(transcript[2].text.contains("error occurred"));
    assert_eq!(controller.phase().await, SessionPhase::Interviewing);

    controller.send_chat_message("second try").await.expect("send");
    let transcript = controller.transcript().await;
    assert_eq!(transcript.len(), 5);
    assert_eq!(transcript[4].text, "Tell me more.");
}

#[tokio::test]
async fn a_second_send_is_rejected_while_one_exchange_is_outstanding() {
    let gate = Arc::new(Semaphore::new(0));
    let fake = Arc::new(FakeBackend::new().with_send_gate(gate.clone()));
    let controller = signed_in(fake).await;
    start_interview_ok(&controller).await;

    let first = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.send_chat_message("held").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = controller
        .send_chat_message("too eager")
        .await
        .expect_err("must be busy");
    assert!(matches!(err, SessionError::ExchangeInFlight));

    gate.add_permits(1);
    first.await.expect("join").expect("first send");
    assert_eq!(controller.phase().await, SessionPhase::Interviewing);
}

#[tokio::test]
async fn empty_input_is_ignored_without_side_effects() {
    let fake = Arc::new(FakeBackend::new());
    let controller = signed_in(fake.clone()).await;
    start_interview_ok(&controller).await;

    controller.send_chat_message("   ").await.expect("noop");
    assert_eq!(controller.transcript().await.len(), 1);
    assert!(!fake.called("send_message").await);
}

#[tokio::test]
async fn cancel_never_touches_the_case_list_or_the_note_fetch_path() {
    let fake = Arc::new(FakeBackend::new());
    let controller = signed_in(fake.clone()).await;
    start_interview_ok(&controller).await;
    controller.send_chat_message("hello").await.expect("send");

    controller.cancel_interview().await.expect("cancel");

    assert!(controller.cases().await.is_empty());
    assert!(controller.transcript().await.is_empty());
    assert!(!fake.called("fetch_note").await);
}

#[tokio::test]
async fn manual_end_with_failed_note_fetch_seeds_the_empty_shell() {
    let fake = Arc::new(FakeBackend::new().with_failing_note_fetch());
    let controller = signed_in(fake.clone()).await;
    start_interview_ok(&controller).await;

    controller.finish_interview().await.expect("finish");

    assert_eq!(controller.phase().await, SessionPhase::Reviewing);
    assert_eq!(controller.draft_note().await, Some(SoapNote::empty()));
    assert!(fake.called("fetch_note").await);
}

#[tokio::test]
async fn manual_end_with_a_server_note_defaults_urgency_to_urgent() {
    let fake = Arc::new(FakeBackend::new().with_note(stored_note()));
    let controller = signed_in(fake).await;
    start_interview_ok(&controller).await;

    controller.finish_interview().await.expect("finish");

    let note = controller.draft_note().await.expect("note");
    assert_eq!(note.subjective, "Persistent cough for a week");
    assert_eq!(note.urgency, Urgency::Urgent);
}

#[tokio::test]
async fn committing_an_immediate_note_tops_the_queue_as_urgent() {
    let fake = Arc::new(FakeBackend::new().with_completion(RiskScore::High));
    let controller = signed_in(fake).await;
    start_interview_ok(&controller).await;
    controller.send_chat_message("severe chest pain").await.expect("send");
    assert_eq!(controller.phase().await, SessionPhase::Reviewing);

    let committed = controller.submit_review().await.expect("submit");

    assert_eq!(committed.status, CaseStatus::Urgent);
    assert_eq!(committed.origin, CaseOrigin::Local);
    assert_eq!(committed.nurse_id, UserId("user-7".to_string()));
    assert_eq!(committed.transcript.len(), 3);

    let cases = controller.cases().await;
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0].id, committed.id);
    assert_eq!(controller.phase().await, SessionPhase::Idle);
}

#[tokio::test]
async fn committing_a_routine_note_admits_a_waiting_case() {
    let fake = Arc::new(FakeBackend::new().with_completion(RiskScore::Low));
    let controller = signed_in(fake).await;
    start_interview_ok(&controller).await;
    controller.send_chat_message("small cut").await.expect("send");

    let committed = controller.submit_review().await.expect("submit");
    assert_eq!(committed.status, CaseStatus::Waiting);
}

#[tokio::test]
async fn lowering_urgency_on_an_urgent_case_does_not_revert_its_status() {
    let fake = Arc::new(
        FakeBackend::new()
            .with_queue(vec![server_entry("enc-1", "OPEN", Some(RiskScore::High))])
            .with_failing_note_fetch(),
    );
    let controller = signed_in(fake).await;
    controller.sync_cases().await.expect("sync");

    let id = CaseId("enc-1".to_string());
    assert_eq!(controller.case(&id).await.unwrap().status, CaseStatus::Urgent);

    controller.begin_edit(&id).await.expect("edit");
    controller
        .set_draft_note(SoapNote {
            urgency: Urgency::Routine,
            ..SoapNote::empty()
        })
        .await
        .expect("edit note");
    let committed = controller.submit_review().await.expect("submit");

    assert_eq!(committed.status, CaseStatus::Urgent);
}

#[tokio::test]
async fn editing_a_local_case_uses_the_cached_note_without_fetching() {
    let fake = Arc::new(FakeBackend::new().with_completion(RiskScore::High));
    let controller = signed_in(fake.clone()).await;
    start_interview_ok(&controller).await;
    controller.send_chat_message("chest pain").await.expect("send");
    let committed = controller.submit_review().await.expect("submit");
    assert!(!fake.called("fetch_note").await);

    controller.begin_edit(&committed.id).await.expect("edit");

    assert!(!fake.called("fetch_note").await);
    let note = controller.draft_note().await.expect("note");
    assert_eq!(note.urgency, Urgency::Immediate);
}

#[tokio::test]
async fn editing_a_server_case_with_failed_fetch_falls_back_to_the_empty_shell() {
    let fake = Arc::new(
        FakeBackend::new()
            .with_queue(vec![server_entry("enc-1", "OPEN", None)])
            .with_failing_note_fetch(),
    );
    let controller = signed_in(fake.clone()).await;
    controller.sync_cases().await.expect("sync");

    controller
        .begin_edit(&CaseId("enc-1".to_string()))
        .await
        .expect("edit");

    assert!(fake.called("fetch_note").await);
    assert_eq!(controller.draft_note().await, Some(SoapNote::empty()));
}

#[tokio::test]
async fn editing_an_urgent_server_case_maps_a_fetched_note_to_immediate() {
    let fake = Arc::new(
        FakeBackend::new()
            .with_queue(vec![server_entry("enc-1", "OPEN", Some(RiskScore::High))])
            .with_note(stored_note()),
    );
    let controller = signed_in(fake).await;
    controller.sync_cases().await.expect("sync");

    controller
        .begin_edit(&CaseId("enc-1".to_string()))
        .await
        .expect("edit");

    let note = controller.draft_note().await.expect("note");
    assert_eq!(note.urgency, Urgency::Immediate);
    assert_eq!(note.plan, "Rest and fluids");
}

#[tokio::test]
async fn discarding_a_review_never_mutates_the_case_list() {
    let fake = Arc::new(
        FakeBackend::new().with_queue(vec![server_entry("enc-1", "OPEN", None)]),
    );
    let controller = signed_in(fake).await;
    controller.sync_cases().await.expect("sync");
    let before = controller.cases().await;

    controller
        .begin_edit(&CaseId("enc-1".to_string()))
        .await
        .expect("edit");
    controller
        .set_draft_note(SoapNote {
            subjective: "rewritten".to_string(),
            ..SoapNote::empty()
        })
        .await
        .expect("edit note");
    controller.discard_review().await.expect("discard");

    assert_eq!(controller.cases().await, before);
    assert_eq!(controller.phase().await, SessionPhase::Idle);
}

#[tokio::test]
async fn terminal_transitions_move_cases_to_history() {
    let fake = Arc::new(
        FakeBackend::new().with_queue(vec![
            server_entry("enc-1", "OPEN", None),
            server_entry("enc-2", "OPEN", None),
        ]),
    );
    let controller = signed_in(fake).await;
    controller.sync_cases().await.expect("sync");

    controller
        .mark_treated(&CaseId("enc-1".to_string()))
        .await
        .expect("treat");
    controller
        .mark_removed(&CaseId("enc-2".to_string()))
        .await
        .expect("remove");

    assert!(controller.cases_in_view(CaseView::Active).await.is_empty());
    assert_eq!(controller.cases_in_view(CaseView::History).await.len(), 2);
}

#[tokio::test]
async fn sync_failure_leaves_the_list_empty_and_warns() {
    let fake = Arc::new(FakeBackend::new().with_failing_lists());
    let controller = signed_in(fake).await;
    let mut rx = controller.subscribe_events();

    let result = controller.sync_cases().await;

    assert!(result.is_err());
    assert!(controller.cases().await.is_empty());
    let warned = drain(&mut rx).into_iter().any(|event| {
        matches!(
            event,
            SessionEvent::Notice {
                level: NoticeLevel::Warning,
                ..
            }
        )
    });
    assert!(warned);
}

#[tokio::test]
async fn rejected_credential_discards_the_whole_session() {
    let fake = Arc::new(FakeBackend::new().with_unauthorized_lists());
    let controller = signed_in(fake.clone()).await;
    let mut rx = controller.subscribe_events();

    let result = controller.sync_cases().await;

    assert!(result.is_err());
    assert!(controller.profile().await.is_none());
    assert!(fake.credentials_cleared.load(Ordering::SeqCst));
    let expired = drain(&mut rx)
        .into_iter()
        .any(|event| matches!(event, SessionEvent::AuthExpired));
    assert!(expired);
}

#[tokio::test]
async fn csv_export_reflects_the_current_list() {
    let fake = Arc::new(FakeBackend::new());
    let controller = signed_in(fake).await;

    let empty = controller.export_csv().await;
    assert_eq!(empty, "ID,Name,Age,Gender,Complaint,Urgency,Time\n");
}

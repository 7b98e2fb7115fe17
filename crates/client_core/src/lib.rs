//! Client core for the triage workstation.
//!
//! Exposes a REST gateway over the clinical backend (auth, patient, and
//! triage collaborators behind trait seams) together with the session
//! controller that drives the admit → interview → review workflow and the
//! in-memory case list it maintains.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{EncounterId, PatientId},
    error::{ApiError, ErrorCode},
    protocol::{
        ApiErrorBody, ChatTurnRequest, ChatTurnResponse, CreateEncounterRequest,
        CreatePatientRequest, EncounterRef, LoginRequest, NoteRecord, PatientRecord, QueueEntry,
        StartInterviewRequest, StartInterviewResponse, StoredMessage, TokenResponse, UserProfile,
    },
};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub mod case_list;
pub mod export;
pub mod reconcile;
pub mod session;

pub use case_list::{CaseFilter, CaseList, CaseView};
pub use session::{
    AdmissionForm, NoticeLevel, SessionController, SessionError, SessionEvent, SessionPhase,
};

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The cached bearer credential is missing or was rejected. The gateway
    /// has already dropped it; callers must treat the session as
    /// unauthenticated and discard local session data.
    #[error("not authenticated")]
    Unauthorized,
    #[error("backend rejected request: {0}")]
    Api(ApiError),
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
}

impl GatewayError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GatewayError::Unauthorized)
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Credential exchange and identity lookup.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchanges credentials for a bearer token, caches it, and returns the
    /// authenticated profile.
    async fn login(&self, username: &str, password: &str) -> GatewayResult<UserProfile>;
    async fn current_user(&self) -> GatewayResult<UserProfile>;
    async fn clear_credentials(&self);
}

/// Patient registry: demographics and encounter creation.
#[async_trait]
pub trait PatientApi: Send + Sync {
    async fn create_patient(&self, request: CreatePatientRequest) -> GatewayResult<PatientRecord>;
    async fn create_encounter(
        &self,
        patient_id: &PatientId,
        chief_complaint: Option<String>,
    ) -> GatewayResult<EncounterRef>;
    async fn search_patients(
        &self,
        nic: Option<&str>,
        name: Option<&str>,
    ) -> GatewayResult<Vec<PatientRecord>>;
}

/// The scripted interview service plus queue/history listings.
#[async_trait]
pub trait TriageApi: Send + Sync {
    async fn start_interview(
        &self,
        encounter_id: &EncounterId,
    ) -> GatewayResult<StartInterviewResponse>;
    async fn send_message(
        &self,
        encounter_id: &EncounterId,
        message: &str,
    ) -> GatewayResult<ChatTurnResponse>;
    async fn fetch_note(&self, encounter_id: &EncounterId) -> GatewayResult<NoteRecord>;
    async fn fetch_messages(&self, encounter_id: &EncounterId)
        -> GatewayResult<Vec<StoredMessage>>;
    async fn fetch_queue(&self) -> GatewayResult<Vec<QueueEntry>>;
    async fn fetch_history(&self) -> GatewayResult<Vec<QueueEntry>>;
}

/// HTTP implementation of all three backend collaborators, sharing one
/// reqwest client and one cached bearer credential.
pub struct RestGateway {
    http: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl RestGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: Client::new(),
            base_url,
            token: RwLock::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.token.read().await.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> GatewayResult<T> {
        let response = self.authed(builder).await.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        if status == StatusCode::UNAUTHORIZED {
            warn!("backend rejected credential; dropping cached token");
            *self.token.write().await = None;
            return Err(GatewayError::Unauthorized);
        }

        let detail = response
            .json::<ApiErrorBody>()
            .await
            .ok()
            .and_then(|body| body.detail)
            .unwrap_or_else(|| format!("API error: {status}"));
        Err(GatewayError::Api(ApiError::new(
            ErrorCode::from_http_status(status.as_u16()),
            detail,
        )))
    }
}

#[async_trait]
impl AuthApi for RestGateway {
    async fn login(&self, username: &str, password: &str) -> GatewayResult<UserProfile> {
        let token: TokenResponse = self
            .send(self.http.post(self.url("/auth/login")).json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            }))
            .await?;
        *self.token.write().await = Some(token.access_token);

        let profile = self.current_user().await?;
        info!(username = profile.username, role = ?profile.role, "signed in");
        Ok(profile)
    }

    async fn current_user(&self) -> GatewayResult<UserProfile> {
        self.send(self.http.get(self.url("/auth/me"))).await
    }

    async fn clear_credentials(&self) {
        *self.token.write().await = None;
    }
}

#[async_trait]
impl PatientApi for RestGateway {
    async fn create_patient(&self, request: CreatePatientRequest) -> GatewayResult<PatientRecord> {
        self.send(self.http.post(self.url("/patients")).json(&request))
            .await
    }

    async fn create_encounter(
        &self,
        patient_id: &PatientId,
        chief_complaint: Option<String>,
    ) -> GatewayResult<EncounterRef> {
        self.send(
            self.http
                .post(self.url(&format!("/patients/{patient_id}/encounters")))
                .json(&CreateEncounterRequest {
                    patient_id: patient_id.clone(),
                    chief_complaint,
                }),
        )
        .await
    }

    async fn search_patients(
        &self,
        nic: Option<&str>,
        name: Option<&str>,
    ) -> GatewayResult<Vec<PatientRecord>> {
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(nic) = nic {
            query.push(("nic", nic));
        }
        if let Some(name) = name {
            query.push(("name", name));
        }
        self.send(self.http.get(self.url("/patients/search")).query(&query))
            .await
    }
}

#[async_trait]
impl TriageApi for RestGateway {
    async fn start_interview(
        &self,
        encounter_id: &EncounterId,
    ) -> GatewayResult<StartInterviewResponse> {
        debug!(encounter_id = %encounter_id, "starting interview");
        self.send(
            self.http
                .post(self.url("/triage/start"))
                .json(&StartInterviewRequest {
                    encounter_id: encounter_id.clone(),
                }),
        )
        .await
    }

    async fn send_message(
        &self,
        encounter_id: &EncounterId,
        message: &str,
    ) -> GatewayResult<ChatTurnResponse> {
        self.send(
            self.http
                .post(self.url("/triage/chat"))
                .json(&ChatTurnRequest {
                    encounter_id: encounter_id.clone(),
                    message: message.to_string(),
                }),
        )
        .await
    }

    async fn fetch_note(&self, encounter_id: &EncounterId) -> GatewayResult<NoteRecord> {
        self.send(
            self.http
                .get(self.url(&format!("/triage/{encounter_id}/note"))),
        )
        .await
    }

    async fn fetch_messages(
        &self,
        encounter_id: &EncounterId,
    ) -> GatewayResult<Vec<StoredMessage>> {
        self.send(
            self.http
                .get(self.url(&format!("/triage/{encounter_id}/messages"))),
        )
        .await
    }

    async fn fetch_queue(&self) -> GatewayResult<Vec<QueueEntry>> {
        self.send(self.http.get(self.url("/triage/queue"))).await
    }

    async fn fetch_history(&self) -> GatewayResult<Vec<QueueEntry>> {
        self.send(self.http.get(self.url("/triage/history"))).await
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

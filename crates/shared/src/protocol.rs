//! Request/response bodies exchanged with the clinical REST backend.
//!
//! Timestamps arrive as strings rather than typed datetimes: the backend
//! emits naive timestamps without a UTC marker, and the client interprets
//! them leniently at reconciliation time.

use serde::{Deserialize, Serialize};

use crate::domain::{CaseId, EncounterId, PatientId, RiskScore, UserId, UserRole};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    #[serde(default)]
    pub license_number: Option<String>,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePatientRequest {
    pub national_id: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: PatientId,
    pub national_id: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    #[serde(default)]
    pub contact_number: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEncounterRequest {
    pub patient_id: PatientId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chief_complaint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncounterRef {
    pub id: EncounterId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartInterviewRequest {
    pub encounter_id: EncounterId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartInterviewResponse {
    pub encounter_id: EncounterId,
    pub ai_message: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurnRequest {
    pub encounter_id: EncounterId,
    pub message: String,
}

/// The assistant's reply to one exchanged message. When the interview is
/// complete the generated note rides along.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurnResponse {
    pub ai_message: String,
    pub is_interview_complete: bool,
    #[serde(default)]
    pub soap_note: Option<SoapNotePayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoapNotePayload {
    pub subjective: String,
    pub objective: String,
    pub assessment: String,
    pub plan: String,
    pub risk_score: RiskScore,
}

/// Server-held clinical note. Fields are nullable until the triage engine
/// fills them in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteRecord {
    pub id: String,
    pub encounter_id: EncounterId,
    #[serde(default)]
    pub subjective: Option<String>,
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub assessment: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    pub is_finalized: bool,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// One entry of the open queue or closed history listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: CaseId,
    pub patient_id: PatientId,
    pub nurse_id: UserId,
    #[serde(default)]
    pub doctor_id: Option<UserId>,
    pub status: String,
    #[serde(default)]
    pub risk_score: Option<RiskScore>,
    #[serde(default)]
    pub chief_complaint: Option<String>,
    pub encounter_timestamp: String,
    pub patient_name: String,
    pub patient_age: u32,
    pub patient_gender: String,
    pub created_at: String,
}

/// A message stored with an encounter, fetched on demand for historical
/// cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub encounter_id: EncounterId,
    pub sender_type: String,
    pub message_content: String,
    pub timestamp: String,
}

/// Error body shape the backend uses for non-2xx responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub detail: Option<String>,
}

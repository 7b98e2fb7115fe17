use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(PatientId);
id_newtype!(EncounterId);
id_newtype!(CaseId);

impl CaseId {
    /// Mint an identifier for a case that only exists in this client.
    /// Whether a case is local is tracked by [`CaseOrigin`], never by the
    /// shape of the id.
    pub fn mint_local() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Nurse,
    Doctor,
}

/// Lifecycle status of a case. `Treated` and `Removed` are terminal;
/// `Removed` is a status, not erasure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    Waiting,
    Urgent,
    Treated,
    Removed,
}

impl CaseStatus {
    pub fn is_active(self) -> bool {
        matches!(self, CaseStatus::Waiting | CaseStatus::Urgent)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CaseStatus::Treated | CaseStatus::Removed)
    }
}

/// Urgency classification attached to a clinical note. The wire form is the
/// backend's color vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Urgency {
    #[serde(rename = "GREEN")]
    Routine,
    #[serde(rename = "YELLOW")]
    Urgent,
    #[serde(rename = "RED")]
    Immediate,
}

impl Urgency {
    pub fn label(self) -> &'static str {
        match self {
            Urgency::Routine => "Routine",
            Urgency::Urgent => "Urgent",
            Urgency::Immediate => "Immediate",
        }
    }

    /// One-way projection from the backend's risk vocabulary. Only `High`
    /// produces `Immediate`; `Low` is a display-grouping distinction.
    pub fn from_risk(risk: RiskScore) -> Self {
        match risk {
            RiskScore::High => Urgency::Immediate,
            RiskScore::Low => Urgency::Routine,
            RiskScore::Medium | RiskScore::Unknown => Urgency::Urgent,
        }
    }
}

/// Three-valued risk score assigned by the backend triage engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskScore {
    Low,
    Medium,
    High,
    #[serde(other)]
    Unknown,
}

/// Where a case record came from. Server-held cases have notes and
/// transcripts that can be re-fetched; local ones only exist in this
/// session's memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseOrigin {
    Server,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    Nurse,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            sent_at: Utc::now(),
        }
    }
}

/// Subjective/Objective/Assessment/Plan note with its urgency
/// classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoapNote {
    pub subjective: String,
    pub objective: String,
    pub assessment: String,
    pub plan: String,
    pub urgency: Urgency,
}

impl SoapNote {
    /// Four empty fields plus `Routine`: the fallback shell used whenever
    /// no server-held or cached note is available.
    pub fn empty() -> Self {
        Self {
            subjective: String::new(),
            objective: String::new(),
            assessment: String::new(),
            plan: String::new(),
            urgency: Urgency::Routine,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: CaseId,
    pub origin: CaseOrigin,
    pub patient_name: String,
    pub age: u32,
    pub gender: String,
    pub chief_complaint: String,
    pub nurse_id: UserId,
    pub admitted_at: DateTime<Utc>,
    pub status: CaseStatus,
    pub note: Option<SoapNote>,
    /// Populated only for cases created in the current session; stored
    /// encounters load their transcript on demand.
    pub transcript: Vec<ChatMessage>,
}

impl CaseRecord {
    pub fn wait_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.admitted_at).num_minutes().max(0)
    }
}

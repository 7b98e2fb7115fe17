//! Projection of the backend's queue/history listings into local case
//! records.
//!
//! The mapping is one-way: the server vocabulary (encounter status plus
//! risk score) collapses into the local lifecycle status and is never
//! inverted back.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use shared::domain::{CaseOrigin, CaseRecord, CaseStatus, RiskScore};
use shared::protocol::QueueEntry;
use tracing::warn;

/// Status precedence: an explicitly completed encounter is `Treated`
/// regardless of risk; otherwise a HIGH risk score marks it `Urgent`;
/// everything else waits.
pub fn status_from_entry(status: &str, risk: Option<RiskScore>) -> CaseStatus {
    if status == "COMPLETED" {
        CaseStatus::Treated
    } else if risk == Some(RiskScore::High) {
        CaseStatus::Urgent
    } else {
        CaseStatus::Waiting
    }
}

/// Parses a backend timestamp. Strings without an explicit offset are
/// treated as UTC; unparseable input falls back to `now` so a malformed
/// row degrades to a zero wait time instead of poisoning the list.
pub fn parse_utc_lenient(raw: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Utc);
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return parsed.and_utc();
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = parsed.and_hms_opt(0, 0, 0) {
            return midnight.and_utc();
        }
    }
    warn!(timestamp = raw, "unparseable backend timestamp");
    now
}

pub fn case_from_entry(entry: QueueEntry, now: DateTime<Utc>) -> CaseRecord {
    let status = status_from_entry(&entry.status, entry.risk_score);
    CaseRecord {
        id: entry.id,
        origin: CaseOrigin::Server,
        patient_name: entry.patient_name,
        age: entry.patient_age,
        gender: entry.patient_gender,
        chief_complaint: entry
            .chief_complaint
            .filter(|complaint| !complaint.trim().is_empty())
            .unwrap_or_else(|| "No complaint".to_string()),
        nurse_id: entry.nurse_id,
        admitted_at: parse_utc_lenient(&entry.created_at, now),
        status,
        note: None,
        transcript: Vec::new(),
    }
}

/// Merges the open queue and closed history into one collection, queue
/// first.
pub fn merge_server_lists(
    queue: Vec<QueueEntry>,
    history: Vec<QueueEntry>,
    now: DateTime<Utc>,
) -> Vec<CaseRecord> {
    queue
        .into_iter()
        .chain(history)
        .map(|entry| case_from_entry(entry, now))
        .collect()
}

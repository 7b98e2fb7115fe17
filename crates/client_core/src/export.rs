//! Local CSV snapshot of the case list. No network involved.

use chrono::SecondsFormat;
use shared::domain::CaseRecord;

const HEADER: &str = "ID,Name,Age,Gender,Complaint,Urgency,Time";

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Fixed-column export over the whole list, active and history alike.
/// Zero cases yields the header row alone.
pub fn cases_to_csv(cases: &[CaseRecord]) -> String {
    let rows = cases
        .iter()
        .map(|case| {
            let urgency = case
                .note
                .as_ref()
                .map(|note| note.urgency.label())
                .unwrap_or("N/A");
            format!(
                "{},{},{},{},{},{},{}",
                case.id,
                quote(&case.patient_name),
                case.age,
                case.gender,
                quote(&case.chief_complaint),
                urgency,
                case.admitted_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!("{HEADER}\n{rows}")
}

//! In-memory case collection backing the queue, history, and dashboard
//! views.
//!
//! Every write rebuilds the collection instead of mutating entries in
//! place, so snapshots handed to view code stay valid. Queue membership is
//! derived from status, never stored.

use shared::domain::{CaseId, CaseRecord, CaseStatus, Urgency};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseView {
    Active,
    History,
}

#[derive(Debug, Clone, Default)]
pub struct CaseList {
    entries: Vec<CaseRecord>,
}

impl CaseList {
    pub fn hydrate(entries: Vec<CaseRecord>) -> Self {
        Self { entries }
    }

    /// Newest first, matching the admission flow where a just-committed
    /// case tops the queue.
    pub fn append(&mut self, case: CaseRecord) {
        let mut rebuilt = Vec::with_capacity(self.entries.len() + 1);
        rebuilt.push(case);
        rebuilt.extend(self.entries.iter().cloned());
        self.entries = rebuilt;
    }

    /// Replaces the entry with the same id. Returns false when no entry
    /// matches.
    pub fn replace_by_id(&mut self, replacement: CaseRecord) -> bool {
        let mut replaced = false;
        self.entries = self
            .entries
            .iter()
            .map(|case| {
                if case.id == replacement.id {
                    replaced = true;
                    replacement.clone()
                } else {
                    case.clone()
                }
            })
            .collect();
        replaced
    }

    pub fn mark_status(&mut self, id: &CaseId, status: CaseStatus) -> bool {
        let mut marked = false;
        self.entries = self
            .entries
            .iter()
            .map(|case| {
                if &case.id == id {
                    marked = true;
                    CaseRecord {
                        status,
                        ..case.clone()
                    }
                } else {
                    case.clone()
                }
            })
            .collect();
        marked
    }

    pub fn get(&self, id: &CaseId) -> Option<&CaseRecord> {
        self.entries.iter().find(|case| &case.id == id)
    }

    pub fn all(&self) -> &[CaseRecord] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn view(&self, view: CaseView) -> Vec<CaseRecord> {
        self.entries
            .iter()
            .filter(|case| match view {
                CaseView::Active => case.status.is_active(),
                CaseView::History => case.status.is_terminal(),
            })
            .cloned()
            .collect()
    }

    pub fn filtered(&self, view: CaseView, filter: &CaseFilter) -> Vec<CaseRecord> {
        self.view(view)
            .into_iter()
            .filter(|case| filter.matches(case))
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|case| case.status.is_active())
            .count()
    }
}

/// Read-side projection over a case view. Matching never touches the
/// store.
#[derive(Debug, Clone, Default)]
pub struct CaseFilter {
    /// Case-insensitive match against patient name or case id.
    pub search: Option<String>,
    pub gender: Option<String>,
    /// Matches the urgency of the case's note; cases without a note never
    /// match an urgency filter.
    pub urgency: Option<Urgency>,
}

impl CaseFilter {
    pub fn matches(&self, case: &CaseRecord) -> bool {
        if let Some(urgency) = self.urgency {
            if case.note.as_ref().map(|note| note.urgency) != Some(urgency) {
                return false;
            }
        }
        if let Some(gender) = &self.gender {
            if !case.gender.eq_ignore_ascii_case(gender) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !needle.is_empty()
                && !case.patient_name.to_lowercase().contains(&needle)
                && !case.id.as_str().to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::catalog::CourseRelation;
use crate::fee::{base_amount, compute_fee, Locality, SessionRate};

/// Candidate student, read-only input to the pool. Locality comes from the
/// student's application for the relation being billed; it can be absent on
/// dirty data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub ref_id: String,
    pub first_name: String,
    pub last_name: String,
    pub college_roll: Option<String>,
    pub locality: Option<Locality>,
}

/// A student chosen for the document being assembled. The fee is computed
/// once when the student is added and never recomputed in place; re-pricing
/// requires remove + add.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedStudent {
    pub ref_id: String,
    pub first_name: String,
    pub last_name: String,
    pub college_roll: Option<String>,
    pub locality: Option<Locality>,
    pub session_fee: f64,
    pub course_relation_id: String,
    pub course_name: String,
    pub year_label: String,
    pub session_name: String,
    pub semester: Option<String>,
}

impl SelectedStudent {
    fn deselected(&self) -> Student {
        Student {
            ref_id: self.ref_id.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            college_roll: self.college_roll.clone(),
            locality: self.locality,
        }
    }
}

/// Everything needed to price one student at add time.
#[derive(Debug, Clone)]
pub struct SelectionContext {
    pub relation_id: String,
    pub course_name: String,
    pub year_label: String,
    pub session_name: String,
    pub semester: Option<String>,
    pub session_rate: Option<SessionRate>,
    pub local_amount: f64,
    pub international_amount: f64,
}

impl SelectionContext {
    /// Resolve year and session on the relation. An unknown label leaves the
    /// rate absent, which prices as zero with a warning rather than failing.
    pub fn from_relation(
        relation: &CourseRelation,
        year_label: &str,
        session_name: &str,
        semester: Option<String>,
    ) -> SelectionContext {
        let session_rate = relation
            .year(year_label)
            .and_then(|y| y.session(session_name))
            .map(|s| s.rate());
        SelectionContext {
            relation_id: relation.id.clone(),
            course_name: relation.course.name.clone(),
            year_label: year_label.to_string(),
            session_name: session_name.to_string(),
            semester,
            session_rate,
            local_amount: relation.local_amount,
            international_amount: relation.international_amount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddWarning {
    MissingSessionData,
    MissingLocality,
}

impl AddWarning {
    pub fn code(&self) -> &'static str {
        match self {
            AddWarning::MissingSessionData => "missing_session_data",
            AddWarning::MissingLocality => "missing_locality",
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum AddOutcome {
    Added { warnings: Vec<AddWarning> },
    AlreadySelected,
    NotAvailable,
}

/// Working set for one in-progress invoice/remit: candidates on one side,
/// chosen students on the other, plus a running total.
///
/// Invariants, held at every observable point:
/// - the two lists never share a reference id;
/// - `total` is exactly the sum of selected fees, recomputed on every
///   mutation and never settable on its own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentPool {
    available: Vec<Student>,
    selected: Vec<SelectedStudent>,
    total: f64,
}

impl StudentPool {
    pub fn new(available: Vec<Student>) -> StudentPool {
        StudentPool {
            available,
            selected: Vec::new(),
            total: 0.0,
        }
    }

    /// Rebuild a pool from both sides, e.g. after edit reconciliation.
    /// Candidates that collide with a selected id are dropped to keep the
    /// partition invariant.
    pub fn from_parts(available: Vec<Student>, selected: Vec<SelectedStudent>) -> StudentPool {
        let mut pool = StudentPool {
            available: Vec::new(),
            selected,
            total: 0.0,
        };
        pool.recompute_total();
        pool.set_available(available);
        pool
    }

    /// Replace the candidate side wholesale (fresh backend query). Selected
    /// students are untouched; incoming rows that collide with a selected id
    /// are dropped.
    pub fn set_available(&mut self, students: Vec<Student>) {
        self.available = students
            .into_iter()
            .filter(|s| !self.is_selected(&s.ref_id))
            .collect();
    }

    pub fn available(&self) -> &[Student] {
        &self.available
    }

    pub fn selected(&self) -> &[SelectedStudent] {
        &self.selected
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn is_selected(&self, ref_id: &str) -> bool {
        self.selected.iter().any(|s| s.ref_id == ref_id)
    }

    /// Move a candidate into the selection, pricing it from `ctx`.
    ///
    /// Rejections are outcomes, not errors: the caller surfaces them to the
    /// user and the pool stays in its last valid state.
    pub fn add(&mut self, ref_id: &str, ctx: &SelectionContext) -> AddOutcome {
        if self.is_selected(ref_id) {
            return AddOutcome::AlreadySelected;
        }
        let Some(idx) = self.available.iter().position(|s| s.ref_id == ref_id) else {
            return AddOutcome::NotAvailable;
        };
        let student = self.available.remove(idx);

        let mut warnings = Vec::new();
        if ctx.session_rate.is_none() {
            warnings.push(AddWarning::MissingSessionData);
            warn!(
                ref_id = %student.ref_id,
                year = %ctx.year_label,
                session = %ctx.session_name,
                "session plan not found, fee defaults to 0"
            );
        }
        let base = match student.locality {
            Some(l) => base_amount(l, ctx.local_amount, ctx.international_amount),
            None => {
                warnings.push(AddWarning::MissingLocality);
                0.0
            }
        };
        let session_fee = compute_fee(ctx.session_rate.as_ref(), base);

        self.selected.push(SelectedStudent {
            ref_id: student.ref_id,
            first_name: student.first_name,
            last_name: student.last_name,
            college_roll: student.college_roll,
            locality: student.locality,
            session_fee,
            course_relation_id: ctx.relation_id.clone(),
            course_name: ctx.course_name.clone(),
            year_label: ctx.year_label.clone(),
            session_name: ctx.session_name.clone(),
            semester: ctx.semester.clone(),
        });
        self.recompute_total();
        AddOutcome::Added { warnings }
    }

    /// Remove a student from the selection and return it to the candidate
    /// side (unless its id is somehow already there). Removing an absent id
    /// is a no-op.
    pub fn remove(&mut self, ref_id: &str) -> bool {
        let Some(idx) = self.selected.iter().position(|s| s.ref_id == ref_id) else {
            return false;
        };
        let gone = self.selected.remove(idx);
        if !self.available.iter().any(|s| s.ref_id == ref_id) {
            self.available.push(gone.deselected());
        }
        self.recompute_total();
        true
    }

    fn recompute_total(&mut self) {
        self.total = self.selected.iter().map(|s| s.session_fee).sum();
    }
}

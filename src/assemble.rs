use serde::{Deserialize, Serialize};

use crate::catalog::CourseRelation;
use crate::pool::StudentPool;

/// Customer invoices and remit (agent payout) reports share one payload
/// shape, distinguished only by this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Invoice,
    Remit,
}

impl PayloadKind {
    pub fn parse(s: &str) -> Option<PayloadKind> {
        match s.trim().to_ascii_lowercase().as_str() {
            "invoice" => Some(PayloadKind::Invoice),
            "remit" => Some(PayloadKind::Remit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadKind::Invoice => "invoice",
            PayloadKind::Remit => "remit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Due,
    Paid,
    /// Remit-only: the payout is accrued but not yet claimable.
    Available,
}

impl DocumentStatus {
    /// `available` only exists on the remit side.
    pub fn parse(kind: PayloadKind, s: &str) -> Option<DocumentStatus> {
        match (kind, s.trim().to_ascii_lowercase().as_str()) {
            (_, "due") => Some(DocumentStatus::Due),
            (_, "paid") => Some(DocumentStatus::Paid),
            (PayloadKind::Remit, "available") => Some(DocumentStatus::Available),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Due => "due",
            DocumentStatus::Paid => "paid",
            DocumentStatus::Available => "available",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadStudent {
    pub ref_id: String,
    pub first_name: String,
    pub last_name: String,
    pub college_roll: Option<String>,
    pub course: String,
    pub amount: f64,
}

/// The document persisted on submission. Built once; the server side owns
/// its lifecycle afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    pub kind: PayloadKind,
    pub status: DocumentStatus,
    /// Customer id for invoices, remit-agent id for remits.
    pub recipient: String,
    pub course_relation_id: String,
    pub institute: String,
    pub course: String,
    pub year_label: String,
    pub session_name: String,
    pub semester: Option<String>,
    pub students: Vec<PayloadStudent>,
    pub no_of_students: usize,
    pub total_amount: f64,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AssembleMeta {
    pub kind: PayloadKind,
    pub status: DocumentStatus,
    pub recipient: Option<String>,
    pub year_label: String,
    pub session_name: String,
    pub semester: Option<String>,
    pub created_by: Option<String>,
}

/// Submission preconditions, each surfaced as its own inline error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssembleError {
    NoStudentsSelected,
    NoCourseRelationSelected,
    RecipientRequired,
}

impl AssembleError {
    pub fn code(&self) -> &'static str {
        match self {
            AssembleError::NoStudentsSelected => "no_students_selected",
            AssembleError::NoCourseRelationSelected => "no_course_relation",
            AssembleError::RecipientRequired => "recipient_required",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AssembleError::NoStudentsSelected => "select at least one student",
            AssembleError::NoCourseRelationSelected => "select a course relation first",
            AssembleError::RecipientRequired => "a customer or remit agent is required",
        }
    }
}

impl std::fmt::Display for AssembleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for AssembleError {}

/// Build the persistable document from the final pool state.
///
/// Per-student amounts come from the fees frozen at selection time; nothing
/// is repriced here, so the document total stays stable even if catalog
/// rates changed mid-session. Pure construction, no persistence.
pub fn assemble(
    pool: &StudentPool,
    relation: Option<&CourseRelation>,
    meta: &AssembleMeta,
) -> Result<Payload, AssembleError> {
    if pool.selected().is_empty() {
        return Err(AssembleError::NoStudentsSelected);
    }
    let relation = relation.ok_or(AssembleError::NoCourseRelationSelected)?;
    let recipient = match meta.recipient.as_deref() {
        Some(r) if !r.trim().is_empty() => r.to_string(),
        _ => return Err(AssembleError::RecipientRequired),
    };

    let students: Vec<PayloadStudent> = pool
        .selected()
        .iter()
        .map(|s| PayloadStudent {
            ref_id: s.ref_id.clone(),
            first_name: s.first_name.clone(),
            last_name: s.last_name.clone(),
            college_roll: s.college_roll.clone(),
            course: s.course_name.clone(),
            amount: s.session_fee,
        })
        .collect();

    Ok(Payload {
        kind: meta.kind,
        status: meta.status,
        recipient,
        course_relation_id: relation.id.clone(),
        institute: relation.institute.name.clone(),
        course: relation.course.name.clone(),
        year_label: meta.year_label.clone(),
        session_name: meta.session_name.clone(),
        semester: meta.semester.clone(),
        no_of_students: students.len(),
        total_amount: pool.total(),
        students,
        created_by: meta.created_by.clone(),
    })
}

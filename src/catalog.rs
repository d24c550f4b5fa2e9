use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

use crate::fee::{parse_amount, RateKind, SessionRate};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdName {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPlan {
    pub name: String,
    #[serde(rename = "rateType")]
    pub rate_kind: RateKind,
    pub rate: Option<f64>,
}

impl SessionPlan {
    pub fn rate(&self) -> SessionRate {
        SessionRate {
            kind: self.rate_kind.clone(),
            rate: self.rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearPlan {
    pub label: String,
    pub sessions: Vec<SessionPlan>,
}

impl YearPlan {
    pub fn session(&self, name: &str) -> Option<&SessionPlan> {
        self.sessions.iter().find(|s| s.name == name)
    }
}

/// One (term, institute, course) offering with its per-year session plans
/// and the two sides of its fee table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRelation {
    pub id: String,
    pub term: IdName,
    pub institute: IdName,
    pub course: IdName,
    pub local_amount: f64,
    pub international_amount: f64,
    pub years: Vec<YearPlan>,
}

impl CourseRelation {
    pub fn year(&self, label: &str) -> Option<&YearPlan> {
        self.years.iter().find(|y| y.label == label)
    }
}

/// Flattened, deduplicated view over a loaded course-relation tree.
///
/// Lookup lists keep first-seen order. Reloading replaces the whole
/// snapshot; there is no incremental merge.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    relations: Vec<CourseRelation>,
    terms: Vec<IdName>,
    institutes: Vec<IdName>,
    courses: Vec<IdName>,
    session_names: Vec<String>,
}

impl Catalog {
    pub fn load(relations: Vec<CourseRelation>) -> Catalog {
        let mut seen_triples: HashSet<(String, String, String)> = HashSet::new();
        let mut kept: Vec<CourseRelation> = Vec::new();

        for mut rel in relations {
            let triple = (
                rel.term.id.clone(),
                rel.institute.id.clone(),
                rel.course.id.clone(),
            );
            if !seen_triples.insert(triple) {
                warn!(
                    relation_id = %rel.id,
                    course = %rel.course.name,
                    "duplicate (term, institute, course) relation dropped"
                );
                continue;
            }

            // Year labels are unique within a relation; later duplicates lose.
            let mut labels: HashSet<String> = HashSet::new();
            rel.years.retain(|y| {
                let fresh = labels.insert(y.label.clone());
                if !fresh {
                    warn!(relation_id = %rel.id, label = %y.label, "duplicate year label dropped");
                }
                fresh
            });

            // A negative rate is bad catalog data; treat it as missing so it
            // bills zero instead of producing a negative fee.
            for year in &mut rel.years {
                for session in &mut year.sessions {
                    if let Some(r) = session.rate {
                        if r < 0.0 {
                            warn!(
                                relation_id = %rel.id,
                                session = %session.name,
                                rate = r,
                                "negative session rate treated as missing"
                            );
                            session.rate = None;
                        }
                    }
                }
            }

            kept.push(rel);
        }

        let mut catalog = Catalog {
            relations: kept,
            ..Catalog::default()
        };
        catalog.rebuild_lookups();
        catalog
    }

    fn rebuild_lookups(&mut self) {
        let mut term_ids = HashSet::new();
        let mut institute_ids = HashSet::new();
        let mut course_ids = HashSet::new();
        let mut session_names = HashSet::new();

        for rel in &self.relations {
            if term_ids.insert(rel.term.id.clone()) {
                self.terms.push(rel.term.clone());
            }
            if institute_ids.insert(rel.institute.id.clone()) {
                self.institutes.push(rel.institute.clone());
            }
            if course_ids.insert(rel.course.id.clone()) {
                self.courses.push(rel.course.clone());
            }
            for year in &rel.years {
                for session in &year.sessions {
                    if session_names.insert(session.name.clone()) {
                        self.session_names.push(session.name.clone());
                    }
                }
            }
        }
    }

    pub fn relations(&self) -> &[CourseRelation] {
        &self.relations
    }

    pub fn terms(&self) -> &[IdName] {
        &self.terms
    }

    pub fn institutes(&self) -> &[IdName] {
        &self.institutes
    }

    pub fn courses(&self) -> &[IdName] {
        &self.courses
    }

    pub fn session_names(&self) -> &[String] {
        &self.session_names
    }

    /// Institutes that offer anything in the given term, first-seen order.
    pub fn institutes_for_term(&self, term_id: &str) -> Vec<IdName> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for rel in self.relations.iter().filter(|r| r.term.id == term_id) {
            if seen.insert(rel.institute.id.clone()) {
                out.push(rel.institute.clone());
            }
        }
        out
    }

    /// Relations matching both term and institute. The caller displays each
    /// by its course name.
    pub fn candidates(&self, term_id: &str, institute_id: &str) -> Vec<&CourseRelation> {
        self.relations
            .iter()
            .filter(|r| r.term.id == term_id && r.institute.id == institute_id)
            .collect()
    }

    /// Direct lookup. A stale id (e.g. after a reload) resolves to `None`;
    /// it must never panic.
    pub fn resolve(&self, relation_id: &str) -> Option<&CourseRelation> {
        self.relations.iter().find(|r| r.id == relation_id)
    }
}

// Ingest shapes for `catalog.load`: the wire tree carries amounts and rates
// as numbers or numeric strings, so they come in as raw JSON values.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSession {
    name: String,
    rate_type: Option<String>,
    rate: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawYear {
    label: String,
    #[serde(default)]
    sessions: Vec<RawSession>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRelation {
    id: String,
    term: IdName,
    institute: IdName,
    course: IdName,
    local_amount: Option<serde_json::Value>,
    international_amount: Option<serde_json::Value>,
    #[serde(default)]
    years: Vec<RawYear>,
}

fn parse_rate(v: Option<&serde_json::Value>) -> Option<f64> {
    match v {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Parse the nested wire tree into relations and load them as a snapshot.
pub fn load_from_json(relations: &serde_json::Value) -> anyhow::Result<Catalog> {
    let raw: Vec<RawRelation> = serde_json::from_value(relations.clone())?;
    let relations = raw
        .into_iter()
        .map(|r| CourseRelation {
            id: r.id,
            term: r.term,
            institute: r.institute,
            course: r.course,
            local_amount: parse_amount(r.local_amount.as_ref()),
            international_amount: parse_amount(r.international_amount.as_ref()),
            years: r
                .years
                .into_iter()
                .map(|y| YearPlan {
                    label: y.label,
                    sessions: y
                        .sessions
                        .into_iter()
                        .map(|s| SessionPlan {
                            name: s.name,
                            rate_kind: RateKind::parse(s.rate_type.as_deref().unwrap_or("")),
                            rate: parse_rate(s.rate.as_ref()),
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();
    Ok(Catalog::load(relations))
}

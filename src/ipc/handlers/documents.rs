use crate::assemble::{self, AssembleMeta, DocumentStatus, Payload, PayloadKind};
use crate::catalog::{CourseRelation, IdName};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::drafts::draft_json;
use crate::ipc::types::{AppState, Draft, Request};
use crate::pool::{SelectedStudent, SelectionContext};
use crate::reconcile::reconcile;
use chrono::Utc;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

fn handle_draft_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(draft_id) = req.params.get("draftId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing draftId", None);
    };
    let Some(draft) = state.drafts.get(draft_id) else {
        return err(&req.id, "not_found", "draft not found", None);
    };
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let status = match req.params.get("status").and_then(|v| v.as_str()) {
        Some(s) => match DocumentStatus::parse(draft.kind, s) {
            Some(st) => st,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("invalid status for {} document", draft.kind.as_str()),
                    Some(json!({ "status": s })),
                )
            }
        },
        None => return err(&req.id, "bad_params", "missing status", None),
    };

    // Invoices name a customer, remits a payout agent; the generic key is
    // accepted for both.
    let recipient_key = match draft.kind {
        PayloadKind::Invoice => "customer",
        PayloadKind::Remit => "remitTo",
    };
    let recipient = req
        .params
        .get(recipient_key)
        .or_else(|| req.params.get("recipient"))
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let created_by = req
        .params
        .get("createdBy")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let meta = AssembleMeta {
        kind: draft.kind,
        status,
        recipient,
        year_label: draft.year_label.clone(),
        session_name: draft.session_name.clone(),
        semester: draft.semester.clone(),
        created_by,
    };
    let relation = state.catalog.resolve(&draft.relation_id);
    let payload = match assemble::assemble(&draft.pool, relation, &meta) {
        Ok(p) => p,
        // Submission blocked; the draft is left exactly as it was.
        Err(e) => return err(&req.id, e.code(), e.message(), None),
    };

    let document_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    if let Err(e) = db::insert_document(conn, &document_id, &payload, &now) {
        return err(&req.id, "db_insert_failed", format!("{e:?}"), None);
    }

    info!(
        document = %document_id,
        kind = payload.kind.as_str(),
        students = payload.no_of_students,
        total = payload.total_amount,
        "document submitted"
    );
    state.drafts.remove(draft_id);
    ok(
        &req.id,
        json!({
            "documentId": document_id,
            "createdAt": now,
            "payload": payload,
        }),
    )
}

fn handle_document_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(document_id) = req.params.get("documentId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing documentId", None);
    };

    match db::load_document(conn, document_id) {
        Ok(Some(row)) => ok(
            &req.id,
            json!({
                "documentId": row.id,
                "createdAt": row.created_at,
                "updatedAt": row.updated_at,
                "payload": row.payload,
            }),
        ),
        Ok(None) => err(&req.id, "not_found", "document not found", None),
        Err(e) => err(&req.id, "db_query_failed", format!("{e:?}"), None),
    }
}

fn handle_document_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "documents": [] }));
    };
    match db::list_documents(conn) {
        Ok(documents) => ok(&req.id, json!({ "documents": documents })),
        Err(e) => err(&req.id, "db_query_failed", format!("{e:?}"), None),
    }
}

fn persisted_students(payload: &Payload) -> Vec<SelectedStudent> {
    payload
        .students
        .iter()
        .map(|s| SelectedStudent {
            ref_id: s.ref_id.clone(),
            first_name: s.first_name.clone(),
            last_name: s.last_name.clone(),
            college_roll: s.college_roll.clone(),
            locality: None,
            session_fee: s.amount,
            course_relation_id: payload.course_relation_id.clone(),
            course_name: s.course.clone(),
            year_label: payload.year_label.clone(),
            session_name: payload.session_name.clone(),
            semester: payload.semester.clone(),
        })
        .collect()
}

/// Minimal relation stand-in so historical documents stay editable after
/// the catalog no longer carries their relation. Fees on such drafts stay
/// frozen (no rates to reprice against).
fn stub_relation(payload: &Payload) -> CourseRelation {
    CourseRelation {
        id: payload.course_relation_id.clone(),
        term: IdName {
            id: String::new(),
            name: String::new(),
        },
        institute: IdName {
            id: String::new(),
            name: payload.institute.clone(),
        },
        course: IdName {
            id: String::new(),
            name: payload.course.clone(),
        },
        local_amount: 0.0,
        international_amount: 0.0,
        years: Vec::new(),
    }
}

fn handle_remit_edit_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(document_id) = req.params.get("documentId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing documentId", None);
    };
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let row = match db::load_document(conn, document_id) {
        Ok(Some(r)) => r,
        Ok(None) => return err(&req.id, "not_found", "document not found", None),
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };
    if row.payload.kind != PayloadKind::Remit {
        return err(
            &req.id,
            "bad_params",
            "document is not a remit report",
            Some(json!({ "kind": row.payload.kind.as_str() })),
        );
    }

    let fresh = match db::candidates_for_relation(conn, &row.payload.course_relation_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };
    let pool = reconcile(persisted_students(&row.payload), fresh);

    let fallback_ctx = match state.catalog.resolve(&row.payload.course_relation_id) {
        Some(rel) => SelectionContext::from_relation(
            rel,
            &row.payload.year_label,
            &row.payload.session_name,
            row.payload.semester.clone(),
        ),
        None => SelectionContext::from_relation(
            &stub_relation(&row.payload),
            &row.payload.year_label,
            &row.payload.session_name,
            row.payload.semester.clone(),
        ),
    };

    let draft_id = Uuid::new_v4().to_string();
    let draft = Draft {
        kind: PayloadKind::Remit,
        relation_id: row.payload.course_relation_id.clone(),
        year_label: row.payload.year_label.clone(),
        session_name: row.payload.session_name.clone(),
        semester: row.payload.semester.clone(),
        fallback_ctx,
        document_id: Some(document_id.to_string()),
        pool,
    };

    let mut result = draft_json(&draft_id, &draft);
    result["document"] = json!({
        "documentId": row.id,
        "status": row.payload.status.as_str(),
        "recipient": row.payload.recipient,
        "createdAt": row.created_at,
        "updatedAt": row.updated_at,
    });
    state.drafts.insert(draft_id, draft);
    ok(&req.id, result)
}

fn handle_remit_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(document_id) = req.params.get("documentId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing documentId", None);
    };
    let Some(draft_id) = req.params.get("draftId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing draftId", None);
    };
    let Some(draft) = state.drafts.get(draft_id) else {
        return err(&req.id, "not_found", "draft not found", None);
    };
    if draft.document_id.as_deref() != Some(document_id) {
        return err(
            &req.id,
            "bad_params",
            "draft does not belong to this document",
            None,
        );
    }
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let row = match db::load_document(conn, document_id) {
        Ok(Some(r)) => r,
        Ok(None) => return err(&req.id, "not_found", "document not found", None),
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };

    let status = match req.params.get("status").and_then(|v| v.as_str()) {
        Some(s) => match DocumentStatus::parse(PayloadKind::Remit, s) {
            Some(st) => st,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "invalid status for remit document",
                    Some(json!({ "status": s })),
                )
            }
        },
        None => row.payload.status,
    };
    let recipient = req
        .params
        .get("remitTo")
        .or_else(|| req.params.get("recipient"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .or(Some(row.payload.recipient.clone()));

    let meta = AssembleMeta {
        kind: PayloadKind::Remit,
        status,
        recipient,
        year_label: draft.year_label.clone(),
        session_name: draft.session_name.clone(),
        semester: draft.semester.clone(),
        created_by: row.payload.created_by.clone(),
    };

    let stub;
    let relation = match state.catalog.resolve(&draft.relation_id) {
        Some(rel) => rel,
        None => {
            stub = stub_relation(&row.payload);
            &stub
        }
    };
    let payload = match assemble::assemble(&draft.pool, Some(relation), &meta) {
        Ok(p) => p,
        Err(e) => return err(&req.id, e.code(), e.message(), None),
    };

    let now = Utc::now().to_rfc3339();
    match db::update_document(conn, document_id, &payload, &now) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "document not found", None),
        Err(e) => return err(&req.id, "db_insert_failed", format!("{e:?}"), None),
    }

    info!(
        document = %document_id,
        students = payload.no_of_students,
        total = payload.total_amount,
        "remit document updated"
    );
    state.drafts.remove(draft_id);
    ok(
        &req.id,
        json!({
            "documentId": document_id,
            "updatedAt": now,
            "payload": payload,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "draft.submit" => Some(handle_draft_submit(state, req)),
        "document.get" => Some(handle_document_get(state, req)),
        "document.list" => Some(handle_document_list(state, req)),
        "remit.editOpen" => Some(handle_remit_edit_open(state, req)),
        "remit.update" => Some(handle_remit_update(state, req)),
        _ => None,
    }
}

use crate::assemble::PayloadKind;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Draft, Request};
use crate::pool::{AddOutcome, SelectionContext, StudentPool};
use serde_json::json;
use uuid::Uuid;

pub fn draft_json(draft_id: &str, draft: &Draft) -> serde_json::Value {
    json!({
        "draftId": draft_id,
        "kind": draft.kind.as_str(),
        "courseRelationId": draft.relation_id,
        "yearLabel": draft.year_label,
        "sessionName": draft.session_name,
        "semester": draft.semester,
        "documentId": draft.document_id,
        "available": draft.pool.available(),
        "selected": draft.pool.selected(),
        "totalAmount": draft.pool.total(),
    })
}

/// Pricing context for a draft. Prefer the live catalog so re-adding a
/// student after a reload picks up current rates; fall back to the context
/// captured at draft creation when the relation has gone stale.
pub fn selection_ctx(state: &AppState, draft: &Draft) -> SelectionContext {
    match state.catalog.resolve(&draft.relation_id) {
        Some(rel) => SelectionContext::from_relation(
            rel,
            &draft.year_label,
            &draft.session_name,
            draft.semester.clone(),
        ),
        None => draft.fallback_ctx.clone(),
    }
}

fn handle_draft_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let kind = match req.params.get("kind").and_then(|v| v.as_str()) {
        Some(s) => match PayloadKind::parse(s) {
            Some(k) => k,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "kind must be one of: invoice, remit",
                    Some(json!({ "kind": s })),
                )
            }
        },
        None => return err(&req.id, "bad_params", "missing kind", None),
    };
    let Some(relation_id) = req.params.get("courseRelationId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing courseRelationId", None);
    };
    let Some(year_label) = req.params.get("yearLabel").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing yearLabel", None);
    };
    let Some(session_name) = req.params.get("sessionName").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing sessionName", None);
    };
    let semester = req
        .params
        .get("semester")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let Some(relation) = state.catalog.resolve(relation_id) else {
        return err(
            &req.id,
            "not_found",
            "course relation not found",
            Some(json!({ "courseRelationId": relation_id })),
        );
    };
    let fallback_ctx =
        SelectionContext::from_relation(relation, year_label, session_name, semester.clone());

    let available = match db::candidates_for_relation(conn, relation_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };

    let draft_id = Uuid::new_v4().to_string();
    let draft = Draft {
        kind,
        relation_id: relation_id.to_string(),
        year_label: year_label.to_string(),
        session_name: session_name.to_string(),
        semester,
        fallback_ctx,
        document_id: None,
        pool: StudentPool::new(available),
    };
    let resp = ok(&req.id, draft_json(&draft_id, &draft));
    state.drafts.insert(draft_id, draft);
    resp
}

fn handle_draft_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(draft_id) = req.params.get("draftId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing draftId", None);
    };
    match state.drafts.get(draft_id) {
        Some(draft) => ok(&req.id, draft_json(draft_id, draft)),
        None => err(&req.id, "not_found", "draft not found", None),
    }
}

fn handle_draft_refresh_available(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(draft_id) = req.params.get("draftId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing draftId", None);
    };
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let relation_id = match state.drafts.get(draft_id) {
        Some(d) => d.relation_id.clone(),
        None => return err(&req.id, "not_found", "draft not found", None),
    };
    let fresh = match db::candidates_for_relation(conn, &relation_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };

    let Some(draft) = state.drafts.get_mut(draft_id) else {
        return err(&req.id, "not_found", "draft not found", None);
    };
    draft.pool.set_available(fresh);
    ok(&req.id, draft_json(draft_id, draft))
}

fn handle_draft_add_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(draft_id) = req.params.get("draftId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing draftId", None);
    };
    let Some(student_id) = req.params.get("studentId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    let Some(draft) = state.drafts.get(draft_id) else {
        return err(&req.id, "not_found", "draft not found", None);
    };

    let ctx = selection_ctx(state, draft);
    let Some(draft) = state.drafts.get_mut(draft_id) else {
        return err(&req.id, "not_found", "draft not found", None);
    };
    match draft.pool.add(student_id, &ctx) {
        AddOutcome::Added { warnings } => {
            let added = draft
                .pool
                .selected()
                .iter()
                .find(|s| s.ref_id == student_id)
                .cloned();
            let warning_codes: Vec<&str> = warnings.iter().map(|w| w.code()).collect();
            ok(
                &req.id,
                json!({
                    "added": true,
                    "student": added,
                    "warnings": warning_codes,
                    "totalAmount": draft.pool.total(),
                }),
            )
        }
        // User-correctable; the pool stays as it was, so this is a warning
        // inside an ok response rather than an error.
        AddOutcome::AlreadySelected => ok(
            &req.id,
            json!({
                "added": false,
                "warnings": ["already_selected"],
                "totalAmount": draft.pool.total(),
            }),
        ),
        AddOutcome::NotAvailable => err(
            &req.id,
            "not_found",
            "student is not in the available pool",
            Some(json!({ "studentId": student_id })),
        ),
    }
}

fn handle_draft_remove_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(draft_id) = req.params.get("draftId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing draftId", None);
    };
    let Some(student_id) = req.params.get("studentId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    let Some(draft) = state.drafts.get_mut(draft_id) else {
        return err(&req.id, "not_found", "draft not found", None);
    };

    // Removing an id that is not selected is a no-op, not an error.
    let removed = draft.pool.remove(student_id);
    ok(
        &req.id,
        json!({
            "removed": removed,
            "totalAmount": draft.pool.total(),
        }),
    )
}

fn handle_draft_discard(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(draft_id) = req.params.get("draftId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing draftId", None);
    };
    let discarded = state.drafts.remove(draft_id).is_some();
    ok(&req.id, json!({ "discarded": discarded }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "draft.create" => Some(handle_draft_create(state, req)),
        "draft.get" => Some(handle_draft_get(state, req)),
        "draft.refreshAvailable" => Some(handle_draft_refresh_available(state, req)),
        "draft.addStudent" => Some(handle_draft_add_student(state, req)),
        "draft.removeStudent" => Some(handle_draft_remove_student(state, req)),
        "draft.discard" => Some(handle_draft_discard(state, req)),
        _ => None,
    }
}

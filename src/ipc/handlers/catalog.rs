use crate::catalog;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use tracing::info;

fn handle_catalog_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(relations) = req.params.get("relations") else {
        return err(&req.id, "bad_params", "missing params.relations", None);
    };

    let loaded = match catalog::load_from_json(relations) {
        Ok(c) => c,
        Err(e) => {
            return err(
                &req.id,
                "bad_params",
                format!("invalid relations payload: {e}"),
                None,
            )
        }
    };

    if let Err(e) = db::replace_catalog(conn, loaded.relations()) {
        return err(&req.id, "db_insert_failed", format!("{e:?}"), None);
    }

    info!(relations = loaded.relations().len(), "catalog replaced");
    let counts = json!({
        "relationCount": loaded.relations().len(),
        "termCount": loaded.terms().len(),
        "instituteCount": loaded.institutes().len(),
        "courseCount": loaded.courses().len(),
        "sessionNameCount": loaded.session_names().len(),
    });
    state.catalog = loaded;
    ok(&req.id, counts)
}

fn handle_catalog_lookups(state: &mut AppState, req: &Request) -> serde_json::Value {
    let c = &state.catalog;
    ok(
        &req.id,
        json!({
            "terms": c.terms(),
            "institutes": c.institutes(),
            "courses": c.courses(),
            "sessionNames": c.session_names(),
        }),
    )
}

fn handle_catalog_institutes(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(term_id) = req.params.get("termId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing termId", None);
    };
    ok(
        &req.id,
        json!({ "institutes": state.catalog.institutes_for_term(term_id) }),
    )
}

fn handle_catalog_relations(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(term_id) = req.params.get("termId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing termId", None);
    };
    let Some(institute_id) = req.params.get("instituteId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing instituteId", None);
    };

    let candidates: Vec<serde_json::Value> = state
        .catalog
        .candidates(term_id, institute_id)
        .into_iter()
        .map(|rel| {
            json!({
                "relationId": rel.id,
                "displayName": rel.course.name,
                "relation": rel,
            })
        })
        .collect();
    ok(&req.id, json!({ "relations": candidates }))
}

fn handle_catalog_resolve(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(relation_id) = req.params.get("relationId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing relationId", None);
    };
    match state.catalog.resolve(relation_id) {
        Some(rel) => ok(&req.id, json!({ "relation": rel })),
        // Stale ids happen after a reload; this is a soft miss, not a crash.
        None => err(
            &req.id,
            "not_found",
            "course relation not found",
            Some(json!({ "relationId": relation_id })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "catalog.load" => Some(handle_catalog_load(state, req)),
        "catalog.lookups" => Some(handle_catalog_lookups(state, req)),
        "catalog.institutes" => Some(handle_catalog_institutes(state, req)),
        "catalog.relations" => Some(handle_catalog_relations(state, req)),
        "catalog.resolve" => Some(handle_catalog_resolve(state, req)),
        _ => None,
    }
}

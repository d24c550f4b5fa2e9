use crate::catalog::Catalog;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match db::open_db(&path) {
        Ok(conn) => {
            // Rebuild the catalog snapshot from whatever the workspace last
            // persisted. Any in-memory drafts belonged to the old workspace.
            let relations = match db::load_catalog(&conn) {
                Ok(v) => v,
                Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
            };
            let relation_count = relations.len();
            state.catalog = Catalog::load(relations);
            state.drafts.clear();
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            info!(
                workspace = %path.to_string_lossy(),
                relations = relation_count,
                "workspace opened"
            );
            ok(
                &req.id,
                json!({
                    "workspacePath": path.to_string_lossy(),
                    "relationCount": relation_count
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}

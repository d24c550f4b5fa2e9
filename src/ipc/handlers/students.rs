use crate::db::{self, ApplicationImport, StudentImport};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawApplication {
    course_relation_id: String,
    choice: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStudent {
    ref_id: String,
    first_name: String,
    last_name: String,
    college_roll: Option<String>,
    #[serde(default)]
    applications: Vec<RawApplication>,
}

fn handle_students_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(students) = req.params.get("students") else {
        return err(&req.id, "bad_params", "missing params.students", None);
    };

    let raw: Vec<RawStudent> = match serde_json::from_value(students.clone()) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "bad_params",
                format!("invalid students payload: {e}"),
                None,
            )
        }
    };

    let rows: Vec<StudentImport> = raw
        .into_iter()
        .map(|s| StudentImport {
            ref_id: s.ref_id,
            first_name: s.first_name,
            last_name: s.last_name,
            college_roll: s.college_roll,
            applications: s
                .applications
                .into_iter()
                .map(|a| ApplicationImport {
                    course_relation_id: a.course_relation_id,
                    choice: a.choice,
                })
                .collect(),
        })
        .collect();

    let now = Utc::now().to_rfc3339();
    match db::upsert_students(conn, &rows, &now) {
        Ok(count) => {
            info!(students = count, "students upserted");
            ok(&req.id, json!({ "loaded": count }))
        }
        Err(e) => err(&req.id, "db_insert_failed", format!("{e:?}"), None),
    }
}

fn handle_students_search(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(relation_id) = req.params.get("courseRelationId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing courseRelationId", None);
    };

    match db::candidates_for_relation(conn, relation_id) {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.load" => Some(handle_students_load(state, req)),
        "students.search" => Some(handle_students_search(state, req)),
        _ => None,
    }
}

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_bursard");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn bursard");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    value
        .pointer("/error/code")
        .and_then(|v| v.as_str())
        .expect("error code")
}

fn catalog_params(enrollment_rate: i64) -> serde_json::Value {
    json!({ "relations": [{
        "id": "r1",
        "term": { "id": "t-fall", "name": "Fall 2026" },
        "institute": { "id": "i-north", "name": "Northgate" },
        "course": { "id": "c-nursing", "name": "Nursing" },
        "localAmount": "700",
        "internationalAmount": "1000",
        "years": [{
            "label": "Year 1",
            "sessions": [
                { "name": "Enrollment", "rateType": "percentage", "rate": enrollment_rate }
            ]
        }]
    }]})
}

fn seed(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, workspace: &PathBuf) {
    request_ok(
        stdin,
        reader,
        "seed-1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(stdin, reader, "seed-2", "catalog.load", catalog_params(10));
    request_ok(
        stdin,
        reader,
        "seed-3",
        "students.load",
        json!({ "students": [{
            "refId": "s1",
            "firstName": "Amina",
            "lastName": "Khan",
            "collegeRoll": "R-101",
            "applications": [{ "courseRelationId": "r1", "choice": "International" }]
        }]}),
    );
}

fn create_draft(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    kind: &str,
) -> String {
    let draft = request_ok(
        stdin,
        reader,
        "create",
        "draft.create",
        json!({
            "kind": kind,
            "courseRelationId": "r1",
            "yearLabel": "Year 1",
            "sessionName": "Enrollment",
            "semester": "Fall-26"
        }),
    );
    draft["draftId"].as_str().expect("draftId").to_string()
}

#[test]
fn submit_preconditions_each_have_their_own_error() {
    let workspace = temp_dir("bursard-submit-validation");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    seed(&mut stdin, &mut reader, &workspace);
    let draft_id = create_draft(&mut stdin, &mut reader, "invoice");

    // Empty selection blocks first.
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "draft.submit",
        json!({ "draftId": draft_id, "status": "due", "customer": "cust-1" }),
    );
    assert_eq!(error_code(&resp), "no_students_selected");

    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "draft.addStudent",
        json!({ "draftId": draft_id, "studentId": "s1" }),
    );

    // Missing recipient blocks next.
    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "draft.submit",
        json!({ "draftId": draft_id, "status": "due" }),
    );
    assert_eq!(error_code(&resp), "recipient_required");

    // "available" is a remit-only status.
    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "draft.submit",
        json!({ "draftId": draft_id, "status": "available", "customer": "cust-1" }),
    );
    assert_eq!(error_code(&resp), "bad_params");

    // The failed submissions left the draft intact: the same action now
    // succeeds with valid params.
    let submitted = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "draft.submit",
        json!({
            "draftId": draft_id,
            "status": "due",
            "customer": "cust-1",
            "createdBy": "admin-1"
        }),
    );
    assert_eq!(submitted.pointer("/payload/totalAmount"), Some(&json!(100.0)));
    assert_eq!(submitted.pointer("/payload/noOfStudents"), Some(&json!(1)));

    let _ = child.kill();
}

#[test]
fn submitted_document_round_trips_with_frozen_fees() {
    let workspace = temp_dir("bursard-submit-roundtrip");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    seed(&mut stdin, &mut reader, &workspace);
    let draft_id = create_draft(&mut stdin, &mut reader, "invoice");

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "draft.addStudent",
        json!({ "draftId": draft_id, "studentId": "s1" }),
    );

    // Catalog rates change mid-session; the selected fee must not move.
    request_ok(&mut stdin, &mut reader, "2", "catalog.load", catalog_params(25));

    let submitted = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "draft.submit",
        json!({ "draftId": draft_id, "status": "due", "customer": "cust-1" }),
    );
    let document_id = submitted["documentId"].as_str().expect("documentId").to_string();
    assert_eq!(submitted.pointer("/payload/students/0/amount"), Some(&json!(100.0)));
    assert_eq!(submitted.pointer("/payload/totalAmount"), Some(&json!(100.0)));

    // The draft is consumed by a successful submit.
    let gone = request(
        &mut stdin,
        &mut reader,
        "4",
        "draft.get",
        json!({ "draftId": draft_id }),
    );
    assert_eq!(error_code(&gone), "not_found");

    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "document.get",
        json!({ "documentId": document_id }),
    );
    assert_eq!(fetched.pointer("/payload/kind"), Some(&json!("invoice")));
    assert_eq!(fetched.pointer("/payload/status"), Some(&json!("due")));
    assert_eq!(fetched.pointer("/payload/recipient"), Some(&json!("cust-1")));
    assert_eq!(fetched.pointer("/payload/institute"), Some(&json!("Northgate")));
    assert_eq!(
        fetched.pointer("/payload/students/0/refId"),
        Some(&json!("s1"))
    );
    assert_eq!(
        fetched.pointer("/payload/students/0/amount"),
        Some(&json!(100.0))
    );

    let listed = request_ok(&mut stdin, &mut reader, "6", "document.list", json!({}));
    let docs = listed["documents"].as_array().expect("documents");
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["documentId"], json!(document_id));
    assert_eq!(docs[0]["totalAmount"], json!(100.0));

    let _ = child.kill();
}

#[test]
fn remit_submit_accepts_available_status_and_remit_to() {
    let workspace = temp_dir("bursard-submit-remit");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    seed(&mut stdin, &mut reader, &workspace);
    let draft_id = create_draft(&mut stdin, &mut reader, "remit");

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "draft.addStudent",
        json!({ "draftId": draft_id, "studentId": "s1" }),
    );
    let submitted = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "draft.submit",
        json!({ "draftId": draft_id, "status": "available", "remitTo": "agent-7" }),
    );
    assert_eq!(submitted.pointer("/payload/kind"), Some(&json!("remit")));
    assert_eq!(submitted.pointer("/payload/status"), Some(&json!("available")));
    assert_eq!(submitted.pointer("/payload/recipient"), Some(&json!("agent-7")));

    let _ = child.kill();
}

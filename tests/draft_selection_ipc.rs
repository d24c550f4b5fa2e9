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

fn request_ok(
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
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

/// Workspace with one relation (local 700 / international 1000, Year 1 with
/// a 10% Enrollment session and a flat-50 Graduation session) and two
/// candidates for it.
fn seed(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, workspace: &PathBuf) {
    request_ok(
        stdin,
        reader,
        "seed-1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        stdin,
        reader,
        "seed-2",
        "catalog.load",
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
                    { "name": "Enrollment", "rateType": "percentage", "rate": 10 },
                    { "name": "Graduation", "rateType": "flat", "rate": 50 }
                ]
            }]
        }]}),
    );
    request_ok(
        stdin,
        reader,
        "seed-3",
        "students.load",
        json!({ "students": [
            {
                "refId": "s1",
                "firstName": "Amina",
                "lastName": "Khan",
                "collegeRoll": "R-101",
                "applications": [{ "courseRelationId": "r1", "choice": "International" }]
            },
            {
                "refId": "s2",
                "firstName": "Bilal",
                "lastName": "Ahmed",
                "collegeRoll": "R-102",
                "applications": [{ "courseRelationId": "r1", "choice": "Local" }]
            },
            {
                "refId": "s3",
                "firstName": "Chloe",
                "lastName": "Park",
                "collegeRoll": "R-103",
                "applications": [{ "courseRelationId": "r-other", "choice": "Local" }]
            }
        ]}),
    );
}

#[test]
fn add_remove_keeps_totals_and_partition() {
    let workspace = temp_dir("bursard-draft");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    seed(&mut stdin, &mut reader, &workspace);

    let draft = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "draft.create",
        json!({
            "kind": "invoice",
            "courseRelationId": "r1",
            "yearLabel": "Year 1",
            "sessionName": "Enrollment",
            "semester": "Fall-26"
        }),
    );
    let draft_id = draft["draftId"].as_str().expect("draftId").to_string();
    // Only the two students with applications for r1 are candidates.
    assert_eq!(draft["available"].as_array().expect("available").len(), 2);
    assert_eq!(draft["totalAmount"], json!(0.0));

    // International student, 10% of 1000.
    let added = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "draft.addStudent",
        json!({ "draftId": draft_id, "studentId": "s1" }),
    );
    assert_eq!(added["added"], json!(true));
    assert_eq!(added.pointer("/student/sessionFee"), Some(&json!(100.0)));
    assert_eq!(added["totalAmount"], json!(100.0));
    assert_eq!(added["warnings"], json!([]));

    // Re-adding the same id is a warning, not an error, and changes nothing.
    let dup = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "draft.addStudent",
        json!({ "draftId": draft_id, "studentId": "s1" }),
    );
    assert_eq!(dup["added"], json!(false));
    assert_eq!(dup["warnings"], json!(["already_selected"]));
    assert_eq!(dup["totalAmount"], json!(100.0));

    // Local student, 10% of 700.
    let added = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "draft.addStudent",
        json!({ "draftId": draft_id, "studentId": "s2" }),
    );
    assert_eq!(added.pointer("/student/sessionFee"), Some(&json!(70.0)));
    assert_eq!(added["totalAmount"], json!(170.0));

    let state = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "draft.get",
        json!({ "draftId": draft_id }),
    );
    assert_eq!(state["available"].as_array().expect("available").len(), 0);
    assert_eq!(state["selected"].as_array().expect("selected").len(), 2);

    // Removal returns the student to the candidate side and the total tracks.
    let removed = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "draft.removeStudent",
        json!({ "draftId": draft_id, "studentId": "s1" }),
    );
    assert_eq!(removed["removed"], json!(true));
    assert_eq!(removed["totalAmount"], json!(70.0));

    // Idempotent: removing again is a no-op.
    let removed = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "draft.removeStudent",
        json!({ "draftId": draft_id, "studentId": "s1" }),
    );
    assert_eq!(removed["removed"], json!(false));
    assert_eq!(removed["totalAmount"], json!(70.0));

    let state = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "draft.get",
        json!({ "draftId": draft_id }),
    );
    let available: Vec<&str> = state["available"]
        .as_array()
        .expect("available")
        .iter()
        .map(|s| s["refId"].as_str().expect("refId"))
        .collect();
    assert_eq!(available, vec!["s1"]);

    let _ = child.kill();
}

#[test]
fn unknown_session_prices_zero_with_warning() {
    let workspace = temp_dir("bursard-draft-missing");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    seed(&mut stdin, &mut reader, &workspace);

    let draft = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "draft.create",
        json!({
            "kind": "invoice",
            "courseRelationId": "r1",
            "yearLabel": "Year 1",
            "sessionName": "No Such Session"
        }),
    );
    let draft_id = draft["draftId"].as_str().expect("draftId").to_string();

    let added = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "draft.addStudent",
        json!({ "draftId": draft_id, "studentId": "s1" }),
    );
    assert_eq!(added["added"], json!(true));
    assert_eq!(added["warnings"], json!(["missing_session_data"]));
    assert_eq!(added.pointer("/student/sessionFee"), Some(&json!(0.0)));
    assert_eq!(added["totalAmount"], json!(0.0));

    let _ = child.kill();
}

#[test]
fn refresh_available_never_duplicates_selected() {
    let workspace = temp_dir("bursard-draft-refresh");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    seed(&mut stdin, &mut reader, &workspace);

    let draft = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "draft.create",
        json!({
            "kind": "remit",
            "courseRelationId": "r1",
            "yearLabel": "Year 1",
            "sessionName": "Graduation"
        }),
    );
    let draft_id = draft["draftId"].as_str().expect("draftId").to_string();
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "draft.addStudent",
        json!({ "draftId": draft_id, "studentId": "s2" }),
    );

    // A new candidate arrives between refreshes.
    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.load",
        json!({ "students": [{
            "refId": "s4",
            "firstName": "Dara",
            "lastName": "Osei",
            "collegeRoll": "R-104",
            "applications": [{ "courseRelationId": "r1", "choice": "Local" }]
        }]}),
    );

    let refreshed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "draft.refreshAvailable",
        json!({ "draftId": draft_id }),
    );
    let available: Vec<&str> = refreshed["available"]
        .as_array()
        .expect("available")
        .iter()
        .map(|s| s["refId"].as_str().expect("refId"))
        .collect();
    // s2 is selected and must not reappear; ordering is last name, first name.
    assert_eq!(available, vec!["s1", "s4"]);
    assert_eq!(refreshed["selected"].as_array().expect("selected").len(), 1);
    assert_eq!(refreshed["totalAmount"], json!(50.0));

    let _ = child.kill();
}

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

fn spawn_sidecar(export_dir: &PathBuf) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_reassessd");
    let mut child = Command::new(exe)
        .env("REASSESSD_EXPORT_DIR", export_dir)
        .env_remove("REASSESSD_CONFIG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn reassessd");
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
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn result(resp: &serde_json::Value) -> &serde_json::Value {
    assert_eq!(resp["ok"], json!(true), "request failed: {}", resp);
    &resp["result"]
}

#[test]
fn subjects_need_a_resolved_student_and_fees_add_up() {
    let workspace = temp_dir("reassessd-application-fees");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);

    let early = request(
        &mut stdin,
        &mut reader,
        "1",
        "application.addSubject",
        json!({ "subject": "Math", "fee": 100 }),
    );
    assert_eq!(result(&early)["added"], json!(false));
    assert_eq!(result(&early)["count"], json!(0));

    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "application.criteria.set",
        json!({ "field": "rollNo", "value": "1002" }),
    );
    let found = request(&mut stdin, &mut reader, "3", "application.search", json!({}));
    assert_eq!(result(&found)["student"]["student"], json!("Jane Smith"));

    let math = request(
        &mut stdin,
        &mut reader,
        "4",
        "application.addSubject",
        json!({ "subject": "Math", "subjectCode": "MTH-301", "fee": 100 }),
    );
    assert_eq!(result(&math)["added"], json!(true));
    assert_eq!(result(&math)["record"]["rollNo"], json!("1002"));
    let physics = request(
        &mut stdin,
        &mut reader,
        "5",
        "application.addSubject",
        json!({ "subject": "Physics", "fee": 80 }),
    );
    assert_eq!(result(&physics)["total"], json!(180.0));

    let blank = request(
        &mut stdin,
        &mut reader,
        "6",
        "application.addSubject",
        json!({ "subject": "   ", "fee": 500 }),
    );
    assert_eq!(result(&blank)["added"], json!(false));
    assert_eq!(result(&blank)["count"], json!(2));
    assert_eq!(result(&blank)["total"], json!(180.0));

    let lab = request(
        &mut stdin,
        &mut reader,
        "7",
        "application.addSubject",
        json!({ "subject": "Lab", "fee": 20 }),
    );
    assert_eq!(result(&lab)["total"], json!(200.0));

    let filtered = request(
        &mut stdin,
        &mut reader,
        "8",
        "application.records",
        json!({ "term": "phys" }),
    );
    assert_eq!(result(&filtered)["visible"], json!(1));
    assert_eq!(result(&filtered)["total"], json!(200.0));
    assert_eq!(result(&filtered)["totalScope"], json!("all"));

    let visible = request(
        &mut stdin,
        &mut reader,
        "9",
        "application.records",
        json!({ "term": "phys", "totalScope": "visible" }),
    );
    assert_eq!(result(&visible)["total"], json!(80.0));

    let paid = request(&mut stdin, &mut reader, "10", "application.pay", json!({}));
    assert_eq!(result(&paid)["amount"], json!(200.0));
    assert_eq!(result(&paid)["dismissAfterMs"], json!(3000));
    assert!(result(&paid)["reference"]
        .as_str()
        .unwrap_or("")
        .starts_with("PAY-"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn pay_requires_student_and_subjects() {
    let workspace = temp_dir("reassessd-application-pay");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);

    let resp = request(&mut stdin, &mut reader, "1", "application.pay", json!({}));
    assert_eq!(resp["error"]["code"], json!("no_student"));

    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "application.criteria.set",
        json!({ "field": "studentName", "value": "arjun mehta" }),
    );
    let _ = request(&mut stdin, &mut reader, "3", "application.search", json!({}));
    let resp = request(&mut stdin, &mut reader, "4", "application.pay", json!({}));
    assert_eq!(resp["error"]["code"], json!("nothing_to_pay"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn payment_failures_carry_body_message_or_fallback() {
    let workspace = temp_dir("reassessd-application-payresult");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "application.paymentResult",
        json!({ "status": 402, "body": "{\"message\":\"Card declined\"}" }),
    );
    assert_eq!(resp["error"]["code"], json!("payment_failed"));
    assert_eq!(resp["error"]["message"], json!("Card declined"));
    assert_eq!(resp["error"]["details"]["status"], json!(402));

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "application.paymentResult",
        json!({ "status": 500, "body": "oops" }),
    );
    assert_eq!(resp["error"]["message"], json!("API request failed"));

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "application.paymentResult",
        json!({}),
    );
    assert_eq!(resp["error"]["message"], json!("Network error"));

    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "application.paymentResult",
        json!({ "status": 200, "body": { "txn": "T-1" } }),
    );
    assert_eq!(result(&resp)["paid"], json!(true));
    assert_eq!(result(&resp)["response"]["txn"], json!("T-1"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn unknown_criteria_field_is_rejected() {
    let workspace = temp_dir("reassessd-application-criteria");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "application.criteria.set",
        json!({ "field": "semester", "value": "3" }),
    );
    assert_eq!(resp["error"]["code"], json!("unknown_field"));

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "marks.criteria.set",
        json!({ "field": "semester", "value": "3" }),
    );
    assert_eq!(result(&resp)["criteria"]["semester"], json!("3"));

    let resp = request(&mut stdin, &mut reader, "3", "application.criteria.get", json!({}));
    assert_eq!(
        result(&resp)["criteria"],
        json!({ "examType": "", "rollNo": "", "session": "", "studentName": "" })
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn searching_another_student_starts_a_fresh_application() {
    let workspace = temp_dir("reassessd-application-switch");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);

    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "application.criteria.set",
        json!({ "field": "rollNo", "value": "1001" }),
    );
    let _ = request(&mut stdin, &mut reader, "2", "application.search", json!({}));
    let math = request(
        &mut stdin,
        &mut reader,
        "3",
        "application.addSubject",
        json!({ "subject": "Math", "fee": 100 }),
    );
    assert_eq!(result(&math)["total"], json!(100.0));
    let paid = request(&mut stdin, &mut reader, "4", "application.pay", json!({}));
    assert_eq!(result(&paid)["amount"], json!(100.0));

    let _ = request(
        &mut stdin,
        &mut reader,
        "5",
        "application.criteria.set",
        json!({ "field": "rollNo", "value": "1002" }),
    );
    let found = request(&mut stdin, &mut reader, "6", "application.search", json!({}));
    assert_eq!(result(&found)["student"]["rollNo"], json!("1002"));

    let rows = request(&mut stdin, &mut reader, "7", "application.records", json!({}));
    assert_eq!(result(&rows)["count"], json!(0));
    assert_eq!(result(&rows)["total"], json!(0.0));
    let student = request(&mut stdin, &mut reader, "8", "application.student", json!({}));
    assert_eq!(result(&student)["payment"], json!(null));

    let resp = request(&mut stdin, &mut reader, "9", "application.pay", json!({}));
    assert_eq!(resp["error"]["code"], json!("nothing_to_pay"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

use serde_json::json;
use std::io::{BufRead, BufReader, Read, Write};
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

fn read_entry(path: &std::path::Path, name: &str) -> String {
    let f = std::fs::File::open(path).expect("open workbook");
    let mut archive = zip::ZipArchive::new(f).expect("workbook is a zip");
    let mut text = String::new();
    archive
        .by_name(name)
        .expect("entry present")
        .read_to_string(&mut text)
        .expect("read entry");
    text
}

#[test]
fn report_starts_with_sample_rows_and_filters_case_insensitively() {
    let workspace = temp_dir("reassessd-report-filter");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);

    let all = request(&mut stdin, &mut reader, "1", "report.records", json!({}));
    assert_eq!(result(&all)["count"], json!(4));
    assert_eq!(result(&all)["visible"], json!(4));
    let ids: Vec<&str> = result(&all)["records"]
        .as_array()
        .expect("records")
        .iter()
        .filter_map(|r| r["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["1", "2", "3", "4"]);

    let jane = request(
        &mut stdin,
        &mut reader,
        "2",
        "report.records",
        json!({ "term": "JANE" }),
    );
    assert_eq!(result(&jane)["visible"], json!(2));
    assert_eq!(result(&jane)["count"], json!(4));
    assert_eq!(result(&jane)["total"], json!(360.0));

    let none = request(
        &mut stdin,
        &mut reader,
        "3",
        "report.records",
        json!({ "term": "nobody" }),
    );
    assert_eq!(result(&none)["visible"], json!(0));
    assert_eq!(result(&none)["records"], json!([]));

    let bad = request(
        &mut stdin,
        &mut reader,
        "4",
        "report.records",
        json!({ "totalScope": "some" }),
    );
    assert_eq!(bad["error"]["code"], json!("bad_params"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn export_writes_named_workbook_with_projected_headers() {
    let workspace = temp_dir("reassessd-report-export");
    let out_dir = workspace.join("downloads");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "report.export",
        json!({ "outDir": out_dir.to_string_lossy(), "term": "jane" }),
    );
    let res = result(&resp);
    assert_eq!(res["fileName"], json!("Reassessment_Report_Export.xlsx"));
    assert_eq!(res["sheetName"], json!("Report"));
    assert_eq!(res["rowsExported"], json!(2));
    assert_eq!(
        res["columns"],
        json!(["Student Name", "Subject", "Status", "Fee"])
    );

    let path = out_dir.join("Reassessment_Report_Export.xlsx");
    assert!(path.is_file());
    let content_types = read_entry(&path, "[Content_Types].xml");
    assert!(content_types.contains("/xl/worksheets/sheet1.xml"));
    let workbook = read_entry(&path, "xl/workbook.xml");
    assert!(workbook.contains("name=\"Report\""));
    let sheet = read_entry(&path, "xl/worksheets/sheet1.xml");
    assert!(sheet.contains("Student Name"));
    assert!(sheet.contains("Jane Smith"));
    assert!(!sheet.contains("John Doe"));
    assert!(sheet.contains("<v>80</v>"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn export_to_unwritable_location_reports_failure() {
    let workspace = temp_dir("reassessd-report-export-fail");
    let blocker = workspace.join("not-a-dir");
    std::fs::write(&blocker, b"file").expect("write blocker");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "report.export",
        json!({ "outDir": blocker.join("nested").to_string_lossy() }),
    );
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("export_failed"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn appended_rows_keep_sidecar_assigned_ids() {
    let workspace = temp_dir("reassessd-report-append-id");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);

    let rejected = request(
        &mut stdin,
        &mut reader,
        "1",
        "report.append",
        json!({ "fields": { "id": "1", "student": "X", "subject": "Y", "fee": 5 } }),
    );
    assert_eq!(rejected["error"]["code"], json!("bad_value"));
    assert_eq!(rejected["error"]["details"]["field"], json!("id"));

    let added = request(
        &mut stdin,
        &mut reader,
        "2",
        "report.append",
        json!({ "fields": { "student": "X", "subject": "Y", "fee": 5 } }),
    );
    assert_eq!(result(&added)["added"], json!(true));
    assert_eq!(result(&added)["count"], json!(5));

    let all = request(&mut stdin, &mut reader, "3", "report.records", json!({}));
    let mut ids: Vec<&str> = result(&all)["records"]
        .as_array()
        .expect("records")
        .iter()
        .filter_map(|r| r["id"].as_str())
        .collect();
    assert_eq!(ids.len(), 5);
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 5, "ids must be unique");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

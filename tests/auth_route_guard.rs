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
    let exe = env!("CARGO_BIN_EXE_bendaharad");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn bendaharad");
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

fn error_code(resp: &serde_json::Value) -> Option<&str> {
    resp.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

fn guard_decision(resp: &serde_json::Value) -> (String, Option<String>) {
    let result = resp.get("result").expect("guard result");
    (
        result
            .get("decision")
            .and_then(|v| v.as_str())
            .expect("decision")
            .to_string(),
        result
            .get("target")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
    )
}

#[test]
fn roles_partition_routes_and_methods() {
    let workspace = temp_dir("bendahara-guard");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(true));

    // Anonymous: every protected root bounces to /login.
    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "guard.route",
        json!({ "path": "/admin/income" }),
    );
    assert_eq!(
        guard_decision(&resp),
        ("redirect".to_string(), Some("/login".to_string()))
    );
    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "guard.route",
        json!({ "path": "/" }),
    );
    assert_eq!(
        guard_decision(&resp),
        ("redirect".to_string(), Some("/login".to_string()))
    );

    // Bootstrap admin, then a parent self-registration.
    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "auth.register",
        json!({ "email": "admin@tk.id", "password": "rahasia1", "name": "Admin" }),
    );
    assert_eq!(
        resp.get("result").and_then(|r| r.get("role")).and_then(|v| v.as_str()),
        Some("admin")
    );
    let resp = request(
        &mut stdin,
        &mut reader,
        "5",
        "auth.register",
        json!({ "email": "ibu@contoh.id", "password": "rahasia2", "name": "Ibu Wati" }),
    );
    assert_eq!(
        resp.get("result").and_then(|r| r.get("role")).and_then(|v| v.as_str()),
        Some("parent")
    );

    // Wrong password and unknown account share one generic failure.
    let resp = request(
        &mut stdin,
        &mut reader,
        "6",
        "auth.login",
        json!({ "email": "admin@tk.id", "password": "salah-total" }),
    );
    assert_eq!(error_code(&resp), Some("auth_failed"));
    let resp = request(
        &mut stdin,
        &mut reader,
        "7",
        "auth.login",
        json!({ "email": "none@tk.id", "password": "salah-total" }),
    );
    assert_eq!(error_code(&resp), Some("auth_failed"));

    // Admin session: /admin allowed, /parent and / bounce to /admin.
    let resp = request(
        &mut stdin,
        &mut reader,
        "8",
        "auth.login",
        json!({ "email": "admin@tk.id", "password": "rahasia1" }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(true), "{}", resp);
    let resp = request(
        &mut stdin,
        &mut reader,
        "9",
        "guard.route",
        json!({ "path": "/admin/reports" }),
    );
    assert_eq!(guard_decision(&resp).0, "allow");
    let resp = request(
        &mut stdin,
        &mut reader,
        "10",
        "guard.route",
        json!({ "path": "/parent/history" }),
    );
    assert_eq!(
        guard_decision(&resp),
        ("redirect".to_string(), Some("/admin".to_string()))
    );
    let resp = request(
        &mut stdin,
        &mut reader,
        "11",
        "guard.route",
        json!({ "path": "/tidak-ada" }),
    );
    assert_eq!(
        guard_decision(&resp),
        ("redirect".to_string(), Some("/".to_string()))
    );

    // Role resolution is idempotent: same principal, same answer twice.
    let first = request(&mut stdin, &mut reader, "12", "auth.whoami", json!({}));
    let second = request(&mut stdin, &mut reader, "13", "auth.whoami", json!({}));
    assert_eq!(
        first.get("result").and_then(|r| r.get("role")),
        second.get("result").and_then(|r| r.get("role"))
    );
    assert_eq!(
        first.get("result").and_then(|r| r.get("role")).and_then(|v| v.as_str()),
        Some("admin")
    );

    // Admin cannot demote their own account.
    let own_id = first
        .get("result")
        .and_then(|r| r.get("principal"))
        .and_then(|v| v.as_str())
        .expect("principal")
        .to_string();
    let resp = request(
        &mut stdin,
        &mut reader,
        "14",
        "users.update",
        json!({ "userId": own_id, "patch": { "role": "guru" } }),
    );
    assert_eq!(error_code(&resp), Some("validation_failed"));

    // A guru account gets no dashboard at all.
    let resp = request(
        &mut stdin,
        &mut reader,
        "15",
        "users.create",
        json!({ "email": "guru@tk.id", "password": "rahasia3", "name": "Pak Guru", "role": "guru" }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(true), "{}", resp);

    // Parent session: /parent allowed, /admin/* bounces to /login (not /parent).
    let resp = request(
        &mut stdin,
        &mut reader,
        "16",
        "auth.login",
        json!({ "email": "ibu@contoh.id", "password": "rahasia2" }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(true), "{}", resp);
    let resp = request(
        &mut stdin,
        &mut reader,
        "17",
        "guard.route",
        json!({ "path": "/parent/upload" }),
    );
    assert_eq!(guard_decision(&resp).0, "allow");
    let resp = request(
        &mut stdin,
        &mut reader,
        "18",
        "guard.route",
        json!({ "path": "/admin/students" }),
    );
    assert_eq!(
        guard_decision(&resp),
        ("redirect".to_string(), Some("/login".to_string()))
    );
    let resp = request(
        &mut stdin,
        &mut reader,
        "19",
        "guard.route",
        json!({ "path": "/" }),
    );
    assert_eq!(
        guard_decision(&resp),
        ("redirect".to_string(), Some("/parent".to_string()))
    );

    // Method gate follows the same policy table.
    let resp = request(&mut stdin, &mut reader, "20", "students.list", json!({}));
    assert_eq!(error_code(&resp), Some("forbidden"));
    let resp = request(&mut stdin, &mut reader, "21", "schedule.list", json!({}));
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(true), "{}", resp);
    let resp = request(
        &mut stdin,
        &mut reader,
        "22",
        "schedule.create",
        json!({
            "studentName": "X",
            "class": "TK A",
            "type": "SPP Bulanan",
            "amount": 100,
            "dueDate": "2025-01-01"
        }),
    );
    assert_eq!(error_code(&resp), Some("forbidden"));

    // Guru: no dashboard and no domain methods.
    let resp = request(
        &mut stdin,
        &mut reader,
        "23",
        "auth.login",
        json!({ "email": "guru@tk.id", "password": "rahasia3" }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(true), "{}", resp);
    let resp = request(
        &mut stdin,
        &mut reader,
        "24",
        "guard.route",
        json!({ "path": "/admin" }),
    );
    assert_eq!(
        guard_decision(&resp),
        ("redirect".to_string(), Some("/login".to_string()))
    );
    let resp = request(&mut stdin, &mut reader, "25", "students.list", json!({}));
    assert_eq!(error_code(&resp), Some("forbidden"));

    // Logout drops straight back to the anonymous table.
    let _ = request(&mut stdin, &mut reader, "26", "auth.logout", json!({}));
    let resp = request(
        &mut stdin,
        &mut reader,
        "27",
        "guard.route",
        json!({ "path": "/parent" }),
    );
    assert_eq!(
        guard_decision(&resp),
        ("redirect".to_string(), Some("/login".to_string()))
    );
    let resp = request(&mut stdin, &mut reader, "28", "auth.whoami", json!({}));
    assert_eq!(
        resp.get("result")
            .and_then(|r| r.get("authenticated"))
            .and_then(|v| v.as_bool()),
        Some(false)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
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

fn expect_ok(resp: &serde_json::Value, method: &str) -> serde_json::Value {
    assert_eq!(
        resp.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        resp
    );
    resp.get("result").cloned().expect("result")
}

fn error_code(resp: &serde_json::Value) -> Option<&str> {
    resp.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

const BANK: &str = "BNI - 0795834521 a.n Rita Ayu Bulan Trisna";

fn write_jpeg(path: &Path, len: usize) {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
    bytes.resize(len, 0x11);
    std::fs::write(path, bytes).expect("write fixture");
}

fn submission(file_path: &Path) -> serde_json::Value {
    json!({
        "paymentType": "SPP Bulanan",
        "amount": 500000,
        "paymentDate": "2025-06-02",
        "bankAccount": BANK,
        "referenceNumber": "TRX1",
        "filePath": file_path.to_string_lossy(),
    })
}

#[test]
fn parent_submission_lands_in_uploads_and_history() {
    let workspace = temp_dir("bendahara-proofs");
    let fixture = workspace.join("bukti-spp.jpg");
    write_jpeg(&fixture, 2 * 1024 * 1024);

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "1",
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        ),
        "workspace.select",
    );
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "2",
            "auth.register",
            json!({ "email": "admin@tk.id", "password": "rahasia1", "name": "Admin" }),
        ),
        "auth.register",
    );
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "3",
            "auth.register",
            json!({ "email": "ibu@contoh.id", "password": "rahasia2", "name": "Ibu Wati" }),
        ),
        "auth.register",
    );

    // Admins never submit proofs, even with a valid payload.
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "4",
            "auth.login",
            json!({ "email": "admin@tk.id", "password": "rahasia1" }),
        ),
        "auth.login",
    );
    let resp = request(
        &mut stdin,
        &mut reader,
        "5",
        "proofs.submit",
        submission(&fixture),
    );
    assert_eq!(error_code(&resp), Some("forbidden"));

    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "6",
            "auth.login",
            json!({ "email": "ibu@contoh.id", "password": "rahasia2" }),
        ),
        "auth.login",
    );
    let submitted = expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "7",
            "proofs.submit",
            submission(&fixture),
        ),
        "proofs.submit",
    );
    let file_id = submitted
        .get("fileId")
        .and_then(|v| v.as_str())
        .expect("fileId")
        .to_string();
    assert_eq!(
        submitted.get("fileName").and_then(|v| v.as_str()),
        Some("bukti-spp.jpg")
    );

    // The blob and its metadata sidecar exist on disk.
    let object = workspace.join("uploads").join(&file_id);
    assert!(object.is_file(), "missing object {}", object.to_string_lossy());
    let meta: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(workspace.join("uploads").join(format!("{}.json", file_id)))
            .expect("metadata sidecar"),
    )
    .expect("metadata json");
    assert_eq!(
        meta.get("mimeType").and_then(|v| v.as_str()),
        Some("image/jpeg")
    );
    assert_eq!(
        meta.get("byteLength").and_then(|v| v.as_u64()),
        Some(2 * 1024 * 1024)
    );

    // The parent's history shows the submission; its fileId matches.
    let listed = expect_ok(
        &request(&mut stdin, &mut reader, "8", "proofs.list", json!({})),
        "proofs.list",
    );
    let proofs = listed.get("proofs").and_then(|v| v.as_array()).expect("proofs");
    assert_eq!(proofs.len(), 1);
    assert_eq!(proofs[0].get("fileId").and_then(|v| v.as_str()), Some(file_id.as_str()));
    assert_eq!(
        proofs[0].get("referenceNumber").and_then(|v| v.as_str()),
        Some("TRX1")
    );

    // Another parent's history is empty.
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "9",
            "auth.register",
            json!({ "email": "bapak@contoh.id", "password": "rahasia3", "name": "Bapak Joni" }),
        ),
        "auth.register",
    );
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "10",
            "auth.login",
            json!({ "email": "bapak@contoh.id", "password": "rahasia3" }),
        ),
        "auth.login",
    );
    let listed = expect_ok(
        &request(&mut stdin, &mut reader, "11", "proofs.list", json!({})),
        "proofs.list",
    );
    assert_eq!(
        listed.get("proofs").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );

    // The admin inbox shows everything.
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "12",
            "auth.login",
            json!({ "email": "admin@tk.id", "password": "rahasia1" }),
        ),
        "auth.login",
    );
    let listed = expect_ok(
        &request(&mut stdin, &mut reader, "13", "proofs.list", json!({})),
        "proofs.list",
    );
    assert_eq!(
        listed.get("proofs").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(1)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn invalid_submissions_fail_before_anything_is_stored() {
    let workspace = temp_dir("bendahara-proofs-invalid");
    let jpeg = workspace.join("bukti.jpg");
    write_jpeg(&jpeg, 4096);

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "1",
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        ),
        "workspace.select",
    );
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "2",
            "auth.register",
            json!({ "email": "admin@tk.id", "password": "rahasia1", "name": "Admin" }),
        ),
        "auth.register",
    );
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "3",
            "auth.register",
            json!({ "email": "ibu@contoh.id", "password": "rahasia2", "name": "Ibu Wati" }),
        ),
        "auth.register",
    );
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "4",
            "auth.login",
            json!({ "email": "ibu@contoh.id", "password": "rahasia2" }),
        ),
        "auth.login",
    );

    // Free-text bank account strings are refused; the picker is closed.
    let mut bad_bank = submission(&jpeg);
    bad_bank["bankAccount"] = json!("BNI - 0795834521");
    let resp = request(&mut stdin, &mut reader, "5", "proofs.submit", bad_bank);
    assert_eq!(error_code(&resp), Some("validation_failed"));

    let mut bad_type = submission(&jpeg);
    bad_type["paymentType"] = json!("Sumbangan");
    let resp = request(&mut stdin, &mut reader, "6", "proofs.submit", bad_type);
    assert_eq!(error_code(&resp), Some("validation_failed"));

    let mut bad_amount = submission(&jpeg);
    bad_amount["amount"] = json!(-1);
    let resp = request(&mut stdin, &mut reader, "7", "proofs.submit", bad_amount);
    assert_eq!(error_code(&resp), Some("validation_failed"));

    // Content sniffing, not the extension, decides the type.
    let fake = workspace.join("bukan-gambar.jpg");
    std::fs::write(&fake, b"GIF89a not really a jpeg").expect("write fixture");
    let resp = request(&mut stdin, &mut reader, "8", "proofs.submit", submission(&fake));
    assert_eq!(error_code(&resp), Some("validation_failed"));

    // One byte over the cap is refused.
    let oversize = workspace.join("terlalu-besar.jpg");
    write_jpeg(&oversize, 10 * 1024 * 1024 + 1);
    let resp = request(&mut stdin, &mut reader, "9", "proofs.submit", submission(&oversize));
    assert_eq!(error_code(&resp), Some("validation_failed"));

    // No partial state: history is empty and no blob was written.
    let listed = expect_ok(
        &request(&mut stdin, &mut reader, "10", "proofs.list", json!({})),
        "proofs.list",
    );
    assert_eq!(
        listed.get("proofs").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );
    assert!(!workspace.join("uploads").exists());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

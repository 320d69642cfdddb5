use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

use crate::auth::{Role, Session};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{opt_str, req_amount, req_date, req_enum, req_str, require_db, require_session};
use crate::ipc::types::{AppState, Request};
use crate::relay::{self, FilePart, FolderStore, RelayRequest, MAX_UPLOAD_BYTES};

pub const PAYMENT_TYPES: &[&str] = &[
    "SPP Bulanan",
    "Uang Pangkal",
    "Uang Kegiatan",
    "Uang Seragam",
    "Uang Makan",
    "Lainnya",
];

/// The school's receiving accounts; transfers are manual and confirmed by
/// proof upload, so the picker is a closed list.
pub const BANK_ACCOUNTS: &[&str] = &[
    "BNI - 0795834521 a.n Rita Ayu Bulan Trisna",
    "BCA - 8832019475 a.n Yayasan TK Tunas Ceria",
    "Mandiri - 1420087736512 a.n Yayasan TK Tunas Ceria",
];

struct ValidatedSubmission {
    payment_type: String,
    amount: i64,
    payment_date: String,
    bank_account: String,
    reference_number: String,
    notes: Option<String>,
    file: FilePart,
}

/// Editing -> Validating: every check runs before anything touches the store
/// or the database. A violation surfaces as a field-level error and nothing
/// else happens.
fn validate_submission(params: &serde_json::Value) -> Result<ValidatedSubmission, HandlerErr> {
    let payment_type = req_enum(params, "paymentType", PAYMENT_TYPES)?;
    let amount = req_amount(params, "amount")?;
    let payment_date = req_date(params, "paymentDate")?;
    let bank_account = req_enum(params, "bankAccount", BANK_ACCOUNTS)?;
    let reference_number = req_str(params, "referenceNumber")?;
    let notes = opt_str(params, "notes");

    let file_path = params
        .get("filePath")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::validation("proofFile", "proof file is required"))?;
    let bytes = std::fs::read(&file_path)
        .map_err(|_| HandlerErr::validation("proofFile", "proof file could not be read"))?;
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(HandlerErr::validation(
            "proofFile",
            "proof file must be 10 MiB or smaller",
        ));
    }
    let Some(mime) = relay::sniff_mime(&bytes) else {
        return Err(HandlerErr::validation(
            "proofFile",
            "proof file must be a JPEG, PNG, or PDF",
        ));
    };
    let file_name = opt_str(params, "fileName").unwrap_or_else(|| {
        std::path::Path::new(&file_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "bukti".to_string())
    });

    Ok(ValidatedSubmission {
        payment_type,
        amount,
        payment_date,
        bank_account,
        reference_number,
        notes,
        file: FilePart {
            file_name,
            mime: mime.to_string(),
            bytes,
        },
    })
}

fn submit(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state)?;
    // Proofs are created by parents, for themselves, only.
    if session.role != Some(Role::Parent) {
        return Err(HandlerErr::new(
            "forbidden",
            "only a parent account can submit a payment proof",
        ));
    }
    let conn = require_db(state)?;
    let Some(workspace) = state.workspace.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };

    let submission = validate_submission(params)?;

    // Validating -> Uploading. Relay failure aborts the flow; no metadata is
    // written for a file that never landed.
    let store = FolderStore::new(workspace.join("uploads"), &state.relay);
    let resp = relay::handle_upload(
        &store,
        &RelayRequest {
            method: "POST".to_string(),
            file: Some(submission.file),
        },
    );
    if resp.status != 200 {
        return Err(HandlerErr::new("upload_failed", "upload failed, try again"));
    }
    let file_id = resp
        .body
        .get("fileId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::new("upload_failed", "upload failed, try again"))?;
    let file_name = resp
        .body
        .get("fileName")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    // Uploading -> PersistingMetadata. A failure here leaves the stored
    // object orphaned; there is no compensating delete and no retry.
    let proof_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO payment_proofs(id, student, payment_type, amount, payment_date,
                                    bank_account, reference_number, notes, file_id, uploaded_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &proof_id,
            &session.principal,
            &submission.payment_type,
            submission.amount,
            &submission.payment_date,
            &submission.bank_account,
            &submission.reference_number,
            submission.notes.as_deref(),
            &file_id,
        ),
    )
    .map_err(|e| {
        HandlerErr::with_details(
            "db_insert_failed",
            e.to_string(),
            json!({ "table": "payment_proofs", "orphanedFileId": file_id }),
        )
    })?;

    Ok(json!({ "proofId": proof_id, "fileId": file_id, "fileName": file_name }))
}

fn list(conn: &Connection, session: &Session) -> Result<serde_json::Value, HandlerErr> {
    let (sql, binds): (&str, Vec<&dyn rusqlite::ToSql>) =
        if session.role == Some(Role::Parent) {
            (
                "SELECT id, student, payment_type, amount, payment_date, bank_account,
                        reference_number, notes, file_id, uploaded_at
                 FROM payment_proofs
                 WHERE student = ?
                 ORDER BY uploaded_at DESC, id",
                vec![&session.principal as &dyn rusqlite::ToSql],
            )
        } else {
            (
                "SELECT id, student, payment_type, amount, payment_date, bank_account,
                        reference_number, notes, file_id, uploaded_at
                 FROM payment_proofs
                 ORDER BY uploaded_at DESC, id",
                vec![],
            )
        };
    let mut stmt = conn.prepare(sql).map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(binds), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "student": r.get::<_, String>(1)?,
                "paymentType": r.get::<_, String>(2)?,
                "amount": r.get::<_, i64>(3)?,
                "paymentDate": r.get::<_, String>(4)?,
                "bankAccount": r.get::<_, String>(5)?,
                "referenceNumber": r.get::<_, String>(6)?,
                "notes": r.get::<_, Option<String>>(7)?,
                "fileId": r.get::<_, String>(8)?,
                "uploadedAt": r.get::<_, String>(9)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "proofs": rows }))
}

fn options() -> serde_json::Value {
    json!({
        "paymentTypes": PAYMENT_TYPES,
        "bankAccounts": BANK_ACCOUNTS,
        "maxUploadBytes": MAX_UPLOAD_BYTES,
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let st: &AppState = state;
    let out = match req.method.as_str() {
        "proofs.submit" => submit(st, &req.params),
        "proofs.list" => require_db(st).and_then(|conn| {
            let session = require_session(st)?;
            list(conn, session)
        }),
        "proofs.options" => Ok(options()),
        _ => return None,
    };
    Some(match out {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    })
}

use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{opt_date, opt_enum, opt_str, req_str, require_db};
use crate::ipc::types::{AppState, Request};

const STATUSES: &[&str] = &["active", "alumni"];

const SELECT_COLUMNS: &str = "id, name, class_name, parent_name, parent_email, parent_phone,
       status, registration_date, birth_date, address,
       emergency_contact, emergency_phone, medical_notes, created_at, updated_at";

fn row_to_json(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "name": r.get::<_, String>(1)?,
        "class": r.get::<_, String>(2)?,
        "parentName": r.get::<_, String>(3)?,
        "parentEmail": r.get::<_, String>(4)?,
        "parentPhone": r.get::<_, Option<String>>(5)?,
        "status": r.get::<_, String>(6)?,
        "registrationDate": r.get::<_, Option<String>>(7)?,
        "birthDate": r.get::<_, Option<String>>(8)?,
        "address": r.get::<_, Option<String>>(9)?,
        "emergencyContact": r.get::<_, Option<String>>(10)?,
        "emergencyPhone": r.get::<_, Option<String>>(11)?,
        "medicalNotes": r.get::<_, Option<String>>(12)?,
        "createdAt": r.get::<_, Option<String>>(13)?,
        "updatedAt": r.get::<_, Option<String>>(14)?,
    }))
}

fn list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM students ORDER BY name",
            SELECT_COLUMNS
        ))
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map([], |r| row_to_json(r))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "students": rows }))
}

fn create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = req_str(params, "name")?;
    let class_name = req_str(params, "class")?;
    let parent_name = req_str(params, "parentName")?;
    let parent_email = req_str(params, "parentEmail")?;
    if !parent_email.contains('@') {
        return Err(HandlerErr::validation(
            "parentEmail",
            "parentEmail must be a valid address",
        ));
    }
    let parent_phone = opt_str(params, "parentPhone");
    let status = opt_enum(params, "status", STATUSES)?.unwrap_or_else(|| "active".to_string());
    let registration_date = opt_date(params, "registrationDate")?;
    let birth_date = opt_date(params, "birthDate")?;
    let address = opt_str(params, "address");
    let emergency_contact = opt_str(params, "emergencyContact");
    let emergency_phone = opt_str(params, "emergencyPhone");
    let medical_notes = opt_str(params, "medicalNotes");

    let student_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, name, class_name, parent_name, parent_email, parent_phone,
                              status, registration_date, birth_date, address,
                              emergency_contact, emergency_phone, medical_notes,
                              created_at, updated_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                strftime('%Y-%m-%dT%H:%M:%SZ','now'),
                strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        rusqlite::params![
            student_id,
            name,
            class_name,
            parent_name,
            parent_email,
            parent_phone,
            status,
            registration_date,
            birth_date,
            address,
            emergency_contact,
            emergency_phone,
            medical_notes,
        ],
    )
    .map_err(|e| HandlerErr::insert("students", e))?;

    Ok(json!({ "studentId": student_id }))
}

fn update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = req_str(params, "studentId")?;
    let patch = params.get("patch").cloned().unwrap_or(json!({}));

    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [&student_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(HandlerErr::query)?;
    if exists.is_none() {
        return Err(HandlerErr::not_found("student not found"));
    }

    // Patch column by column; created_at is never touched.
    let mut sets: Vec<(&str, String)> = Vec::new();
    if let Some(v) = opt_str(&patch, "name") {
        sets.push(("name", v));
    }
    if let Some(v) = opt_str(&patch, "class") {
        sets.push(("class_name", v));
    }
    if let Some(v) = opt_str(&patch, "parentName") {
        sets.push(("parent_name", v));
    }
    if let Some(v) = opt_str(&patch, "parentEmail") {
        if !v.contains('@') {
            return Err(HandlerErr::validation(
                "parentEmail",
                "parentEmail must be a valid address",
            ));
        }
        sets.push(("parent_email", v));
    }
    if let Some(v) = opt_str(&patch, "parentPhone") {
        sets.push(("parent_phone", v));
    }
    if let Some(v) = opt_enum(&patch, "status", STATUSES)? {
        sets.push(("status", v));
    }
    if let Some(v) = opt_date(&patch, "registrationDate")? {
        sets.push(("registration_date", v));
    }
    if let Some(v) = opt_date(&patch, "birthDate")? {
        sets.push(("birth_date", v));
    }
    if let Some(v) = opt_str(&patch, "address") {
        sets.push(("address", v));
    }
    if let Some(v) = opt_str(&patch, "emergencyContact") {
        sets.push(("emergency_contact", v));
    }
    if let Some(v) = opt_str(&patch, "emergencyPhone") {
        sets.push(("emergency_phone", v));
    }
    if let Some(v) = opt_str(&patch, "medicalNotes") {
        sets.push(("medical_notes", v));
    }
    if sets.is_empty() {
        return Err(HandlerErr::bad_params("patch has no recognized fields"));
    }

    let assignments = sets
        .iter()
        .map(|(col, _)| format!("{} = ?", col))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE students SET {}, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now') WHERE id = ?",
        assignments
    );
    let mut binds: Vec<&dyn rusqlite::ToSql> = sets
        .iter()
        .map(|(_, v)| v as &dyn rusqlite::ToSql)
        .collect();
    binds.push(&student_id);
    conn.execute(&sql, rusqlite::params_from_iter(binds))
        .map_err(|e| HandlerErr::update("students", e))?;

    Ok(json!({ "ok": true }))
}

fn get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = req_str(params, "studentId")?;
    let row = conn
        .query_row(
            &format!("SELECT {} FROM students WHERE id = ?", SELECT_COLUMNS),
            [&student_id],
            |r| row_to_json(r),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some(student) = row else {
        return Err(HandlerErr::not_found("student not found"));
    };
    Ok(json!({ "student": student }))
}

fn delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = req_str(params, "studentId")?;
    let affected = conn
        .execute("DELETE FROM students WHERE id = ?", [&student_id])
        .map_err(|e| HandlerErr::delete("students", e))?;
    if affected == 0 {
        return Err(HandlerErr::not_found("student not found"));
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "students.list" => require_db(state).and_then(|conn| list(conn)),
        "students.get" => require_db(state).and_then(|conn| get(conn, &req.params)),
        "students.create" => require_db(state).and_then(|conn| create(conn, &req.params)),
        "students.update" => require_db(state).and_then(|conn| update(conn, &req.params)),
        "students.delete" => require_db(state).and_then(|conn| delete(conn, &req.params)),
        _ => return None,
    };
    Some(match out {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    })
}

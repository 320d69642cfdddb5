use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{opt_str, patch_text, req_str, require_db};
use crate::ipc::types::{AppState, Request};

fn list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    // studentCount is derived by string equality with students.class_name;
    // there is no foreign key between the two tables.
    let mut stmt = conn
        .prepare(
            "SELECT
               c.id,
               c.name,
               c.teacher,
               c.academic_year,
               c.capacity,
               c.description,
               (SELECT COUNT(*) FROM students s
                WHERE s.class_name = c.name AND s.status = 'active') AS student_count
             FROM classes c
             ORDER BY c.name",
        )
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "teacher": r.get::<_, String>(2)?,
                "academicYear": r.get::<_, Option<String>>(3)?,
                "capacity": r.get::<_, Option<i64>>(4)?,
                "description": r.get::<_, Option<String>>(5)?,
                "studentCount": r.get::<_, i64>(6)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "classes": rows }))
}

fn create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = req_str(params, "name")?;
    let teacher = req_str(params, "teacher")?;
    let academic_year = opt_str(params, "academicYear");
    let capacity = match params.get("capacity") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => {
            let n = v
                .as_i64()
                .ok_or_else(|| HandlerErr::validation("capacity", "capacity must be a whole number"))?;
            if n <= 0 {
                return Err(HandlerErr::validation(
                    "capacity",
                    "capacity must be greater than zero",
                ));
            }
            Some(n)
        }
    };
    let description = opt_str(params, "description");

    let class_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, name, teacher, academic_year, capacity, description,
                             created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?,
                strftime('%Y-%m-%dT%H:%M:%SZ','now'),
                strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &class_id,
            &name,
            &teacher,
            academic_year.as_deref(),
            capacity,
            description.as_deref(),
        ),
    )
    .map_err(|e| HandlerErr::insert("classes", e))?;

    Ok(json!({ "classId": class_id, "name": name }))
}

fn update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = req_str(params, "classId")?;
    let patch = params.get("patch").cloned().unwrap_or(json!({}));

    let existing = conn
        .query_row(
            "SELECT name, teacher, academic_year, capacity, description
             FROM classes WHERE id = ?",
            [&class_id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Option<String>>(2)?,
                    r.get::<_, Option<i64>>(3)?,
                    r.get::<_, Option<String>>(4)?,
                ))
            },
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some((old_name, old_teacher, old_year, old_capacity, old_description)) = existing else {
        return Err(HandlerErr::not_found("class not found"));
    };

    let name = opt_str(&patch, "name").unwrap_or(old_name);
    let teacher = opt_str(&patch, "teacher").unwrap_or(old_teacher);
    let academic_year = patch_text(&patch, "academicYear", old_year);
    let capacity = match patch.get("capacity") {
        None => old_capacity,
        Some(v) if v.is_null() => None,
        Some(v) => {
            let n = v
                .as_i64()
                .ok_or_else(|| HandlerErr::validation("capacity", "capacity must be a whole number"))?;
            if n <= 0 {
                return Err(HandlerErr::validation(
                    "capacity",
                    "capacity must be greater than zero",
                ));
            }
            Some(n)
        }
    };
    let description = patch_text(&patch, "description", old_description);

    conn.execute(
        "UPDATE classes
         SET name = ?, teacher = ?, academic_year = ?, capacity = ?, description = ?,
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
         WHERE id = ?",
        (
            &name,
            &teacher,
            academic_year.as_deref(),
            capacity,
            description.as_deref(),
            &class_id,
        ),
    )
    .map_err(|e| HandlerErr::update("classes", e))?;

    Ok(json!({ "ok": true }))
}

fn delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = req_str(params, "classId")?;
    // Hard delete, no cascade: students referencing the class by name keep
    // their class string.
    let affected = conn
        .execute("DELETE FROM classes WHERE id = ?", [&class_id])
        .map_err(|e| HandlerErr::delete("classes", e))?;
    if affected == 0 {
        return Err(HandlerErr::not_found("class not found"));
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "classes.list" => require_db(state).and_then(|conn| list(conn)),
        "classes.create" => require_db(state).and_then(|conn| create(conn, &req.params)),
        "classes.update" => require_db(state).and_then(|conn| update(conn, &req.params)),
        "classes.delete" => require_db(state).and_then(|conn| delete(conn, &req.params)),
        _ => return None,
    };
    Some(match out {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    })
}

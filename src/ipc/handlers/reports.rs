use rusqlite::Connection;
use serde_json::json;

use crate::finance;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{req_str, require_db};
use crate::ipc::types::{AppState, Request};

fn sum_by_status(conn: &Connection, table: &str) -> Result<(i64, i64, i64), HandlerErr> {
    conn.query_row(
        &format!(
            "SELECT
               COALESCE(SUM(CASE WHEN status = 'verified' THEN amount END), 0),
               COALESCE(SUM(CASE WHEN status = 'pending' THEN amount END), 0),
               COALESCE(SUM(CASE WHEN status = 'rejected' THEN amount END), 0)
             FROM {}",
            table
        ),
        [],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )
    .map_err(HandlerErr::query)
}

fn summary(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let (income_verified, income_pending, income_rejected) = sum_by_status(conn, "incomes")?;
    let (expense_verified, expense_pending, expense_rejected) = sum_by_status(conn, "expenses")?;
    Ok(json!({
        "income": {
            "verified": income_verified,
            "pending": income_pending,
            "rejected": income_rejected,
        },
        "expense": {
            "verified": expense_verified,
            "pending": expense_pending,
            "rejected": expense_rejected,
        },
        // Only verified entries count toward the balance.
        "balance": income_verified - expense_verified,
    }))
}

fn monthly(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year = params
        .get("year")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params("missing year"))? as i32;

    let mut income = [0i64; 12];
    let mut expense = [0i64; 12];
    for (table, buckets) in [("incomes", &mut income), ("expenses", &mut expense)] {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT date, amount FROM {} WHERE status = 'verified'",
                table
            ))
            .map_err(HandlerErr::query)?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(HandlerErr::query)?;
        for (date, amount) in rows {
            if let Some(month) = finance::month_bucket(&date, year) {
                buckets[(month - 1) as usize] += amount;
            }
        }
    }

    let months: Vec<serde_json::Value> = (0..12)
        .map(|i| {
            json!({
                "month": i + 1,
                "income": income[i],
                "expense": expense[i],
            })
        })
        .collect();
    Ok(json!({ "year": year, "months": months }))
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn export_csv(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let out = req_str(params, "outPath")?;

    let mut csv = String::from("kind,date,category,amount,status,notes\n");
    let mut row_count = 0usize;
    for (table, kind) in [("incomes", "income"), ("expenses", "expense")] {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT date, category, amount, status, notes FROM {} ORDER BY date, id",
                table
            ))
            .map_err(HandlerErr::query)?;
        let rows = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, i64>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, Option<String>>(4)?,
                ))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(HandlerErr::query)?;
        for (date, category, amount, status, notes) in rows {
            csv.push_str(&format!(
                "{},{},{},{},{},{}\n",
                kind,
                csv_quote(&date),
                csv_quote(&category),
                amount,
                csv_quote(&status),
                csv_quote(notes.as_deref().unwrap_or("")),
            ));
            row_count += 1;
        }
    }

    if let Err(e) = std::fs::write(&out, csv) {
        return Err(HandlerErr::new("io_failed", e.to_string()));
    }
    Ok(json!({ "outPath": out, "rowCount": row_count }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "reports.summary" => require_db(state).and_then(|conn| summary(conn)),
        "reports.monthly" => require_db(state).and_then(|conn| monthly(conn, &req.params)),
        "reports.exportCsv" => require_db(state).and_then(|conn| export_csv(conn, &req.params)),
        _ => return None,
    };
    Some(match out {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    })
}

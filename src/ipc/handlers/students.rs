use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{compare_optional, db_conn, opt_str, paginate, parse_list_query, required_str};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const STUDENT_STATUSES: [&str; 4] = ["active", "inactive", "graduated", "suspended"];
const SORT_FIELDS: [&str; 6] = [
    "student_no",
    "name",
    "email",
    "program",
    "status",
    "enrollment_date",
];

#[derive(Debug, Clone)]
struct StudentRecord {
    id: String,
    student_no: String,
    first_name: String,
    last_name: String,
    email: String,
    date_of_birth: Option<String>,
    enrollment_date: Option<String>,
    program: Option<String>,
    status: String,
    contact_number: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

fn student_json(s: &StudentRecord) -> serde_json::Value {
    json!({
        "id": s.id,
        "student_no": s.student_no,
        "first_name": s.first_name,
        "last_name": s.last_name,
        "email": s.email,
        "date_of_birth": s.date_of_birth,
        "enrollment_date": s.enrollment_date,
        "program": s.program,
        "status": s.status,
        "contact_number": s.contact_number,
        "created_at": s.created_at,
        "updated_at": s.updated_at,
    })
}

const STUDENT_COLUMNS: &str = "id, student_no, first_name, last_name, email, date_of_birth,
     enrollment_date, program, status, contact_number, created_at, updated_at";

fn row_to_student(row: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRecord> {
    Ok(StudentRecord {
        id: row.get(0)?,
        student_no: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        email: row.get(4)?,
        date_of_birth: row.get(5)?,
        enrollment_date: row.get(6)?,
        program: row.get(7)?,
        status: row.get(8)?,
        contact_number: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn load_student(conn: &Connection, id: &str) -> rusqlite::Result<Option<StudentRecord>> {
    conn.query_row(
        &format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS),
        [id],
        row_to_student,
    )
    .optional()
}

fn validate_status(req: &Request, status: &str) -> Result<(), serde_json::Value> {
    if STUDENT_STATUSES.iter().any(|s| *s == status) {
        Ok(())
    } else {
        Err(err(
            &req.id,
            "bad_params",
            format!("status must be one of: {}", STUDENT_STATUSES.join(", ")),
            Some(json!({ "status": status })),
        ))
    }
}

fn validate_date(req: &Request, key: &str, value: &str) -> Result<(), serde_json::Value> {
    match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(_) => Ok(()),
        Err(_) => Err(err(
            &req.id,
            "bad_params",
            format!("{} must be a YYYY-MM-DD date", key),
            Some(json!({ key: value })),
        )),
    }
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let query = match parse_list_query(req, &SORT_FIELDS, "student_no") {
        Ok(q) => q,
        Err(resp) => return resp,
    };
    let status_filter = match opt_str(req, "status") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Some(status) = status_filter.as_deref() {
        if let Err(resp) = validate_status(req, status) {
            return resp;
        }
    }

    let mut stmt = match conn.prepare(&format!(
        "SELECT {} FROM students ORDER BY student_no",
        STUDENT_COLUMNS
    )) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], row_to_student)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let mut students = match rows {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    if let Some(search) = query.search.as_deref() {
        students.retain(|s| {
            s.student_no.to_ascii_lowercase().contains(search)
                || s.first_name.to_ascii_lowercase().contains(search)
                || s.last_name.to_ascii_lowercase().contains(search)
                || s.email.to_ascii_lowercase().contains(search)
                || s.program
                    .as_deref()
                    .map(|p| p.to_ascii_lowercase().contains(search))
                    .unwrap_or(false)
        });
    }
    if let Some(status) = status_filter.as_deref() {
        students.retain(|s| s.status == status);
    }

    let descending = query.sort_dir == "desc";
    students.sort_by(|a, b| {
        let ord = match query.sort_by.as_str() {
            "name" => {
                let an = format!("{}, {}", a.last_name, a.first_name);
                let bn = format!("{}, {}", b.last_name, b.first_name);
                compare_optional(Some(&an), Some(&bn), descending)
            }
            "email" => compare_optional(Some(&a.email), Some(&b.email), descending),
            "program" => compare_optional(a.program.as_deref(), b.program.as_deref(), descending),
            "status" => compare_optional(Some(&a.status), Some(&b.status), descending),
            "enrollment_date" => compare_optional(
                a.enrollment_date.as_deref(),
                b.enrollment_date.as_deref(),
                descending,
            ),
            _ => compare_optional(Some(&a.student_no), Some(&b.student_no), descending),
        };
        ord.then_with(|| a.student_no.cmp(&b.student_no))
    });

    let total = students.len();
    let paged = paginate(&students, query.page, query.page_size);
    ok(
        &req.id,
        json!({
            "students": paged.iter().map(student_json).collect::<Vec<_>>(),
            "total": total,
            "page": query.page,
            "page_size": query.page_size,
        }),
    )
}

fn handle_students_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "student_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match load_student(conn, &student_id) {
        Ok(Some(s)) => ok(&req.id, json!({ "student": student_json(&s) })),
        Ok(None) => err(&req.id, "not_found", "student not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let student_no = match required_str(req, "student_no") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let first_name = match required_str(req, "first_name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let last_name = match required_str(req, "last_name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let email = match required_str(req, "email") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let status = match required_str(req, "status") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(resp) = validate_status(req, &status) {
        return resp;
    }
    let program = match opt_str(req, "program") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let contact_number = match opt_str(req, "contact_number") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let date_of_birth = match opt_str(req, "date_of_birth") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Some(d) = date_of_birth.as_deref() {
        if let Err(resp) = validate_date(req, "date_of_birth", d) {
            return resp;
        }
    }
    let enrollment_date = match opt_str(req, "enrollment_date") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Some(d) = enrollment_date.as_deref() {
        if let Err(resp) = validate_date(req, "enrollment_date", d) {
            return resp;
        }
    }

    let taken: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM students WHERE student_no = ?",
            [&student_no],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if taken.is_some() {
        return err(
            &req.id,
            "conflict",
            "student_no already in use",
            Some(json!({ "student_no": student_no })),
        );
    }

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO students(
            id, student_no, first_name, last_name, email, date_of_birth,
            enrollment_date, program, status, contact_number, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
            strftime('%Y-%m-%dT%H:%M:%SZ','now'), strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        rusqlite::params![
            id,
            student_no,
            first_name,
            last_name,
            email,
            date_of_birth,
            enrollment_date,
            program,
            status,
            contact_number,
        ],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    match load_student(conn, &id) {
        Ok(Some(s)) => ok(&req.id, json!({ "student": student_json(&s) })),
        Ok(None) => err(&req.id, "db_query_failed", "inserted row missing", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "student_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let existing = match load_student(conn, &student_id) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut set_parts: Vec<String> = Vec::new();
    let mut values: Vec<rusqlite::types::Value> = Vec::new();

    // Required fields may be replaced, never cleared.
    for key in ["student_no", "first_name", "last_name", "email", "status"] {
        if req.params.get(key).is_none() {
            continue;
        }
        let value = match required_str(req, key) {
            Ok(v) => v,
            Err(resp) => return resp,
        };
        if key == "status" {
            if let Err(resp) = validate_status(req, &value) {
                return resp;
            }
        }
        if key == "student_no" && value != existing.student_no {
            let taken: Option<i64> = match conn
                .query_row(
                    "SELECT 1 FROM students WHERE student_no = ? AND id != ?",
                    [&value, &student_id],
                    |r| r.get(0),
                )
                .optional()
            {
                Ok(v) => v,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            };
            if taken.is_some() {
                return err(
                    &req.id,
                    "conflict",
                    "student_no already in use",
                    Some(json!({ "student_no": value })),
                );
            }
        }
        set_parts.push(format!("{} = ?", key));
        values.push(rusqlite::types::Value::Text(value));
    }

    // Optional fields accept null to clear.
    for key in [
        "program",
        "contact_number",
        "date_of_birth",
        "enrollment_date",
    ] {
        if req.params.get(key).is_none() {
            continue;
        }
        let value = match opt_str(req, key) {
            Ok(v) => v,
            Err(resp) => return resp,
        };
        if matches!(key, "date_of_birth" | "enrollment_date") {
            if let Some(d) = value.as_deref() {
                if let Err(resp) = validate_date(req, key, d) {
                    return resp;
                }
            }
        }
        set_parts.push(format!("{} = ?", key));
        values.push(match value {
            Some(v) => rusqlite::types::Value::Text(v),
            None => rusqlite::types::Value::Null,
        });
    }

    if set_parts.is_empty() {
        return err(&req.id, "bad_params", "no fields to update", None);
    }

    set_parts.push("updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')".into());
    let sql = format!(
        "UPDATE students SET {} WHERE id = ?",
        set_parts.join(", ")
    );
    values.push(rusqlite::types::Value::Text(student_id.clone()));

    if let Err(e) = conn.execute(&sql, rusqlite::params_from_iter(values)) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    match load_student(conn, &student_id) {
        Ok(Some(s)) => ok(&req.id, json!({ "student": student_json(&s) })),
        Ok(None) => err(&req.id, "not_found", "student not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "student_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [&student_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Grade rows reference the student; delete them first (no ON DELETE CASCADE).
    if let Err(e) = tx.execute("DELETE FROM grades WHERE student_id = ?", [&student_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "grades" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM students WHERE id = ?", [&student_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}

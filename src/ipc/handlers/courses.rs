use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{compare_optional, db_conn, opt_str, paginate, parse_list_query, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const COURSE_STATUSES: [&str; 3] = ["active", "inactive", "completed"];
const SORT_FIELDS: [&str; 6] = ["code", "name", "credits", "semester", "instructor", "status"];

#[derive(Debug, Clone)]
struct CourseRecord {
    id: String,
    code: String,
    name: String,
    description: Option<String>,
    credits: i64,
    instructor: Option<String>,
    semester: String,
    capacity: Option<i64>,
    status: String,
    enrolled_count: i64,
    created_at: Option<String>,
    updated_at: Option<String>,
}

fn course_json(c: &CourseRecord) -> serde_json::Value {
    json!({
        "id": c.id,
        "code": c.code,
        "name": c.name,
        "description": c.description,
        "credits": c.credits,
        "instructor": c.instructor,
        "semester": c.semester,
        "capacity": c.capacity,
        "status": c.status,
        "enrolled_count": c.enrolled_count,
        "created_at": c.created_at,
        "updated_at": c.updated_at,
    })
}

// Correlated subquery keeps the enrollment count join-free.
const COURSE_COLUMNS: &str = "c.id, c.code, c.name, c.description, c.credits, c.instructor,
     c.semester, c.capacity, c.status,
     (SELECT COUNT(*) FROM grades g WHERE g.course_id = c.id) AS enrolled_count,
     c.created_at, c.updated_at";

fn row_to_course(row: &rusqlite::Row<'_>) -> rusqlite::Result<CourseRecord> {
    Ok(CourseRecord {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        credits: row.get(4)?,
        instructor: row.get(5)?,
        semester: row.get(6)?,
        capacity: row.get(7)?,
        status: row.get(8)?,
        enrolled_count: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn load_course(conn: &Connection, id: &str) -> rusqlite::Result<Option<CourseRecord>> {
    conn.query_row(
        &format!("SELECT {} FROM courses c WHERE c.id = ?", COURSE_COLUMNS),
        [id],
        row_to_course,
    )
    .optional()
}

fn validate_status(req: &Request, status: &str) -> Result<(), serde_json::Value> {
    if COURSE_STATUSES.iter().any(|s| *s == status) {
        Ok(())
    } else {
        Err(err(
            &req.id,
            "bad_params",
            format!("status must be one of: {}", COURSE_STATUSES.join(", ")),
            Some(json!({ "status": status })),
        ))
    }
}

fn parse_credits(req: &Request) -> Result<i64, serde_json::Value> {
    match req.params.get("credits").and_then(|v| v.as_i64()) {
        Some(c) if c >= 1 => Ok(c),
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            "credits must be a positive integer",
            None,
        )),
        None => Err(err(&req.id, "bad_params", "missing credits", None)),
    }
}

fn handle_courses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let query = match parse_list_query(req, &SORT_FIELDS, "code") {
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
    let semester_filter = match opt_str(req, "semester") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let mut stmt = match conn.prepare(&format!(
        "SELECT {} FROM courses c ORDER BY c.code",
        COURSE_COLUMNS
    )) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], row_to_course)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let mut courses = match rows {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    if let Some(search) = query.search.as_deref() {
        courses.retain(|c| {
            c.code.to_ascii_lowercase().contains(search)
                || c.name.to_ascii_lowercase().contains(search)
                || c.instructor
                    .as_deref()
                    .map(|i| i.to_ascii_lowercase().contains(search))
                    .unwrap_or(false)
        });
    }
    if let Some(status) = status_filter.as_deref() {
        courses.retain(|c| c.status == status);
    }
    if let Some(semester) = semester_filter.as_deref() {
        courses.retain(|c| c.semester == semester);
    }

    let descending = query.sort_dir == "desc";
    courses.sort_by(|a, b| {
        let ord = match query.sort_by.as_str() {
            "name" => compare_optional(Some(&a.name), Some(&b.name), descending),
            "credits" => {
                let ord = a.credits.cmp(&b.credits);
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            }
            "semester" => compare_optional(Some(&a.semester), Some(&b.semester), descending),
            "instructor" => {
                compare_optional(a.instructor.as_deref(), b.instructor.as_deref(), descending)
            }
            "status" => compare_optional(Some(&a.status), Some(&b.status), descending),
            _ => compare_optional(Some(&a.code), Some(&b.code), descending),
        };
        ord.then_with(|| a.code.cmp(&b.code))
    });

    let total = courses.len();
    let paged = paginate(&courses, query.page, query.page_size);
    ok(
        &req.id,
        json!({
            "courses": paged.iter().map(course_json).collect::<Vec<_>>(),
            "total": total,
            "page": query.page,
            "page_size": query.page_size,
        }),
    )
}

fn handle_courses_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let course_id = match required_str(req, "course_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match load_course(conn, &course_id) {
        Ok(Some(c)) => ok(&req.id, json!({ "course": course_json(&c) })),
        Ok(None) => err(&req.id, "not_found", "course not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_courses_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let code = match required_str(req, "code") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let semester = match required_str(req, "semester") {
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
    let credits = match parse_credits(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let description = match opt_str(req, "description") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let instructor = match opt_str(req, "instructor") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let capacity = match req.params.get("capacity") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => match v.as_i64() {
            Some(c) if c >= 0 => Some(c),
            _ => {
                return err(
                    &req.id,
                    "bad_params",
                    "capacity must be a non-negative integer",
                    None,
                )
            }
        },
    };

    let taken: Option<i64> = match conn
        .query_row("SELECT 1 FROM courses WHERE code = ?", [&code], |r| r.get(0))
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if taken.is_some() {
        return err(
            &req.id,
            "conflict",
            "course code already in use",
            Some(json!({ "code": code })),
        );
    }

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO courses(
            id, code, name, description, credits, instructor, semester,
            capacity, status, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?,
            strftime('%Y-%m-%dT%H:%M:%SZ','now'), strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        rusqlite::params![
            id, code, name, description, credits, instructor, semester, capacity, status,
        ],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "courses" })),
        );
    }

    match load_course(conn, &id) {
        Ok(Some(c)) => ok(&req.id, json!({ "course": course_json(&c) })),
        Ok(None) => err(&req.id, "db_query_failed", "inserted row missing", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_courses_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let course_id = match required_str(req, "course_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let existing = match load_course(conn, &course_id) {
        Ok(Some(c)) => c,
        Ok(None) => return err(&req.id, "not_found", "course not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut set_parts: Vec<String> = Vec::new();
    let mut values: Vec<rusqlite::types::Value> = Vec::new();

    for key in ["code", "name", "semester", "status"] {
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
        if key == "code" && value != existing.code {
            let taken: Option<i64> = match conn
                .query_row(
                    "SELECT 1 FROM courses WHERE code = ? AND id != ?",
                    [&value, &course_id],
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
                    "course code already in use",
                    Some(json!({ "code": value })),
                );
            }
        }
        set_parts.push(format!("{} = ?", key));
        values.push(rusqlite::types::Value::Text(value));
    }

    if req.params.get("credits").is_some() {
        let credits = match parse_credits(req) {
            Ok(v) => v,
            Err(resp) => return resp,
        };
        set_parts.push("credits = ?".into());
        values.push(rusqlite::types::Value::Integer(credits));
    }
    if req.params.get("capacity").is_some() {
        let capacity = match req.params.get("capacity") {
            Some(v) if v.is_null() => None,
            Some(v) => match v.as_i64() {
                Some(c) if c >= 0 => Some(c),
                _ => {
                    return err(
                        &req.id,
                        "bad_params",
                        "capacity must be a non-negative integer",
                        None,
                    )
                }
            },
            None => None,
        };
        set_parts.push("capacity = ?".into());
        values.push(match capacity {
            Some(c) => rusqlite::types::Value::Integer(c),
            None => rusqlite::types::Value::Null,
        });
    }
    for key in ["description", "instructor"] {
        if req.params.get(key).is_none() {
            continue;
        }
        let value = match opt_str(req, key) {
            Ok(v) => v,
            Err(resp) => return resp,
        };
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
    let sql = format!("UPDATE courses SET {} WHERE id = ?", set_parts.join(", "));
    values.push(rusqlite::types::Value::Text(course_id.clone()));

    if let Err(e) = conn.execute(&sql, rusqlite::params_from_iter(values)) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "courses" })),
        );
    }

    match load_course(conn, &course_id) {
        Ok(Some(c)) => ok(&req.id, json!({ "course": course_json(&c) })),
        Ok(None) => err(&req.id, "not_found", "course not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_courses_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let course_id = match required_str(req, "course_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM courses WHERE id = ?", [&course_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "course not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    if let Err(e) = tx.execute("DELETE FROM grades WHERE course_id = ?", [&course_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "grades" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM courses WHERE id = ?", [&course_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "courses" })),
        );
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.list" => Some(handle_courses_list(state, req)),
        "courses.get" => Some(handle_courses_get(state, req)),
        "courses.create" => Some(handle_courses_create(state, req)),
        "courses.update" => Some(handle_courses_update(state, req)),
        "courses.delete" => Some(handle_courses_delete(state, req)),
        _ => None,
    }
}

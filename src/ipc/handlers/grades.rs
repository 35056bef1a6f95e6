use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, opt_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::stats::{grade_points_for_letter, letter_grade_from_score};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct GradeRecord {
    id: String,
    score: Option<f64>,
    semester: Option<String>,
    submission_date: Option<String>,
    comments: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
    student_id: String,
    student_no: String,
    student_first_name: String,
    student_last_name: String,
    student_email: String,
    course_id: String,
    course_code: String,
    course_name: String,
    course_semester: String,
}

const GRADE_SELECT: &str = "SELECT
       g.id, g.score, g.semester, g.submission_date, g.comments, g.created_at, g.updated_at,
       s.id, s.student_no, s.first_name, s.last_name, s.email,
       c.id, c.code, c.name, c.semester
     FROM grades g
     JOIN students s ON s.id = g.student_id
     JOIN courses c ON c.id = g.course_id";

fn row_to_grade(row: &rusqlite::Row<'_>) -> rusqlite::Result<GradeRecord> {
    Ok(GradeRecord {
        id: row.get(0)?,
        score: row.get(1)?,
        semester: row.get(2)?,
        submission_date: row.get(3)?,
        comments: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        student_id: row.get(7)?,
        student_no: row.get(8)?,
        student_first_name: row.get(9)?,
        student_last_name: row.get(10)?,
        student_email: row.get(11)?,
        course_id: row.get(12)?,
        course_code: row.get(13)?,
        course_name: row.get(14)?,
        course_semester: row.get(15)?,
    })
}

fn grade_json(g: &GradeRecord) -> serde_json::Value {
    // Display letter comes from the fine plus/minus table, never the coarse
    // dashboard map.
    let letter = g.score.map(letter_grade_from_score);
    json!({
        "id": g.id,
        "student_id": g.student_id,
        "course_id": g.course_id,
        "score": g.score,
        "letter": letter,
        "semester": g.semester,
        "submission_date": g.submission_date,
        "comments": g.comments,
        "created_at": g.created_at,
        "updated_at": g.updated_at,
        "student": {
            "id": g.student_id,
            "student_no": g.student_no,
            "first_name": g.student_first_name,
            "last_name": g.student_last_name,
            "email": g.student_email,
        },
        "course": {
            "id": g.course_id,
            "code": g.course_code,
            "name": g.course_name,
            "semester": g.course_semester,
        },
    })
}

fn load_grade(conn: &Connection, id: &str) -> rusqlite::Result<Option<GradeRecord>> {
    conn.query_row(&format!("{} WHERE g.id = ?", GRADE_SELECT), [id], row_to_grade)
        .optional()
}

fn parse_score(req: &Request) -> Result<Option<f64>, serde_json::Value> {
    match req.params.get("score") {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => match v.as_f64() {
            Some(s) if (0.0..=100.0).contains(&s) => Ok(Some(s)),
            _ => Err(err(
                &req.id,
                "bad_params",
                "score must be a number in 0..=100 or null",
                None,
            )),
        },
    }
}

fn handle_grades_list_by_course(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let course_id = match required_str(req, "course_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let semester = match opt_str(req, "semester") {
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

    let mut stmt = match conn.prepare(&format!(
        "{} WHERE g.course_id = ? ORDER BY s.student_no",
        GRADE_SELECT
    )) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&course_id], row_to_grade)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let mut grades = match rows {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Some(semester) = semester.as_deref() {
        grades.retain(|g| g.semester.as_deref() == Some(semester));
    }

    ok(
        &req.id,
        json!({ "grades": grades.iter().map(grade_json).collect::<Vec<_>>() }),
    )
}

fn handle_grades_list_by_student(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let mut stmt = match conn.prepare(&format!(
        "{} WHERE g.student_id = ? ORDER BY c.code",
        GRADE_SELECT
    )) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&student_id], row_to_grade)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let grades = match rows {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // Profile-screen GPA: plain mean of letter points over graded rows.
    // Separate figure from the credit-weighted dashboard GPA.
    let mut total_points = 0.0;
    let mut graded = 0usize;
    for g in &grades {
        if let Some(score) = g.score {
            total_points += grade_points_for_letter(letter_grade_from_score(score));
            graded += 1;
        }
    }
    let gpa = if graded > 0 {
        (total_points / graded as f64 * 100.0).round() / 100.0
    } else {
        0.0
    };

    ok(
        &req.id,
        json!({
            "grades": grades.iter().map(grade_json).collect::<Vec<_>>(),
            "gpa": gpa,
        }),
    )
}

fn handle_grades_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "student_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let course_id = match required_str(req, "course_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let score = match parse_score(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let comments = match opt_str(req, "comments") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let submission_date = match opt_str(req, "submission_date") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let student_exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [&student_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if student_exists.is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }

    let course_semester: Option<String> = match conn
        .query_row(
            "SELECT semester FROM courses WHERE id = ?",
            [&course_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(course_semester) = course_semester else {
        return err(&req.id, "not_found", "course not found", None);
    };

    let semester = match opt_str(req, "semester") {
        Ok(v) => v.unwrap_or(course_semester),
        Err(resp) => return resp,
    };

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO grades(
            id, student_id, course_id, score, semester, submission_date, comments,
            created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?,
            COALESCE(?, strftime('%Y-%m-%dT%H:%M:%SZ','now')), ?,
            strftime('%Y-%m-%dT%H:%M:%SZ','now'), strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        rusqlite::params![id, student_id, course_id, score, semester, submission_date, comments],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "grades" })),
        );
    }

    match load_grade(conn, &id) {
        Ok(Some(g)) => ok(&req.id, json!({ "grade": grade_json(&g) })),
        Ok(None) => err(&req.id, "db_query_failed", "inserted row missing", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_grades_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let grade_id = match required_str(req, "grade_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let exists = match load_grade(conn, &grade_id) {
        Ok(Some(_)) => true,
        Ok(None) => false,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if !exists {
        return err(&req.id, "not_found", "grade not found", None);
    }

    let mut set_parts: Vec<String> = Vec::new();
    let mut values: Vec<rusqlite::types::Value> = Vec::new();

    if req.params.get("score").is_some() {
        let score = match parse_score(req) {
            Ok(v) => v,
            Err(resp) => return resp,
        };
        set_parts.push("score = ?".into());
        values.push(match score {
            Some(s) => rusqlite::types::Value::Real(s),
            None => rusqlite::types::Value::Null,
        });
    }
    for key in ["semester", "comments", "submission_date"] {
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
    let sql = format!("UPDATE grades SET {} WHERE id = ?", set_parts.join(", "));
    values.push(rusqlite::types::Value::Text(grade_id.clone()));

    if let Err(e) = conn.execute(&sql, rusqlite::params_from_iter(values)) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "grades" })),
        );
    }

    match load_grade(conn, &grade_id) {
        Ok(Some(g)) => ok(&req.id, json!({ "grade": grade_json(&g) })),
        Ok(None) => err(&req.id, "not_found", "grade not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_grades_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let grade_id = match required_str(req, "grade_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let affected = match conn.execute("DELETE FROM grades WHERE id = ?", [&grade_id]) {
        Ok(n) => n,
        Err(e) => {
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "grades" })),
            )
        }
    };
    if affected == 0 {
        return err(&req.id, "not_found", "grade not found", None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.list_by_course" => Some(handle_grades_list_by_course(state, req)),
        "grades.list_by_student" => Some(handle_grades_list_by_student(state, req)),
        "grades.create" => Some(handle_grades_create(state, req)),
        "grades.update" => Some(handle_grades_update(state, req)),
        "grades.delete" => Some(handle_grades_delete(state, req)),
        _ => None,
    }
}

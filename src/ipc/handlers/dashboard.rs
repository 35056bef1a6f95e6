use crate::ipc::error::{err, ok};
use crate::ipc::helpers::db_conn;
use crate::ipc::types::{AppState, Request};
use crate::stats;
use rusqlite::Connection;
use serde_json::json;

fn load_students(conn: &Connection) -> rusqlite::Result<Vec<stats::StudentRow>> {
    let mut stmt = conn.prepare("SELECT status, program FROM students ORDER BY rowid")?;
    let rows = stmt.query_map([], |r| {
        Ok(stats::StudentRow {
            status: r.get(0)?,
            program: r.get(1)?,
        })
    })?;
    rows.collect()
}

fn load_courses(conn: &Connection) -> rusqlite::Result<Vec<stats::CourseRow>> {
    let mut stmt = conn.prepare("SELECT id, credits FROM courses ORDER BY rowid")?;
    let rows = stmt.query_map([], |r| {
        Ok(stats::CourseRow {
            id: r.get(0)?,
            credits: r.get(1)?,
        })
    })?;
    rows.collect()
}

fn load_grades(conn: &Connection) -> rusqlite::Result<Vec<stats::GradeRow>> {
    // LEFT JOIN: a grade whose student row is gone still flows through and is
    // excluded by the aggregator, not by the query.
    let mut stmt = conn.prepare(
        "SELECT g.course_id, g.score, s.student_no
         FROM grades g
         LEFT JOIN students s ON s.id = g.student_id
         ORDER BY g.rowid",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok(stats::GradeRow {
            course_id: r.get(0)?,
            score: r.get(1)?,
            student_no: r.get(2)?,
        })
    })?;
    rows.collect()
}

fn handle_dashboard_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    // Fresh snapshots on every call; the aggregation itself is pure.
    let students = match load_students(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let courses = match load_courses(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let grades = match load_grades(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let summary = stats::dashboard_stats(&students, &courses, &grades);
    ok(&req.id, json!(summary))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.stats" => Some(handle_dashboard_stats(state, req)),
        _ => None,
    }
}

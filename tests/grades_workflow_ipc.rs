
use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{request_err, request_ok, spawn_sidecar, temp_dir};

struct Fixture {
    student_id: String,
    course_id: String,
}

fn seed(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, workspace: &str) -> Fixture {
    let _ = request_ok(
        stdin,
        reader,
        "seed-1",
        "workspace.select",
        json!({ "path": workspace }),
    );
    let student = request_ok(
        stdin,
        reader,
        "seed-2",
        "students.create",
        json!({
            "student_no": "S-5001",
            "first_name": "Alan",
            "last_name": "Turing",
            "email": "alan@example.edu",
            "status": "active",
        }),
    );
    let course = request_ok(
        stdin,
        reader,
        "seed-3",
        "courses.create",
        json!({
            "code": "CS301",
            "name": "Computability",
            "credits": 3,
            "semester": "2025F",
            "status": "active",
        }),
    );
    Fixture {
        student_id: student
            .get("student")
            .and_then(|s| s.get("id"))
            .and_then(|v| v.as_str())
            .expect("student id")
            .to_string(),
        course_id: course
            .get("course")
            .and_then(|c| c.get("id"))
            .and_then(|v| v.as_str())
            .expect("course id")
            .to_string(),
    }
}

#[test]
fn grade_entry_defaults_and_embedded_records() {
    let workspace = temp_dir("registrar-grades-entry");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed(&mut stdin, &mut reader, &workspace.to_string_lossy());

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grades.create",
        json!({
            "student_id": fx.student_id.clone(),
            "course_id": fx.course_id.clone(),
            "score": 91.0,
        }),
    );
    let grade = created.get("grade").expect("grade");
    // Semester falls back to the course's; submission date defaults to now.
    assert_eq!(grade.get("semester").and_then(|v| v.as_str()), Some("2025F"));
    assert!(grade.get("submission_date").and_then(|v| v.as_str()).is_some());
    // Display letter uses the fine plus/minus table.
    assert_eq!(grade.get("letter").and_then(|v| v.as_str()), Some("A-"));
    assert_eq!(
        grade
            .get("student")
            .and_then(|s| s.get("student_no"))
            .and_then(|v| v.as_str()),
        Some("S-5001")
    );
    assert_eq!(
        grade
            .get("course")
            .and_then(|c| c.get("code"))
            .and_then(|v| v.as_str()),
        Some("CS301")
    );
}

#[test]
fn ungraded_rows_have_no_letter_until_scored() {
    let workspace = temp_dir("registrar-grades-ungraded");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed(&mut stdin, &mut reader, &workspace.to_string_lossy());

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grades.create",
        json!({
            "student_id": fx.student_id.clone(),
            "course_id": fx.course_id.clone(),
        }),
    );
    let grade_id = created
        .get("grade")
        .and_then(|g| g.get("id"))
        .and_then(|v| v.as_str())
        .expect("grade id")
        .to_string();
    assert!(created
        .get("grade")
        .and_then(|g| g.get("letter"))
        .map(|v| v.is_null())
        .unwrap_or(false));

    // An ungraded enrollment must not move the dashboard GPA.
    let stats = request_ok(&mut stdin, &mut reader, "2", "dashboard.stats", json!({}));
    assert_eq!(stats.get("average_gpa").and_then(|v| v.as_f64()), Some(0.0));

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.update",
        json!({ "grade_id": grade_id, "score": 64.0, "comments": "late submission" }),
    );
    let grade = updated.get("grade").expect("grade");
    assert_eq!(grade.get("letter").and_then(|v| v.as_str()), Some("D"));
    assert_eq!(
        grade.get("comments").and_then(|v| v.as_str()),
        Some("late submission")
    );

    let stats = request_ok(&mut stdin, &mut reader, "4", "dashboard.stats", json!({}));
    assert_eq!(stats.get("average_gpa").and_then(|v| v.as_f64()), Some(1.0));
}

#[test]
fn profile_gpa_uses_letter_points_unweighted() {
    let workspace = temp_dir("registrar-grades-profile");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed(&mut stdin, &mut reader, &workspace.to_string_lossy());

    let second_course = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "courses.create",
        json!({
            "code": "CS302",
            "name": "Complexity",
            "credits": 1,
            "semester": "2025F",
            "status": "active",
        }),
    );
    let second_id = second_course
        .get("course")
        .and_then(|c| c.get("id"))
        .and_then(|v| v.as_str())
        .expect("course id")
        .to_string();

    // 95 -> A (4.0), 85 -> B (3.0); profile GPA ignores credits: (4.0+3.0)/2.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.create",
        json!({
            "student_id": fx.student_id.clone(),
            "course_id": fx.course_id.clone(),
            "score": 95.0,
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.create",
        json!({
            "student_id": fx.student_id.clone(),
            "course_id": second_id,
            "score": 85.0,
        }),
    );

    let listing = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "grades.list_by_student",
        json!({ "student_id": fx.student_id }),
    );
    assert_eq!(listing.get("gpa").and_then(|v| v.as_f64()), Some(3.5));
    assert_eq!(
        listing.get("grades").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(2)
    );

    // The dashboard figure is credit-weighted and uses the coarse map:
    // (4.0*3 + 3.0*1) / 4 = 3.75.
    let stats = request_ok(&mut stdin, &mut reader, "5", "dashboard.stats", json!({}));
    assert_eq!(stats.get("average_gpa").and_then(|v| v.as_f64()), Some(3.75));
}

#[test]
fn grade_references_must_resolve() {
    let workspace = temp_dir("registrar-grades-refs");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed(&mut stdin, &mut reader, &workspace.to_string_lossy());

    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "grades.create",
        json!({
            "student_id": fx.student_id.clone(),
            "course_id": "no-such-course",
            "score": 80.0,
        }),
    );
    assert_eq!(code, "not_found");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "grades.create",
        json!({
            "student_id": "no-such-student",
            "course_id": fx.course_id.clone(),
            "score": 80.0,
        }),
    );
    assert_eq!(code, "not_found");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "grades.create",
        json!({
            "student_id": fx.student_id,
            "course_id": fx.course_id,
            "score": 101.0,
        }),
    );
    assert_eq!(code, "bad_params");
}

#[test]
fn semester_filter_on_course_listing() {
    let workspace = temp_dir("registrar-grades-filter");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed(&mut stdin, &mut reader, &workspace.to_string_lossy());

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grades.create",
        json!({
            "student_id": fx.student_id.clone(),
            "course_id": fx.course_id.clone(),
            "score": 88.0,
            "semester": "2025F",
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.create",
        json!({
            "student_id": fx.student_id,
            "course_id": fx.course_id.clone(),
            "score": 72.0,
            "semester": "2026W",
        }),
    );

    let all = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.list_by_course",
        json!({ "course_id": fx.course_id.clone() }),
    );
    assert_eq!(
        all.get("grades").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(2)
    );

    let winter = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "grades.list_by_course",
        json!({ "course_id": fx.course_id, "semester": "2026W" }),
    );
    let rows = winter.get("grades").and_then(|v| v.as_array()).expect("grades");
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get("letter").and_then(|v| v.as_str()),
        Some("C-")
    );
}

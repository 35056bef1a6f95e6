
use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{request_err, request_ok, spawn_sidecar, temp_dir};

fn create_course(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    code: &str,
    credits: i64,
    semester: &str,
) -> String {
    let result = request_ok(
        stdin,
        reader,
        id,
        "courses.create",
        json!({
            "code": code,
            "name": format!("Course {}", code),
            "credits": credits,
            "semester": semester,
            "status": "active",
        }),
    );
    result
        .get("course")
        .and_then(|c| c.get("id"))
        .and_then(|v| v.as_str())
        .expect("course id")
        .to_string()
}

#[test]
fn create_update_delete_roundtrip() {
    let workspace = temp_dir("registrar-courses-crud");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let course_id = create_course(&mut stdin, &mut reader, "2", "MATH200", 4, "2025F");

    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "courses.get",
        json!({ "course_id": course_id.clone() }),
    );
    let record = fetched.get("course").expect("course");
    assert_eq!(record.get("credits").and_then(|v| v.as_i64()), Some(4));
    assert_eq!(record.get("enrolled_count").and_then(|v| v.as_i64()), Some(0));

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "courses.update",
        json!({
            "course_id": course_id.clone(),
            "credits": 3,
            "instructor": "Dr. Gauss",
            "status": "completed",
        }),
    );
    let record = updated.get("course").expect("course");
    assert_eq!(record.get("credits").and_then(|v| v.as_i64()), Some(3));
    assert_eq!(record.get("instructor").and_then(|v| v.as_str()), Some("Dr. Gauss"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "courses.delete",
        json!({ "course_id": course_id.clone() }),
    );
    let code = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "courses.get",
        json!({ "course_id": course_id }),
    );
    assert_eq!(code, "not_found");
}

#[test]
fn credits_must_be_positive_and_codes_unique() {
    let workspace = temp_dir("registrar-courses-validation");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "courses.create",
        json!({
            "code": "PHY100",
            "name": "Zero Credit",
            "credits": 0,
            "semester": "2025F",
            "status": "active",
        }),
    );
    assert_eq!(code, "bad_params");

    let _ = create_course(&mut stdin, &mut reader, "3", "PHY101", 3, "2025F");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "courses.create",
        json!({
            "code": "PHY101",
            "name": "Duplicate",
            "credits": 3,
            "semester": "2026W",
            "status": "active",
        }),
    );
    assert_eq!(code, "conflict");
}

#[test]
fn delete_cascades_to_grades_and_dashboard() {
    let workspace = temp_dir("registrar-courses-cascade");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let course_id = create_course(&mut stdin, &mut reader, "2", "CS200", 3, "2025F");
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({
            "student_no": "S-9001",
            "first_name": "Grace",
            "last_name": "Hopper",
            "email": "grace@example.edu",
            "status": "active",
        }),
    );
    let student_id = student
        .get("student")
        .and_then(|s| s.get("id"))
        .and_then(|v| v.as_str())
        .expect("student id")
        .to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "grades.create",
        json!({
            "student_id": student_id.clone(),
            "course_id": course_id.clone(),
            "score": 95.0,
        }),
    );

    let with_grade = request_ok(&mut stdin, &mut reader, "5", "dashboard.stats", json!({}));
    assert_eq!(with_grade.get("average_gpa").and_then(|v| v.as_f64()), Some(4.0));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "courses.get",
        json!({ "course_id": course_id.clone() }),
    );
    assert_eq!(
        listed
            .get("course")
            .and_then(|c| c.get("enrolled_count"))
            .and_then(|v| v.as_i64()),
        Some(1)
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "courses.delete",
        json!({ "course_id": course_id }),
    );

    let after = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "grades.list_by_student",
        json!({ "student_id": student_id }),
    );
    assert_eq!(
        after.get("grades").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );

    let stats = request_ok(&mut stdin, &mut reader, "9", "dashboard.stats", json!({}));
    assert_eq!(stats.get("average_gpa").and_then(|v| v.as_f64()), Some(0.0));
    assert_eq!(stats.get("total_students").and_then(|v| v.as_i64()), Some(1));
}

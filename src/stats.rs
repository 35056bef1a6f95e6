use serde::Serialize;
use std::collections::HashMap;

/// Student fields the dashboard aggregation reads. `program` of `None` or an
/// empty string means the student is not enrolled in a program.
#[derive(Debug, Clone)]
pub struct StudentRow {
    pub status: String,
    pub program: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CourseRow {
    pub id: String,
    pub credits: i64,
}

/// One grade row as fetched for aggregation. `student_no` is the student's
/// human-facing identifier carried on the grade's embedded student record,
/// not the internal row id; it is the accumulation key.
#[derive(Debug, Clone)]
pub struct GradeRow {
    pub course_id: String,
    pub score: Option<f64>,
    pub student_no: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramCount {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpaBucket {
    pub range: &'static str,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_students: i64,
    pub active_students: i64,
    pub graduated_students: i64,
    pub average_gpa: f64,
    pub program_distribution: Vec<ProgramCount>,
    pub gpa_distribution: Vec<GpaBucket>,
}

/// Fixed bucket labels for the GPA histogram, highest first. Every label is
/// always present in the output, occupied or not.
pub const GPA_RANGE_LABELS: [&str; 21] = [
    "4.0", "3.8-3.9", "3.6-3.7", "3.4-3.5", "3.2-3.3", "3.0-3.1", "2.8-2.9", "2.6-2.7", "2.4-2.5",
    "2.2-2.3", "2.0-2.1", "1.8-1.9", "1.6-1.7", "1.4-1.5", "1.2-1.3", "1.0-1.1", "0.8-0.9",
    "0.6-0.7", "0.4-0.5", "0.2-0.3", "0.0-0.1",
];

/// Coarse 4-level score map used only for the dashboard GPA. Deliberately
/// separate from `letter_grade_from_score`; the two tables report different
/// numbers and must stay independent.
pub fn grade_point_from_score(score: f64) -> f64 {
    if score >= 90.0 {
        4.0
    } else if score >= 80.0 {
        3.0
    } else if score >= 70.0 {
        2.0
    } else if score >= 60.0 {
        1.0
    } else {
        0.0
    }
}

/// Fine letter table with plus/minus steps, used for per-grade display rows.
pub fn letter_grade_from_score(score: f64) -> &'static str {
    if score >= 93.0 {
        "A"
    } else if score >= 90.0 {
        "A-"
    } else if score >= 87.0 {
        "B+"
    } else if score >= 83.0 {
        "B"
    } else if score >= 80.0 {
        "B-"
    } else if score >= 77.0 {
        "C+"
    } else if score >= 73.0 {
        "C"
    } else if score >= 70.0 {
        "C-"
    } else if score >= 67.0 {
        "D+"
    } else if score >= 60.0 {
        "D"
    } else {
        "F"
    }
}

/// Point values for the fine letter table. Unknown letters count as 0.
pub fn grade_points_for_letter(letter: &str) -> f64 {
    match letter {
        "A" => 4.0,
        "A-" => 3.7,
        "B+" => 3.3,
        "B" => 3.0,
        "B-" => 2.7,
        "C+" => 2.3,
        "C" => 2.0,
        "C-" => 1.7,
        "D+" => 1.3,
        "D" => 1.0,
        _ => 0.0,
    }
}

/// Descending-threshold first match: a GPA of exactly 3.8 lands in "3.8-3.9",
/// exactly 4.0 in "4.0".
fn gpa_bucket_index(gpa: f64) -> usize {
    if gpa >= 4.0 {
        0
    } else if gpa >= 3.8 {
        1
    } else if gpa >= 3.6 {
        2
    } else if gpa >= 3.4 {
        3
    } else if gpa >= 3.2 {
        4
    } else if gpa >= 3.0 {
        5
    } else if gpa >= 2.8 {
        6
    } else if gpa >= 2.6 {
        7
    } else if gpa >= 2.4 {
        8
    } else if gpa >= 2.2 {
        9
    } else if gpa >= 2.0 {
        10
    } else if gpa >= 1.8 {
        11
    } else if gpa >= 1.6 {
        12
    } else if gpa >= 1.4 {
        13
    } else if gpa >= 1.2 {
        14
    } else if gpa >= 1.0 {
        15
    } else if gpa >= 0.8 {
        16
    } else if gpa >= 0.6 {
        17
    } else if gpa >= 0.4 {
        18
    } else if gpa >= 0.2 {
        19
    } else {
        20
    }
}

pub fn gpa_range_label(gpa: f64) -> &'static str {
    GPA_RANGE_LABELS[gpa_bucket_index(gpa)]
}

struct GpaAccum {
    total_weighted: f64,
    total_credits: i64,
}

/// Turns fresh snapshots of the three collections into one dashboard summary.
///
/// Pure and total: no input is mutated, malformed rows are skipped rather than
/// rejected, and identical inputs always produce an identical value. A grade
/// contributes to GPA only when its score is present, its course is known with
/// positive credits, and it carries a student key. Per-student GPA weights
/// grade points by course credits; `average_gpa` is then the plain mean of
/// those per-student figures.
pub fn dashboard_stats(
    students: &[StudentRow],
    courses: &[CourseRow],
    grades: &[GradeRow],
) -> DashboardStats {
    let course_credits: HashMap<&str, i64> = courses
        .iter()
        .map(|c| (c.id.as_str(), c.credits))
        .collect();

    let total_students = students.len() as i64;
    let active_students = students.iter().filter(|s| s.status == "active").count() as i64;
    let graduated_students = students
        .iter()
        .filter(|s| s.status == "graduated")
        .count() as i64;

    // First-seen ordering everywhere below: map iteration order must not leak
    // into the output or repeated runs stop being bit-identical.
    let mut programs: Vec<ProgramCount> = Vec::new();
    let mut program_index: HashMap<String, usize> = HashMap::new();
    for s in students {
        let Some(name) = s.program.as_deref().map(str::trim).filter(|p| !p.is_empty()) else {
            continue;
        };
        match program_index.get(name) {
            Some(&i) => programs[i].value += 1,
            None => {
                program_index.insert(name.to_string(), programs.len());
                programs.push(ProgramCount {
                    name: name.to_string(),
                    value: 1,
                });
            }
        }
    }

    let mut accums: Vec<GpaAccum> = Vec::new();
    let mut accum_index: HashMap<String, usize> = HashMap::new();
    for g in grades {
        let Some(score) = g.score else {
            continue;
        };
        let Some(student_no) = g.student_no.as_deref() else {
            continue;
        };
        let Some(&credits) = course_credits.get(g.course_id.as_str()) else {
            continue;
        };
        if credits <= 0 {
            // A weightless course cannot enter the credit-weighted ratio.
            continue;
        }
        let idx = match accum_index.get(student_no) {
            Some(&i) => i,
            None => {
                accum_index.insert(student_no.to_string(), accums.len());
                accums.push(GpaAccum {
                    total_weighted: 0.0,
                    total_credits: 0,
                });
                accums.len() - 1
            }
        };
        let a = &mut accums[idx];
        a.total_weighted += grade_point_from_score(score) * credits as f64;
        a.total_credits += credits;
    }

    let mut bucket_counts = [0i64; GPA_RANGE_LABELS.len()];
    let mut total_gpa = 0.0;
    for a in &accums {
        let gpa = a.total_weighted / a.total_credits as f64;
        bucket_counts[gpa_bucket_index(gpa)] += 1;
        total_gpa += gpa;
    }

    let average_gpa = if accums.is_empty() {
        0.0
    } else {
        (total_gpa / accums.len() as f64 * 100.0).round() / 100.0
    };

    DashboardStats {
        total_students,
        active_students,
        graduated_students,
        average_gpa,
        program_distribution: programs,
        gpa_distribution: GPA_RANGE_LABELS
            .iter()
            .copied()
            .zip(bucket_counts)
            .map(|(range, count)| GpaBucket { range, count })
            .collect(),
    }
}

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::model::{ExamResult, Subject};

/// Which subjects contribute to `total_max_marks`.
///
/// Leaderboards count only subjects the student actually sat, so "marks
/// missed" reflects attempted papers. Report cards and class ranks count the
/// whole syllabus, so a missing paper lowers the percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MaxMarksBasis {
    AttemptedOnly,
    FullSyllabus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectOutcome {
    pub subject_id: String,
    pub subject_name: String,
    pub marks: Option<f64>,
    pub max_marks: f64,
    pub pass_marks: f64,
    pub is_passed: bool,
    pub is_missing: bool,
}

impl SubjectOutcome {
    pub fn is_failed(&self) -> bool {
        !self.is_missing && !self.is_passed
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAggregate {
    pub student_id: String,
    pub basis: MaxMarksBasis,
    pub total_marks: f64,
    pub total_max_marks: f64,
    pub percentage: f64,
    pub attempted_count: usize,
    pub missing_count: usize,
    /// Results whose subject is not in the supplied subject list.
    pub extra_subject_ids: Vec<String>,
    pub per_subject: Vec<SubjectOutcome>,
}

impl StudentAggregate {
    pub fn marks_missed(&self) -> f64 {
        (self.total_max_marks - self.total_marks).max(0.0)
    }
}

/// Reduce one student's results for one exam against a subject list.
///
/// `results` may hold other students' rows; only `student_id`'s are used.
pub fn aggregate_student(
    student_id: &str,
    subjects: &[Subject],
    results: &[ExamResult],
    basis: MaxMarksBasis,
) -> StudentAggregate {
    let marks_by_subject: HashMap<&str, f64> = results
        .iter()
        .filter(|r| r.student_id == student_id)
        .map(|r| (r.subject_id.as_str(), r.marks))
        .collect();

    let mut total_marks = 0.0_f64;
    let mut total_max_marks = 0.0_f64;
    let mut attempted_count = 0usize;
    let mut missing_count = 0usize;
    let mut per_subject = Vec::with_capacity(subjects.len());

    for s in subjects {
        let marks = marks_by_subject.get(s.id.as_str()).copied();
        match marks {
            Some(m) => {
                attempted_count += 1;
                total_marks += m;
                total_max_marks += s.max_marks;
            }
            None => {
                missing_count += 1;
                if basis == MaxMarksBasis::FullSyllabus {
                    total_max_marks += s.max_marks;
                }
            }
        }
        per_subject.push(SubjectOutcome {
            subject_id: s.id.clone(),
            subject_name: s.name.clone(),
            marks,
            max_marks: s.max_marks,
            pass_marks: s.pass_marks,
            is_passed: marks.map(|m| m >= s.pass_marks).unwrap_or(false),
            is_missing: marks.is_none(),
        });
    }

    let known: HashSet<&str> = subjects.iter().map(|s| s.id.as_str()).collect();
    let mut extra_subject_ids: Vec<String> = marks_by_subject
        .keys()
        .filter(|id| !known.contains(*id))
        .map(|id| id.to_string())
        .collect();
    extra_subject_ids.sort();

    let percentage = if total_max_marks > 0.0 {
        100.0 * total_marks / total_max_marks
    } else {
        0.0
    };

    StudentAggregate {
        student_id: student_id.to_string(),
        basis,
        total_marks,
        total_max_marks,
        percentage,
        attempted_count,
        missing_count,
        extra_subject_ids,
        per_subject,
    }
}

/// Subjects counted toward an exam's totals.
pub fn exam_subjects(subjects: &[Subject]) -> Vec<Subject> {
    subjects
        .iter()
        .filter(|s| s.is_exam_subject)
        .cloned()
        .collect()
}

use serde::Serialize;

use crate::calc::aggregate::{aggregate_student, exam_subjects, MaxMarksBasis};
use crate::model::{ExamResult, Subject};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EligibilityStatus {
    Passed,
    Failed,
    /// One or more exam subjects have no result; needs a human decision.
    Unknown,
    /// Direct promotion, no marks consulted.
    Eligible,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Eligibility {
    pub status: EligibilityStatus,
    pub failed_count: usize,
    pub missing_count: usize,
    pub detail: String,
}

impl Eligibility {
    /// Whether the student starts out ticked on the review screen.
    pub fn default_selected(&self) -> bool {
        matches!(
            self.status,
            EligibilityStatus::Passed | EligibilityStatus::Eligible
        )
    }

    pub fn direct() -> Self {
        Self {
            status: EligibilityStatus::Eligible,
            failed_count: 0,
            missing_count: 0,
            detail: "Direct promotion".to_string(),
        }
    }
}

/// Classify one student against a class's exam subjects.
///
/// Failure wins over missing: a student who failed one paper and skipped
/// another is `failed`, not `unknown`.
pub fn classify(student_id: &str, subjects: &[Subject], results: &[ExamResult]) -> Eligibility {
    let counted = exam_subjects(subjects);
    let agg = aggregate_student(student_id, &counted, results, MaxMarksBasis::FullSyllabus);

    let failed_count = agg.per_subject.iter().filter(|s| s.is_failed()).count();
    let missing_count = agg.missing_count;

    let (status, detail) = if failed_count > 0 {
        (
            EligibilityStatus::Failed,
            format!("Failed {failed_count} subjects"),
        )
    } else if missing_count > 0 {
        (
            EligibilityStatus::Unknown,
            format!("Missing {missing_count} subjects"),
        )
    } else {
        (EligibilityStatus::Passed, "Passed all subjects".to_string())
    };

    Eligibility {
        status,
        failed_count,
        missing_count,
        detail,
    }
}

use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::calc::aggregate::{aggregate_student, exam_subjects, MaxMarksBasis, SubjectOutcome};
use crate::calc::eligibility::{classify, EligibilityStatus};
use crate::calc::rank::{competition_ranks, desc, scores_equal};
use crate::calc::round_off_1_decimal;
use crate::error::EngineError;
use crate::model::{Audience, Class, Exam, ExamStatus, MarkRecord, Subject};
use crate::store::{Store, UpsertOutcome};

/// Exam lookup honouring visibility: students never see drafts.
pub fn visible_exam<S: Store + ?Sized>(
    store: &S,
    exam_id: &str,
    audience: Audience,
) -> Result<Exam, EngineError> {
    match store.exam(exam_id)? {
        Some(e) if audience == Audience::Mentor || e.status == ExamStatus::Published => Ok(e),
        _ => Err(EngineError::NotFound("exam")),
    }
}

pub fn visible_exams<S: Store + ?Sized>(
    store: &S,
    audience: Audience,
) -> Result<Vec<Exam>, EngineError> {
    Ok(store
        .exams()?
        .into_iter()
        .filter(|e| audience == Audience::Mentor || e.status == ExamStatus::Published)
        .collect())
}

fn load_subject<S: Store + ?Sized>(store: &S, subject_id: &str) -> Result<Subject, EngineError> {
    let subject = store
        .subject(subject_id)?
        .ok_or(EngineError::NotFound("subject"))?;
    if !subject.is_exam_subject {
        return Err(EngineError::validation_with(
            "subject does not take exam marks",
            json!({ "subjectId": subject_id }),
        ));
    }
    Ok(subject)
}

/// Check a batch of marks for one subject before anything is written.
pub fn validate_marks(
    subject: &Subject,
    class_student_ids: &HashSet<String>,
    records: &[MarkRecord],
) -> Result<(), EngineError> {
    let mut seen: HashSet<&str> = HashSet::new();
    for rec in records {
        if !seen.insert(rec.student_id.as_str()) {
            return Err(EngineError::validation_with(
                "duplicate student in marks batch",
                json!({ "studentId": rec.student_id }),
            ));
        }
        if !class_student_ids.contains(&rec.student_id) {
            return Err(EngineError::validation_with(
                "student does not belong to the subject's class",
                json!({ "studentId": rec.student_id, "subjectId": subject.id }),
            ));
        }
        if !rec.marks.is_finite() || rec.marks < 0.0 {
            return Err(EngineError::validation_with(
                "marks must be a non-negative number",
                json!({ "studentId": rec.student_id, "marks": rec.marks }),
            ));
        }
        if rec.marks > subject.max_marks {
            return Err(EngineError::validation_with(
                "marks exceed the subject maximum",
                json!({
                    "studentId": rec.student_id,
                    "marks": rec.marks,
                    "maxMarks": subject.max_marks
                }),
            ));
        }
    }
    Ok(())
}

/// Create or replace the marks for the students in `records`. Shared by manual
/// entry and CSV import.
pub fn upsert_marks<S: Store + ?Sized>(
    store: &S,
    exam_id: &str,
    subject_id: &str,
    records: &[MarkRecord],
) -> Result<UpsertOutcome, EngineError> {
    if store.exam(exam_id)?.is_none() {
        return Err(EngineError::NotFound("exam"));
    }
    let subject = load_subject(store, subject_id)?;
    let class_student_ids: HashSet<String> = store
        .students_in_class(&subject.class_id)?
        .into_iter()
        .map(|s| s.id)
        .collect();
    validate_marks(&subject, &class_student_ids, records)?;

    let outcome = store.upsert_results(exam_id, subject_id, records)?;
    info!(
        exam_id,
        subject_id,
        inserted = outcome.inserted,
        updated = outcome.updated,
        unchanged = outcome.unchanged,
        "marks upserted"
    );
    Ok(outcome)
}

pub fn delete_marks<S: Store + ?Sized>(
    store: &S,
    exam_id: &str,
    subject_id: &str,
    student_ids: &[String],
) -> Result<usize, EngineError> {
    if store.exam(exam_id)?.is_none() {
        return Err(EngineError::NotFound("exam"));
    }
    if store.subject(subject_id)?.is_none() {
        return Err(EngineError::NotFound("subject"));
    }
    let deleted = store.delete_results(exam_id, subject_id, student_ids)?;
    info!(exam_id, subject_id, deleted, "marks deleted");
    Ok(deleted)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRow {
    pub rank: u32,
    pub student_id: String,
    pub name: String,
    pub register_no: Option<String>,
    pub total_marks: f64,
    pub total_max_marks: f64,
    pub marks_missed: f64,
    pub percentage: f64,
    pub attempted_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Leaderboard {
    pub exam: Exam,
    pub class: Class,
    pub rows: Vec<LeaderboardRow>,
}

fn load_class<S: Store + ?Sized>(store: &S, class_id: &str) -> Result<Class, EngineError> {
    store.class(class_id)?.ok_or(EngineError::NotFound("class"))
}

/// Attempted-subjects ranking of a class for one exam. Students with no
/// results at all are left off.
pub fn leaderboard<S: Store + ?Sized>(
    store: &S,
    exam_id: &str,
    class_id: &str,
    audience: Audience,
) -> Result<Leaderboard, EngineError> {
    let exam = visible_exam(store, exam_id, audience)?;
    let class = load_class(store, class_id)?;
    let subjects = exam_subjects(&store.subjects_for_class(class_id)?);
    let results = store.results_for_exam(exam_id)?;

    let mut rows: Vec<LeaderboardRow> = store
        .students_in_class(class_id)?
        .into_iter()
        .filter(|s| s.is_active())
        .filter_map(|s| {
            let agg = aggregate_student(&s.id, &subjects, &results, MaxMarksBasis::AttemptedOnly);
            if agg.attempted_count == 0 {
                return None;
            }
            Some(LeaderboardRow {
                rank: 0,
                marks_missed: agg.marks_missed(),
                percentage: round_off_1_decimal(agg.percentage),
                student_id: s.id,
                name: s.name,
                register_no: s.register_no,
                total_marks: agg.total_marks,
                total_max_marks: agg.total_max_marks,
                attempted_count: agg.attempted_count,
            })
        })
        .collect();

    rows.sort_by(|a, b| desc(a.total_marks, b.total_marks).then_with(|| a.name.cmp(&b.name)));
    let ranks = competition_ranks(&rows, |a, b| scores_equal(a.total_marks, b.total_marks));
    for (row, rank) in rows.iter_mut().zip(ranks) {
        row.rank = rank;
    }
    debug!(exam_id, class_id, rows = rows.len(), "leaderboard computed");

    Ok(Leaderboard { exam, class, rows })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCardRow {
    pub rank: u32,
    pub student_id: String,
    pub name: String,
    pub register_no: Option<String>,
    pub total_marks: f64,
    pub total_max_marks: f64,
    pub percentage: f64,
    pub status: EligibilityStatus,
    pub detail: String,
    pub subjects: Vec<SubjectOutcome>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCard {
    pub exam: Exam,
    pub class: Class,
    pub rows: Vec<ReportCardRow>,
}

/// Full-syllabus report for every active student, ranked by total marks.
pub fn report_card<S: Store + ?Sized>(
    store: &S,
    exam_id: &str,
    class_id: &str,
    audience: Audience,
) -> Result<ReportCard, EngineError> {
    let exam = visible_exam(store, exam_id, audience)?;
    let class = load_class(store, class_id)?;
    let subjects = exam_subjects(&store.subjects_for_class(class_id)?);
    let results = store.results_for_exam(exam_id)?;

    let mut rows: Vec<ReportCardRow> = store
        .students_in_class(class_id)?
        .into_iter()
        .filter(|s| s.is_active())
        .map(|s| {
            let agg = aggregate_student(&s.id, &subjects, &results, MaxMarksBasis::FullSyllabus);
            let eligibility = classify(&s.id, &subjects, &results);
            ReportCardRow {
                rank: 0,
                student_id: s.id,
                name: s.name,
                register_no: s.register_no,
                total_marks: agg.total_marks,
                total_max_marks: agg.total_max_marks,
                percentage: round_off_1_decimal(agg.percentage),
                status: eligibility.status,
                detail: eligibility.detail,
                subjects: agg.per_subject,
            }
        })
        .collect();

    rows.sort_by(|a, b| desc(a.total_marks, b.total_marks).then_with(|| a.name.cmp(&b.name)));
    let ranks = competition_ranks(&rows, |a, b| scores_equal(a.total_marks, b.total_marks));
    for (row, rank) in rows.iter_mut().zip(ranks) {
        row.rank = rank;
    }
    debug!(exam_id, class_id, rows = rows.len(), "report card computed");

    Ok(ReportCard { exam, class, rows })
}

//! Marks sheet interchange.
//!
//! The sheet carries five identity columns followed by one column per exam
//! subject. Subject headers embed the subject id in brackets
//! (`[subj_17] Mathematics`), which is what import keys on; column order and
//! the identity columns are informational only.

use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::calc::aggregate::exam_subjects;
use crate::error::EngineError;
use crate::model::{Class, MarkRecord, Subject};
use crate::results;
use crate::store::{Store, UpsertOutcome};

pub const NOT_APPLICABLE: &str = "N/A";
pub const IDENTITY_HEADERS: [&str; 5] = ["Student ID", "Register No", "Name", "Class", "Division"];

const SUBJECT_TAG: &str = r"^\s*\[([^\]]+)\]";

pub fn subject_header(subject: &Subject) -> String {
    format!("[{}] {}", subject.id, subject.name)
}

/// Shortest decimal that parses back to the same mark.
fn format_mark(marks: f64) -> String {
    format!("{marks}")
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedSheet {
    pub csv: String,
    pub students: usize,
    pub subjects: usize,
}

/// Render the sheet for `exam_id` across `class_ids`, or every class when
/// the list is empty. Only active students get a row.
pub fn export_marks<S: Store + ?Sized>(
    store: &S,
    exam_id: &str,
    class_ids: &[String],
) -> Result<ExportedSheet, EngineError> {
    if store.exam(exam_id)?.is_none() {
        return Err(EngineError::NotFound("exam"));
    }
    let classes: Vec<Class> = if class_ids.is_empty() {
        store.classes()?
    } else {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(class_ids.len());
        for id in class_ids.iter().filter(|id| seen.insert(*id)) {
            out.push(store.class(id)?.ok_or(EngineError::NotFound("class"))?);
        }
        out
    };

    let mut subjects: Vec<Subject> = Vec::new();
    for c in &classes {
        subjects.extend(exam_subjects(&store.subjects_for_class(&c.id)?));
    }
    let marks: HashMap<(String, String), f64> = store
        .results_for_exam(exam_id)?
        .into_iter()
        .map(|r| ((r.student_id, r.subject_id), r.marks))
        .collect();

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());

    let mut header: Vec<String> = IDENTITY_HEADERS.iter().map(|h| h.to_string()).collect();
    header.extend(subjects.iter().map(subject_header));
    writer.write_record(&header)?;

    let mut student_rows = 0usize;
    for c in &classes {
        for s in store.students_in_class(&c.id)?.into_iter().filter(|s| s.is_active()) {
            let mut row = vec![
                s.id.clone(),
                s.register_no.clone().unwrap_or_default(),
                s.name.clone(),
                c.name.clone(),
                c.division.clone(),
            ];
            for subj in &subjects {
                let cell = if subj.class_id != s.class_id {
                    NOT_APPLICABLE.to_string()
                } else {
                    marks
                        .get(&(s.id.clone(), subj.id.clone()))
                        .map(|m| format_mark(*m))
                        .unwrap_or_default()
                };
                row.push(cell);
            }
            writer.write_record(&row)?;
            student_rows += 1;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| EngineError::Csv(e.into_error().into()))?;
    let csv = String::from_utf8(bytes).map_err(|e| EngineError::Format(e.to_string()))?;
    debug!(exam_id, students = student_rows, subjects = subjects.len(), "marks exported");
    Ok(ExportedSheet {
        csv,
        students: student_rows,
        subjects: subjects.len(),
    })
}

/// Subject id per column index, from the bracket tags in the header row.
/// A subject tagged twice is read from its first column only.
pub fn subject_columns(
    header: &csv::StringRecord,
) -> Result<BTreeMap<usize, String>, EngineError> {
    let tag = Regex::new(SUBJECT_TAG).map_err(|e| EngineError::Format(e.to_string()))?;
    let mut seen = HashSet::new();
    Ok(header
        .iter()
        .enumerate()
        .filter_map(|(idx, h)| {
            tag.captures(h)
                .and_then(|c| c.get(1))
                .map(|m| (idx, m.as_str().trim().to_string()))
        })
        .filter(|(_, id)| !id.is_empty() && seen.insert(id.clone()))
        .collect())
}

/// Subject ids end up inside `[...]` header tags, so they must survive the
/// tag pattern unchanged.
pub fn valid_subject_id(id: &str) -> bool {
    !id.is_empty() && id.trim() == id && !id.contains(['[', ']'])
}

/// A usable mark: non-empty, not `N/A`, and a finite number.
pub fn parse_cell(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case(NOT_APPLICABLE) {
        return None;
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectImport {
    pub subject_id: String,
    pub records: usize,
    #[serde(flatten)]
    pub outcome: UpsertOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectImportError {
    pub subject_id: String,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub subjects_detected: usize,
    pub rows: usize,
    pub cells_accepted: usize,
    pub cells_skipped: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub subjects: Vec<SubjectImport>,
    pub errors: Vec<SubjectImportError>,
}

/// Apply a marks sheet. A sheet without any tagged subject column is
/// rejected before anything is written; after that each subject is upserted
/// on its own and failures are reported per subject.
pub fn import_marks<S: Store + ?Sized>(
    store: &S,
    exam_id: &str,
    text: &str,
) -> Result<ImportReport, EngineError> {
    if store.exam(exam_id)?.is_none() {
        return Err(EngineError::NotFound("exam"));
    }
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let mut records = reader.records();

    let header = match records.next() {
        Some(h) => h?,
        None => return Err(EngineError::Format("marks sheet is empty".to_string())),
    };
    let columns = subject_columns(&header)?;
    if columns.is_empty() {
        return Err(EngineError::Format(
            "no [subjectId] column headers found".to_string(),
        ));
    }
    let id_col = header
        .iter()
        .position(|h| h.eq_ignore_ascii_case(IDENTITY_HEADERS[0]))
        .unwrap_or(0);

    let mut by_subject: BTreeMap<String, Vec<MarkRecord>> = BTreeMap::new();
    let mut rows = 0usize;
    let mut cells_accepted = 0usize;
    let mut cells_skipped = 0usize;
    for record in records {
        let record = record?;
        let student_id = record.get(id_col).unwrap_or("").trim();
        if student_id.is_empty() {
            continue;
        }
        rows += 1;
        for (idx, subject_id) in &columns {
            match record.get(*idx).and_then(parse_cell) {
                Some(marks) => {
                    cells_accepted += 1;
                    by_subject
                        .entry(subject_id.clone())
                        .or_default()
                        .push(MarkRecord {
                            student_id: student_id.to_string(),
                            marks,
                        });
                }
                None => cells_skipped += 1,
            }
        }
    }

    let mut report = ImportReport {
        subjects_detected: columns.len(),
        rows,
        cells_accepted,
        cells_skipped,
        inserted: 0,
        updated: 0,
        unchanged: 0,
        subjects: Vec::new(),
        errors: Vec::new(),
    };
    for (subject_id, marks) in by_subject {
        match results::upsert_marks(store, exam_id, &subject_id, &marks) {
            Ok(outcome) => {
                debug!(
                    exam_id,
                    subject_id = %subject_id,
                    changed = outcome.changed(),
                    "subject imported"
                );
                report.inserted += outcome.inserted;
                report.updated += outcome.updated;
                report.unchanged += outcome.unchanged;
                report.subjects.push(SubjectImport {
                    subject_id,
                    records: marks.len(),
                    outcome,
                });
            }
            Err(e) => {
                warn!(exam_id, subject_id = %subject_id, error = %e, "subject import failed");
                report.errors.push(SubjectImportError {
                    subject_id,
                    code: e.code(),
                    message: e.to_string(),
                    details: e.details(),
                });
            }
        }
    }

    info!(
        exam_id,
        subjects = report.subjects_detected,
        accepted = report.cells_accepted,
        inserted = report.inserted,
        updated = report.updated,
        failed_subjects = report.errors.len(),
        "marks imported"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExamStatus;
    use crate::store::fixtures::*;
    use crate::store::SqliteStore;

    fn seed(conn: &rusqlite::Connection) {
        add_class(conn, "c5a", "5", "A");
        add_class(conn, "c6a", "6", "A");
        add_student(conn, "s1", "c5a", "Asha", true);
        add_student(conn, "s2", "c5a", "Bilal, Jr.", true);
        add_student(conn, "s3", "c6a", "Chen", true);
        add_subject(conn, "math5", "c5a", "Mathematics", 100.0, 40.0);
        add_subject(conn, "sci5", "c5a", "Science", 50.0, 20.0);
        add_subject(conn, "math6", "c6a", "Mathematics", 100.0, 40.0);
        add_exam(conn, "e1", ExamStatus::Published);
    }

    #[test]
    fn export_marks_na_blank_and_quoted_names() {
        let conn = memory_conn();
        seed(&conn);
        add_result(&conn, "e1", "math5", "s1", 72.5);
        add_result(&conn, "e1", "math6", "s3", 88.0);
        let store = SqliteStore::new(&conn);

        let sheet = export_marks(&store, "e1", &[]).unwrap();
        let lines: Vec<&str> = sheet.csv.lines().collect();
        assert_eq!(
            lines[0],
            "Student ID,Register No,Name,Class,Division,\
             [math5] Mathematics,[sci5] Science,[math6] Mathematics"
        );
        assert_eq!(lines[1], "s1,R-s1,Asha,5,A,72.5,,N/A");
        assert_eq!(lines[2], "s2,R-s2,\"Bilal, Jr.\",5,A,,,N/A");
        assert_eq!(lines[3], "s3,R-s3,Chen,6,A,N/A,N/A,88");
        assert_eq!(sheet.students, 3);
    }

    #[test]
    fn reimporting_an_unmodified_export_changes_nothing() {
        let conn = memory_conn();
        seed(&conn);
        add_result(&conn, "e1", "math5", "s1", 72.5);
        add_result(&conn, "e1", "sci5", "s2", 33.0);
        add_result(&conn, "e1", "math6", "s3", 88.0);
        let store = SqliteStore::new(&conn);

        let sheet = export_marks(&store, "e1", &[]).unwrap();
        let report = import_marks(&store, "e1", &sheet.csv).unwrap();
        assert_eq!(report.subjects_detected, 3);
        assert_eq!(report.cells_accepted, 3);
        assert_eq!(report.inserted + report.updated, 0);
        assert_eq!(report.unchanged, 3);
        assert!(report.errors.is_empty());
        assert_eq!(store.results_for_exam("e1").unwrap().len(), 3);
    }

    #[test]
    fn import_converges_to_sheet_values_and_leaves_blanks_alone() {
        let conn = memory_conn();
        seed(&conn);
        add_result(&conn, "e1", "math5", "s1", 50.0);
        add_result(&conn, "e1", "sci5", "s1", 10.0);
        let store = SqliteStore::new(&conn);

        let text = "\u{feff}Name,[sci5] Science,Student ID,[math5] Mathematics\n\
                    Asha,,s1,61\n\
                    \"Bilal, Jr.\",abc,s2,44\n";
        let report = import_marks(&store, "e1", text).unwrap();
        assert_eq!(report.cells_accepted, 2);
        assert_eq!(report.cells_skipped, 2);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.updated, 1);

        let sci = store.results_for_exam_subject("e1", "sci5").unwrap();
        assert_eq!(sci.len(), 1);
        assert_eq!(sci[0].marks, 10.0);
    }

    #[test]
    fn sheet_without_subject_tags_is_a_format_error() {
        let conn = memory_conn();
        seed(&conn);
        let store = SqliteStore::new(&conn);

        let text = "Student ID,Mathematics\ns1,40\n";
        let e = import_marks(&store, "e1", text).unwrap_err();
        assert_eq!(e.code(), "format_error");
        assert!(store.results_for_exam("e1").unwrap().is_empty());
    }

    #[test]
    fn invalid_subject_is_reported_without_blocking_others() {
        let conn = memory_conn();
        seed(&conn);
        let store = SqliteStore::new(&conn);

        let text = "Student ID,[math5] M,[sci5] S,[ghost] G\ns1,40,70,5\n";
        let report = import_marks(&store, "e1", text).unwrap();
        assert_eq!(report.inserted, 1);
        let failed: Vec<&str> = report
            .errors
            .iter()
            .map(|e| e.subject_id.as_str())
            .collect();
        assert_eq!(failed, vec!["ghost", "sci5"]);
    }

    #[test]
    fn repeated_class_ids_export_once_and_reimport_cleanly() {
        let conn = memory_conn();
        seed(&conn);
        add_result(&conn, "e1", "math5", "s1", 72.5);
        let store = SqliteStore::new(&conn);

        let ids = vec!["c5a".to_string(), "c5a".to_string()];
        let sheet = export_marks(&store, "e1", &ids).unwrap();
        assert_eq!(sheet.students, 2);
        assert_eq!(sheet.subjects, 2);
        assert_eq!(sheet.csv.matches("[math5]").count(), 1);

        let report = import_marks(&store, "e1", &sheet.csv).unwrap();
        assert!(report.errors.is_empty());
        assert_eq!(report.unchanged, 1);
    }

    #[test]
    fn duplicated_subject_column_is_read_once() {
        let conn = memory_conn();
        seed(&conn);
        let store = SqliteStore::new(&conn);

        let text = "Student ID,[math5] Mathematics,[math5] Mathematics\ns1,61,99\n";
        let report = import_marks(&store, "e1", text).unwrap();
        assert_eq!(report.subjects_detected, 1);
        assert!(report.errors.is_empty());
        let math = store.results_for_exam_subject("e1", "math5").unwrap();
        assert_eq!(math.len(), 1);
        assert_eq!(math[0].marks, 61.0);
    }

    #[test]
    fn subject_ids_must_survive_header_tags() {
        assert!(valid_subject_id("math5"));
        assert!(valid_subject_id("subj 17"));
        assert!(!valid_subject_id("m]5"));
        assert!(!valid_subject_id("[m"));
        assert!(!valid_subject_id(" m5"));
        assert!(!valid_subject_id(""));
    }

    #[test]
    fn parse_cell_rules() {
        assert_eq!(parse_cell(" 42 "), Some(42.0));
        assert_eq!(parse_cell("n/a"), None);
        assert_eq!(parse_cell(""), None);
        assert_eq!(parse_cell("NaN"), None);
        assert_eq!(parse_cell("x"), None);
    }
}

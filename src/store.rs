use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::db;
use crate::error::EngineError;
use crate::model::{
    Activity, ActivitySubmission, AttendanceRecord, Class, DeclarationStatus, Exam, ExamResult,
    ExamStatus, MarkRecord, Period, PrayerRecord, ScoreConfig, StarDeclaration, Student,
    StudentStatus, Subject,
};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Counts from one `upsert_results` call. `unchanged` rows already held the
/// proposed mark, so re-applying an unmodified sheet reports zero writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl UpsertOutcome {
    pub fn changed(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Data-access collaborator the engine runs against. Queries are plain
/// equality filters; the engine holds no state between calls.
pub trait Store {
    fn classes(&self) -> Result<Vec<Class>, EngineError>;
    fn class(&self, class_id: &str) -> Result<Option<Class>, EngineError>;

    fn students_in_class(&self, class_id: &str) -> Result<Vec<Student>, EngineError>;
    fn student(&self, student_id: &str) -> Result<Option<Student>, EngineError>;

    fn subjects_for_class(&self, class_id: &str) -> Result<Vec<Subject>, EngineError>;
    fn subject(&self, subject_id: &str) -> Result<Option<Subject>, EngineError>;

    fn exams(&self) -> Result<Vec<Exam>, EngineError>;
    fn exam(&self, exam_id: &str) -> Result<Option<Exam>, EngineError>;

    fn results_for_exam(&self, exam_id: &str) -> Result<Vec<ExamResult>, EngineError>;
    fn results_for_exam_subject(
        &self,
        exam_id: &str,
        subject_id: &str,
    ) -> Result<Vec<ExamResult>, EngineError>;

    fn attendance_for_class(
        &self,
        class_id: &str,
        period: Period,
    ) -> Result<Vec<AttendanceRecord>, EngineError>;
    fn activities_for_class(&self, class_id: &str) -> Result<Vec<Activity>, EngineError>;
    fn submissions_for_class(&self, class_id: &str)
        -> Result<Vec<ActivitySubmission>, EngineError>;
    fn prayers_for_class(
        &self,
        class_id: &str,
        period: Period,
    ) -> Result<Vec<PrayerRecord>, EngineError>;

    fn star_declaration(
        &self,
        class_id: &str,
        period: Period,
    ) -> Result<Option<StarDeclaration>, EngineError>;
    fn score_config(&self, scope: Option<&str>) -> Result<ScoreConfig, EngineError>;

    fn upsert_results(
        &self,
        exam_id: &str,
        subject_id: &str,
        records: &[MarkRecord],
    ) -> Result<UpsertOutcome, EngineError>;
    fn delete_results(
        &self,
        exam_id: &str,
        subject_id: &str,
        student_ids: &[String],
    ) -> Result<usize, EngineError>;
    fn set_student_class(&self, student_id: &str, class_id: &str) -> Result<(), EngineError>;
    fn set_star_declaration(
        &self,
        class_id: &str,
        period: Period,
        status: DeclarationStatus,
    ) -> Result<(), EngineError>;
}

pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

fn conversion_err(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn date_col(r: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = r.get(idx)?;
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|e| conversion_err(idx, e))
}

/// Accepts the canonical naive UTC form, RFC 3339, or a bare date.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(v) = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT) {
        return Some(v);
    }
    if let Ok(v) = DateTime::parse_from_rfc3339(raw) {
        return Some(v.with_timezone(&Utc).naive_utc());
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn format_date(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    let status: String = r.get(4)?;
    Ok(Student {
        id: r.get(0)?,
        class_id: r.get(1)?,
        name: r.get(2)?,
        register_no: r.get(3)?,
        // Unknown statuses are never treated as active.
        status: StudentStatus::parse(&status).unwrap_or(StudentStatus::Inactive),
        gender: r.get(5)?,
    })
}

fn subject_from_row(r: &Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: r.get(0)?,
        class_id: r.get(1)?,
        name: r.get(2)?,
        max_marks: r.get(3)?,
        pass_marks: r.get(4)?,
        is_exam_subject: r.get::<_, i64>(5)? != 0,
    })
}

fn exam_from_row(r: &Row<'_>) -> rusqlite::Result<Exam> {
    let status: String = r.get(2)?;
    Ok(Exam {
        id: r.get(0)?,
        name: r.get(1)?,
        status: ExamStatus::parse(&status).unwrap_or(ExamStatus::Draft),
        date: r.get(3)?,
    })
}

fn result_from_row(r: &Row<'_>) -> rusqlite::Result<ExamResult> {
    Ok(ExamResult {
        exam_id: r.get(0)?,
        subject_id: r.get(1)?,
        student_id: r.get(2)?,
        marks: r.get(3)?,
    })
}

fn same_marks(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

const STUDENT_COLUMNS: &str = "id, class_id, name, register_no, status, gender";
const SUBJECT_COLUMNS: &str = "id, class_id, name, max_marks, pass_marks, is_exam_subject";

impl Store for SqliteStore<'_> {
    fn classes(&self) -> Result<Vec<Class>, EngineError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, division FROM classes ORDER BY name, division")?;
        let rows = stmt
            .query_map([], |r| {
                Ok(Class {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    division: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn class(&self, class_id: &str) -> Result<Option<Class>, EngineError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, division FROM classes WHERE id = ?",
                [class_id],
                |r| {
                    Ok(Class {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        division: r.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    fn students_in_class(&self, class_id: &str) -> Result<Vec<Student>, EngineError> {
        let sql = format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE class_id = ? ORDER BY name, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([class_id], student_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn student(&self, student_id: &str) -> Result<Option<Student>, EngineError> {
        let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?");
        Ok(self
            .conn
            .query_row(&sql, [student_id], student_from_row)
            .optional()?)
    }

    fn subjects_for_class(&self, class_id: &str) -> Result<Vec<Subject>, EngineError> {
        let sql = format!(
            "SELECT {SUBJECT_COLUMNS} FROM subjects WHERE class_id = ? ORDER BY sort_order, name"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([class_id], subject_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn subject(&self, subject_id: &str) -> Result<Option<Subject>, EngineError> {
        let sql = format!("SELECT {SUBJECT_COLUMNS} FROM subjects WHERE id = ?");
        Ok(self
            .conn
            .query_row(&sql, [subject_id], subject_from_row)
            .optional()?)
    }

    fn exams(&self) -> Result<Vec<Exam>, EngineError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, status, date FROM exams ORDER BY date, name")?;
        let rows = stmt
            .query_map([], exam_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn exam(&self, exam_id: &str) -> Result<Option<Exam>, EngineError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, status, date FROM exams WHERE id = ?",
                [exam_id],
                exam_from_row,
            )
            .optional()?)
    }

    fn results_for_exam(&self, exam_id: &str) -> Result<Vec<ExamResult>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT exam_id, subject_id, student_id, marks FROM results WHERE exam_id = ?",
        )?;
        let rows = stmt
            .query_map([exam_id], result_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn results_for_exam_subject(
        &self,
        exam_id: &str,
        subject_id: &str,
    ) -> Result<Vec<ExamResult>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT exam_id, subject_id, student_id, marks
             FROM results
             WHERE exam_id = ? AND subject_id = ?",
        )?;
        let rows = stmt
            .query_map((exam_id, subject_id), result_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn attendance_for_class(
        &self,
        class_id: &str,
        period: Period,
    ) -> Result<Vec<AttendanceRecord>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT a.student_id, a.date, a.status
             FROM attendance_records a
             JOIN students s ON s.id = a.student_id
             WHERE s.class_id = ? AND a.date >= ? AND a.date < ?
             ORDER BY a.date",
        )?;
        let rows = stmt
            .query_map(
                (
                    class_id,
                    format_date(period.first_day()),
                    format_date(period.next_first_day()),
                ),
                |r| {
                    Ok(AttendanceRecord {
                        student_id: r.get(0)?,
                        date: date_col(r, 1)?,
                        status: r.get(2)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn activities_for_class(&self, class_id: &str) -> Result<Vec<Activity>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, class_id, title, active FROM activities WHERE class_id = ? ORDER BY title",
        )?;
        let rows = stmt
            .query_map([class_id], |r| {
                Ok(Activity {
                    id: r.get(0)?,
                    class_id: r.get(1)?,
                    title: r.get(2)?,
                    active: r.get::<_, i64>(3)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn submissions_for_class(
        &self,
        class_id: &str,
    ) -> Result<Vec<ActivitySubmission>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT sub.student_id, sub.activity_id, sub.status, sub.submitted_at
             FROM activity_submissions sub
             JOIN activities act ON act.id = sub.activity_id
             WHERE act.class_id = ?",
        )?;
        let rows = stmt
            .query_map([class_id], |r| {
                let raw: String = r.get(3)?;
                let submitted_at = parse_timestamp(&raw).ok_or_else(|| {
                    rusqlite::Error::FromSqlConversionFailure(
                        3,
                        Type::Text,
                        format!("bad timestamp: {raw}").into(),
                    )
                })?;
                Ok(ActivitySubmission {
                    student_id: r.get(0)?,
                    activity_id: r.get(1)?,
                    status: r.get(2)?,
                    submitted_at,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn prayers_for_class(
        &self,
        class_id: &str,
        period: Period,
    ) -> Result<Vec<PrayerRecord>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT p.student_id, p.date, p.prayers_json
             FROM prayer_records p
             JOIN students s ON s.id = p.student_id
             WHERE s.class_id = ? AND p.date >= ? AND p.date < ?
             ORDER BY p.date",
        )?;
        let rows = stmt
            .query_map(
                (
                    class_id,
                    format_date(period.first_day()),
                    format_date(period.next_first_day()),
                ),
                |r| {
                    let raw: String = r.get(2)?;
                    let prayers: BTreeMap<String, bool> =
                        serde_json::from_str(&raw).map_err(|e| conversion_err(2, e))?;
                    Ok(PrayerRecord {
                        student_id: r.get(0)?,
                        date: date_col(r, 1)?,
                        prayers,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn star_declaration(
        &self,
        class_id: &str,
        period: Period,
    ) -> Result<Option<StarDeclaration>, EngineError> {
        let status: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM star_declarations
                 WHERE class_id = ? AND month = ? AND year = ?",
                (class_id, period.month, period.year),
                |r| r.get(0),
            )
            .optional()?;
        Ok(status.map(|s| StarDeclaration {
            class_id: class_id.to_string(),
            period,
            status: DeclarationStatus::parse(&s).unwrap_or(DeclarationStatus::Hidden),
        }))
    }

    fn score_config(&self, scope: Option<&str>) -> Result<ScoreConfig, EngineError> {
        db::load_score_config(self.conn, scope)
    }

    fn upsert_results(
        &self,
        exam_id: &str,
        subject_id: &str,
        records: &[MarkRecord],
    ) -> Result<UpsertOutcome, EngineError> {
        let tx = self.conn.unchecked_transaction()?;
        let now = format_timestamp(Utc::now().naive_utc());
        let mut outcome = UpsertOutcome::default();
        for rec in records {
            let existing: Option<f64> = tx
                .query_row(
                    "SELECT marks FROM results
                     WHERE exam_id = ? AND subject_id = ? AND student_id = ?",
                    (exam_id, subject_id, &rec.student_id),
                    |r| r.get(0),
                )
                .optional()?;
            match existing {
                Some(m) if same_marks(m, rec.marks) => {
                    outcome.unchanged += 1;
                    continue;
                }
                Some(_) => outcome.updated += 1,
                None => outcome.inserted += 1,
            }
            tx.execute(
                "INSERT INTO results(id, exam_id, subject_id, student_id, marks, updated_at)
                 VALUES(?, ?, ?, ?, ?, ?)
                 ON CONFLICT(exam_id, subject_id, student_id) DO UPDATE SET
                   marks = excluded.marks,
                   updated_at = excluded.updated_at",
                (
                    Uuid::new_v4().to_string(),
                    exam_id,
                    subject_id,
                    &rec.student_id,
                    rec.marks,
                    &now,
                ),
            )?;
        }
        tx.commit()?;
        Ok(outcome)
    }

    fn delete_results(
        &self,
        exam_id: &str,
        subject_id: &str,
        student_ids: &[String],
    ) -> Result<usize, EngineError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut deleted = 0usize;
        for sid in student_ids {
            deleted += tx.execute(
                "DELETE FROM results WHERE exam_id = ? AND subject_id = ? AND student_id = ?",
                (exam_id, subject_id, sid),
            )?;
        }
        tx.commit()?;
        Ok(deleted)
    }

    fn set_student_class(&self, student_id: &str, class_id: &str) -> Result<(), EngineError> {
        let changed = self.conn.execute(
            "UPDATE students SET class_id = ?, updated_at = ? WHERE id = ?",
            (
                class_id,
                format_timestamp(Utc::now().naive_utc()),
                student_id,
            ),
        )?;
        if changed == 0 {
            return Err(EngineError::NotFound("student"));
        }
        Ok(())
    }

    fn set_star_declaration(
        &self,
        class_id: &str,
        period: Period,
        status: DeclarationStatus,
    ) -> Result<(), EngineError> {
        self.conn.execute(
            "INSERT INTO star_declarations(class_id, month, year, status, updated_at)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(class_id, month, year) DO UPDATE SET
               status = excluded.status,
               updated_at = excluded.updated_at",
            (
                class_id,
                period.month,
                period.year,
                status.as_str(),
                format_timestamp(Utc::now().naive_utc()),
            ),
        )?;
        Ok(())
    }
}

//! Plain record plumbing: the rows the evaluation engine reads.

use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

use crate::error::EngineError;
use crate::ipc::helpers::{
    get_opt_bool, get_opt_str, get_required_f64, get_required_str, parse_audience, with_db,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{ExamStatus, StudentStatus};
use crate::reconcile;
use crate::results;
use crate::store::{format_date, format_timestamp, parse_timestamp, SqliteStore, Store};

fn parse_date(params: &Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    let raw = get_required_str(params, key)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key)))
}

fn require_class(store: &SqliteStore<'_>, class_id: &str) -> Result<(), HandlerErr> {
    match store.class(class_id)? {
        Some(_) => Ok(()),
        None => Err(EngineError::NotFound("class").into()),
    }
}

fn require_student(store: &SqliteStore<'_>, student_id: &str) -> Result<(), HandlerErr> {
    match store.student(student_id)? {
        Some(_) => Ok(()),
        None => Err(EngineError::NotFound("student").into()),
    }
}

fn classes_list(conn: &Connection, _params: &Value) -> Result<Value, HandlerErr> {
    let store = SqliteStore::new(conn);
    let classes = store.classes()?;
    Ok(json!({ "classes": classes }))
}

fn classes_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let division = get_opt_str(params, "division").unwrap_or_default();
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, name, division) VALUES(?, ?, ?)",
        (&id, &name, &division),
    )?;
    Ok(json!({ "classId": id }))
}

fn students_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let store = SqliteStore::new(conn);
    require_class(&store, &class_id)?;
    let students = store.students_in_class(&class_id)?;
    Ok(json!({ "students": students }))
}

fn students_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let name = get_required_str(params, "name")?;
    let status = match get_opt_str(params, "status") {
        None => StudentStatus::Active,
        Some(s) => StudentStatus::parse(&s)
            .ok_or_else(|| HandlerErr::bad_params("status must be active or inactive"))?,
    };
    let store = SqliteStore::new(conn);
    require_class(&store, &class_id)?;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, class_id, name, register_no, status, gender, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &class_id,
            &name,
            get_opt_str(params, "registerNo"),
            status.as_str(),
            get_opt_str(params, "gender"),
            format_timestamp(Utc::now().naive_utc()),
        ),
    )?;
    Ok(json!({ "studentId": id }))
}

fn subjects_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let store = SqliteStore::new(conn);
    require_class(&store, &class_id)?;
    let subjects = store.subjects_for_class(&class_id)?;
    Ok(json!({ "subjects": subjects }))
}

fn subjects_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let name = get_required_str(params, "name")?;
    let max_marks = get_required_f64(params, "maxMarks")?;
    let pass_marks = get_required_f64(params, "passMarks")?;
    if !max_marks.is_finite() || max_marks <= 0.0 {
        return Err(HandlerErr {
            code: "bad_params",
            message: "maxMarks must be greater than zero".to_string(),
            details: Some(json!({ "maxMarks": max_marks })),
        });
    }
    if !pass_marks.is_finite() || pass_marks < 0.0 || pass_marks > max_marks {
        return Err(HandlerErr {
            code: "bad_params",
            message: "passMarks must be between 0 and maxMarks".to_string(),
            details: Some(json!({ "passMarks": pass_marks, "maxMarks": max_marks })),
        });
    }
    // Read untrimmed: the id must match its `[id]` header tag exactly.
    let id = match params.get("subjectId").and_then(|v| v.as_str()) {
        Some(id) if !reconcile::valid_subject_id(id) => {
            return Err(HandlerErr {
                code: "bad_params",
                message: "subjectId must not contain brackets or surrounding whitespace"
                    .to_string(),
                details: Some(json!({ "subjectId": id })),
            });
        }
        Some(id) => id.to_string(),
        None => Uuid::new_v4().to_string(),
    };
    let is_exam_subject = get_opt_bool(params, "isExamSubject")?.unwrap_or(true);
    let store = SqliteStore::new(conn);
    require_class(&store, &class_id)?;

    let sort_order: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM subjects WHERE class_id = ?",
        [&class_id],
        |r| r.get(0),
    )?;
    conn.execute(
        "INSERT INTO subjects(
            id, class_id, name, max_marks, pass_marks, is_exam_subject, sort_order
         ) VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &class_id,
            &name,
            max_marks,
            pass_marks,
            is_exam_subject as i64,
            sort_order,
        ),
    )?;
    Ok(json!({ "subjectId": id }))
}

fn parse_exam_status(raw: &str) -> Result<ExamStatus, HandlerErr> {
    ExamStatus::parse(raw)
        .ok_or_else(|| HandlerErr::bad_params("status must be draft or published"))
}

fn exams_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let audience = parse_audience(params)?;
    let store = SqliteStore::new(conn);
    let exams = results::visible_exams(&store, audience)?;
    Ok(json!({ "exams": exams }))
}

fn exams_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let status = match get_opt_str(params, "status") {
        Some(s) => parse_exam_status(&s)?,
        None => ExamStatus::Draft,
    };
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO exams(id, name, status, date) VALUES(?, ?, ?, ?)",
        (&id, &name, status.as_str(), get_opt_str(params, "date")),
    )?;
    Ok(json!({ "examId": id }))
}

fn exams_set_status(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let exam_id = get_required_str(params, "examId")?;
    let status = parse_exam_status(&get_required_str(params, "status")?)?;
    let changed = conn.execute(
        "UPDATE exams SET status = ? WHERE id = ?",
        (status.as_str(), &exam_id),
    )?;
    if changed == 0 {
        return Err(EngineError::NotFound("exam").into());
    }
    Ok(json!({ "ok": true }))
}

fn attendance_record(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let date = parse_date(params, "date")?;
    let status = get_required_str(params, "status")?.to_ascii_lowercase();
    require_student(&SqliteStore::new(conn), &student_id)?;

    conn.execute(
        "INSERT INTO attendance_records(id, student_id, date, status)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(student_id, date) DO UPDATE SET status = excluded.status",
        (Uuid::new_v4().to_string(), &student_id, format_date(date), &status),
    )?;
    Ok(json!({ "ok": true }))
}

fn activities_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let store = SqliteStore::new(conn);
    require_class(&store, &class_id)?;
    let activities = store.activities_for_class(&class_id)?;
    Ok(json!({ "activities": activities }))
}

fn activities_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let title = get_required_str(params, "title")?;
    let active = get_opt_bool(params, "active")?.unwrap_or(true);
    require_class(&SqliteStore::new(conn), &class_id)?;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO activities(id, class_id, title, active) VALUES(?, ?, ?, ?)",
        (&id, &class_id, &title, active as i64),
    )?;
    Ok(json!({ "activityId": id }))
}

fn activities_submit(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let activity_id = get_required_str(params, "activityId")?;
    let status = get_opt_str(params, "status")
        .unwrap_or_else(|| "completed".to_string())
        .to_ascii_lowercase();
    let submitted_at = match get_opt_str(params, "submittedAt") {
        Some(raw) => parse_timestamp(&raw)
            .ok_or_else(|| HandlerErr::bad_params("submittedAt must be a timestamp"))?,
        None => Utc::now().naive_utc(),
    };
    let store = SqliteStore::new(conn);
    require_student(&store, &student_id)?;
    let known: Option<i64> = conn
        .query_row("SELECT 1 FROM activities WHERE id = ?", [&activity_id], |r| r.get(0))
        .optional()?;
    if known.is_none() {
        return Err(EngineError::NotFound("activity").into());
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO activity_submissions(id, student_id, activity_id, status, submitted_at)
         VALUES(?, ?, ?, ?, ?)",
        (
            &id,
            &student_id,
            &activity_id,
            &status,
            format_timestamp(submitted_at),
        ),
    )?;
    Ok(json!({ "submissionId": id }))
}

fn prayers_record(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let date = parse_date(params, "date")?;
    let flags = params
        .get("prayers")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("missing prayers"))?;
    let mut prayers: BTreeMap<String, bool> = BTreeMap::new();
    for (name, v) in flags {
        let done = v
            .as_bool()
            .ok_or_else(|| HandlerErr::bad_params(format!("prayers.{} must be a boolean", name)))?;
        prayers.insert(name.clone(), done);
    }
    require_student(&SqliteStore::new(conn), &student_id)?;

    conn.execute(
        "INSERT INTO prayer_records(id, student_id, date, prayers_json)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(student_id, date) DO UPDATE SET prayers_json = excluded.prayers_json",
        (
            Uuid::new_v4().to_string(),
            &student_id,
            format_date(date),
            serde_json::to_string(&prayers)?,
        ),
    )?;
    debug!(student_id = %student_id, date = %date, "prayers recorded");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: fn(&Connection, &Value) -> Result<Value, HandlerErr> = match req.method.as_str() {
        "classes.list" => classes_list,
        "classes.create" => classes_create,
        "students.list" => students_list,
        "students.create" => students_create,
        "subjects.list" => subjects_list,
        "subjects.create" => subjects_create,
        "exams.list" => exams_list,
        "exams.create" => exams_create,
        "exams.setStatus" => exams_set_status,
        "attendance.record" => attendance_record,
        "activities.list" => activities_list,
        "activities.create" => activities_create,
        "activities.submit" => activities_submit,
        "prayers.record" => prayers_record,
        _ => return None,
    };
    Some(with_db(state, req, f))
}

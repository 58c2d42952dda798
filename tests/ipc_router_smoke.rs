mod common;

use common::{str_field, temp_dir, Sidecar};
use serde_json::json;

#[test]
fn data_methods_need_a_workspace() {
    let mut sc = Sidecar::spawn();
    let health = sc.ok("health", json!({}));
    assert!(health.get("version").is_some());
    assert!(health.get("workspacePath").map(|v| v.is_null()).unwrap_or(false));

    assert_eq!(sc.err_code("classes.list", json!({})), "no_workspace");
    assert_eq!(sc.err_code("stars.scores", json!({ "classId": "x" })), "no_workspace");
    assert_eq!(sc.err_code("workspace.select", json!({})), "bad_params");
    sc.shutdown();
}

#[test]
fn bad_json_and_unknown_methods_are_reported() {
    let mut sc = Sidecar::spawn();
    let resp = sc.send_line("{not json");
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(resp["error"]["code"], json!("bad_json"));
    assert!(resp.get("id").is_none());

    assert_eq!(sc.err_code("grid.get", json!({})), "not_implemented");
    sc.shutdown();
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let (mut sc, workspace) = Sidecar::with_workspace("meritd-router-smoke");
    assert!(workspace.join("meritd.sqlite3").is_file());

    let class_id = sc.create_class("5", "A");
    let student_id = sc.create_student(&class_id, "Asha", true);
    let subject_id = sc.create_subject(&class_id, "Mathematics", 100.0, 40.0);
    let exam_id = sc.create_exam("Term 1", "published");

    let classes = sc.ok("classes.list", json!({}));
    assert_eq!(classes["classes"].as_array().map(|a| a.len()), Some(1));
    sc.ok("students.list", json!({ "classId": class_id }));
    sc.ok("subjects.list", json!({ "classId": class_id }));
    sc.ok("exams.list", json!({ "audience": "mentor" }));
    sc.ok(
        "attendance.record",
        json!({ "studentId": student_id, "date": "2026-03-02", "status": "present" }),
    );
    let act = sc.ok("activities.create", json!({ "classId": class_id, "title": "Essay" }));
    sc.ok(
        "activities.submit",
        json!({
            "studentId": student_id,
            "activityId": str_field(&act, "activityId"),
            "submittedAt": "2026-03-03T10:00:00Z"
        }),
    );
    sc.ok(
        "prayers.record",
        json!({ "studentId": student_id, "date": "2026-03-02", "prayers": { "fajr": true } }),
    );

    sc.upsert_marks(&exam_id, &subject_id, &[(student_id.as_str(), 55.0)]);
    sc.ok("results.list", json!({ "examId": exam_id }));
    sc.ok("results.leaderboard", json!({ "examId": exam_id, "classId": class_id }));
    sc.ok("results.reportCard", json!({ "examId": exam_id, "classId": class_id }));
    sc.ok("promotion.planSchool", json!({ "mode": "direct" }));
    sc.ok("stars.config.get", json!({}));
    sc.ok(
        "stars.status",
        json!({ "classId": class_id, "now": "2026-03-10T00:00:00Z" }),
    );
    sc.ok(
        "stars.scores",
        json!({ "classId": class_id, "month": 3, "year": 2026, "audience": "mentor" }),
    );
    sc.ok("marks.exportCsv", json!({ "examId": exam_id }));

    let tmp = temp_dir("meritd-router-smoke-out");
    let out = tmp.join("marks.csv");
    sc.ok(
        "marks.exportCsv",
        json!({ "examId": exam_id, "outPath": out.to_string_lossy() }),
    );
    assert!(out.is_file());
    sc.ok(
        "marks.importCsv",
        json!({ "examId": exam_id, "path": out.to_string_lossy() }),
    );
    sc.shutdown();
}

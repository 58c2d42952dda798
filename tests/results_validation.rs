mod common;

use common::Sidecar;
use serde_json::{json, Value};

fn rows(v: &Value) -> &Vec<Value> {
    v["rows"].as_array().expect("rows")
}

#[test]
fn upsert_rejects_invalid_marks_before_writing() {
    let (mut sc, _ws) = Sidecar::with_workspace("meritd-results-validation");
    let c5a = sc.create_class("5", "A");
    let c5b = sc.create_class("5", "B");
    let s1 = sc.create_student(&c5a, "Asha", true);
    let other = sc.create_student(&c5b, "Other", true);
    let math = sc.create_subject(&c5a, "Mathematics", 100.0, 40.0);
    let exam = sc.create_exam("Term 1", "published");

    let upsert = |student: &str, marks: f64| {
        json!({
            "examId": exam,
            "subjectId": math,
            "records": [{ "studentId": student, "marks": marks }]
        })
    };
    assert_eq!(sc.err_code("results.upsert", upsert(&s1, 101.0)), "bad_params");
    assert_eq!(sc.err_code("results.upsert", upsert(&s1, -2.0)), "bad_params");
    assert_eq!(sc.err_code("results.upsert", upsert(&other, 10.0)), "bad_params");
    assert_eq!(
        sc.err_code(
            "results.upsert",
            json!({ "examId": "nope", "subjectId": math, "records": [] })
        ),
        "not_found"
    );
    let listed = sc.ok("results.list", json!({ "examId": exam }));
    assert_eq!(listed["results"], json!([]));

    let art = sc.ok(
        "subjects.create",
        json!({
            "classId": c5a, "name": "Art", "maxMarks": 10.0, "passMarks": 0.0,
            "isExamSubject": false
        }),
    )["subjectId"]
        .as_str()
        .expect("subjectId")
        .to_string();
    assert_eq!(
        sc.err_code(
            "results.upsert",
            json!({
                "examId": exam,
                "subjectId": art,
                "records": [{ "studentId": s1, "marks": 5.0 }]
            })
        ),
        "bad_params"
    );
    assert_eq!(
        sc.err_code(
            "subjects.create",
            json!({ "classId": c5a, "name": "Bad", "maxMarks": 50.0, "passMarks": 60.0 })
        ),
        "bad_params"
    );

    sc.upsert_marks(&exam, &math, &[(s1.as_str(), 70.0)]);
    let again = sc.ok("results.upsert", upsert(&s1, 70.0));
    assert_eq!(again["unchanged"], json!(1));
    let deleted = sc.ok(
        "results.delete",
        json!({ "examId": exam, "subjectId": math, "studentIds": [s1] }),
    );
    assert_eq!(deleted["deleted"], json!(1));
    sc.shutdown();
}

#[test]
fn leaderboard_and_report_card_use_different_bases() {
    let (mut sc, _ws) = Sidecar::with_workspace("meritd-results-views");
    let c5a = sc.create_class("5", "A");
    let asha = sc.create_student(&c5a, "Asha", true);
    let bilal = sc.create_student(&c5a, "Bilal", true);
    let chen = sc.create_student(&c5a, "Chen", true);
    let dara = sc.create_student(&c5a, "Dara", true);
    let math = sc.create_subject(&c5a, "Mathematics", 100.0, 40.0);
    let sci = sc.create_subject(&c5a, "Science", 100.0, 40.0);
    let exam = sc.create_exam("Term 1", "draft");

    sc.upsert_marks(
        &exam,
        &math,
        &[
            (asha.as_str(), 90.0),
            (bilal.as_str(), 80.0),
            (chen.as_str(), 80.0),
            (dara.as_str(), 70.0),
        ],
    );
    sc.upsert_marks(
        &exam,
        &sci,
        &[
            (asha.as_str(), 90.0),
            (bilal.as_str(), 80.0),
            (chen.as_str(), 80.0),
        ],
    );

    let params = json!({ "examId": exam, "classId": c5a });
    assert_eq!(sc.err_code("results.leaderboard", params.clone()), "not_found");
    let student_exams = sc.ok("exams.list", json!({}));
    assert_eq!(student_exams["exams"], json!([]));

    sc.ok("exams.setStatus", json!({ "examId": exam, "status": "published" }));
    let board = sc.ok("results.leaderboard", params.clone());
    let ranks: Vec<u64> = rows(&board)
        .iter()
        .map(|r| r["rank"].as_u64().unwrap_or(0))
        .collect();
    assert_eq!(ranks, vec![1, 2, 2, 4]);
    let last = &rows(&board)[3];
    assert_eq!(last["studentId"], json!(dara));
    assert_eq!(last["totalMaxMarks"], json!(100.0));
    assert_eq!(last["marksMissed"], json!(30.0));

    let card = sc.ok("results.reportCard", params);
    let dara_row = rows(&card)
        .iter()
        .find(|r| r["studentId"] == json!(dara))
        .expect("dara row");
    assert_eq!(dara_row["totalMaxMarks"], json!(200.0));
    assert_eq!(dara_row["percentage"], json!(35.0));
    assert_eq!(dara_row["status"], json!("unknown"));
    sc.shutdown();
}

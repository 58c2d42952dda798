mod common;

use common::Sidecar;
use serde_json::{json, Value};

fn candidate<'a>(plan: &'a Value, student_id: &str) -> &'a Value {
    plan["candidates"]
        .as_array()
        .expect("candidates")
        .iter()
        .find(|c| c["studentId"] == json!(student_id))
        .unwrap_or_else(|| panic!("no candidate {}", student_id))
}

#[test]
fn exam_based_plan_classifies_failed_unknown_and_passed() {
    let (mut sc, _ws) = Sidecar::with_workspace("meritd-eligibility");
    let c5a = sc.create_class("5", "A");
    let c6a = sc.create_class("6", "A");
    let failed = sc.create_student(&c5a, "Asha", true);
    let missing = sc.create_student(&c5a, "Bilal", true);
    let passed = sc.create_student(&c5a, "Chen", true);
    let a = sc.create_subject(&c5a, "A", 100.0, 40.0);
    let b = sc.create_subject(&c5a, "B", 100.0, 40.0);
    let exam = sc.create_exam("Finals", "published");

    sc.upsert_marks(&exam, &a, &[(failed.as_str(), 30.0), (passed.as_str(), 40.0)]);
    sc.upsert_marks(
        &exam,
        &b,
        &[(failed.as_str(), 60.0), (missing.as_str(), 60.0), (passed.as_str(), 90.0)],
    );

    let plan = sc.ok(
        "promotion.plan",
        json!({ "mode": "exam", "examId": exam, "sourceClassId": c5a, "targetClassId": c6a }),
    );

    let f = candidate(&plan, &failed);
    assert_eq!(f["status"], json!("failed"));
    assert_eq!(f["detail"], json!("Failed 1 subjects"));
    assert_eq!(f["selected"], json!(false));

    let m = candidate(&plan, &missing);
    assert_eq!(m["status"], json!("unknown"));
    assert_eq!(m["detail"], json!("Missing 1 subjects"));
    assert_eq!(m["selected"], json!(false));

    let p = candidate(&plan, &passed);
    assert_eq!(p["status"], json!("passed"));
    assert_eq!(p["selected"], json!(true));

    assert_eq!(
        sc.err_code(
            "promotion.plan",
            json!({ "examId": "nope", "sourceClassId": c5a, "targetClassId": c6a })
        ),
        "not_found"
    );
    sc.shutdown();
}

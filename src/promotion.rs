//! Class promotion: target matching, review plans, and batch execution.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::calc::eligibility::{classify, Eligibility, EligibilityStatus};
use crate::error::EngineError;
use crate::model::Class;
use crate::store::Store;

/// Next-grade class with the same division. Grade names that are not
/// integers never resolve.
pub fn resolve_target<'a>(source: &Class, classes: &'a [Class]) -> Option<&'a Class> {
    let grade: i64 = source.name.trim().parse().ok()?;
    let next = (grade + 1).to_string();
    classes
        .iter()
        .find(|c| c.id != source.id && c.name.trim() == next && c.division == source.division)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionMode {
    Direct,
    ByExam { exam_id: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassMapping {
    pub source_class_id: String,
    pub source_label: String,
    pub target_class_id: Option<String>,
    pub target_label: Option<String>,
    pub active_students: usize,
    /// Has a target and at least one active student.
    pub executable: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionCandidate {
    pub student_id: String,
    pub name: String,
    pub register_no: Option<String>,
    pub source_class_id: String,
    pub target_class_id: String,
    pub status: EligibilityStatus,
    pub detail: String,
    pub selected: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionPlan {
    pub mappings: Vec<ClassMapping>,
    pub candidates: Vec<PromotionCandidate>,
}

fn candidates_for<S: Store + ?Sized>(
    store: &S,
    source: &Class,
    target_class_id: &str,
    mode: &PromotionMode,
) -> Result<Vec<PromotionCandidate>, EngineError> {
    let students: Vec<_> = store
        .students_in_class(&source.id)?
        .into_iter()
        .filter(|s| s.is_active())
        .collect();

    let (subjects, results) = match mode {
        PromotionMode::Direct => (Vec::new(), Vec::new()),
        PromotionMode::ByExam { exam_id } => (
            store.subjects_for_class(&source.id)?,
            store.results_for_exam(exam_id)?,
        ),
    };

    Ok(students
        .into_iter()
        .map(|s| {
            let eligibility = match mode {
                PromotionMode::Direct => Eligibility::direct(),
                PromotionMode::ByExam { .. } => classify(&s.id, &subjects, &results),
            };
            PromotionCandidate {
                selected: eligibility.default_selected(),
                student_id: s.id,
                name: s.name,
                register_no: s.register_no,
                source_class_id: source.id.clone(),
                target_class_id: target_class_id.to_string(),
                status: eligibility.status,
                detail: eligibility.detail,
            }
        })
        .collect())
}

fn check_exam<S: Store + ?Sized>(store: &S, mode: &PromotionMode) -> Result<(), EngineError> {
    if let PromotionMode::ByExam { exam_id } = mode {
        if store.exam(exam_id)?.is_none() {
            return Err(EngineError::NotFound("exam"));
        }
    }
    Ok(())
}

/// Review plan for one explicitly chosen source and target class.
pub fn plan_class<S: Store + ?Sized>(
    store: &S,
    source_class_id: &str,
    target_class_id: &str,
    mode: &PromotionMode,
) -> Result<PromotionPlan, EngineError> {
    if source_class_id.trim().is_empty() || target_class_id.trim().is_empty() {
        return Err(EngineError::validation("select both a source and a target class"));
    }
    if source_class_id == target_class_id {
        return Err(EngineError::validation_with(
            "target class must differ from source class",
            json!({ "classId": source_class_id }),
        ));
    }
    let source = store
        .class(source_class_id)?
        .ok_or(EngineError::NotFound("class"))?;
    let target = store
        .class(target_class_id)?
        .ok_or(EngineError::NotFound("class"))?;
    check_exam(store, mode)?;

    let candidates = candidates_for(store, &source, &target.id, mode)?;
    let mapping = ClassMapping {
        source_class_id: source.id.clone(),
        source_label: source.label(),
        target_class_id: Some(target.id.clone()),
        target_label: Some(target.label()),
        active_students: candidates.len(),
        executable: !candidates.is_empty(),
    };
    debug!(
        source = %source.id,
        target = %target.id,
        candidates = candidates.len(),
        "class promotion planned"
    );
    Ok(PromotionPlan {
        mappings: vec![mapping],
        candidates,
    })
}

/// Review plan for every class. Mappings without a target stay in the plan
/// for review but contribute no candidates.
pub fn plan_school<S: Store + ?Sized>(
    store: &S,
    mode: &PromotionMode,
) -> Result<PromotionPlan, EngineError> {
    check_exam(store, mode)?;
    let classes = store.classes()?;

    let mut mappings = Vec::with_capacity(classes.len());
    let mut candidates = Vec::new();
    for source in &classes {
        let target = resolve_target(source, &classes);
        let active_students = store
            .students_in_class(&source.id)?
            .iter()
            .filter(|s| s.is_active())
            .count();
        let executable = target.is_some() && active_students > 0;
        if let (true, Some(t)) = (executable, target) {
            candidates.extend(candidates_for(store, source, &t.id, mode)?);
        }
        mappings.push(ClassMapping {
            source_class_id: source.id.clone(),
            source_label: source.label(),
            target_class_id: target.map(|t| t.id.clone()),
            target_label: target.map(Class::label),
            active_students,
            executable,
        });
    }
    debug!(
        classes = mappings.len(),
        candidates = candidates.len(),
        "school promotion planned"
    );
    Ok(PromotionPlan {
        mappings,
        candidates,
    })
}

/// One reviewed move. The target is the one recorded at review time.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionMove {
    pub student_id: String,
    pub target_class_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedMove {
    pub student_id: String,
    pub reason: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedMove {
    pub student_id: String,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionSummary {
    pub moved: usize,
    pub source_classes: usize,
    pub skipped: Vec<SkippedMove>,
    pub failed: Vec<FailedMove>,
}

/// Apply the reviewed moves one student at a time. A failed write leaves the
/// earlier ones in place.
pub fn execute<S: Store + ?Sized>(
    store: &S,
    moves: &[PromotionMove],
) -> Result<PromotionSummary, EngineError> {
    if moves.is_empty() {
        return Err(EngineError::validation("no students selected for promotion"));
    }

    let mut class_exists: HashMap<String, bool> = HashMap::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut sources: BTreeSet<String> = BTreeSet::new();
    let mut skipped = Vec::new();
    let mut failed = Vec::new();
    let mut moved = 0usize;

    for m in moves {
        let skip = |reason| SkippedMove {
            student_id: m.student_id.clone(),
            reason,
        };
        let fail = |e: EngineError| {
            warn!(student_id = %m.student_id, error = %e, "promotion lookup failed");
            FailedMove {
                student_id: m.student_id.clone(),
                code: e.code(),
                message: e.to_string(),
            }
        };
        if !seen.insert(m.student_id.as_str()) {
            skipped.push(skip("duplicate"));
            continue;
        }
        let target_exists = match class_exists.get(&m.target_class_id) {
            Some(v) => *v,
            None => match store.class(&m.target_class_id) {
                Ok(found) => {
                    let v = found.is_some();
                    class_exists.insert(m.target_class_id.clone(), v);
                    v
                }
                Err(e) => {
                    failed.push(fail(e));
                    continue;
                }
            },
        };
        if !target_exists {
            skipped.push(skip("target_not_found"));
            continue;
        }
        let student = match store.student(&m.student_id) {
            Ok(Some(s)) => s,
            Ok(None) => {
                skipped.push(skip("not_found"));
                continue;
            }
            Err(e) => {
                failed.push(fail(e));
                continue;
            }
        };
        if !student.is_active() {
            skipped.push(skip("inactive"));
            continue;
        }
        if student.class_id == m.target_class_id {
            skipped.push(skip("already_in_target"));
            continue;
        }
        match store.set_student_class(&student.id, &m.target_class_id) {
            Ok(()) => {
                moved += 1;
                sources.insert(student.class_id);
            }
            Err(e) => {
                warn!(student_id = %student.id, error = %e, "promotion write failed");
                failed.push(FailedMove {
                    student_id: student.id,
                    code: e.code(),
                    message: e.to_string(),
                });
            }
        }
    }

    info!(
        requested = moves.len(),
        moved,
        source_classes = sources.len(),
        skipped = skipped.len(),
        failed = failed.len(),
        "promotion executed"
    );
    Ok(PromotionSummary {
        moved,
        source_classes: sources.len(),
        skipped,
        failed,
    })
}

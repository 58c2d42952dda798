//! Star-of-the-month visibility per class and period.
//!
//! Stored state is `Hidden` or `Declared`. Visibility is computed at read time:
//! once the period has ended the results are visible whatever was stored, and
//! no further transition is accepted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::error::EngineError;
use crate::model::{DeclarationStatus, Period};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Declare,
    Undo,
}

impl Transition {
    fn label(self) -> &'static str {
        match self {
            Self::Declare => "declare",
            Self::Undo => "undo",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarationView {
    pub class_id: String,
    pub month: u32,
    pub year: i32,
    pub stored: DeclarationStatus,
    pub period_ended: bool,
    pub visible: bool,
    pub can_transition: bool,
}

pub fn is_visible(stored: DeclarationStatus, period: Period, now: DateTime<Utc>) -> bool {
    period.has_ended(now) || stored == DeclarationStatus::Declared
}

pub fn view(
    class_id: &str,
    stored: Option<DeclarationStatus>,
    period: Period,
    now: DateTime<Utc>,
) -> DeclarationView {
    let stored = stored.unwrap_or(DeclarationStatus::Hidden);
    DeclarationView {
        class_id: class_id.to_string(),
        month: period.month,
        year: period.year,
        stored,
        period_ended: period.has_ended(now),
        visible: is_visible(stored, period, now),
        can_transition: period.contains(now),
    }
}

/// Next stored state, or a validation error when the move is not allowed.
pub fn next_status(
    current: DeclarationStatus,
    transition: Transition,
    period: Period,
    now: DateTime<Utc>,
) -> Result<DeclarationStatus, EngineError> {
    let details = json!({
        "month": period.month,
        "year": period.year,
        "transition": transition.label(),
    });
    if period.has_ended(now) {
        return Err(EngineError::validation_with(
            "period has ended; results are already visible",
            details,
        ));
    }
    if !period.contains(now) {
        return Err(EngineError::validation_with(
            "period has not started yet",
            details,
        ));
    }
    match (current, transition) {
        (DeclarationStatus::Hidden, Transition::Declare) => Ok(DeclarationStatus::Declared),
        (DeclarationStatus::Declared, Transition::Undo) => Ok(DeclarationStatus::Hidden),
        (DeclarationStatus::Declared, Transition::Declare) => Err(
            EngineError::validation_with("results are already declared", details),
        ),
        (DeclarationStatus::Hidden, Transition::Undo) => Err(EngineError::validation_with(
            "results are not declared",
            details,
        )),
    }
}

pub fn status<S: Store + ?Sized>(
    store: &S,
    class_id: &str,
    period: Period,
    now: DateTime<Utc>,
) -> Result<DeclarationView, EngineError> {
    if store.class(class_id)?.is_none() {
        return Err(EngineError::NotFound("class"));
    }
    let stored = store.star_declaration(class_id, period)?.map(|d| d.status);
    Ok(view(class_id, stored, period, now))
}

pub fn apply<S: Store + ?Sized>(
    store: &S,
    class_id: &str,
    period: Period,
    transition: Transition,
    now: DateTime<Utc>,
) -> Result<DeclarationView, EngineError> {
    if store.class(class_id)?.is_none() {
        return Err(EngineError::NotFound("class"));
    }
    let current = store
        .star_declaration(class_id, period)?
        .map(|d| d.status)
        .unwrap_or(DeclarationStatus::Hidden);
    let next = next_status(current, transition, period, now)?;
    store.set_star_declaration(class_id, period, next)?;
    info!(
        class_id,
        month = period.month,
        year = period.year,
        transition = transition.label(),
        "star declaration updated"
    );
    Ok(view(class_id, Some(next), period, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::*;
    use crate::store::SqliteStore;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn hidden_becomes_visible_after_period_ends() {
        let period = Period::new(3, 2026).unwrap();
        assert!(!is_visible(DeclarationStatus::Hidden, period, at(2026, 3, 15)));
        assert!(is_visible(DeclarationStatus::Hidden, period, at(2026, 4, 1)));
        assert!(is_visible(DeclarationStatus::Declared, period, at(2026, 3, 15)));
    }

    #[test]
    fn transitions_only_inside_the_period() {
        let period = Period::new(3, 2026).unwrap();
        assert_eq!(
            next_status(DeclarationStatus::Hidden, Transition::Declare, period, at(2026, 3, 10))
                .unwrap(),
            DeclarationStatus::Declared
        );
        assert_eq!(
            next_status(DeclarationStatus::Declared, Transition::Undo, period, at(2026, 3, 10))
                .unwrap(),
            DeclarationStatus::Hidden
        );
        let declare =
            |now| next_status(DeclarationStatus::Hidden, Transition::Declare, period, now);
        assert!(declare(at(2026, 4, 2)).is_err());
        assert!(declare(at(2026, 2, 2)).is_err());
    }

    #[test]
    fn repeated_declare_is_rejected() {
        let period = Period::new(3, 2026).unwrap();
        let now = at(2026, 3, 10);
        let e = next_status(DeclarationStatus::Declared, Transition::Declare, period, now)
            .unwrap_err();
        assert_eq!(e.code(), "bad_params");
    }

    #[test]
    fn apply_persists_and_undo_hides_again() {
        let conn = memory_conn();
        add_class(&conn, "c5a", "5", "A");
        let store = SqliteStore::new(&conn);
        let period = Period::new(3, 2026).unwrap();
        let now = at(2026, 3, 20);

        let initial = status(&store, "c5a", period, now).unwrap();
        assert_eq!(initial.stored, DeclarationStatus::Hidden);
        assert!(!initial.visible);

        let declared = apply(&store, "c5a", period, Transition::Declare, now).unwrap();
        assert!(declared.visible);
        let undone = apply(&store, "c5a", period, Transition::Undo, now).unwrap();
        assert!(!undone.visible);

        let later = status(&store, "c5a", period, at(2026, 5, 1)).unwrap();
        assert_eq!(later.stored, DeclarationStatus::Hidden);
        assert!(later.visible);
        assert!(!later.can_transition);
    }
}

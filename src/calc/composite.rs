use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

use crate::calc::rank::{competition_ranks, desc, scores_equal};
use crate::calc::{percent_of, round_off_2_decimals};
use crate::model::{
    Activity, ActivitySubmission, AttendanceRecord, Period, PrayerRecord, ScoreConfig, Student,
};

/// Fixed daily prayer count used as the prayer denominator.
pub const DAILY_PRAYERS: usize = 5;

/// Everything the star board needs for one class and period.
pub struct StarInputs<'a> {
    pub students: &'a [Student],
    pub attendance: &'a [AttendanceRecord],
    pub activities: &'a [Activity],
    pub submissions: &'a [ActivitySubmission],
    pub prayers: &'a [PrayerRecord],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubScores {
    pub attendance: f64,
    pub activities: f64,
    pub prayer: f64,
}

impl SubScores {
    /// Mean of the enabled criteria only; zero when nothing is enabled.
    pub fn final_score(&self, config: &ScoreConfig) -> f64 {
        let mut sum = 0.0_f64;
        if config.attendance {
            sum += self.attendance;
        }
        if config.activities {
            sum += self.activities;
        }
        if config.prayer {
            sum += self.prayer;
        }
        match config.enabled_count() {
            0 => 0.0,
            n => sum / n as f64,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StarScore {
    pub student_id: String,
    pub name: String,
    pub register_no: Option<String>,
    pub attendance: f64,
    pub activities: f64,
    pub prayer: f64,
    pub final_score: f64,
    pub rank: u32,
    pub is_winner: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StarBoard {
    pub month: u32,
    pub year: i32,
    pub criteria: ScoreConfig,
    pub working_days: usize,
    pub active_activities: usize,
    pub top_score: f64,
    pub winners: Vec<String>,
    pub rows: Vec<StarScore>,
}

/// Distinct dates with any attendance entry for the class, floored at 1.
pub fn working_days(records: &[AttendanceRecord], period: Period) -> usize {
    records
        .iter()
        .filter(|r| period.contains_date(r.date))
        .map(|r| r.date)
        .collect::<BTreeSet<_>>()
        .len()
        .max(1)
}

pub fn attendance_score(
    student_id: &str,
    records: &[AttendanceRecord],
    period: Period,
    working_days: usize,
) -> f64 {
    let present_days = records
        .iter()
        .filter(|r| r.student_id == student_id && r.is_present() && period.contains_date(r.date))
        .map(|r| r.date)
        .collect::<BTreeSet<_>>()
        .len();
    percent_of(present_days as f64, working_days as f64)
}

/// Completed active activities in the period over the class's active
/// activities. Repeat submissions for one activity count once.
pub fn activities_score(
    student_id: &str,
    activities: &[Activity],
    submissions: &[ActivitySubmission],
    period: Period,
) -> f64 {
    let active: HashSet<&str> = activities
        .iter()
        .filter(|a| a.active)
        .map(|a| a.id.as_str())
        .collect();
    let completed = submissions
        .iter()
        .filter(|s| {
            s.student_id == student_id
                && s.is_completed()
                && active.contains(s.activity_id.as_str())
                && period.contains_date(s.submitted_at.date())
        })
        .map(|s| s.activity_id.as_str())
        .collect::<HashSet<_>>()
        .len();
    percent_of(completed as f64, active.len() as f64)
}

/// True prayer flags over `days_in_period * DAILY_PRAYERS`. A single day never
/// contributes more than `DAILY_PRAYERS`.
pub fn prayer_score(student_id: &str, prayers: &[PrayerRecord], period: Period) -> f64 {
    let true_flags: usize = prayers
        .iter()
        .filter(|p| p.student_id == student_id && period.contains_date(p.date))
        .map(|p| p.true_count().min(DAILY_PRAYERS))
        .sum();
    let denom = period.days() as usize * DAILY_PRAYERS;
    percent_of(true_flags as f64, denom as f64)
}

pub fn sub_scores(
    student_id: &str,
    inputs: &StarInputs<'_>,
    period: Period,
    working_days: usize,
) -> SubScores {
    SubScores {
        attendance: attendance_score(student_id, inputs.attendance, period, working_days),
        activities: activities_score(student_id, inputs.activities, inputs.submissions, period),
        prayer: prayer_score(student_id, inputs.prayers, period),
    }
}

/// Score every active student, rank by final score, and pick the winners.
///
/// Every student sharing the top score wins, as long as that score is above
/// zero.
pub fn compute_star_board(
    inputs: &StarInputs<'_>,
    period: Period,
    config: ScoreConfig,
) -> StarBoard {
    let wd = working_days(inputs.attendance, period);
    let active_activities = inputs.activities.iter().filter(|a| a.active).count();

    let mut rows: Vec<StarScore> = inputs
        .students
        .iter()
        .filter(|s| s.is_active())
        .map(|s| {
            let sub = sub_scores(&s.id, inputs, period, wd);
            StarScore {
                student_id: s.id.clone(),
                name: s.name.clone(),
                register_no: s.register_no.clone(),
                attendance: round_off_2_decimals(sub.attendance),
                activities: round_off_2_decimals(sub.activities),
                prayer: round_off_2_decimals(sub.prayer),
                final_score: round_off_2_decimals(sub.final_score(&config)),
                rank: 0,
                is_winner: false,
            }
        })
        .collect();

    rows.sort_by(|a, b| desc(a.final_score, b.final_score).then_with(|| a.name.cmp(&b.name)));
    let ranks = competition_ranks(&rows, |a, b| scores_equal(a.final_score, b.final_score));
    for (row, rank) in rows.iter_mut().zip(ranks) {
        row.rank = rank;
    }

    let top_score = rows.first().map(|r| r.final_score).unwrap_or(0.0);
    let mut winners = Vec::new();
    if top_score > 0.0 {
        for row in rows.iter_mut() {
            if scores_equal(row.final_score, top_score) {
                row.is_winner = true;
                winners.push(row.student_id.clone());
            }
        }
    }

    StarBoard {
        month: period.month,
        year: period.year,
        criteria: config,
        working_days: wd,
        active_activities,
        top_score,
        winners,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StudentStatus;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn student(id: &str, name: &str) -> Student {
        Student {
            id: id.to_string(),
            name: name.to_string(),
            register_no: None,
            class_id: "c5a".to_string(),
            status: StudentStatus::Active,
            gender: None,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, d).unwrap()
    }

    fn attendance(student_id: &str, d: u32, status: &str) -> AttendanceRecord {
        AttendanceRecord {
            student_id: student_id.to_string(),
            date: day(d),
            status: status.to_string(),
        }
    }

    fn activity(id: &str, active: bool) -> Activity {
        Activity {
            id: id.to_string(),
            class_id: "c5a".to_string(),
            title: id.to_string(),
            active,
        }
    }

    fn completed(student_id: &str, activity_id: &str, d: u32) -> ActivitySubmission {
        ActivitySubmission {
            student_id: student_id.to_string(),
            activity_id: activity_id.to_string(),
            status: "completed".to_string(),
            submitted_at: day(d).and_hms_opt(9, 0, 0).unwrap(),
        }
    }

    fn prayers(student_id: &str, d: u32, true_flags: usize) -> PrayerRecord {
        let mut map = BTreeMap::new();
        for i in 0..DAILY_PRAYERS {
            map.insert(format!("p{i}"), i < true_flags);
        }
        PrayerRecord {
            student_id: student_id.to_string(),
            date: day(d),
            prayers: map,
        }
    }

    /// 20 working days with 18 present, 3 of 5 activities done, and 80 true
    /// prayer flags in a 30-day month.
    fn reference_inputs() -> (
        Vec<Student>,
        Vec<AttendanceRecord>,
        Vec<Activity>,
        Vec<ActivitySubmission>,
        Vec<PrayerRecord>,
    ) {
        let students = vec![student("s1", "Asha"), student("s2", "Bilal")];
        let mut att = Vec::new();
        for d in 1..=20 {
            att.push(attendance("s1", d, if d <= 18 { "present" } else { "absent" }));
            att.push(attendance("s2", d, "absent"));
        }
        let acts = (1..=5)
            .map(|i| activity(&format!("a{i}"), true))
            .collect::<Vec<_>>();
        let subs = vec![
            completed("s1", "a1", 2),
            completed("s1", "a2", 3),
            completed("s1", "a3", 4),
        ];
        let mut pr = Vec::new();
        for d in 1..=16 {
            pr.push(prayers("s1", d, 5));
        }
        (students, att, acts, subs, pr)
    }

    #[test]
    fn reference_composite_blends_three_criteria() {
        let (students, att, acts, subs, pr) = reference_inputs();
        let inputs = StarInputs {
            students: &students,
            attendance: &att,
            activities: &acts,
            submissions: &subs,
            prayers: &pr,
        };
        let period = Period::new(4, 2026).unwrap();
        let board = compute_star_board(&inputs, period, ScoreConfig::default());

        assert_eq!(board.working_days, 20);
        let top = &board.rows[0];
        assert_eq!(top.student_id, "s1");
        assert_eq!(top.attendance, 90.0);
        assert_eq!(top.activities, 60.0);
        assert!((top.prayer - 53.33).abs() < 0.01);
        assert!((top.final_score - 67.78).abs() < 0.01);
        assert_eq!(board.winners, vec!["s1".to_string()]);
    }

    #[test]
    fn disabled_criteria_are_left_out_of_the_mean() {
        let sub = SubScores {
            attendance: 90.0,
            activities: 60.0,
            prayer: 0.0,
        };
        let cfg = ScoreConfig {
            attendance: true,
            activities: true,
            prayer: false,
        };
        assert_eq!(sub.final_score(&cfg), 75.0);
        let none = ScoreConfig {
            attendance: false,
            activities: false,
            prayer: false,
        };
        assert_eq!(sub.final_score(&none), 0.0);
    }

    #[test]
    fn ties_at_the_top_produce_multiple_winners() {
        let students = vec![student("s1", "Asha"), student("s2", "Bilal"), student("s3", "Chen")];
        let att = vec![
            attendance("s1", 1, "present"),
            attendance("s2", 1, "present"),
            attendance("s3", 1, "absent"),
        ];
        let inputs = StarInputs {
            students: &students,
            attendance: &att,
            activities: &[],
            submissions: &[],
            prayers: &[],
        };
        let cfg = ScoreConfig {
            attendance: true,
            activities: false,
            prayer: false,
        };
        let board = compute_star_board(&inputs, Period::new(4, 2026).unwrap(), cfg);
        assert_eq!(board.winners, vec!["s1".to_string(), "s2".to_string()]);
        let ranks: Vec<u32> = board.rows.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 1, 3]);
    }

    #[test]
    fn all_zero_scores_have_no_winner() {
        let students = vec![student("s1", "Asha")];
        let inputs = StarInputs {
            students: &students,
            attendance: &[],
            activities: &[],
            submissions: &[],
            prayers: &[],
        };
        let period = Period::new(4, 2026).unwrap();
        let board = compute_star_board(&inputs, period, ScoreConfig::default());
        assert!(board.winners.is_empty());
        assert_eq!(board.rows[0].rank, 1);
        assert_eq!(board.working_days, 1);
    }

    #[test]
    fn inactive_activities_and_other_months_are_ignored() {
        let acts = vec![activity("a1", true), activity("a2", false)];
        let mut late = completed("s1", "a1", 1);
        late.submitted_at = NaiveDate::from_ymd_opt(2026, 5, 2)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let subs = vec![completed("s1", "a2", 3), late];
        let score = activities_score("s1", &acts, &subs, Period::new(4, 2026).unwrap());
        assert_eq!(score, 0.0);
    }

    #[test]
    fn repeat_submissions_count_once() {
        let acts = vec![activity("a1", true), activity("a2", true)];
        let subs = vec![completed("s1", "a1", 3), completed("s1", "a1", 4)];
        let score = activities_score("s1", &acts, &subs, Period::new(4, 2026).unwrap());
        assert_eq!(score, 50.0);
    }
}

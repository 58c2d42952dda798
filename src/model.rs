use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    Active,
    Inactive,
}

impl StudentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub register_no: Option<String>,
    pub class_id: String,
    pub status: StudentStatus,
    pub gender: Option<String>,
}

impl Student {
    pub fn is_active(&self) -> bool {
        self.status == StudentStatus::Active
    }
}

/// A class is a grade name ("5") plus a division letter ("A").
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: String,
    pub name: String,
    pub division: String,
}

impl Class {
    pub fn label(&self) -> String {
        if self.division.is_empty() {
            self.name.clone()
        } else {
            format!("{}-{}", self.name, self.division)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub class_id: String,
    pub name: String,
    pub max_marks: f64,
    pub pass_marks: f64,
    pub is_exam_subject: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExamStatus {
    Draft,
    Published,
}

impl ExamStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "published" => Some(Self::Published),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: String,
    pub name: String,
    pub status: ExamStatus,
    pub date: Option<String>,
}

/// One stored mark, unique per (exam, subject, student).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResult {
    pub exam_id: String,
    pub subject_id: String,
    pub student_id: String,
    pub marks: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRecord {
    pub student_id: String,
    pub marks: f64,
}

#[derive(Debug, Clone)]
pub struct AttendanceRecord {
    pub student_id: String,
    pub date: NaiveDate,
    pub status: String,
}

impl AttendanceRecord {
    pub fn is_present(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("present")
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub class_id: String,
    pub title: String,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct ActivitySubmission {
    pub student_id: String,
    pub activity_id: String,
    pub status: String,
    pub submitted_at: NaiveDateTime,
}

impl ActivitySubmission {
    pub fn is_completed(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("completed")
    }
}

#[derive(Debug, Clone)]
pub struct PrayerRecord {
    pub student_id: String,
    pub date: NaiveDate,
    pub prayers: BTreeMap<String, bool>,
}

impl PrayerRecord {
    pub fn true_count(&self) -> usize {
        self.prayers.values().filter(|v| **v).count()
    }
}

/// A calendar month used as a scoring and declaration period (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Period {
    pub month: u32,
    pub year: i32,
}

impl Period {
    pub fn new(month: u32, year: i32) -> Result<Self, EngineError> {
        if !(1..=12).contains(&month) {
            return Err(EngineError::validation(format!(
                "month must be in 1..=12, got {month}"
            )));
        }
        if !(1970..=9999).contains(&year) {
            return Err(EngineError::validation(format!(
                "year must be in 1970..=9999, got {year}"
            )));
        }
        Ok(Self { month, year })
    }

    pub fn of(now: DateTime<Utc>) -> Self {
        Self {
            month: now.month(),
            year: now.year(),
        }
    }

    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// First day of the following month; the period is `[first_day, next_first_day)`.
    pub fn next_first_day(self) -> NaiveDate {
        let (y, m) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(y, m, 1).unwrap_or(NaiveDate::MAX)
    }

    pub fn days(self) -> u32 {
        (self.next_first_day() - self.first_day()).num_days() as u32
    }

    pub fn start(self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.first_day().and_hms_opt(0, 0, 0).unwrap_or_default())
    }

    pub fn end(self) -> DateTime<Utc> {
        Utc.from_utc_datetime(
            &self
                .next_first_day()
                .and_hms_opt(0, 0, 0)
                .unwrap_or_default(),
        )
    }

    pub fn contains_date(self, date: NaiveDate) -> bool {
        date >= self.first_day() && date < self.next_first_day()
    }

    pub fn contains(self, now: DateTime<Utc>) -> bool {
        now >= self.start() && now < self.end()
    }

    pub fn has_ended(self, now: DateTime<Utc>) -> bool {
        now >= self.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationStatus {
    Hidden,
    Declared,
}

impl DeclarationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hidden => "hidden",
            Self::Declared => "declared",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hidden" => Some(Self::Hidden),
            "declared" => Some(Self::Declared),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StarDeclaration {
    pub class_id: String,
    pub period: Period,
    pub status: DeclarationStatus,
}

/// Enabled criteria for the composite star score. Missing keys default to enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoreConfig {
    pub attendance: bool,
    pub activities: bool,
    pub prayer: bool,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            attendance: true,
            activities: true,
            prayer: true,
        }
    }
}

impl ScoreConfig {
    pub fn enabled_count(&self) -> usize {
        [self.attendance, self.activities, self.prayer]
            .iter()
            .filter(|v| **v)
            .count()
    }
}

/// Who is reading a view. Students never see draft exams or undeclared stars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Mentor,
    Student,
}

impl Audience {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mentor" => Some(Self::Mentor),
            "student" => Some(Self::Student),
            _ => None,
        }
    }
}

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Term names, in school-year order. Stored verbatim in records.
pub const TERMS: [&str; 3] = ["First Term", "Second Term", "Third Term"];

/// Timestamp shape shared by every `createdAt`/`updatedAt` field.
pub fn now_stamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Today's date in the register/payment `YYYY-MM-DD` shape.
pub fn today_string() -> String {
    Utc::now().date_naive().to_string()
}

/// Session label for a date, e.g. `2025/2026`. School years start in September.
pub fn session_for(date: NaiveDate) -> String {
    let y = date.year();
    if date.month() >= 9 {
        format!("{}/{}", y, y + 1)
    } else {
        format!("{}/{}", y - 1, y)
    }
}

fn default_subjects() -> Vec<String> {
    [
        "English Language",
        "Mathematics",
        "Basic Science",
        "Social Studies",
        "Civic Education",
        "Computer Studies",
        "Agricultural Science",
        "Physical & Health Education",
        "Creative Arts",
        "Religious Studies",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// School-wide singleton. One KV row; the UI's Settings view edits it whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub school_name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub motto: String,
    pub current_session: String,
    pub current_term: String,
    pub next_term_begins: Option<String>,
    /// Base64 data URLs; nullable so a fresh school renders without media.
    pub logo: Option<String>,
    pub principal_signature: Option<String>,
    pub subjects: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            school_name: String::new(),
            address: String::new(),
            phone: String::new(),
            email: String::new(),
            motto: String::new(),
            current_session: session_for(Utc::now().date_naive()),
            current_term: TERMS[0].to_string(),
            next_term_begins: None,
            logo: None,
            principal_signature: None,
            subjects: default_subjects(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Student {
    pub id: String,
    pub admission_no: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub class_id: Option<String>,
    pub guardian_name: String,
    pub guardian_phone: String,
    pub date_of_birth: Option<String>,
    pub passport: Option<String>,
    pub created_at: String,
}

impl Student {
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Teacher {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StaffMember {
    pub id: String,
    pub name: String,
    pub role: String,
    pub phone: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchoolClass {
    pub id: String,
    pub name: String,
    pub teacher_id: Option<String>,
    /// Per-class subject override; `None` means the settings list applies.
    pub subjects: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Fee {
    pub id: String,
    pub name: String,
    pub amount: f64,
    /// `None` bills every class in the school.
    pub class_id: Option<String>,
    pub session: String,
    pub term: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Payment {
    pub id: String,
    pub student_id: String,
    pub amount: f64,
    pub date: String,
    pub session: String,
    pub term: String,
    pub remark: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Expense {
    pub id: String,
    pub amount: f64,
    pub date: String,
    pub session: String,
    pub term: String,
    pub remark: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubjectScore {
    pub subject: String,
    pub ca1: f64,
    pub ca2: f64,
    pub exam: f64,
    pub total: f64,
    pub grade: String,
    pub remark: String,
}

/// One sheet per (student, session, term); saves replace the whole element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoreSheet {
    pub id: String,
    pub student_id: String,
    pub session: String,
    pub term: String,
    pub subjects: Vec<SubjectScore>,
    /// BTreeMap keeps serialized documents byte-stable across saves.
    pub affective: BTreeMap<String, String>,
    pub psychomotor: BTreeMap<String, String>,
    pub teacher_remark: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttendanceEntry {
    pub student_id: String,
    pub status: String,
}

/// One register per (class, date, session, term); saves replace the element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttendanceRecord {
    pub id: String,
    pub class_id: String,
    pub date: String,
    pub session: String,
    pub term: String,
    pub entries: Vec<AttendanceEntry>,
}

/// Everything the daemon knows, decoded from the ten store rows at open.
/// All reads are linear scans; vector order is insertion order and is what
/// ranking ties fall back to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchoolState {
    pub settings: Settings,
    pub students: Vec<Student>,
    pub teachers: Vec<Teacher>,
    pub staff: Vec<StaffMember>,
    pub classes: Vec<SchoolClass>,
    pub fees: Vec<Fee>,
    pub payments: Vec<Payment>,
    pub expenses: Vec<Expense>,
    pub scores: Vec<ScoreSheet>,
    pub attendance: Vec<AttendanceRecord>,
}

impl SchoolState {
    pub fn find_student(&self, id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    pub fn find_class(&self, id: &str) -> Option<&SchoolClass> {
        self.classes.iter().find(|c| c.id == id)
    }

    pub fn find_teacher(&self, id: &str) -> Option<&Teacher> {
        self.teachers.iter().find(|t| t.id == id)
    }

    pub fn students_in_class(&self, class_id: &str) -> Vec<&Student> {
        self.students
            .iter()
            .filter(|s| s.class_id.as_deref() == Some(class_id))
            .collect()
    }

    /// The subject list a class is graded against.
    pub fn class_subjects(&self, class: &SchoolClass) -> Vec<String> {
        match &class.subjects {
            Some(list) if !list.is_empty() => list.clone(),
            _ => self.settings.subjects.clone(),
        }
    }

    /// `None` for an unassigned student, `"Unknown"` for a dangling reference.
    pub fn resolve_class_name(&self, class_id: Option<&str>) -> Option<String> {
        class_id.map(|id| {
            self.find_class(id)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| "Unknown".to_string())
        })
    }

    pub fn sheet_for(&self, student_id: &str, session: &str, term: &str) -> Option<&ScoreSheet> {
        self.scores
            .iter()
            .find(|s| s.student_id == student_id && s.session == session && s.term == term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_rolls_over_in_september() {
        let aug = NaiveDate::from_ymd_opt(2025, 8, 31).unwrap();
        let sep = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        assert_eq!(session_for(aug), "2024/2025");
        assert_eq!(session_for(sep), "2025/2026");
    }

    #[test]
    fn default_settings_start_in_first_term_with_subjects() {
        let s = Settings::default();
        assert_eq!(s.current_term, "First Term");
        assert!(!s.subjects.is_empty());
        assert!(s.logo.is_none());
    }

    #[test]
    fn display_name_is_last_comma_first() {
        let s = Student {
            first_name: "Ada".to_string(),
            last_name: "Obi".to_string(),
            ..Student::default()
        };
        assert_eq!(s.display_name(), "Obi, Ada");
    }

    #[test]
    fn partial_student_json_fills_defaults() {
        let s: Student =
            serde_json::from_str(r#"{"id":"s1","firstName":"Ada"}"#).expect("partial decode");
        assert_eq!(s.id, "s1");
        assert_eq!(s.first_name, "Ada");
        assert_eq!(s.last_name, "");
        assert!(s.class_id.is_none());
    }

    #[test]
    fn class_subject_override_beats_settings_list() {
        let mut state = SchoolState::default();
        state.classes.push(SchoolClass {
            id: "c1".to_string(),
            name: "JSS 1".to_string(),
            teacher_id: None,
            subjects: Some(vec!["Mathematics".to_string()]),
        });
        state.classes.push(SchoolClass {
            id: "c2".to_string(),
            name: "JSS 2".to_string(),
            teacher_id: None,
            subjects: None,
        });
        let c1 = state.find_class("c1").unwrap();
        let c2 = state.find_class("c2").unwrap();
        assert_eq!(state.class_subjects(c1), vec!["Mathematics".to_string()]);
        assert_eq!(state.class_subjects(c2), state.settings.subjects);
    }

    #[test]
    fn dangling_class_reference_resolves_to_unknown() {
        let state = SchoolState::default();
        assert_eq!(state.resolve_class_name(None), None);
        assert_eq!(
            state.resolve_class_name(Some("gone")),
            Some("Unknown".to_string())
        );
    }
}

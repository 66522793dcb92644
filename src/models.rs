use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{Document, EntityKind};

/// A document as it comes back from a [`crate::store::RecordStore`]: the
/// record itself plus the identity the store assigned on insertion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stored<T> {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub record: T,
}

impl<T> Stored<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Stored<U> {
        Stored {
            id: self.id,
            created_at: self.created_at,
            record: f(self.record),
        }
    }
}

impl<T> std::ops::Deref for Stored<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.record
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeesStructure {
    pub sem1: u32,
    pub sem2: u32,
    pub total: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub roll_no: String,
    pub name: String,
    pub branch: String,
    pub gmail: String,
    #[serde(default)]
    pub mobile: String,
    #[serde(default)]
    pub address: String,
    pub dob: Option<NaiveDate>,
    pub age: u32,
    pub photo: Option<String>,
    #[serde(default)]
    pub certificates: Vec<String>,
    pub fees_structure: FeesStructure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentData {
    #[serde(flatten)]
    pub profile: StudentProfile,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherProfile {
    pub name: String,
    pub gmail: String,
    pub subject: String,
    pub age: u32,
    #[serde(default)]
    pub profession: String,
    pub dob: Option<NaiveDate>,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherData {
    #[serde(flatten)]
    pub profile: TeacherProfile,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassData {
    pub teacher_id: Uuid,
    pub branch: String,
    pub name: String,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEntry {
    pub student_id: Uuid,
    pub roll_no: String,
    pub name: String,
    pub present: bool,
}

/// A point-in-time roster snapshot. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceData {
    pub class_id: Uuid,
    pub branch: String,
    pub teacher_id: Uuid,
    pub date: DateTime<Utc>,
    pub students: Vec<AttendanceEntry>,
}

impl AttendanceData {
    pub fn present_count(&self) -> usize {
        self.students.iter().filter(|entry| entry.present).count()
    }
}

impl Document for StudentData {
    const KIND: EntityKind = EntityKind::Student;
}

impl Document for TeacherData {
    const KIND: EntityKind = EntityKind::Teacher;
}

impl Document for ClassData {
    const KIND: EntityKind = EntityKind::Class;
}

impl Document for AttendanceData {
    const KIND: EntityKind = EntityKind::Attendance;
}

/// Branches are free strings; they are compared upper-cased everywhere.
pub fn normalize_branch(branch: &str) -> String {
    branch.trim().to_uppercase()
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

//! Fixtures shared by the unit tests.

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use crate::fees::fees_for;
use crate::models::{ClassData, Stored, StudentData, StudentProfile};
use crate::store::{RecordStore, Records};

pub async fn student(store: &dyn RecordStore, roll_no: &str, branch: &str) -> Stored<StudentData> {
    store
        .create(StudentData {
            profile: StudentProfile {
                roll_no: roll_no.to_string(),
                name: format!("Student {}", roll_no),
                branch: branch.to_string(),
                gmail: format!("{}@college.com", roll_no.to_lowercase()),
                mobile: String::new(),
                address: String::new(),
                dob: None,
                age: 20,
                photo: None,
                certificates: Vec::new(),
                fees_structure: fees_for(branch),
            },
            password_hash: "unused".to_string(),
        })
        .await
        .unwrap()
}

pub async fn class(store: &dyn RecordStore, branch: &str) -> Stored<ClassData> {
    class_by(store, branch, Uuid::new_v4(), "Lecture").await
}

pub async fn class_by(
    store: &dyn RecordStore,
    branch: &str,
    teacher_id: Uuid,
    name: &str,
) -> Stored<ClassData> {
    store
        .create(ClassData {
            teacher_id,
            branch: branch.to_string(),
            name: name.to_string(),
            start_time: Utc.with_ymd_and_hms(2026, 10, 14, 9, 0, 0).unwrap(),
        })
        .await
        .unwrap()
}

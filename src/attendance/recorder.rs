use std::collections::HashSet;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::roster::resolve_roster;
use crate::err::Error;
use crate::models::{AttendanceData, AttendanceEntry, Stored};
use crate::store::{RecordStore, Records};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub attendance: Stored<AttendanceData>,
    pub total_students: usize,
    pub present_count: usize,
}

/// Snapshots the full branch roster of `class_id` with each student flagged
/// present or absent, and stores it as one new attendance record.
///
/// Present ids that are not on the roster are dropped with a warning.
/// Calling this twice for the same class yields two records.
pub async fn record_attendance(
    store: &dyn RecordStore,
    class_id: Uuid,
    present_ids: &HashSet<Uuid>,
    teacher_id: Uuid,
) -> Result<AttendanceSummary, Error> {
    let roster = resolve_roster(store, class_id).await?;

    let students: Vec<AttendanceEntry> = roster
        .students
        .iter()
        .map(|student| AttendanceEntry {
            student_id: student.id,
            roll_no: student.profile.roll_no.clone(),
            name: student.profile.name.clone(),
            present: present_ids.contains(&student.id),
        })
        .collect();

    let on_roster: HashSet<Uuid> = students.iter().map(|entry| entry.student_id).collect();
    let mut ignored: Vec<&Uuid> = present_ids
        .iter()
        .filter(|id| !on_roster.contains(*id))
        .collect();
    if !ignored.is_empty() {
        ignored.sort_unstable();
        log::warn!(
            target: "attendance",
            "ignoring {} present id(s) not on the {} roster of class {}: {:?}",
            ignored.len(),
            roster.branch(),
            class_id,
            ignored
        );
    }

    let record = AttendanceData {
        class_id,
        branch: roster.branch().to_string(),
        teacher_id,
        date: Utc::now(),
        students,
    };
    let attendance = store.create(record).await?;

    let total_students = attendance.students.len();
    let present_count = attendance.present_count();
    log::info!(
        target: "attendance",
        "recorded attendance {} for class {} ({}/{} present)",
        attendance.id,
        class_id,
        present_count,
        total_students
    );

    Ok(AttendanceSummary {
        attendance,
        total_students,
        present_count,
    })
}

//! Attendance marking and reporting.
//!
//! Marking resolves the class's branch roster ([`roster`]), snapshots it
//! with presence flags and stores the result ([`recorder`]). Reads live in
//! [`query`]. The HTTP handlers below validate request bodies and pass the
//! authenticated teacher through.

pub mod query;
pub mod recorder;
pub mod roster;

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::Path;
use axum::Extension;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{Principal, TeacherSession};
use crate::extract::{required, JsonBody, PathId};
use crate::models::normalize_branch;
use crate::{proceeds, AppState, Error, Payload};

use query::{AttendanceView, BranchSummary};
use recorder::AttendanceSummary;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAttendance {
    class_id: Option<String>,
    present_student_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceList {
    attendance: Vec<AttendanceView>,
}

/// Splits submitted ids into parsed student ids and the ones that are not
/// ids at all. Any spelling `Uuid::parse_str` accepts counts.
fn parse_present_ids(ids: Vec<String>) -> (HashSet<Uuid>, Vec<String>) {
    let mut present = HashSet::with_capacity(ids.len());
    let mut malformed = Vec::new();
    for id in ids {
        match Uuid::parse_str(id.trim()) {
            Ok(id) => {
                present.insert(id);
            }
            Err(_) => malformed.push(id),
        }
    }
    (present, malformed)
}

pub async fn mark_attendance(
    TeacherSession(teacher): TeacherSession,
    JsonBody(body): JsonBody<MarkAttendance>,
    Extension(state): Extension<Arc<AppState>>,
) -> Payload<AttendanceSummary> {
    let class_id = required(body.class_id, "classId")?;
    let class_id = Uuid::parse_str(class_id.trim())?;
    let (present, malformed) =
        parse_present_ids(required(body.present_student_ids, "presentStudentIds")?);
    if !malformed.is_empty() {
        log::warn!(
            target: "attendance",
            "ignoring {} malformed present id(s) for class {}: {:?}",
            malformed.len(),
            class_id,
            malformed
        );
    }

    proceeds(recorder::record_attendance(state.store.as_ref(), class_id, &present, teacher.id).await?)
}

pub async fn by_class(
    _: Principal,
    PathId(class_id): PathId,
    Extension(state): Extension<Arc<AppState>>,
) -> Payload<AttendanceList> {
    let attendance = query::attendance_by_class(state.store.as_ref(), class_id).await?;
    proceeds(AttendanceList { attendance })
}

pub async fn mine(
    TeacherSession(teacher): TeacherSession,
    Extension(state): Extension<Arc<AppState>>,
) -> Payload<AttendanceList> {
    let attendance = query::attendance_by_teacher(state.store.as_ref(), teacher.id).await?;
    proceeds(AttendanceList { attendance })
}

pub async fn by_branch(
    _: Principal,
    Path(branch): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Payload<BranchSummary> {
    let branch = normalize_branch(&branch);
    if branch.is_empty() {
        return Err(Error::missing("branch"));
    }
    proceeds(query::branch_summary(state.store.as_ref(), &branch).await?)
}

use std::sync::Arc;

use axum::extract::Path;
use axum::Extension;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::TeacherSession;
use crate::extract::{parse_datetime, required_text, JsonBody};
use crate::models::{normalize_branch, ClassData, Stored, StudentData, StudentProfile};
use crate::store::{Filter, Records};
use crate::{proceeds, AppState, Error, Payload};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClass {
    name: Option<String>,
    branch: Option<String>,
    start_time: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedClass {
    pub class: Stored<ClassData>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassList {
    pub classes: Vec<Stored<ClassData>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BranchStudents {
    pub branch: String,
    pub students: Vec<Stored<StudentProfile>>,
}

/// The class is owned by the calling teacher. A missing `startTime` means
/// "now"; one that is present must parse.
pub async fn create_class(
    TeacherSession(teacher): TeacherSession,
    JsonBody(body): JsonBody<CreateClass>,
    Extension(state): Extension<Arc<AppState>>,
) -> Payload<CreatedClass> {
    let name = required_text(body.name, "name")?;
    let branch = normalize_branch(&required_text(body.branch, "branch")?);
    let start_time = match body.start_time.filter(|t| !t.trim().is_empty()) {
        Some(raw) => parse_datetime(&raw)
            .ok_or_else(|| Error::invalid("`startTime` must be an RFC 3339 date-time"))?,
        None => Utc::now(),
    };

    let class = state
        .store
        .create(ClassData {
            teacher_id: teacher.id,
            branch,
            name,
            start_time,
        })
        .await?;
    log::info!(
        "teacher {} created class `{}` for {} ({})",
        teacher.id,
        class.name,
        class.branch,
        class.id
    );
    proceeds(CreatedClass { class })
}

pub async fn my_classes(
    TeacherSession(teacher): TeacherSession,
    Extension(state): Extension<Arc<AppState>>,
) -> Payload<ClassList> {
    let classes = state
        .store
        .find::<ClassData>(Filter::new().id_eq("teacherId", teacher.id))
        .await?;
    proceeds(ClassList { classes })
}

/// Same students, in the same order, that attendance for this branch would
/// snapshot.
pub async fn branch_students(
    TeacherSession(_): TeacherSession,
    Path(branch): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Payload<BranchStudents> {
    let branch = normalize_branch(&branch);
    let students = state
        .store
        .find::<StudentData>(Filter::new().eq("branch", branch.as_str()))
        .await?
        .into_iter()
        .map(|s| s.map(|s| s.profile))
        .collect();
    proceeds(BranchStudents { branch, students })
}

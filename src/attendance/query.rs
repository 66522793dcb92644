use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_with::skip_serializing_none;
use uuid::Uuid;

use crate::err::Error;
use crate::models::{AttendanceData, ClassData, Stored, StudentData};
use crate::store::{Filter, RecordStore, Records};

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRef {
    pub id: Uuid,
    pub name: String,
    pub roll_no: String,
    pub branch: Option<String>,
}

/// One snapshot entry plus the student it points at, if they still exist.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryView {
    pub student_id: Uuid,
    pub roll_no: String,
    pub name: String,
    pub present: bool,
    pub student: Option<StudentRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRef {
    pub id: Uuid,
    pub name: String,
    pub branch: String,
    pub start_time: DateTime<Utc>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceView {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub class_id: Uuid,
    pub class: Option<ClassRef>,
    pub branch: String,
    pub teacher_id: Uuid,
    pub date: DateTime<Utc>,
    pub present_count: usize,
    pub students: Vec<EntryView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchSummary {
    pub branch: String,
    pub total_classes: usize,
    pub total_students: usize,
    pub total_present: usize,
}

/// Memoizes by-id lookups while a result set is being resolved.
struct Lookup<'a, T> {
    store: &'a dyn RecordStore,
    seen: HashMap<Uuid, Option<Stored<T>>>,
}

impl<'a, T: crate::store::Document + Clone + 'static> Lookup<'a, T> {
    fn new(store: &'a dyn RecordStore) -> Self {
        Lookup {
            store,
            seen: HashMap::new(),
        }
    }

    async fn get(&mut self, id: Uuid) -> Result<Option<Stored<T>>, Error> {
        if let Some(hit) = self.seen.get(&id) {
            return Ok(hit.clone());
        }
        let found = self.store.get::<T>(id).await?;
        self.seen.insert(id, found.clone());
        Ok(found)
    }
}

async fn view(
    record: Stored<AttendanceData>,
    students: &mut Lookup<'_, StudentData>,
    with_branch: bool,
    class: Option<ClassRef>,
) -> Result<AttendanceView, Error> {
    let present_count = record.present_count();
    let Stored {
        id,
        created_at,
        record,
    } = record;

    let mut entries = Vec::with_capacity(record.students.len());
    for entry in record.students {
        let student = students.get(entry.student_id).await?.map(|s| StudentRef {
            id: s.id,
            name: s.profile.name.clone(),
            roll_no: s.profile.roll_no.clone(),
            branch: with_branch.then(|| s.profile.branch.clone()),
        });
        entries.push(EntryView {
            student_id: entry.student_id,
            roll_no: entry.roll_no,
            name: entry.name,
            present: entry.present,
            student,
        });
    }

    Ok(AttendanceView {
        id,
        created_at,
        class_id: record.class_id,
        class,
        branch: record.branch,
        teacher_id: record.teacher_id,
        date: record.date,
        present_count,
        students: entries,
    })
}

/// Every attendance taken for `class_id`, oldest first.
pub async fn attendance_by_class(
    store: &dyn RecordStore,
    class_id: Uuid,
) -> Result<Vec<AttendanceView>, Error> {
    let records = store
        .find::<AttendanceData>(Filter::new().id_eq("classId", class_id))
        .await?;
    let mut students = Lookup::new(store);
    let mut views = Vec::with_capacity(records.len());
    for record in records {
        views.push(view(record, &mut students, true, None).await?);
    }
    Ok(views)
}

/// Every attendance recorded by `teacher_id`, with the class resolved.
pub async fn attendance_by_teacher(
    store: &dyn RecordStore,
    teacher_id: Uuid,
) -> Result<Vec<AttendanceView>, Error> {
    let records = store
        .find::<AttendanceData>(Filter::new().id_eq("teacherId", teacher_id))
        .await?;
    let mut students = Lookup::new(store);
    let mut classes = Lookup::<ClassData>::new(store);
    let mut views = Vec::with_capacity(records.len());
    for record in records {
        let class = classes.get(record.class_id).await?.map(|c| ClassRef {
            id: c.id,
            name: c.name.clone(),
            branch: c.branch.clone(),
            start_time: c.start_time,
        });
        views.push(view(record, &mut students, false, class).await?);
    }
    Ok(views)
}

pub fn summarize(branch: &str, records: &[Stored<AttendanceData>]) -> BranchSummary {
    records.iter().fold(
        BranchSummary {
            branch: branch.to_string(),
            total_classes: 0,
            total_students: 0,
            total_present: 0,
        },
        |mut summary, record| {
            summary.total_classes += 1;
            summary.total_students += record.students.len();
            summary.total_present += record.present_count();
            summary
        },
    )
}

/// Totals over every attendance of `branch`. Zero records give a zeroed
/// summary.
pub async fn branch_summary(store: &dyn RecordStore, branch: &str) -> Result<BranchSummary, Error> {
    let records = store
        .find::<AttendanceData>(Filter::new().eq("branch", branch))
        .await?;
    Ok(summarize(branch, &records))
}

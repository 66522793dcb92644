use uuid::Uuid;

use crate::err::Error;
use crate::models::{ClassData, Stored, StudentData};
use crate::store::{Filter, RecordStore, Records};

/// The class an attendance is taken for, together with every student that
/// currently belongs to its branch.
#[derive(Debug, Clone)]
pub struct Roster {
    pub class: Stored<ClassData>,
    pub students: Vec<Stored<StudentData>>,
}

impl Roster {
    pub fn branch(&self) -> &str {
        &self.class.branch
    }
}

/// Students come back in store insertion order. A branch without students
/// is reported as `NotFound`: attendance cannot be taken for it.
pub async fn resolve_roster(store: &dyn RecordStore, class_id: Uuid) -> Result<Roster, Error> {
    let class = store
        .get::<ClassData>(class_id)
        .await?
        .ok_or_else(|| Error::not_found("Class not found"))?;

    let students = store
        .find::<StudentData>(Filter::new().eq("branch", class.branch.as_str()))
        .await?;
    if students.is_empty() {
        return Err(Error::not_found("No students in this branch"));
    }

    Ok(Roster { class, students })
}

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::multipart::Field;
use axum::extract::Multipart;
use axum::Extension;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_with::skip_serializing_none;

use crate::auth::{generate_temp_password, hash_password, AdminSession};
use crate::extract::{age_on, parse_date, required_text, JsonBody, NumberOrText};
use crate::fees::fees_for;
use crate::io::{check_upload, oversized, save_upload, MAX_UPLOAD_BYTES};
use crate::models::{
    normalize_branch, normalize_email, Stored, StudentData, StudentProfile, TeacherData,
    TeacherProfile,
};
use crate::store::{Filter, Records};
use crate::{proceeds, AppState, Error, Payload};

const DEFAULT_STUDENT_AGE: u32 = 20;
const MAX_CERTIFICATES: usize = 10;

/// The one place a temporary password is ever shown.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub roll_no: Option<String>,
    pub name: String,
    pub gmail: String,
    pub temp_pass: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedStudent {
    pub student: Stored<StudentProfile>,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedTeacher {
    pub teacher: Stored<TeacherProfile>,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentList {
    pub students: Vec<Stored<StudentProfile>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeacherList {
    pub teachers: Vec<Stored<TeacherProfile>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordReset {
    pub new_password: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTeacher {
    name: Option<String>,
    gmail: Option<String>,
    subject: Option<String>,
    age: Option<NumberOrText>,
    profession: Option<String>,
    dob: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetPassword {
    email: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

struct PendingFile {
    file_name: String,
    content_type: String,
    bytes: Vec<u8>,
}

impl PendingFile {
    fn check(&self) -> Result<(), Error> {
        check_upload(&self.file_name, &self.content_type, self.bytes.len())
    }
}

/// Reads one file part chunk by chunk, giving up as soon as it grows past
/// the upload limit.
async fn read_file_part(field: &mut Field<'_>, file_name: &str) -> Result<Vec<u8>, Error> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.chunk().await? {
        if bytes.len() + chunk.len() > MAX_UPLOAD_BYTES {
            return Err(oversized(file_name));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

/// Text fields and files of the student multipart form. Field names are
/// matched case-insensitively so `rollNo` and `RollNo` both work.
#[derive(Default)]
struct StudentForm {
    fields: HashMap<String, String>,
    photo: Option<PendingFile>,
    certificates: Vec<PendingFile>,
}

impl StudentForm {
    async fn read(mut multipart: Multipart) -> Result<Self, Error> {
        let mut form = StudentForm::default();
        while let Some(mut field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_lowercase();
            match name.as_str() {
                "photo" | "certificates" => {
                    let file_name = field.file_name().unwrap_or(name.as_str()).to_string();
                    let content_type = field
                        .content_type()
                        .map(|mime| mime.to_string())
                        .unwrap_or_else(|| {
                            mime_guess::from_path(&file_name)
                                .first_or_octet_stream()
                                .to_string()
                        });
                    let bytes = read_file_part(&mut field, &file_name).await?;
                    if bytes.is_empty() {
                        continue;
                    }
                    let file = PendingFile {
                        file_name,
                        content_type,
                        bytes,
                    };
                    if name == "photo" {
                        if form.photo.is_some() {
                            return Err(Error::invalid("Only one `photo` may be uploaded"));
                        }
                        form.photo = Some(file);
                    } else {
                        if form.certificates.len() == MAX_CERTIFICATES {
                            return Err(Error::invalid(format!(
                                "At most {} certificates may be uploaded",
                                MAX_CERTIFICATES
                            )));
                        }
                        form.certificates.push(file);
                    }
                }
                _ => {
                    let value = field.text().await?;
                    form.fields.insert(name, value);
                }
            }
        }
        Ok(form)
    }

    fn take(&mut self, field: &str) -> Option<String> {
        self.fields
            .remove(&field.to_lowercase())
            .filter(|value| !value.trim().is_empty())
    }
}

fn resolve_age(
    age: Option<NumberOrText>,
    dob: Option<NaiveDate>,
    fallback: u32,
) -> Result<u32, Error> {
    if let Some(age) = age.map(|age| age.parse("age")).transpose()?.flatten() {
        return Ok(age);
    }
    Ok(dob
        .map(|dob| age_on(dob, Utc::now().naive_utc().date()))
        .unwrap_or(fallback))
}

async fn ensure_unique_student(
    state: &AppState,
    roll_no: &str,
    gmail: &str,
) -> Result<(), Error> {
    let store = state.store.as_ref();
    if store
        .find_one::<StudentData>(Filter::new().eq("rollNo", roll_no))
        .await?
        .is_some()
    {
        return Err(Error::AlreadyExists {
            message: "Duplicate: RollNo already exists".to_string(),
        });
    }
    if store
        .find_one::<StudentData>(Filter::new().eq("gmail", gmail))
        .await?
        .is_some()
    {
        return Err(Error::AlreadyExists {
            message: "Duplicate: Gmail already exists".to_string(),
        });
    }
    Ok(())
}

pub async fn create_student(
    AdminSession(_): AdminSession,
    Extension(state): Extension<Arc<AppState>>,
    multipart: Multipart,
) -> Payload<CreatedStudent> {
    let mut form = StudentForm::read(multipart).await?;

    let roll_no = required_text(form.take("rollNo"), "rollNo")?;
    let name = required_text(form.take("name"), "name")?;
    let branch = normalize_branch(&required_text(form.take("branch"), "branch")?);
    let gmail = normalize_email(&required_text(form.take("gmail"), "gmail")?);
    let dob = form.take("dob").as_deref().and_then(parse_date);
    let age = resolve_age(form.take("age").map(NumberOrText::Text), dob, DEFAULT_STUDENT_AGE)?;
    for file in form.photo.iter().chain(&form.certificates) {
        file.check()?;
    }

    ensure_unique_student(&state, &roll_no, &gmail).await?;

    let upload_dir = &state.config.upload_dir;
    let photo = match &form.photo {
        Some(file) => {
            Some(save_upload(upload_dir, &file.file_name, &file.content_type, &file.bytes).await?)
        }
        None => None,
    };
    let mut certificates = Vec::with_capacity(form.certificates.len());
    for file in &form.certificates {
        certificates
            .push(save_upload(upload_dir, &file.file_name, &file.content_type, &file.bytes).await?);
    }

    let temp_pass = generate_temp_password();
    let student = StudentData {
        profile: StudentProfile {
            roll_no,
            name,
            fees_structure: fees_for(&branch),
            branch,
            gmail,
            mobile: form.take("mobile").unwrap_or_default(),
            address: form.take("address").unwrap_or_default(),
            dob,
            age,
            photo,
            certificates,
        },
        password_hash: hash_password(&temp_pass)?,
    };
    let student = state.store.create(student).await?;
    log::info!("created student {} ({})", student.profile.roll_no, student.id);

    let credentials = Credentials {
        roll_no: Some(student.profile.roll_no.clone()),
        name: student.profile.name.clone(),
        gmail: student.profile.gmail.clone(),
        temp_pass,
    };
    proceeds(CreatedStudent {
        student: student.map(|s| s.profile),
        credentials,
    })
}

pub async fn create_teacher(
    AdminSession(_): AdminSession,
    JsonBody(body): JsonBody<CreateTeacher>,
    Extension(state): Extension<Arc<AppState>>,
) -> Payload<CreatedTeacher> {
    let name = required_text(body.name, "name")?;
    let gmail = normalize_email(&required_text(body.gmail, "gmail")?);
    let subject = required_text(body.subject, "subject")?;
    let dob = body.dob.as_deref().and_then(parse_date);
    let age = resolve_age(body.age, None, 0)?;

    if state
        .store
        .find_one::<TeacherData>(Filter::new().eq("gmail", gmail.as_str()))
        .await?
        .is_some()
    {
        return Err(Error::AlreadyExists {
            message: "Gmail already exists".to_string(),
        });
    }

    let temp_pass = generate_temp_password();
    let teacher = TeacherData {
        profile: TeacherProfile {
            name,
            gmail,
            subject,
            age,
            profession: body.profession.unwrap_or_default().trim().to_string(),
            dob,
            phone: body.phone.unwrap_or_default().trim().to_string(),
        },
        password_hash: hash_password(&temp_pass)?,
    };
    let teacher = state.store.create(teacher).await?;
    log::info!("created teacher {} ({})", teacher.profile.gmail, teacher.id);

    let credentials = Credentials {
        roll_no: None,
        name: teacher.profile.name.clone(),
        gmail: teacher.profile.gmail.clone(),
        temp_pass,
    };
    proceeds(CreatedTeacher {
        teacher: teacher.map(|t| t.profile),
        credentials,
    })
}

pub async fn list_students(
    AdminSession(_): AdminSession,
    Extension(state): Extension<Arc<AppState>>,
) -> Payload<StudentList> {
    let mut students: Vec<_> = state
        .store
        .find::<StudentData>(Filter::new())
        .await?
        .into_iter()
        .map(|s| s.map(|s| s.profile))
        .collect();
    students.sort_by(|a, b| a.roll_no.cmp(&b.roll_no));
    proceeds(StudentList { students })
}

pub async fn list_teachers(
    AdminSession(_): AdminSession,
    Extension(state): Extension<Arc<AppState>>,
) -> Payload<TeacherList> {
    let mut teachers: Vec<_> = state
        .store
        .find::<TeacherData>(Filter::new())
        .await?
        .into_iter()
        .map(|t| t.map(|t| t.profile))
        .collect();
    teachers.sort_by(|a, b| a.name.cmp(&b.name));
    proceeds(TeacherList { teachers })
}

/// Replaces the credential of a student or teacher with a fresh temporary
/// password. Written to the `audit` log target.
pub async fn reset_password(
    AdminSession(admin): AdminSession,
    JsonBody(body): JsonBody<ResetPassword>,
    Extension(state): Extension<Arc<AppState>>,
) -> Payload<PasswordReset> {
    let email = normalize_email(&required_text(body.email, "email")?);
    let kind = required_text(body.kind, "type")?.to_lowercase();

    let new_password = generate_temp_password();
    let patch = json!({ "passwordHash": hash_password(&new_password)? });
    let filter = Filter::new().eq("gmail", email.as_str());
    let found = match kind.as_str() {
        "student" => state
            .store
            .patch::<StudentData>(filter, patch)
            .await?
            .is_some(),
        "teacher" => state
            .store
            .patch::<TeacherData>(filter, patch)
            .await?
            .is_some(),
        _ => return Err(Error::invalid("Invalid type: student or teacher")),
    };
    if !found {
        return Err(Error::not_found("User not found"));
    }

    log::warn!(
        target: "audit",
        "admin {} reset the {} password of `{}`",
        admin.id,
        kind,
        email
    );
    proceeds(PasswordReset {
        new_password,
        message: format!("{} password reset successfully", kind),
    })
}

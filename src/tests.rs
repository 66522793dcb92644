use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use crate::auth::{Principal, Role};
use crate::config::Config;
use crate::store::MemoryStore;
use crate::testing::student;
use crate::{app, AppState};

const BOUNDARY: &str = "collegeerp-boundary";

fn state(upload_dir: &Path) -> Arc<AppState> {
    let upload_dir = upload_dir.to_string_lossy().to_string();
    let config = Config::from_lookup(move |name| match name {
        "SESSION_SECRET" => Some("router-tests".to_string()),
        "UPLOAD_DIR" => Some(upload_dir.clone()),
        _ => None,
    })
    .unwrap();
    Arc::new(AppState::new(config, Arc::new(MemoryStore::new())).unwrap())
}

fn token(state: &AppState, id: Uuid, role: Role) -> String {
    state.identity.issue(Principal { id, role }).unwrap().token
}

fn request(method: Method, uri: &str, token: Option<&str>) -> axum::http::request::Builder {
    let builder = Request::builder().method(method).uri(uri);
    match token {
        Some(token) => builder.header(header::AUTHORIZATION, format!("Bearer {}", token)),
        None => builder,
    }
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    request(Method::GET, uri, token).body(Body::empty()).unwrap()
}

fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    request(Method::POST, uri, token)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a str, &'a [u8]),
}

fn multipart(uri: &str, token: &str, parts: &[Part]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, file_name, content_type, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        name, file_name, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    request(Method::POST, uri, Some(token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send_raw(state: &Arc<AppState>, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app(state.clone()).oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    (status, bytes.to_vec())
}

async fn send(state: &Arc<AppState>, req: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send_raw(state, req).await;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn ping_answers_head_requests() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(dir.path());
    let req = request(Method::HEAD, "/api/ping", None)
        .body(Body::empty())
        .unwrap();
    let (status, _) = send_raw(&state, req).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_api_paths_are_json_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(dir.path());
    let (status, body) = send(&state, get("/api/nothing-here", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");
}

#[tokio::test]
async fn other_paths_fall_back_to_the_client() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(dir.path());
    let (status, bytes) = send_raw(&state, get("/teacher/dashboard", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8_lossy(&bytes).contains("<html"));
}

#[tokio::test]
async fn fees_are_public() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(dir.path());
    let (status, body) = send(&state, get("/api/fees", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["CSE"]["sem1"], 55000);
    assert_eq!(body["CSE"]["total"], 110000);
}

#[tokio::test]
async fn marking_requires_a_teacher_session() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(dir.path());
    let body = json!({ "classId": Uuid::new_v4(), "presentStudentIds": [] });

    let (status, reply) = send(&state, post("/api/attendance", None, body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply["error"], "InvalidSession");
    assert_eq!(reply["message"], "No token provided");

    let (status, _) = send(&state, post("/api/attendance", Some("garbage"), body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let student = token(&state, Uuid::new_v4(), Role::Student);
    let (status, reply) = send(&state, post("/api/attendance", Some(&student), body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(reply["error"], "Forbidden");

    let admin = token(&state, Uuid::nil(), Role::Admin);
    let (status, _) = send(&state, post("/api/attendance", Some(&admin), body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_marking_requests_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(dir.path());
    let teacher = token(&state, Uuid::new_v4(), Role::Teacher);

    let (status, reply) = send(&state, post("/api/attendance", Some(&teacher), json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply["error"], "InvalidPayload");

    let body = json!({ "classId": Uuid::new_v4() });
    let (status, _) = send(&state, post("/api/attendance", Some(&teacher), body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = json!({ "classId": "not-an-id", "presentStudentIds": [] });
    let (status, _) = send(&state, post("/api/attendance", Some(&teacher), body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = json!({ "classId": Uuid::new_v4(), "presentStudentIds": [] });
    let (status, reply) = send(&state, post("/api/attendance", Some(&teacher), body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(reply["message"], "Class not found");
}

#[tokio::test]
async fn admin_routes_reject_other_roles() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(dir.path());
    let teacher = token(&state, Uuid::new_v4(), Role::Teacher);

    let (status, _) = send(&state, get("/api/admin/students", Some(&teacher))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&state, get("/api/admin/teachers", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_admin_password_is_an_authentication_failure() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(dir.path());
    let body = json!({ "email": "admin@collegeerp.com", "password": "letmein" });
    let (status, reply) = send(&state, post("/api/auth/admin-login", None, body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply["error"], "AuthenticationFailure");
}

#[tokio::test]
async fn teacher_marks_attendance_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(dir.path());

    let body = json!({ "email": "Admin@CollegeERP.com", "password": "admin123" });
    let (status, reply) = send(&state, post("/api/auth/admin-login", None, body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["user"]["role"], "admin");
    let admin = reply["token"].as_str().unwrap().to_string();

    let body = json!({
        "name": "Prof. Rao",
        "gmail": "Rao@College.com",
        "subject": "Networks",
        "age": "41"
    });
    let (status, reply) = send(&state, post("/api/admin/teachers", Some(&admin), body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["teacher"]["gmail"], "rao@college.com");
    assert_eq!(reply["teacher"]["age"], 41);
    assert!(reply["teacher"].get("passwordHash").is_none());
    let temp_pass = reply["credentials"]["tempPass"].as_str().unwrap().to_string();

    let (status, reply) = send(&state, post("/api/admin/teachers", Some(&admin), body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply["error"], "AlreadyExists");

    let login = json!({ "gmail": "rao@college.com", "password": temp_pass, "role": "teacher" });
    let (status, reply) = send(&state, post("/api/auth/login", None, login)).await;
    assert_eq!(status, StatusCode::OK);
    let teacher = reply["token"].as_str().unwrap().to_string();

    let store = state.store.as_ref();
    let s1 = student(store, "CSE001", "CSE").await;
    student(store, "CSE002", "CSE").await;
    let s3 = student(store, "CSE003", "CSE").await;
    student(store, "ECE001", "ECE").await;

    let body = json!({ "name": "Computer Networks", "branch": "cse", "startTime": "2026-10-14T09:00:00Z" });
    let (status, reply) = send(&state, post("/api/teacher/classes", Some(&teacher), body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["class"]["branch"], "CSE");
    let class_id = reply["class"]["id"].as_str().unwrap().to_string();

    let (status, reply) = send(&state, get("/api/teacher/students/cse", Some(&teacher))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["students"].as_array().unwrap().len(), 3);

    let body = json!({
        "classId": class_id,
        "presentStudentIds": [s1.id, s3.id.to_string().to_uppercase(), "not-enrolled"]
    });
    let (status, reply) = send(&state, post("/api/attendance", Some(&teacher), body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["totalStudents"], 3);
    assert_eq!(reply["presentCount"], 2);
    let entries = reply["attendance"]["students"].as_array().unwrap();
    let present: Vec<bool> = entries.iter().map(|e| e["present"].as_bool().unwrap()).collect();
    assert_eq!(present, vec![true, false, true]);

    let uri = format!("/api/attendance/class/{}", class_id);
    let (status, reply) = send(&state, get(&uri, Some(&admin))).await;
    assert_eq!(status, StatusCode::OK);
    let records = reply["attendance"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["presentCount"], 2);

    let (status, reply) = send(&state, get("/api/attendance/my", Some(&teacher))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["attendance"][0]["class"]["name"], "Computer Networks");

    let (status, reply) = send(&state, get("/api/attendance/branch/cse", Some(&teacher))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["branch"], "CSE");
    assert_eq!(reply["totalClasses"], 1);
    assert_eq!(reply["totalStudents"], 3);
    assert_eq!(reply["totalPresent"], 2);
}

#[tokio::test]
async fn admin_enrolls_a_student_with_a_photo() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(dir.path());
    let admin = token(&state, Uuid::nil(), Role::Admin);

    let parts = [
        Part::Text("rollNo", "CSE042"),
        Part::Text("name", "Asha Verma"),
        Part::Text("branch", "cse"),
        Part::Text("gmail", "Asha@College.com"),
        Part::Text("dob", "2005-06-01"),
        Part::File("photo", "asha.png", "image/png", b"\x89PNG fake"),
    ];
    let (status, reply) = send(&state, multipart("/api/admin/students", &admin, &parts)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["student"]["branch"], "CSE");
    assert_eq!(reply["student"]["feesStructure"]["sem1"], 55000);
    assert_eq!(reply["student"]["feesStructure"]["total"], 110000);
    assert!(reply["student"].get("passwordHash").is_none());
    let photo = reply["student"]["photo"].as_str().unwrap().to_string();
    assert!(photo.starts_with("/uploads/"));
    let temp_pass = reply["credentials"]["tempPass"].as_str().unwrap().to_string();

    let (status, bytes) = send_raw(&state, get(&photo, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"\x89PNG fake".to_vec());

    let (status, reply) = send(&state, multipart("/api/admin/students", &admin, &parts)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply["message"], "Duplicate: RollNo already exists");

    let login = json!({ "gmail": "asha@college.com", "password": temp_pass, "role": "student" });
    let (status, reply) = send(&state, post("/api/auth/login", None, login)).await;
    assert_eq!(status, StatusCode::OK);
    let session = reply["token"].as_str().unwrap().to_string();

    let (status, reply) = send(&state, get("/api/auth/me", Some(&session))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["user"]["rollNo"], "CSE042");
    assert_eq!(reply["user"]["role"], "student");
}

#[tokio::test]
async fn non_image_uploads_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(dir.path());
    let admin = token(&state, Uuid::nil(), Role::Admin);

    let parts = [
        Part::Text("rollNo", "CSE043"),
        Part::Text("name", "Ravi"),
        Part::Text("branch", "CSE"),
        Part::Text("gmail", "ravi@college.com"),
        Part::File("certificates", "run.exe", "application/x-msdownload", b"MZ"),
    ];
    let (status, reply) = send(&state, multipart("/api/admin/students", &admin, &parts)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply["error"], "InvalidPayload");

    let (_, reply) = send(&state, get("/api/admin/students", Some(&admin))).await;
    assert_eq!(reply["students"].as_array().unwrap().len(), 0);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn oversized_photos_are_refused_before_anything_is_stored() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(dir.path());
    let admin = token(&state, Uuid::nil(), Role::Admin);

    let photo = vec![0u8; 11 * 1024 * 1024];
    let parts = [
        Part::Text("rollNo", "CSE044"),
        Part::Text("name", "Meera"),
        Part::Text("branch", "CSE"),
        Part::Text("gmail", "meera@college.com"),
        Part::File("photo", "huge.png", "image/png", &photo),
    ];
    let (status, reply) = send(&state, multipart("/api/admin/students", &admin, &parts)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply["error"], "InvalidPayload");
    assert!(reply["message"].as_str().unwrap().contains("upload limit"));

    let (_, reply) = send(&state, get("/api/admin/students", Some(&admin))).await;
    assert_eq!(reply["students"].as_array().unwrap().len(), 0);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn password_reset_replaces_the_credential() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(dir.path());
    let admin = token(&state, Uuid::nil(), Role::Admin);

    let body = json!({ "name": "Prof. Iyer", "gmail": "iyer@college.com", "subject": "Maths" });
    let (_, reply) = send(&state, post("/api/admin/teachers", Some(&admin), body)).await;
    let old_pass = reply["credentials"]["tempPass"].as_str().unwrap().to_string();

    let body = json!({ "email": "iyer@college.com", "type": "teacher" });
    let (status, reply) = send(&state, post("/api/admin/reset-password", Some(&admin), body)).await;
    assert_eq!(status, StatusCode::OK);
    let new_pass = reply["newPassword"].as_str().unwrap().to_string();

    let login = |password: &str| json!({ "gmail": "iyer@college.com", "password": password, "role": "teacher" });
    let (status, _) = send(&state, post("/api/auth/login", None, login(&old_pass))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&state, post("/api/auth/login", None, login(&new_pass))).await;
    assert_eq!(status, StatusCode::OK);

    let body = json!({ "email": "nobody@college.com", "type": "student" });
    let (status, _) = send(&state, post("/api/admin/reset-password", Some(&admin), body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let body = json!({ "email": "iyer@college.com", "type": "dean" });
    let (status, _) = send(&state, post("/api/admin/reset-password", Some(&admin), body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

use std::ops::Add;
use std::sync::Arc;

use axum::extract::{FromRequest, RequestParts};
use axum::headers::authorization::Bearer;
use axum::headers::Authorization;
use axum::{async_trait, Extension, TypedHeader};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand::{thread_rng, Rng};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use sha2::Sha256;
use uuid::Uuid;

use crate::config::Config;
use crate::extract::{required_text, JsonBody};
use crate::models::{normalize_email, StudentData, TeacherData};
use crate::store::{Filter, Records};
use crate::{proceeds, AppState, Error, Payload};

type HmacSha256 = Hmac<Sha256>;

const TEMP_PASSWORD_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const TEMP_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value.trim().to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "teacher" => Some(Role::Teacher),
            "student" => Some(Role::Student),
            _ => None,
        }
    }
}

/// The authenticated caller. Admin sessions carry the nil id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: Uuid,
    role: Role,
    exp: i64,
}

/// Generates a one-time password from `A-Z0-9`.
pub fn generate_temp_password() -> String {
    let mut rng = thread_rng();
    (0..TEMP_PASSWORD_LEN)
        .map(|_| TEMP_PASSWORD_CHARSET[rng.gen_range(0..TEMP_PASSWORD_CHARSET.len())] as char)
        .collect()
}

pub fn hash_password(password: &str) -> Result<String, Error> {
    Ok(Pbkdf2
        .hash_password(password.as_bytes(), &SaltString::generate(&mut OsRng))?
        .to_string())
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, Error> {
    let hash = PasswordHash::new(hash)?;
    Ok(Pbkdf2.verify_password(password.as_bytes(), &hash).is_ok())
}

/// Issues and verifies session tokens of the form
/// `hex(postcard(claims)).hex(hmac_sha256(secret, claims))`.
pub struct Identity {
    secret: Vec<u8>,
    ttl: Duration,
    admin_email: String,
    admin_hash: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Identity {
    pub fn new(config: &Config) -> Result<Self, Error> {
        Ok(Identity {
            secret: config.session_secret.clone(),
            ttl: config.session_ttl,
            admin_email: normalize_email(&config.admin_email),
            admin_hash: hash_password(&config.admin_password)?,
        })
    }

    fn mac(&self) -> Result<HmacSha256, Error> {
        HmacSha256::new_from_slice(&self.secret).map_err(|err| Error::InternalError {
            kind: "SessionError",
            message: err.to_string(),
        })
    }

    pub fn issue(&self, principal: Principal) -> Result<SessionToken, Error> {
        self.issue_at(principal, Utc::now())
    }

    fn issue_at(&self, principal: Principal, now: DateTime<Utc>) -> Result<SessionToken, Error> {
        let expires_at = now.add(self.ttl);
        let claims = Claims {
            sub: principal.id,
            role: principal.role,
            exp: expires_at.timestamp(),
        };
        let payload = postcard::to_allocvec(&claims)?;
        let mut mac = self.mac()?;
        mac.update(&payload);
        let signature = mac.finalize().into_bytes();
        Ok(SessionToken {
            token: format!("{}.{}", hex::encode(&payload), hex::encode(signature)),
            expires_at,
        })
    }

    pub fn verify(&self, token: &str) -> Result<Principal, Error> {
        let invalid = || Error::InvalidSession {
            message: "Invalid token".to_string(),
        };
        let (payload, signature) = token.split_once('.').ok_or_else(invalid)?;
        let payload = hex::decode(payload).map_err(|_| invalid())?;
        let signature = hex::decode(signature).map_err(|_| invalid())?;

        let mut mac = self.mac()?;
        mac.update(&payload);
        mac.verify_slice(&signature).map_err(|_| invalid())?;

        let claims: Claims = postcard::from_bytes(&payload).map_err(|_| invalid())?;
        if Utc::now().timestamp() >= claims.exp {
            return Err(Error::InvalidSession {
                message: "Session expired".to_string(),
            });
        }
        Ok(Principal {
            id: claims.sub,
            role: claims.role,
        })
    }

    pub fn check_admin(&self, email: &str, password: &str) -> Result<bool, Error> {
        if normalize_email(email) != self.admin_email {
            return Ok(false);
        }
        verify_password(password, &self.admin_hash)
    }
}

#[async_trait]
impl<B> FromRequest<B> for Principal
where
    B: Send,
{
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let Extension(state) = Extension::<Arc<AppState>>::from_request(req)
            .await
            .map_err(|err| Error::InternalError {
                kind: "StateError",
                message: err.to_string(),
            })?;
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request(req)
                .await
                .map_err(|_| Error::InvalidSession {
                    message: "No token provided".to_string(),
                })?;
        state.identity.verify(bearer.token())
    }
}

fn require(principal: Principal, role: Role) -> Result<Principal, Error> {
    if principal.role == role {
        Ok(principal)
    } else {
        Err(Error::Forbidden {
            message: format!("This action requires the {} role", role.as_str()),
        })
    }
}

/// A principal that is known to be the administrator.
pub struct AdminSession(pub Principal);

/// A principal that is known to be a teacher.
pub struct TeacherSession(pub Principal);

#[async_trait]
impl<B> FromRequest<B> for AdminSession
where
    B: Send,
{
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let principal = Principal::from_request(req).await?;
        require(principal, Role::Admin).map(AdminSession)
    }
}

#[async_trait]
impl<B> FromRequest<B> for TeacherSession
where
    B: Send,
{
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let principal = Principal::from_request(req).await?;
        require(principal, Role::Teacher).map(TeacherSession)
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: Option<Uuid>,
    pub name: String,
    pub gmail: String,
    pub roll_no: Option<String>,
    pub branch: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedIn {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: SessionUser,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub user: SessionUser,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminLogin {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserLogin {
    gmail: Option<String>,
    password: Option<String>,
    role: Option<String>,
}

fn admin_user(email: &str) -> SessionUser {
    SessionUser {
        id: None,
        name: "Administrator".to_string(),
        gmail: email.to_string(),
        roll_no: None,
        branch: None,
        role: Role::Admin,
    }
}

fn failure<S: Into<String>>(message: S) -> Error {
    Error::AuthenticationFailure {
        message: message.into(),
    }
}

pub async fn admin_login(
    JsonBody(login): JsonBody<AdminLogin>,
    Extension(state): Extension<Arc<AppState>>,
) -> Payload<LoggedIn> {
    let email = required_text(login.email, "email")?;
    let password = required_text(login.password, "password")?;

    if !state.identity.check_admin(&email, &password)? {
        log::warn!("rejected admin login for `{}`", email);
        return Err(failure("Invalid admin credentials"));
    }

    let session = state.identity.issue(Principal {
        id: Uuid::nil(),
        role: Role::Admin,
    })?;
    proceeds(LoggedIn {
        token: session.token,
        expires_at: session.expires_at,
        user: admin_user(&normalize_email(&email)),
    })
}

pub async fn login(
    JsonBody(login): JsonBody<UserLogin>,
    Extension(state): Extension<Arc<AppState>>,
) -> Payload<LoggedIn> {
    let gmail = normalize_email(&required_text(login.gmail, "gmail")?);
    let password = required_text(login.password, "password")?;
    let role = required_text(login.role, "role")?;
    let by_gmail = || Filter::new().eq("gmail", gmail.as_str());

    let (id, hash, user) = match Role::parse(&role) {
        Some(Role::Student) => {
            let student = state
                .store
                .find_one::<StudentData>(by_gmail())
                .await?
                .ok_or_else(|| failure("User not found"))?;
            let user = student_user(student.id, &student.profile);
            (student.id, student.record.password_hash, user)
        }
        Some(Role::Teacher) => {
            let teacher = state
                .store
                .find_one::<TeacherData>(by_gmail())
                .await?
                .ok_or_else(|| failure("User not found"))?;
            let user = teacher_user(teacher.id, &teacher.profile);
            (teacher.id, teacher.record.password_hash, user)
        }
        _ => return Err(Error::invalid("`role` must be `student` or `teacher`")),
    };

    if !verify_password(&password, &hash)? {
        return Err(failure("Invalid password"));
    }

    let session = state.identity.issue(Principal {
        id,
        role: user.role,
    })?;
    log::info!("{} `{}` logged in", user.role.as_str(), gmail);
    proceeds(LoggedIn {
        token: session.token,
        expires_at: session.expires_at,
        user,
    })
}

pub async fn current_user(
    principal: Principal,
    Extension(state): Extension<Arc<AppState>>,
) -> Payload<CurrentUser> {
    let user = match principal.role {
        Role::Admin => admin_user(&state.config.admin_email),
        Role::Student => {
            let student = state
                .store
                .get::<StudentData>(principal.id)
                .await?
                .ok_or_else(|| Error::not_found("Account no longer exists"))?;
            student_user(student.id, &student.profile)
        }
        Role::Teacher => {
            let teacher = state
                .store
                .get::<TeacherData>(principal.id)
                .await?
                .ok_or_else(|| Error::not_found("Account no longer exists"))?;
            teacher_user(teacher.id, &teacher.profile)
        }
    };
    proceeds(CurrentUser { user })
}

fn student_user(id: Uuid, student: &crate::models::StudentProfile) -> SessionUser {
    SessionUser {
        id: Some(id),
        name: student.name.clone(),
        gmail: student.gmail.clone(),
        roll_no: Some(student.roll_no.clone()),
        branch: Some(student.branch.clone()),
        role: Role::Student,
    }
}

fn teacher_user(id: Uuid, teacher: &crate::models::TeacherProfile) -> SessionUser {
    SessionUser {
        id: Some(id),
        name: teacher.name.clone(),
        gmail: teacher.gmail.clone(),
        roll_no: None,
        branch: None,
        role: Role::Teacher,
    }
}

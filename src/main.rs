pub mod admin;
pub mod attendance;
pub mod auth;
pub mod config;
pub mod err;
pub mod extract;
pub mod fees;
pub mod frontend;
pub mod io;
pub mod models;
pub mod store;
pub mod teacher;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::handler::Handler;
use axum::routing::{get, head, post};
use axum::{Extension, Router};
use serde::Serialize;

use crate::auth::Identity;
use crate::config::Config;
pub use crate::err::Error;
use crate::err::{Fine, Maybe};
use crate::store::{MemoryStore, PgStore, RecordStore};

pub type Payload<T> = Result<Maybe<T>, Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Fine(value))
}

/// Shared by every handler through an `Extension` layer.
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub identity: Identity,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn RecordStore>) -> Result<Self, Error> {
        Ok(AppState {
            identity: Identity::new(&config)?,
            store,
            config,
        })
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/auth/admin-login", post(auth::admin_login))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/me", get(auth::current_user))
        .route("/api/ping", head(ping))
        .route("/api/fees", get(fees::list_fees))
        .route(
            "/api/admin/students",
            get(admin::list_students).post(admin::create_student),
        )
        .route(
            "/api/admin/teachers",
            get(admin::list_teachers).post(admin::create_teacher),
        )
        .route("/api/admin/reset-password", post(admin::reset_password))
        .route(
            "/api/teacher/classes",
            get(teacher::my_classes).post(teacher::create_class),
        )
        .route("/api/teacher/students/:branch", get(teacher::branch_students))
        .route("/api/attendance", post(attendance::mark_attendance))
        .route("/api/attendance/class/:class_id", get(attendance::by_class))
        .route("/api/attendance/my", get(attendance::mine))
        .route("/api/attendance/branch/:branch", get(attendance::by_branch))
        .route("/uploads/:file", get(io::serve_upload))
        .fallback(frontend::serve.into_service())
        .layer(Extension(state))
}

async fn ping() {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    io::prepare_io(&config.upload_dir).await?;

    let store: Arc<dyn RecordStore> = match &config.database_url {
        Some(url) => {
            log::info!("Connecting to the document database");
            Arc::new(PgStore::connect(url).await?)
        }
        None => {
            log::warn!("DATABASE_URL is not set; records are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let addr = config.addr;
    let state = Arc::new(AppState::new(config, store).map_err(|err| anyhow::anyhow!("{:?}", err))?);

    log::info!("Starting College ERP HTTP Server on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app(state).into_make_service())
        .await?;
    Ok(())
}

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use chrono::Duration;
use rand::{thread_rng, Rng};

pub const DEFAULT_ADMIN_EMAIL: &str = "admin@collegeerp.com";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub database_url: Option<String>,
    pub session_secret: Vec<u8>,
    pub session_ttl: Duration,
    pub upload_dir: PathBuf,
    pub admin_email: String,
    pub admin_password: String,
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(var)
    }

    /// Builds a config from any variable source; `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let addr = lookup("COLLEGE_ERP_ADDR")
            .unwrap_or_else(|| "127.0.0.1:5000".to_string())
            .parse::<SocketAddr>()
            .context("COLLEGE_ERP_ADDR must be a socket address such as 127.0.0.1:5000")?;

        let session_secret = match lookup("SESSION_SECRET") {
            Some(secret) => secret.into_bytes(),
            None => {
                log::warn!("SESSION_SECRET is not set; sessions will not survive a restart");
                thread_rng().gen::<[u8; 32]>().to_vec()
            }
        };

        let ttl_hours = match lookup("SESSION_TTL_HOURS") {
            Some(hours) => hours
                .parse::<i64>()
                .ok()
                .filter(|hours| *hours > 0)
                .context("SESSION_TTL_HOURS must be a positive number of hours")?,
            None => 24,
        };

        let admin_email = lookup("ADMIN_EMAIL")
            .unwrap_or_else(|| DEFAULT_ADMIN_EMAIL.to_string())
            .to_lowercase();
        let admin_password = match lookup("ADMIN_PASSWORD") {
            Some(password) => password,
            None => {
                log::warn!("ADMIN_PASSWORD is not set; using the built-in default");
                DEFAULT_ADMIN_PASSWORD.to_string()
            }
        };

        Ok(Config {
            addr,
            database_url: lookup("DATABASE_URL"),
            session_secret,
            session_ttl: Duration::hours(ttl_hours),
            upload_dir: PathBuf::from(lookup("UPLOAD_DIR").unwrap_or_else(|| "uploads".to_string())),
            admin_email,
            admin_password,
        })
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::bail;
use axum::extract::Path as UrlPath;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use chrono::Utc;
use rand::{thread_rng, Rng};
use tokio::fs::{create_dir_all, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};

use crate::{AppState, Error};

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const UPLOAD_URL_PREFIX: &str = "/uploads/";

pub async fn prepare_io(upload_dir: &Path) -> anyhow::Result<()> {
    create_dir_all(upload_dir).await?;
    Ok(())
}

pub async fn create_io_file<P: Into<PathBuf>>(path: P) -> anyhow::Result<File> {
    let pathbuf = path.into();
    if let Some(parent) = pathbuf.parent() {
        create_dir_all(parent).await?;
    }
    if pathbuf.exists() {
        bail!("File already exists!")
    }
    File::create(pathbuf).await.map_err(anyhow::Error::from)
}

pub async fn read_io_file<P: Into<PathBuf>>(path: P) -> anyhow::Result<Option<Vec<u8>>> {
    let buf = path.into();
    if !buf.exists() {
        return Ok(None);
    }
    let mut bytes = Vec::new();
    BufReader::new(File::open(buf).await?)
        .read_to_end(&mut bytes)
        .await?;
    Ok(Some(bytes))
}

/// Images and PDFs only.
pub fn accepted_content_type(content_type: &str) -> bool {
    content_type.starts_with("image/") || content_type == "application/pdf"
}

/// Only plain ASCII alphanumeric extensions survive; anything else is dropped.
fn extension_of(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name).extension()?.to_str()?;
    if ext.is_empty() || ext.len() > 8 || !ext.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_lowercase())
}

fn stored_name(file_name: &str) -> String {
    let stamp = Utc::now().timestamp_millis();
    let nonce: u32 = thread_rng().gen_range(0..1_000_000_000);
    match extension_of(file_name) {
        Some(ext) => format!("{}-{}.{}", stamp, nonce, ext),
        None => format!("{}-{}", stamp, nonce),
    }
}

pub fn check_upload(file_name: &str, content_type: &str, len: usize) -> Result<(), Error> {
    if !accepted_content_type(content_type) {
        return Err(Error::invalid(format!(
            "Only images and PDFs allowed! (`{}` is `{}`)",
            file_name, content_type
        )));
    }
    if len > MAX_UPLOAD_BYTES {
        return Err(oversized(file_name));
    }
    Ok(())
}

pub fn oversized(file_name: &str) -> Error {
    Error::invalid(format!(
        "`{}` exceeds the {} byte upload limit",
        file_name, MAX_UPLOAD_BYTES
    ))
}

/// Writes an uploaded file and returns the path it is served under.
pub async fn save_upload(
    upload_dir: &Path,
    file_name: &str,
    content_type: &str,
    bytes: &[u8],
) -> Result<String, Error> {
    check_upload(file_name, content_type, bytes.len())?;

    let name = stored_name(file_name);
    let file = create_io_file(upload_dir.join(&name)).await?;
    let mut writer = BufWriter::new(file);
    writer.write_all(bytes).await?;
    writer.flush().await?;
    log::info!("stored upload `{}` as {}", file_name, name);
    Ok(format!("{}{}", UPLOAD_URL_PREFIX, name))
}

fn is_single_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(|c: char| c == '/' || c == '\\')
}

pub async fn serve_upload(
    UrlPath(name): UrlPath<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Response, Error> {
    if !is_single_component(&name) {
        return Err(Error::not_found("Upload not found"));
    }
    let bytes = read_io_file(state.config.upload_dir.join(&name))
        .await?
        .ok_or_else(|| Error::not_found("Upload not found"))?;
    let mime = mime_guess::from_path(&name).first_or_octet_stream();
    Ok(([(header::CONTENT_TYPE, mime.to_string())], bytes).into_response())
}

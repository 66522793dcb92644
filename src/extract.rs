use axum::body::HttpBody;
use axum::extract::{FromRequest, Path, RequestParts};
use axum::{async_trait, BoxError, Json};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use uuid::Uuid;

use crate::err::Error;

/// `Json<T>` whose rejections come back as an `InvalidPayload` error body
/// instead of axum's plain-text rejection.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, B> FromRequest<B> for JsonBody<T>
where
    T: DeserializeOwned,
    B: HttpBody + Send,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req)
            .await
            .map(|Json(value)| JsonBody(value))
            .map_err(|rejection| Error::invalid(format!("Malformed request body: {}", rejection)))
    }
}

/// A single `:id` path segment parsed as a [`Uuid`].
pub struct PathId(pub Uuid);

#[async_trait]
impl<B> FromRequest<B> for PathId
where
    B: Send,
{
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request(req)
            .await
            .map_err(|rejection| Error::invalid(rejection.to_string()))?;
        Ok(PathId(Uuid::parse_str(&raw)?))
    }
}

/// Unwraps a required field of a request body.
pub fn required<T>(value: Option<T>, field: &str) -> Result<T, Error> {
    value.ok_or_else(|| Error::missing(field))
}

/// Like [`required`], but blank strings count as missing.
pub fn required_text(value: Option<String>, field: &str) -> Result<String, Error> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
        _ => Err(Error::missing(field)),
    }
}

/// Form inputs send numbers as text; JSON clients send real numbers.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumberOrText {
    Number(u32),
    Text(String),
}

impl NumberOrText {
    /// Blank text counts as absent.
    pub fn parse(&self, field: &str) -> Result<Option<u32>, Error> {
        match self {
            NumberOrText::Number(n) => Ok(Some(*n)),
            NumberOrText::Text(text) if text.trim().is_empty() => Ok(None),
            NumberOrText::Text(text) => text
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| Error::invalid(format!("`{}` must be a whole number", field))),
        }
    }
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp. Anything else is
/// treated as not given.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.naive_utc().date()))
}

/// Accepts RFC 3339 or the `YYYY-MM-DDTHH:MM[:SS]` form of a browser
/// `datetime-local` input, read as UTC.
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Whole years between `dob` and `today`.
pub fn age_on(dob: NaiveDate, today: NaiveDate) -> u32 {
    let mut years = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        years -= 1;
    }
    years.max(0) as u32
}

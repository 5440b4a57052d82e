use std::collections::HashMap;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::Form;
use serde_json::{Map, Value};

use crate::err::Error;

#[derive(Debug, Clone)]
pub struct Upload {
    pub bytes: Bytes,
}

/// A request body before validation: text fields from JSON, urlencoded or multipart
/// bodies (or a query string), plus any file parts of a multipart body.
#[derive(Debug, Clone, Default)]
pub struct RawInput {
    pub fields: Map<String, Value>,
    pub files: HashMap<String, Upload>,
}

/// How a field showed up in the input, after trimming and empty-to-absent conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presented {
    Missing,
    Text(String),
    Other,
}

impl RawInput {
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            files: HashMap::new(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let fields = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), Value::String(value.into())))
            .collect();
        Self::from_fields(fields)
    }

    pub fn file(&self, field: &str) -> Option<&Upload> {
        self.files.get(field)
    }

    pub fn presented(&self, field: &str, trim: bool) -> Presented {
        if self.files.contains_key(field) {
            return Presented::Other;
        }
        match self.fields.get(field) {
            None | Some(Value::Null) => Presented::Missing,
            Some(Value::String(value)) => {
                let value = if trim { value.trim() } else { value.as_str() };
                if value.is_empty() {
                    Presented::Missing
                } else {
                    Presented::Text(value.to_string())
                }
            }
            Some(_) => Presented::Other,
        }
    }

    /// Trimmed text value of a field, if it is one.
    pub fn text(&self, field: &str) -> Option<String> {
        match self.presented(field, true) {
            Presented::Text(value) => Some(value),
            _ => None,
        }
    }

    async fn from_multipart(mut multipart: Multipart) -> Result<Self, MultipartError> {
        let mut input = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or("").to_string();
            let file_name = field.file_name().map(|s| s.to_string());
            let bytes = field.bytes().await?;

            match file_name {
                // An empty file input still submits a nameless, empty part.
                Some(file_name) if file_name.is_empty() && bytes.is_empty() => {}
                Some(file_name) => {
                    log::debug!("received {} ({} bytes) as {}", file_name, bytes.len(), name);
                    input.files.insert(name, Upload { bytes });
                }
                None => {
                    input.fields.insert(
                        name,
                        Value::String(String::from_utf8_lossy(&bytes).into_owned()),
                    );
                }
            }
        }
        Ok(input)
    }
}

#[async_trait]
impl<S> FromRequest<S> for RawInput
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        // Bodies over the size limit are refused outright. Other unreadable bodies degrade
        // to empty input; validation then names what is missing.
        if content_type.starts_with("multipart/form-data") {
            let parsed = match Multipart::from_request(req, state).await {
                Ok(multipart) => Self::from_multipart(multipart)
                    .await
                    .map_err(|err| (err.status(), err.body_text())),
                Err(rejection) => Err((rejection.status(), rejection.body_text())),
            };
            return match parsed {
                Ok(input) => Ok(input),
                Err((status, reason)) => unreadable("multipart", status, reason),
            };
        }

        if content_type.starts_with("application/x-www-form-urlencoded") {
            return match Form::<Vec<(String, String)>>::from_request(req, state).await {
                Ok(Form(pairs)) => Ok(Self::from_pairs(pairs)),
                Err(rejection) => unreadable("form", rejection.status(), rejection.body_text()),
            };
        }

        let body = match Bytes::from_request(req, state).await {
            Ok(body) => body,
            Err(rejection) => {
                return unreadable("raw", rejection.status(), rejection.body_text());
            }
        };
        if body.is_empty() {
            return Ok(Self::default());
        }
        match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(fields)) => Ok(Self::from_fields(fields)),
            Ok(_) => Ok(Self::default()),
            Err(err) => {
                log::debug!("discarding malformed json body: {}", err);
                Ok(Self::default())
            }
        }
    }
}

fn unreadable(kind: &str, status: StatusCode, reason: String) -> Result<RawInput, Error> {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        log::debug!("refusing oversized {} body: {}", kind, reason);
        return Err(Error::PayloadTooLarge);
    }
    log::debug!("discarding unreadable {} body: {}", kind, reason);
    Ok(RawInput::default())
}

/// Form bodies carrying uploads
///
/// Upload routes take `multipart/form-data`; when a client sends no files it
/// may post the same fields as JSON instead.
use crate::{
    error::{ApiError, ApiResult},
    media::MediaFile,
};
use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    http::header,
    Json,
};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Text fields and files of a multipart body, keyed by field name
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, Vec<MediaFile>>,
}

impl MultipartForm {
    /// Drain a multipart body. Parts with a file name are files, the rest text.
    pub async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = MultipartForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::Validation(format!("Malformed multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name.is_empty() {
                continue;
            }

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::Validation(format!("Failed to read upload: {}", e)))?;
                    if data.is_empty() {
                        continue;
                    }
                    form.files
                        .entry(name)
                        .or_default()
                        .push(MediaFile::new(Some(file_name), content_type, data.to_vec()));
                }
                None => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| ApiError::Validation(format!("Invalid form field: {}", e)))?;
                    form.fields.insert(name, text);
                }
            }
        }

        Ok(form)
    }

    fn from_json(body: Map<String, Value>) -> Self {
        let fields = body
            .into_iter()
            .filter_map(|(name, value)| match value {
                Value::Null => None,
                Value::String(text) => Some((name, text)),
                other => Some((name, other.to_string())),
            })
            .collect();
        Self {
            fields,
            files: HashMap::new(),
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn owned(&self, name: &str) -> Option<String> {
        self.fields.get(name).cloned()
    }

    /// `true`/`1`/`on` checkbox-style flags
    pub fn flag(&self, name: &str) -> bool {
        matches!(
            self.text(name).map(str::trim),
            Some("true") | Some("1") | Some("on")
        )
    }

    pub fn take_files(&mut self, name: &str) -> Vec<MediaFile> {
        self.files.remove(name).unwrap_or_default()
    }

    pub fn take_file(&mut self, name: &str) -> Option<MediaFile> {
        self.take_files(name).into_iter().next()
    }

    /// Every file regardless of field name
    pub fn take_all_files(&mut self) -> Vec<MediaFile> {
        self.files.drain().flat_map(|(_, files)| files).collect()
    }
}

#[async_trait]
impl<S> FromRequest<S> for MultipartForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/json"))
            .unwrap_or(false);

        if is_json {
            let Json(body) = Json::<Map<String, Value>>::from_request(req, state)
                .await
                .map_err(|e| ApiError::Validation(e.body_text()))?;
            return Ok(Self::from_json(body));
        }

        let multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| ApiError::Validation(e.body_text()))?;
        Self::read(multipart).await
    }
}

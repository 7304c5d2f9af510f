/// Remote media host backend
///
/// Talks to a Cloudinary-compatible HTTP API: signed multipart uploads to
/// `{api}/{cloud}/{resource}/upload` and signed deletes to
/// `{api}/{cloud}/{resource}/destroy`.
use crate::{
    error::{ApiError, ApiResult},
    media::{MediaBackend, MediaFile, MediaKind, UploadedMedia},
};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// Remote backend settings
#[derive(Debug, Clone)]
pub struct RemoteMediaConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub api_base_url: String,
    pub delivery_base_url: String,
}

#[derive(Clone)]
pub struct RemoteMediaBackend {
    client: reqwest::Client,
    config: RemoteMediaConfig,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

impl RemoteMediaBackend {
    pub fn new(config: RemoteMediaConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config: RemoteMediaConfig {
                api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
                delivery_base_url: config.delivery_base_url.trim_end_matches('/').to_string(),
                ..config
            },
        }
    }

    fn resource_type(kind: MediaKind) -> &'static str {
        match kind {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Pdf => "raw",
        }
    }

    fn endpoint(&self, kind: MediaKind, action: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.config.api_base_url,
            self.config.cloud_name,
            Self::resource_type(kind),
            action
        )
    }

    /// Sign request parameters: sorted `k=v` pairs joined by `&`, secret
    /// appended, SHA-256 hex digest.
    pub fn sign(params: &[(&str, &str)], api_secret: &str) -> String {
        let mut sorted: Vec<_> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let joined = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(joined.as_bytes());
        hasher.update(api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn asset_prefix(&self) -> String {
        format!("{}/{}/", self.config.delivery_base_url, self.config.cloud_name)
    }
}

#[async_trait]
impl MediaBackend for RemoteMediaBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn upload(&self, file: &MediaFile, kind: MediaKind, folder: &str) -> ApiResult<UploadedMedia> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = Self::sign(
            &[("folder", folder), ("timestamp", &timestamp)],
            &self.config.api_secret,
        );

        let file_name = file
            .file_name
            .clone()
            .unwrap_or_else(|| format!("upload.{}", kind.default_extension()));
        let part = Part::bytes(file.data.clone())
            .file_name(file_name)
            .mime_str(&file.content_type)
            .map_err(|e| ApiError::Validation(format!("Invalid content type: {}", e)))?;

        let form = Form::new()
            .part("file", part)
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", folder.to_string())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let response = self
            .client
            .post(self.endpoint(kind, "upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ApiError::Media(format!("Upload request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Media(format!(
                "Media host refused upload ({}): {}",
                status, body
            )));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Media(format!("Unreadable upload response: {}", e)))?;

        info!("Uploaded {} to media host as {}", kind.as_str(), uploaded.public_id);

        Ok(UploadedMedia {
            url: uploaded.secure_url,
            public_id: uploaded.public_id,
            media_type: kind,
            duration: uploaded.duration,
        })
    }

    async fn destroy(&self, public_id: &str, kind: MediaKind) -> ApiResult<()> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = Self::sign(
            &[("public_id", public_id), ("timestamp", &timestamp)],
            &self.config.api_secret,
        );

        let response = self
            .client
            .post(self.endpoint(kind, "destroy"))
            .form(&[
                ("public_id", public_id),
                ("timestamp", timestamp.as_str()),
                ("api_key", self.config.api_key.as_str()),
                ("signature", signature.as_str()),
                ("signature_algorithm", "sha256"),
            ])
            .send()
            .await
            .map_err(|e| ApiError::Media(format!("Destroy request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ApiError::Media(format!(
                "Media host refused delete of {} ({})",
                public_id,
                response.status()
            )));
        }

        let body: DestroyResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Media(format!("Unreadable destroy response: {}", e)))?;
        debug!("Destroy {} -> {}", public_id, body.result);

        match body.result.as_str() {
            "ok" | "not found" => Ok(()),
            other => Err(ApiError::Media(format!(
                "Media host could not delete {}: {}",
                public_id, other
            ))),
        }
    }

    fn owns_url(&self, url: &str) -> bool {
        url.starts_with(&self.asset_prefix())
    }

    /// `{delivery}/{cloud}/{resource}/upload/[v123/]{folder}/{name}.{ext}`
    /// gives `{folder}/{name}`; raw assets keep their extension.
    fn public_id_from_url(&self, url: &str) -> Option<String> {
        let rest = url.strip_prefix(&self.asset_prefix())?;
        let (resource, rest) = rest.split_once('/')?;
        let rest = rest.strip_prefix("upload/")?;
        let rest = rest.split(['?', '#']).next()?;

        let rest = match rest.split_once('/') {
            Some((version, tail))
                if version.len() > 1
                    && version.starts_with('v')
                    && version[1..].chars().all(|c| c.is_ascii_digit()) =>
            {
                tail
            }
            _ => rest,
        };
        if rest.is_empty() {
            return None;
        }

        if resource == "raw" {
            return Some(rest.to_string());
        }
        Some(match rest.rsplit_once('.') {
            Some((stem, _)) if !stem.ends_with('/') => stem.to_string(),
            _ => rest.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> RemoteMediaBackend {
        RemoteMediaBackend::new(RemoteMediaConfig {
            cloud_name: "demo".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            api_base_url: "https://api.cloudinary.com/v1_1/".to_string(),
            delivery_base_url: "https://res.cloudinary.com".to_string(),
        })
    }

    #[test]
    fn test_signature_is_order_independent() {
        let a = RemoteMediaBackend::sign(&[("timestamp", "1700000000"), ("folder", "posts")], "s");
        let b = RemoteMediaBackend::sign(&[("folder", "posts"), ("timestamp", "1700000000")], "s");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let mut hasher = Sha256::new();
        hasher.update(b"folder=posts&timestamp=1700000000s");
        assert_eq!(a, hex::encode(hasher.finalize()));
    }

    #[test]
    fn test_public_id_from_url() {
        let backend = backend();
        assert_eq!(
            backend.public_id_from_url(
                "https://res.cloudinary.com/demo/image/upload/v1712345678/posts/abc123.jpg"
            ),
            Some("posts/abc123".to_string())
        );
        assert_eq!(
            backend.public_id_from_url("https://res.cloudinary.com/demo/raw/upload/docs/file.pdf"),
            Some("docs/file.pdf".to_string())
        );
        assert_eq!(
            backend.public_id_from_url("https://res.cloudinary.com/other/image/upload/a.jpg"),
            None
        );
    }

    #[test]
    fn test_owns_url() {
        let backend = backend();
        assert!(backend.owns_url("https://res.cloudinary.com/demo/video/upload/v1/c/x.mp4"));
        assert!(!backend.owns_url("https://example.com/demo/video/upload/x.mp4"));
        assert_eq!(
            backend.endpoint(MediaKind::Video, "upload"),
            "https://api.cloudinary.com/v1_1/demo/video/upload"
        );
    }
}

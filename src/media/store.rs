/// Media store
///
/// Validates incoming files against the MIME whitelist and size ceiling,
/// uploads them through the configured backend under a timeout, and removes
/// assets again on a best-effort basis.
use crate::{
    config::{MediaBackendConfig, MediaConfig},
    error::{ApiError, ApiResult},
    media::{
        disk::DiskMediaBackend,
        remote::{RemoteMediaBackend, RemoteMediaConfig},
        MediaBackend, MediaFile, MediaKind, UploadedMedia,
    },
    metrics,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use std::{sync::Arc, time::Duration};

/// Result of accepting a media reference that may already be hosted
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// A data URI was uploaded
    Uploaded(UploadedMedia),
    /// The value was kept as given
    Kept(String),
}

impl UploadOutcome {
    pub fn url(&self) -> &str {
        match self {
            UploadOutcome::Uploaded(media) => &media.url,
            UploadOutcome::Kept(url) => url,
        }
    }

    pub fn was_uploaded(&self) -> bool {
        matches!(self, UploadOutcome::Uploaded(_))
    }

    /// The asset created by this call, if any
    pub fn uploaded(&self) -> Option<&UploadedMedia> {
        match self {
            UploadOutcome::Uploaded(media) => Some(media),
            UploadOutcome::Kept(_) => None,
        }
    }
}

/// Main media store
#[derive(Clone)]
pub struct MediaStore {
    backend: Arc<dyn MediaBackend>,
    upload_timeout: Duration,
    max_upload_bytes: u64,
}

impl MediaStore {
    /// Create a store for the configured backend
    pub fn new(config: &MediaConfig) -> Self {
        let backend: Arc<dyn MediaBackend> = match &config.backend {
            MediaBackendConfig::Disk {
                location,
                public_base_url,
            } => Arc::new(DiskMediaBackend::new(location.clone(), public_base_url.clone())),
            MediaBackendConfig::Remote {
                cloud_name,
                api_key,
                api_secret,
                api_base_url,
                delivery_base_url,
            } => Arc::new(RemoteMediaBackend::new(RemoteMediaConfig {
                cloud_name: cloud_name.clone(),
                api_key: api_key.clone(),
                api_secret: api_secret.clone(),
                api_base_url: api_base_url.clone(),
                delivery_base_url: delivery_base_url.clone(),
            })),
        };

        Self::with_backend(
            backend,
            Duration::from_secs(config.upload_timeout_secs),
            config.max_upload_bytes,
        )
    }

    pub fn with_backend(
        backend: Arc<dyn MediaBackend>,
        upload_timeout: Duration,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            backend,
            upload_timeout,
            max_upload_bytes,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Check a file before upload and return its category
    pub fn validate(&self, file: &MediaFile, allowed: &[MediaKind]) -> ApiResult<MediaKind> {
        let kind = file.kind().ok_or_else(|| {
            ApiError::Validation(format!("Unsupported file type: {}", file.content_type))
        })?;

        if !allowed.contains(&kind) {
            return Err(ApiError::Validation(format!(
                "A {} file is not accepted here",
                kind.as_str()
            )));
        }

        if file.data.is_empty() {
            return Err(ApiError::Validation("Uploaded file is empty".to_string()));
        }

        if file.data.len() as u64 > self.max_upload_bytes {
            return Err(ApiError::Validation(format!(
                "File exceeds the maximum size of {} bytes",
                self.max_upload_bytes
            )));
        }

        if kind == MediaKind::Image {
            match image::guess_format(&file.data) {
                Ok(ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP) => {}
                _ => {
                    return Err(ApiError::Validation(
                        "File content is not a JPEG, PNG or WebP image".to_string(),
                    ))
                }
            }
        }

        Ok(kind)
    }

    /// Validate and upload one file
    pub async fn upload(
        &self,
        file: &MediaFile,
        allowed: &[MediaKind],
        folder: &str,
    ) -> ApiResult<UploadedMedia> {
        let kind = match self.validate(file, allowed) {
            Ok(kind) => kind,
            Err(e) => {
                let label = file.kind().map(|k| k.as_str()).unwrap_or("unknown");
                metrics::record_media_upload(self.backend_name(), label, "rejected");
                return Err(e);
            }
        };

        let result =
            tokio::time::timeout(self.upload_timeout, self.backend.upload(file, kind, folder)).await;

        match result {
            Ok(Ok(media)) => {
                metrics::record_media_upload(self.backend_name(), kind.as_str(), "success");
                Ok(media)
            }
            Ok(Err(e)) => {
                metrics::record_media_upload(self.backend_name(), kind.as_str(), "failed");
                Err(e)
            }
            Err(_) => {
                metrics::record_media_upload(self.backend_name(), kind.as_str(), "timeout");
                tracing::warn!(
                    "Upload of {} to {} timed out after {:?}",
                    kind.as_str(),
                    folder,
                    self.upload_timeout
                );
                Err(ApiError::Media("Upload timed out".to_string()))
            }
        }
    }

    /// Upload several files; if any fails, the ones already stored are removed
    pub async fn upload_all(
        &self,
        files: &[MediaFile],
        allowed: &[MediaKind],
        folder: &str,
    ) -> ApiResult<Vec<UploadedMedia>> {
        for file in files {
            self.validate(file, allowed)?;
        }

        let mut uploaded = Vec::with_capacity(files.len());
        for file in files {
            match self.upload(file, allowed, folder).await {
                Ok(media) => uploaded.push(media),
                Err(e) => {
                    self.discard(&uploaded).await;
                    return Err(e);
                }
            }
        }
        Ok(uploaded)
    }

    /// Decode and upload a `data:<mime>;base64,<payload>` value
    pub async fn upload_data_uri(
        &self,
        uri: &str,
        allowed: &[MediaKind],
        folder: &str,
    ) -> ApiResult<UploadedMedia> {
        let file = decode_data_uri(uri)?;
        self.upload(&file, allowed, folder).await
    }

    /// Accept a media field sent as text: data URIs are uploaded, anything
    /// else is kept. With `require_hosted`, kept values must be URLs served
    /// by the media host.
    pub async fn accept_reference(
        &self,
        value: &str,
        allowed: &[MediaKind],
        folder: &str,
        require_hosted: bool,
    ) -> ApiResult<UploadOutcome> {
        let value = value.trim();
        if is_data_uri(value) {
            return self
                .upload_data_uri(value, allowed, folder)
                .await
                .map(UploadOutcome::Uploaded);
        }
        if require_hosted && !self.is_hosted_url(value) {
            return Err(ApiError::Validation(
                "Media URL must be hosted by the media service".to_string(),
            ));
        }
        Ok(UploadOutcome::Kept(value.to_string()))
    }

    /// Whether `url` points at the configured media host
    pub fn is_hosted_url(&self, url: &str) -> bool {
        self.backend.owns_url(url)
    }

    /// Remove an asset, logging failures
    pub async fn destroy(&self, public_id: &str, kind: MediaKind) {
        if let Err(e) = self.backend.destroy(public_id, kind).await {
            tracing::warn!("Failed to delete media {}: {}", public_id, e);
        }
    }

    /// Remove the asset behind a served URL; foreign URLs are ignored
    pub async fn destroy_url(&self, url: &str, kind: MediaKind) {
        match self.backend.public_id_from_url(url) {
            Some(public_id) => self.destroy(&public_id, kind).await,
            None => tracing::debug!("Not deleting {}: not hosted here", url),
        }
    }

    /// Remove several uploaded assets concurrently
    pub async fn discard(&self, media: &[UploadedMedia]) {
        futures::future::join_all(
            media
                .iter()
                .map(|m| self.destroy(&m.public_id, m.media_type)),
        )
        .await;
    }
}

pub fn is_data_uri(value: &str) -> bool {
    value.starts_with("data:")
}

/// Parse a base64 data URI into a file
pub fn decode_data_uri(uri: &str) -> ApiResult<MediaFile> {
    let invalid = || ApiError::Validation("Invalid data URI".to_string());

    let rest = uri.strip_prefix("data:").ok_or_else(invalid)?;
    let (meta, payload) = rest.split_once(',').ok_or_else(invalid)?;
    let mime = meta.strip_suffix(";base64").ok_or_else(invalid)?;
    if mime.is_empty() {
        return Err(invalid());
    }

    let data = STANDARD.decode(payload.trim()).map_err(|_| invalid())?;
    Ok(MediaFile::new(None, mime.to_ascii_lowercase(), data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn disk_store(max: u64) -> (TempDir, MediaStore) {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(DiskMediaBackend::new(
            dir.path().to_path_buf(),
            "http://localhost:5000/uploads",
        ));
        (dir, MediaStore::with_backend(backend, Duration::from_secs(5), max))
    }

    struct SlowBackend;

    #[async_trait]
    impl MediaBackend for SlowBackend {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn upload(&self, _: &MediaFile, kind: MediaKind, _: &str) -> ApiResult<UploadedMedia> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(UploadedMedia {
                url: "http://slow/x".to_string(),
                public_id: "x".to_string(),
                media_type: kind,
                duration: None,
            })
        }

        async fn destroy(&self, _: &str, _: MediaKind) -> ApiResult<()> {
            Ok(())
        }

        fn owns_url(&self, _: &str) -> bool {
            false
        }

        fn public_id_from_url(&self, _: &str) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_validate_rules() {
        let (_dir, store) = disk_store(64);

        let png = MediaFile::new(Some("a.png".to_string()), "image/png", PNG.to_vec());
        assert_eq!(store.validate(&png, &[MediaKind::Image]).unwrap(), MediaKind::Image);
        assert!(store.validate(&png, &[MediaKind::Video]).is_err());

        let gif = MediaFile::new(Some("a.gif".to_string()), "image/gif", b"GIF89a".to_vec());
        assert!(store.validate(&gif, &[MediaKind::Image]).is_err());

        let fake = MediaFile::new(Some("a.png".to_string()), "image/png", b"<html>".to_vec());
        assert!(store.validate(&fake, &[MediaKind::Image]).is_err());

        let big = MediaFile::new(None, "application/pdf", vec![0u8; 65]);
        assert!(matches!(
            store.validate(&big, &[MediaKind::Pdf]),
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_times_out() {
        let store = MediaStore::with_backend(Arc::new(SlowBackend), Duration::from_millis(50), 1024);
        let file = MediaFile::new(None, "video/mp4", vec![1, 2, 3]);

        let result = store.upload(&file, &[MediaKind::Video], "posts").await;
        assert!(matches!(result, Err(ApiError::Media(_))));
    }

    #[tokio::test]
    async fn test_data_uri_upload() {
        let (dir, store) = disk_store(1024);
        let uri = format!("data:image/png;base64,{}", STANDARD.encode(PNG));

        let outcome = store
            .accept_reference(&uri, &[MediaKind::Image], "profile", false)
            .await
            .unwrap();
        assert!(outcome.was_uploaded());
        assert!(store.is_hosted_url(outcome.url()));

        let UploadOutcome::Uploaded(media) = outcome else {
            panic!("expected upload");
        };
        assert!(dir.path().join(&media.public_id).exists());

        store.destroy_url(&media.url, MediaKind::Image).await;
        assert!(!dir.path().join(&media.public_id).exists());
    }

    #[tokio::test]
    async fn test_accept_reference_requires_hosting() {
        let (_dir, store) = disk_store(1024);

        let foreign = store
            .accept_reference("https://elsewhere.example/flag.png", &[MediaKind::Image], "flags", true)
            .await;
        assert!(matches!(foreign, Err(ApiError::Validation(_))));

        let kept = store
            .accept_reference("https://elsewhere.example/me.png", &[MediaKind::Image], "profile", false)
            .await
            .unwrap();
        assert_eq!(kept, UploadOutcome::Kept("https://elsewhere.example/me.png".to_string()));
    }

    #[test]
    fn test_decode_data_uri() {
        assert!(decode_data_uri("data:image/png;base64,@@@").is_err());
        assert!(decode_data_uri("data:image/png,plain").is_err());
        assert!(decode_data_uri("https://x/y.png").is_err());

        let file = decode_data_uri("data:application/pdf;base64,JVBERi0=").unwrap();
        assert_eq!(file.content_type, "application/pdf");
        assert_eq!(file.data, b"%PDF-");
    }
}

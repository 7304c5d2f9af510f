/// Disk-based media backend
use crate::{
    db,
    error::{ApiError, ApiResult},
    media::{MediaBackend, MediaFile, MediaKind, UploadedMedia},
};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Disk storage backend
///
/// Files live at `{base}/{folder}/{uuid}.{ext}` and are served by the
/// static file route mounted at `public_base_url`. The relative path doubles
/// as the asset id.
#[derive(Clone)]
pub struct DiskMediaBackend {
    base_path: PathBuf,
    public_base_url: String,
}

impl DiskMediaBackend {
    /// Create a new disk storage backend
    pub fn new(base_path: PathBuf, public_base_url: impl Into<String>) -> Self {
        Self {
            base_path,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve an asset id to a path, refusing anything that escapes the base
    fn asset_path(&self, public_id: &str) -> ApiResult<PathBuf> {
        let relative = Path::new(public_id);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe || public_id.is_empty() {
            return Err(ApiError::Validation(format!("Invalid media id: {}", public_id)));
        }
        Ok(self.base_path.join(relative))
    }
}

/// Keep folder names to a single safe path segment
fn sanitize_folder(folder: &str) -> String {
    let cleaned: String = folder
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if cleaned.is_empty() {
        "misc".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl MediaBackend for DiskMediaBackend {
    fn name(&self) -> &'static str {
        "disk"
    }

    async fn upload(&self, file: &MediaFile, kind: MediaKind, folder: &str) -> ApiResult<UploadedMedia> {
        let folder = sanitize_folder(folder);
        let extension = file
            .extension()
            .unwrap_or_else(|| kind.default_extension().to_string());
        let public_id = format!("{}/{}.{}", folder, db::new_id(), extension);

        let path = self.asset_path(&public_id)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                ApiError::Media(format!("Failed to create media directory: {}", e))
            })?;
        }
        fs::write(&path, &file.data)
            .await
            .map_err(|e| ApiError::Media(format!("Failed to write {}: {}", public_id, e)))?;

        tracing::debug!("Stored {} bytes at {}", file.data.len(), path.display());

        Ok(UploadedMedia {
            url: format!("{}/{}", self.public_base_url, public_id),
            public_id,
            media_type: kind,
            duration: None,
        })
    }

    async fn destroy(&self, public_id: &str, _kind: MediaKind) -> ApiResult<()> {
        let path = self.asset_path(public_id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ApiError::Media(format!(
                "Failed to delete {}: {}",
                public_id, e
            ))),
        }
    }

    fn owns_url(&self, url: &str) -> bool {
        self.public_id_from_url(url).is_some()
    }

    fn public_id_from_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(&self.public_base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty())
            .map(|rest| rest.split(['?', '#']).next().unwrap_or(rest).to_string())
    }
}

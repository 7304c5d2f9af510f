/// Media hosting
///
/// Pictures, videos and PDF documents attached to posts, profiles, courses
/// and library entries. Files are pushed to a [`MediaBackend`] and only the
/// resulting public URL (plus the backend's asset id) is kept in the database.

pub mod disk;
pub mod remote;
pub mod store;

pub use store::{MediaStore, UploadOutcome};

use crate::error::ApiResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Broad category of an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Pdf,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Pdf => "pdf",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            "pdf" => Some(MediaKind::Pdf),
            _ => None,
        }
    }

    /// Classify an accepted MIME type; anything off the whitelist is `None`
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" | "image/png" | "image/webp" => Some(MediaKind::Image),
            "video/mp4" | "video/quicktime" => Some(MediaKind::Video),
            "application/pdf" => Some(MediaKind::Pdf),
            _ => None,
        }
    }

    /// File extension used when the upload carries none
    pub fn default_extension(&self) -> &'static str {
        match self {
            MediaKind::Image => "jpg",
            MediaKind::Video => "mp4",
            MediaKind::Pdf => "pdf",
        }
    }
}

/// A file received from a client, before upload
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub file_name: Option<String>,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl MediaFile {
    pub fn new(file_name: Option<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name,
            content_type: content_type.into(),
            data,
        }
    }

    pub fn kind(&self) -> Option<MediaKind> {
        MediaKind::from_mime(&self.content_type)
    }

    /// Lower-cased extension from the original file name
    pub fn extension(&self) -> Option<String> {
        self.file_name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
    }
}

/// A file stored on the media host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedMedia {
    pub url: String,
    pub public_id: String,
    #[serde(rename = "type")]
    pub media_type: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// Media storage backend trait
///
/// Implementations push bytes to wherever files are served from and remove
/// them again by asset id.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Short name used in logs and metrics
    fn name(&self) -> &'static str;

    /// Store `file` under `folder` and return where it is served
    async fn upload(&self, file: &MediaFile, kind: MediaKind, folder: &str) -> ApiResult<UploadedMedia>;

    /// Remove a stored asset; missing assets are not an error
    async fn destroy(&self, public_id: &str, kind: MediaKind) -> ApiResult<()>;

    /// Whether `url` points at an asset this backend serves
    fn owns_url(&self, url: &str) -> bool;

    /// Recover the asset id from a served URL
    fn public_id_from_url(&self, url: &str) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_whitelist() {
        assert_eq!(MediaKind::from_mime("image/png"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_mime("IMAGE/JPEG"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_mime("video/quicktime"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_mime("application/pdf"), Some(MediaKind::Pdf));
        assert_eq!(MediaKind::from_mime("image/gif"), None);
        assert_eq!(MediaKind::from_mime("text/html"), None);
    }

    #[test]
    fn test_file_extension() {
        let file = MediaFile::new(Some("Cours 1.MP4".to_string()), "video/mp4", vec![]);
        assert_eq!(file.extension().as_deref(), Some("mp4"));

        let bare = MediaFile::new(Some("README".to_string()), "application/pdf", vec![]);
        assert_eq!(bare.extension(), None);

        let sneaky = MediaFile::new(Some("a.p/df".to_string()), "application/pdf", vec![]);
        assert_eq!(sneaky.extension(), None);
    }
}

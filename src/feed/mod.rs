/// Content feed
///
/// Posts and panneaux share one storage layout and one set of operations;
/// [`FeedKind`] selects which of the two a [`FeedManager`] serves. A
/// publication owns its media, likes, comments (each with an ordered reply
/// list) and per-platform share counters.

mod comments;
mod manager;
mod shares;

pub use manager::FeedManager;

use crate::{
    account::PublicUser,
    error::{ApiError, ApiResult},
    media::{MediaFile, MediaKind, UploadedMedia},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which collection a publication belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Post,
    Panneau,
}

impl FeedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::Post => "post",
            FeedKind::Panneau => "panneau",
        }
    }

    /// Human label used in messages
    pub fn label(&self) -> &'static str {
        match self {
            FeedKind::Post => "Post",
            FeedKind::Panneau => "Panneau",
        }
    }

    /// Media host folder for this collection
    pub fn folder(&self) -> &'static str {
        match self {
            FeedKind::Post => "posts",
            FeedKind::Panneau => "panneaux",
        }
    }

    /// Key holding the items in feed responses
    pub fn collection_key(&self) -> &'static str {
        match self {
            FeedKind::Post => "posts",
            FeedKind::Panneau => "panneaux",
        }
    }

    pub fn max_images(&self) -> usize {
        match self {
            FeedKind::Post => 1,
            FeedKind::Panneau => 5,
        }
    }

    pub fn accepts_pdf(&self) -> bool {
        matches!(self, FeedKind::Panneau)
    }
}

/// Files attached to a create call, grouped by form field
#[derive(Debug, Clone, Default)]
pub struct FeedUploads {
    pub images: Vec<MediaFile>,
    pub video: Vec<MediaFile>,
    pub pdf: Vec<MediaFile>,
}

impl FeedUploads {
    /// The single media category used, with its files.
    ///
    /// Mixing categories or exceeding the per-field counts is rejected.
    pub fn single_category(self, kind: FeedKind) -> ApiResult<Option<(MediaKind, Vec<MediaFile>)>> {
        let used = [!self.images.is_empty(), !self.video.is_empty(), !self.pdf.is_empty()]
            .iter()
            .filter(|used| **used)
            .count();
        if used > 1 {
            return Err(ApiError::Validation(
                "Only one type of media can be attached".to_string(),
            ));
        }

        if self.images.len() > kind.max_images() {
            return Err(ApiError::Validation(format!(
                "At most {} image(s) can be attached",
                kind.max_images()
            )));
        }
        if self.video.len() > 1 {
            return Err(ApiError::Validation("Only one video can be attached".to_string()));
        }
        if !self.pdf.is_empty() && !kind.accepts_pdf() {
            return Err(ApiError::Validation("PDF files are not accepted here".to_string()));
        }
        if self.pdf.len() > 1 {
            return Err(ApiError::Validation("Only one PDF can be attached".to_string()));
        }

        Ok(if !self.images.is_empty() {
            Some((MediaKind::Image, self.images))
        } else if !self.video.is_empty() {
            Some((MediaKind::Video, self.video))
        } else if !self.pdf.is_empty() {
            Some((MediaKind::Pdf, self.pdf))
        } else {
            None
        })
    }
}

/// Edit of an existing publication
#[derive(Debug, Clone, Default)]
pub struct FeedUpdate {
    pub content: String,
    /// Drop the current images
    pub remove_media: bool,
    /// Drop the current video
    pub remove_video: bool,
    /// Replaces the current images when present
    pub image: Option<MediaFile>,
    /// Replaces the current video when present
    pub video: Option<MediaFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: String,
    pub user: PublicUser,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub user: PublicUser,
    pub content: String,
    pub replies: Vec<Reply>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A publication with everything it owns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub kind: FeedKind,
    pub author: PublicUser,
    pub content: String,
    pub media: Vec<UploadedMedia>,
    pub likes: Vec<PublicUser>,
    pub like_count: usize,
    pub comments: Vec<Comment>,
    pub comment_count: usize,
    pub shares: BTreeMap<String, i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn liked_by(&self, user_id: &str) -> bool {
        self.likes.iter().any(|u| u.id == user_id)
    }

    pub fn find_comment(&self, comment_id: &str) -> Option<&Comment> {
        self.comments.iter().find(|c| c.id == comment_id)
    }
}

/// One page of a feed
#[derive(Debug, Clone)]
pub struct FeedPage {
    pub items: Vec<Post>,
    pub current_page: i64,
    pub total_pages: i64,
    pub total: i64,
}

/// Result of toggling a like
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeOutcome {
    pub likes: Vec<String>,
    pub likes_count: usize,
    pub liked: bool,
}

/// Result of adding a comment; `notify_author` is set when the post author
/// should hear about it by email
#[derive(Debug, Clone)]
pub struct CommentAdded {
    pub post: Post,
    pub comment: Comment,
    pub notify_author: bool,
}

/// Platforms a publication can be shared to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharePlatform {
    Email,
    Whatsapp,
    Linkedin,
    Facebook,
    Twitter,
    Autre,
}

impl SharePlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            SharePlatform::Email => "email",
            SharePlatform::Whatsapp => "whatsapp",
            SharePlatform::Linkedin => "linkedin",
            SharePlatform::Facebook => "facebook",
            SharePlatform::Twitter => "twitter",
            SharePlatform::Autre => "autre",
        }
    }

    pub fn parse(raw: &str) -> ApiResult<Self> {
        match raw.trim().to_lowercase().as_str() {
            "email" => Ok(SharePlatform::Email),
            "whatsapp" => Ok(SharePlatform::Whatsapp),
            "linkedin" => Ok(SharePlatform::Linkedin),
            "facebook" => Ok(SharePlatform::Facebook),
            "twitter" => Ok(SharePlatform::Twitter),
            "autre" => Ok(SharePlatform::Autre),
            _ => Err(ApiError::Validation("Invalid or missing platform".to_string())),
        }
    }
}

/// A recorded share
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Share {
    pub id: String,
    pub post: String,
    pub user: PublicUser,
    pub platform: SharePlatform,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(mime: &str) -> MediaFile {
        MediaFile::new(None, mime, vec![1])
    }

    #[test]
    fn test_single_category() {
        let mixed = FeedUploads {
            images: vec![file("image/png")],
            video: vec![file("video/mp4")],
            ..Default::default()
        };
        assert!(mixed.single_category(FeedKind::Panneau).is_err());

        let five = FeedUploads {
            images: (0..5).map(|_| file("image/png")).collect(),
            ..Default::default()
        };
        assert!(five.clone().single_category(FeedKind::Post).is_err());
        let (kind, files) = five.single_category(FeedKind::Panneau).unwrap().unwrap();
        assert_eq!(kind, MediaKind::Image);
        assert_eq!(files.len(), 5);

        let pdf = FeedUploads {
            pdf: vec![file("application/pdf")],
            ..Default::default()
        };
        assert!(pdf.clone().single_category(FeedKind::Post).is_err());
        assert!(pdf.single_category(FeedKind::Panneau).unwrap().is_some());

        assert!(FeedUploads::default()
            .single_category(FeedKind::Post)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_share_platform() {
        assert_eq!(SharePlatform::parse("WhatsApp").unwrap(), SharePlatform::Whatsapp);
        assert!(SharePlatform::parse("myspace").is_err());
        assert!(SharePlatform::parse("").is_err());
    }
}

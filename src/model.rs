use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a scheduled post. `Processing` marks a post claimed by a
/// worker sweep so overlapping sweeps never pick it up twice.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PostStatus {
    Scheduled,
    Processing,
    Posted,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Scheduled => "scheduled",
            PostStatus::Processing => "processing",
            PostStatus::Posted => "posted",
            PostStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(PostStatus::Scheduled),
            "processing" => Some(PostStatus::Processing),
            "posted" => Some(PostStatus::Posted),
            "failed" => Some(PostStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify a MIME type string; anything mentioning "video" is a video,
    /// everything else is treated as an image.
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.to_ascii_lowercase().contains("video") {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

/// A target social page with its credential and scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Page {
    pub id: i64,
    pub name: String,
    pub external_id: String,
    pub access_token: String,
    /// Comma-separated `HH:MM` times of day at which this page accepts posts.
    pub time_slots: String,
    pub allow_images: bool,
    pub allow_videos: bool,
    pub created_at: DateTime<Utc>,
}

impl Page {
    pub fn allows(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Image => self.allow_images,
            MediaKind::Video => self.allow_videos,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Folder {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MediaItem {
    pub id: i64,
    /// Key of the blob in the media store.
    pub storage_key: String,
    pub original_name: String,
    pub content_type: String,
    pub folder_id: Option<i64>,
    pub uploaded_at: DateTime<Utc>,
}

impl MediaItem {
    pub fn kind(&self) -> MediaKind {
        MediaKind::from_content_type(&self.content_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScheduledPost {
    pub id: i64,
    pub page_id: i64,
    pub media_id: Option<i64>,
    pub title: String,
    pub description: String,
    /// Target publish instant, epoch seconds, minute-aligned in practice.
    pub scheduled_time: i64,
    pub media_kind: String,
    pub status: String,
    /// Soft pause flag, orthogonal to `status`.
    pub is_active: bool,
    pub remote_post_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledPost {
    pub fn status(&self) -> Option<PostStatus> {
        PostStatus::parse(&self.status)
    }
}

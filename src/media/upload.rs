use super::types::{AlbumPost, Dimension};
use anyhow::Result;
use async_trait::async_trait;

/// Where an upload goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadTarget {
    pub chat_id: u64,
}

/// Fully resolved arguments for a single-item upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub source_url: String,
    /// Companion audio track to mux into a video.
    pub audio_url: Option<String>,
    pub title: String,
    pub thumbnail: Option<String>,
    pub post_link: String,
    pub description: String,
    pub dimension: Dimension,
    pub duration: u64,
}

/// Performs the actual transfer of resolved media to the chat.
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn photo(&self, target: UploadTarget, request: UploadRequest, as_file: bool)
        -> Result<()>;

    async fn gif(&self, target: UploadTarget, request: UploadRequest) -> Result<()>;

    async fn video(&self, target: UploadTarget, request: UploadRequest) -> Result<()>;

    async fn audio(&self, target: UploadTarget, request: UploadRequest) -> Result<()>;

    async fn album(
        &self,
        target: UploadTarget,
        album: AlbumPost,
        post_link: String,
        as_file: bool,
    ) -> Result<()>;
}

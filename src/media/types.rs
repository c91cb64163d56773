use crate::error::GrabError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dimension {
    pub width: u32,
    pub height: u32,
}

impl Dimension {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantKind {
    Video,
    Audio,
}

/// One downloadable stream listed in a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub kind: VariantKind,
    pub source_url: String,
    /// Only video variants carry a dimension.
    pub dimension: Option<Dimension>,
}

impl Variant {
    pub fn video(source_url: impl Into<String>, dimension: Dimension) -> Self {
        Self {
            kind: VariantKind::Video,
            source_url: source_url.into(),
            dimension: Some(dimension),
        }
    }

    pub fn audio(source_url: impl Into<String>) -> Self {
        Self {
            kind: VariantKind::Audio,
            source_url: source_url.into(),
            dimension: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailableMedia {
    pub videos: Vec<Variant>,
    pub audios: Vec<Variant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Gif,
    Video,
}

impl MediaKind {
    /// Maps the `e` field of gallery media metadata.
    pub fn from_gallery_kind(kind: &str) -> Result<Self, GrabError> {
        match kind {
            "Image" => Ok(MediaKind::Photo),
            "AnimatedImage" => Ok(MediaKind::Gif),
            other => Err(GrabError::UnknownMediaKind(other.to_string())),
        }
    }
}

/// A selectable entry of a single-item post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEntry {
    pub link: String,
    /// Display label, e.g. `1080` or `640x480`.
    pub quality: String,
    pub dimension: Dimension,
    pub audio_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPost {
    pub title: String,
    pub description: String,
    pub thumbnail: Option<String>,
    pub kind: MediaKind,
    /// Seconds; zero when unknown or not applicable.
    pub duration: u64,
    pub medias: Vec<MediaEntry>,
}

impl MediaPost {
    /// Index of the audio-only entry of a video post, if it has one.
    pub fn audio_index(&self) -> Option<usize> {
        if self.kind != MediaKind::Video {
            return None;
        }
        self.medias.iter().position(|m| m.audio_only)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumItem {
    pub link: String,
    pub caption: String,
    pub kind: MediaKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumPost {
    pub title: String,
    pub items: Vec<AlbumItem>,
}

/// Everything a post lookup can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    Text { title: String, text: String },
    Comment { text: String },
    Media(MediaPost),
    Album(AlbumPost),
}

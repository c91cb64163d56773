mod manifest;
mod quality;
mod reddit;
mod types;
mod upload;
mod utils;

pub use reddit::{PostFetcher, RedditFetcher};
pub use types::{AlbumItem, AlbumPost, Dimension, FetchResult, MediaEntry, MediaKind, MediaPost};
pub use upload::{MediaUploader, UploadRequest, UploadTarget};
pub use utils::{ffmpeg_available, mux_video_audio};

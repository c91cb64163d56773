//! Decides what happens to a fetched post and resumes pending selections.
//!
//! A fetched post either goes straight to an uploader, or its choices are
//! parked in a [`SelectionCache`] and the user gets a prompt whose buttons
//! carry the cache token. Pressing a button brings the token back through
//! [`SelectionDispatcher::handle_callback`], which consumes the entry and
//! routes the chosen link to the matching upload.

use super::cache::{SelectionCache, SelectionToken};
use super::callback::{CallbackMode, CallbackRequest};
use crate::error::GrabError;
use crate::media::{
    AlbumPost, Dimension, FetchResult, MediaEntry, MediaKind, MediaPost, MediaUploader,
    UploadRequest, UploadTarget,
};
use crate::prefs::{DownloadMode, PreferenceStore};
use crate::utils::add_link_if_needed;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Who asked, and where results go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: u64,
    pub chat_id: u64,
}

impl RequestContext {
    fn target(&self) -> UploadTarget {
        UploadTarget {
            chat_id: self.chat_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedLink {
    pub link: String,
    pub dimension: Dimension,
}

/// Choices of a single-item post waiting for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSelection {
    pub post_link: String,
    pub links: HashMap<String, CachedLink>,
    pub title: String,
    pub thumbnail: Option<String>,
    pub description: String,
    pub kind: MediaKind,
    pub duration: u64,
    /// Key in `links` of the audio-only stream of a video.
    pub audio_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAlbum {
    pub post_link: String,
    pub album: AlbumPost,
}

/// What a prompt button stands for. Rendering it is up to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionLabel {
    Quality(String),
    Audio,
    Photo(String),
    PhotoFile(String),
    AlbumMedia,
    AlbumFiles,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptOption {
    pub label: OptionLabel,
    pub request: CallbackRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Quality,
    AlbumMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub token: SelectionToken,
    pub kind: PromptKind,
    pub options: Vec<PromptOption>,
}

/// Result of handling a freshly fetched post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Text-only posts are answered with this text.
    Text(String),
    NoMedia,
    /// Media was handed to the uploader without asking.
    Dispatched,
    AwaitingChoice(Prompt),
}

/// The upload a callback ended in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Photo { as_file: bool },
    Gif,
    Video { with_audio: bool },
    Audio,
    Album { as_file: bool },
}

pub struct SelectionDispatcher {
    uploader: Arc<dyn MediaUploader>,
    prefs: Arc<dyn PreferenceStore>,
    selections: SelectionCache<CachedSelection>,
    albums: SelectionCache<CachedAlbum>,
}

impl SelectionDispatcher {
    pub fn new(
        uploader: Arc<dyn MediaUploader>,
        prefs: Arc<dyn PreferenceStore>,
        ttl: Duration,
        max_capacity: u64,
    ) -> Self {
        Self {
            uploader,
            prefs,
            selections: SelectionCache::new(ttl, max_capacity),
            albums: SelectionCache::new(ttl, max_capacity),
        }
    }

    pub async fn handle_fetched(
        &self,
        ctx: RequestContext,
        result: FetchResult,
        post_link: &str,
    ) -> Result<FetchOutcome, GrabError> {
        match result {
            FetchResult::Text { title, text } => Ok(FetchOutcome::Text(add_link_if_needed(
                &format!("{title}\n{text}"),
                post_link,
            ))),
            FetchResult::Comment { text } => {
                Ok(FetchOutcome::Text(add_link_if_needed(&text, post_link)))
            }
            FetchResult::Media(post) => self.handle_media(ctx, post, post_link).await,
            FetchResult::Album(album) => self.handle_album(ctx, album, post_link).await,
        }
    }

    async fn handle_media(
        &self,
        ctx: RequestContext,
        post: MediaPost,
        post_link: &str,
    ) -> Result<FetchOutcome, GrabError> {
        if post.medias.is_empty() {
            return Ok(FetchOutcome::NoMedia);
        }

        if let Some((entry, upload)) = single_dispatchable(&post) {
            debug!("Dispatching {:?} post without prompt: {}", post.kind, post_link);
            let request = UploadRequest {
                source_url: entry.link.clone(),
                audio_url: None,
                title: post.title.clone(),
                thumbnail: post.thumbnail.clone(),
                post_link: post_link.to_string(),
                description: post.description.clone(),
                dimension: entry.dimension,
                duration: post.duration,
            };
            let result = match upload {
                AutoUpload::Gif => self.uploader.gif(ctx.target(), request).await,
                AutoUpload::Video => self.uploader.video(ctx.target(), request).await,
            };
            result.map_err(GrabError::Upload)?;
            return Ok(FetchOutcome::Dispatched);
        }

        let audio_key = post.audio_index().map(|i| i.to_string());
        let links = post
            .medias
            .iter()
            .enumerate()
            .map(|(i, m)| {
                (
                    i.to_string(),
                    CachedLink {
                        link: m.link.clone(),
                        dimension: m.dimension,
                    },
                )
            })
            .collect();

        let token = self.selections.put(CachedSelection {
            post_link: post_link.to_string(),
            links,
            title: post.title.clone(),
            thumbnail: post.thumbnail.clone(),
            description: post.description.clone(),
            kind: post.kind,
            duration: post.duration,
            audio_key,
        });

        let options = quality_options(&token, &post);
        info!(
            "Awaiting quality choice for {} ({} options, {} prompts pending)",
            post_link,
            options.len(),
            self.selections.len()
        );
        Ok(FetchOutcome::AwaitingChoice(Prompt {
            token,
            kind: PromptKind::Quality,
            options,
        }))
    }

    async fn handle_album(
        &self,
        ctx: RequestContext,
        album: AlbumPost,
        post_link: &str,
    ) -> Result<FetchOutcome, GrabError> {
        if album.items.is_empty() {
            return Ok(FetchOutcome::NoMedia);
        }

        let as_file = match self.prefs.mode(ctx.user_id) {
            DownloadMode::Media => false,
            DownloadMode::Files => true,
            DownloadMode::Ask => {
                let token = self.albums.put(CachedAlbum {
                    post_link: post_link.to_string(),
                    album,
                });
                let option = |label, mode| PromptOption {
                    label,
                    request: CallbackRequest {
                        token: token.to_string(),
                        link_key: None,
                        mode,
                    },
                };
                let options = vec![
                    option(OptionLabel::AlbumMedia, CallbackMode::AsMedia),
                    option(OptionLabel::AlbumFiles, CallbackMode::AsFile),
                ];
                return Ok(FetchOutcome::AwaitingChoice(Prompt {
                    token,
                    kind: PromptKind::AlbumMode,
                    options,
                }));
            }
        };

        self.uploader
            .album(ctx.target(), album, post_link.to_string(), as_file)
            .await
            .map_err(GrabError::Upload)?;
        Ok(FetchOutcome::Dispatched)
    }

    /// Resumes the selection `request` refers to. The cache entry is gone
    /// afterwards whatever the outcome.
    pub async fn handle_callback(
        &self,
        ctx: RequestContext,
        request: CallbackRequest,
    ) -> Result<Resolution, GrabError> {
        let Some(cached) = self.selections.get_and_delete(&request.token) else {
            let album = self
                .albums
                .get_and_delete(&request.token)
                .ok_or(GrabError::CacheExpired)?;
            let as_file = request.mode == CallbackMode::AsFile;
            self.uploader
                .album(ctx.target(), album.album, album.post_link, as_file)
                .await
                .map_err(GrabError::Upload)?;
            return Ok(Resolution::Album { as_file });
        };

        let link = request
            .link_key
            .as_ref()
            .and_then(|key| cached.links.get(key))
            .ok_or_else(|| GrabError::InconsistentCacheEntry {
                key: request.link_key.clone(),
            })?;

        let mut upload = UploadRequest {
            source_url: link.link.clone(),
            audio_url: None,
            title: cached.title.clone(),
            thumbnail: cached.thumbnail.clone(),
            post_link: cached.post_link.clone(),
            description: cached.description.clone(),
            dimension: link.dimension,
            duration: cached.duration,
        };
        let target = ctx.target();

        let resolution = match cached.kind {
            MediaKind::Photo => {
                let as_file = request.mode == CallbackMode::AsFile;
                self.uploader
                    .photo(target, upload, as_file)
                    .await
                    .map(|_| Resolution::Photo { as_file })
            }
            MediaKind::Gif => self
                .uploader
                .gif(target, upload)
                .await
                .map(|_| Resolution::Gif),
            MediaKind::Video
                if request.link_key.is_some() && request.link_key == cached.audio_key =>
            {
                self.uploader
                    .audio(target, upload)
                    .await
                    .map(|_| Resolution::Audio)
            }
            MediaKind::Video => {
                if let Some(key) = &cached.audio_key {
                    let audio = cached.links.get(key).ok_or_else(|| {
                        GrabError::InconsistentCacheEntry {
                            key: Some(key.clone()),
                        }
                    })?;
                    upload.audio_url = Some(audio.link.clone());
                }
                let with_audio = upload.audio_url.is_some();
                self.uploader
                    .video(target, upload)
                    .await
                    .map(|_| Resolution::Video { with_audio })
            }
        };

        resolution.map_err(GrabError::Upload)
    }
}

enum AutoUpload {
    Gif,
    Video,
}

/// The only entry of a post that needs no prompt, if there is one.
fn single_dispatchable(post: &MediaPost) -> Option<(&MediaEntry, AutoUpload)> {
    let [entry] = post.medias.as_slice() else {
        return None;
    };
    match post.kind {
        // Photos always offer the photo/file choice
        MediaKind::Photo => None,
        MediaKind::Gif => Some((entry, AutoUpload::Gif)),
        MediaKind::Video if post.audio_index().is_none() => Some((entry, AutoUpload::Video)),
        MediaKind::Video => None,
    }
}

fn quality_options(token: &SelectionToken, post: &MediaPost) -> Vec<PromptOption> {
    let request = |key: usize, mode| CallbackRequest {
        token: token.to_string(),
        link_key: Some(key.to_string()),
        mode,
    };

    let mut options = Vec::new();
    for (i, media) in post.medias.iter().enumerate() {
        match post.kind {
            MediaKind::Photo => {
                options.push(PromptOption {
                    label: OptionLabel::Photo(media.quality.clone()),
                    request: request(i, CallbackMode::AsMedia),
                });
                options.push(PromptOption {
                    label: OptionLabel::PhotoFile(media.quality.clone()),
                    request: request(i, CallbackMode::AsFile),
                });
            }
            MediaKind::Gif | MediaKind::Video => options.push(PromptOption {
                label: if media.audio_only {
                    OptionLabel::Audio
                } else {
                    OptionLabel::Quality(media.quality.clone())
                },
                request: request(i, CallbackMode::AsMedia),
            }),
        }
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::AlbumItem;
    use crate::prefs::MemoryPreferences;
    use anyhow::Result;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Photo(UploadRequest, bool),
        Gif(UploadRequest),
        Video(UploadRequest),
        Audio(UploadRequest),
        Album(usize, String, bool),
    }

    #[derive(Default)]
    struct RecordingUploader {
        calls: Mutex<Vec<Call>>,
        fail: bool,
    }

    impl RecordingUploader {
        fn record(&self, call: Call) -> Result<()> {
            self.calls.lock().push(call);
            if self.fail {
                anyhow::bail!("upload rejected");
            }
            Ok(())
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl MediaUploader for RecordingUploader {
        async fn photo(&self, _: UploadTarget, request: UploadRequest, as_file: bool) -> Result<()> {
            self.record(Call::Photo(request, as_file))
        }

        async fn gif(&self, _: UploadTarget, request: UploadRequest) -> Result<()> {
            self.record(Call::Gif(request))
        }

        async fn video(&self, _: UploadTarget, request: UploadRequest) -> Result<()> {
            self.record(Call::Video(request))
        }

        async fn audio(&self, _: UploadTarget, request: UploadRequest) -> Result<()> {
            self.record(Call::Audio(request))
        }

        async fn album(
            &self,
            _: UploadTarget,
            album: AlbumPost,
            post_link: String,
            as_file: bool,
        ) -> Result<()> {
            self.record(Call::Album(album.items.len(), post_link, as_file))
        }
    }

    const LINK: &str = "https://www.reddit.com/r/videos/comments/abc/title/";
    const CTX: RequestContext = RequestContext {
        user_id: 42,
        chat_id: 1000,
    };

    struct Harness {
        uploader: Arc<RecordingUploader>,
        prefs: Arc<MemoryPreferences>,
        dispatcher: SelectionDispatcher,
    }

    fn harness_with(uploader: RecordingUploader) -> Harness {
        let uploader = Arc::new(uploader);
        let prefs = Arc::new(MemoryPreferences::new());
        let dispatcher = SelectionDispatcher::new(
            uploader.clone(),
            prefs.clone(),
            Duration::from_secs(60),
            1_000,
        );
        Harness {
            uploader,
            prefs,
            dispatcher,
        }
    }

    fn harness() -> Harness {
        harness_with(RecordingUploader::default())
    }

    fn entry(link: &str, quality: &str, dimension: Dimension, audio_only: bool) -> MediaEntry {
        MediaEntry {
            link: link.to_string(),
            quality: quality.to_string(),
            dimension,
            audio_only,
        }
    }

    fn post(kind: MediaKind, medias: Vec<MediaEntry>) -> MediaPost {
        MediaPost {
            title: "A title".to_string(),
            description: "desc".to_string(),
            thumbnail: Some("https://thumb/1.jpg".to_string()),
            kind,
            duration: 31,
            medias,
        }
    }

    fn video_with_audio() -> MediaPost {
        post(
            MediaKind::Video,
            vec![
                entry("https://v/DASH_1080.mp4", "1080", Dimension::new(1920, 1080), false),
                entry("https://v/DASH_720.mp4", "720", Dimension::new(1280, 720), false),
                entry("https://v/DASH_AUDIO_128.mp4", "Audio", Dimension::default(), true),
            ],
        )
    }

    fn album() -> AlbumPost {
        AlbumPost {
            title: "Gallery".to_string(),
            items: vec![
                AlbumItem {
                    link: "https://i/1.jpg".to_string(),
                    caption: String::new(),
                    kind: MediaKind::Photo,
                },
                AlbumItem {
                    link: "https://i/2.gif".to_string(),
                    caption: "second".to_string(),
                    kind: MediaKind::Gif,
                },
            ],
        }
    }

    fn prompt(outcome: FetchOutcome) -> Prompt {
        match outcome {
            FetchOutcome::AwaitingChoice(prompt) => prompt,
            other => panic!("expected a prompt, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_text_and_comment_posts() {
        let h = harness();
        let outcome = h
            .dispatcher
            .handle_fetched(
                CTX,
                FetchResult::Text {
                    title: "Title".into(),
                    text: "Body".into(),
                },
                LINK,
            )
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Text(format!("Title\nBody\n\n{LINK}")));

        let outcome = h
            .dispatcher
            .handle_fetched(CTX, FetchResult::Comment { text: "nice".into() }, LINK)
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Text(format!("nice\n\n{LINK}")));
        assert!(h.uploader.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_media_post() {
        let h = harness();
        let outcome = h
            .dispatcher
            .handle_fetched(CTX, FetchResult::Media(post(MediaKind::Video, vec![])), LINK)
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::NoMedia);
    }

    #[tokio::test]
    async fn test_single_video_without_audio_dispatches_immediately() {
        let h = harness();
        let single = post(
            MediaKind::Video,
            vec![entry("https://v/DASH_480.mp4", "480", Dimension::new(854, 480), false)],
        );

        let outcome = h
            .dispatcher
            .handle_fetched(CTX, FetchResult::Media(single), LINK)
            .await
            .unwrap();

        assert_eq!(outcome, FetchOutcome::Dispatched);
        assert!(h.dispatcher.selections.is_empty());
        assert_eq!(
            h.uploader.calls(),
            vec![Call::Video(UploadRequest {
                source_url: "https://v/DASH_480.mp4".to_string(),
                audio_url: None,
                title: "A title".to_string(),
                thumbnail: Some("https://thumb/1.jpg".to_string()),
                post_link: LINK.to_string(),
                description: "desc".to_string(),
                dimension: Dimension::new(854, 480),
                duration: 31,
            })]
        );
    }

    #[tokio::test]
    async fn test_single_gif_dispatches_immediately() {
        let h = harness();
        let gif = post(
            MediaKind::Gif,
            vec![entry("https://i/a.mp4", "", Dimension::new(300, 200), false)],
        );

        let outcome = h
            .dispatcher
            .handle_fetched(CTX, FetchResult::Media(gif), LINK)
            .await
            .unwrap();

        assert_eq!(outcome, FetchOutcome::Dispatched);
        assert!(matches!(h.uploader.calls().as_slice(), [Call::Gif(r)] if r.source_url == "https://i/a.mp4"));
    }

    #[tokio::test]
    async fn test_single_photo_still_prompts() {
        let h = harness();
        let photo = post(
            MediaKind::Photo,
            vec![entry("https://i/a.jpg", "640x480", Dimension::new(640, 480), false)],
        );

        let prompt = prompt(
            h.dispatcher
                .handle_fetched(CTX, FetchResult::Media(photo), LINK)
                .await
                .unwrap(),
        );

        assert_eq!(prompt.kind, PromptKind::Quality);
        let labels: Vec<_> = prompt.options.iter().map(|o| o.label.clone()).collect();
        assert_eq!(
            labels,
            vec![
                OptionLabel::Photo("640x480".into()),
                OptionLabel::PhotoFile("640x480".into())
            ]
        );
        assert!(h.uploader.calls().is_empty());

        let as_file = prompt.options[1].request.clone();
        let resolution = h.dispatcher.handle_callback(CTX, as_file).await.unwrap();
        assert_eq!(resolution, Resolution::Photo { as_file: true });
        assert!(matches!(
            h.uploader.calls().as_slice(),
            [Call::Photo(r, true)] if r.source_url == "https://i/a.jpg"
        ));
    }

    #[tokio::test]
    async fn test_video_with_audio_registers_selection() {
        let h = harness();
        let prompt = prompt(
            h.dispatcher
                .handle_fetched(CTX, FetchResult::Media(video_with_audio()), LINK)
                .await
                .unwrap(),
        );

        assert_eq!(prompt.options.len(), 3);
        assert_eq!(prompt.options[2].label, OptionLabel::Audio);
        assert!(prompt
            .options
            .iter()
            .all(|o| o.request.token == prompt.token.as_str()));

        let cached = h
            .dispatcher
            .selections
            .get_and_delete(prompt.token.as_str())
            .unwrap();
        assert_eq!(cached.links.len(), 3);
        assert_eq!(cached.audio_key.as_deref(), Some("2"));
        assert!(cached.links.contains_key("2"));
        assert_eq!(cached.kind, MediaKind::Video);
        assert_eq!(cached.post_link, LINK);
    }

    #[tokio::test]
    async fn test_callback_on_audio_key_uploads_audio() {
        let h = harness();
        let prompt = prompt(
            h.dispatcher
                .handle_fetched(CTX, FetchResult::Media(video_with_audio()), LINK)
                .await
                .unwrap(),
        );

        let resolution = h
            .dispatcher
            .handle_callback(CTX, prompt.options[2].request.clone())
            .await
            .unwrap();

        assert_eq!(resolution, Resolution::Audio);
        assert!(matches!(
            h.uploader.calls().as_slice(),
            [Call::Audio(r)] if r.source_url == "https://v/DASH_AUDIO_128.mp4" && r.duration == 31
        ));
    }

    #[tokio::test]
    async fn test_callback_on_video_key_attaches_audio() {
        let h = harness();
        let prompt = prompt(
            h.dispatcher
                .handle_fetched(CTX, FetchResult::Media(video_with_audio()), LINK)
                .await
                .unwrap(),
        );

        let resolution = h
            .dispatcher
            .handle_callback(CTX, prompt.options[1].request.clone())
            .await
            .unwrap();

        assert_eq!(resolution, Resolution::Video { with_audio: true });
        let calls = h.uploader.calls();
        let [Call::Video(request)] = calls.as_slice() else {
            panic!("expected one video upload, got {calls:?}");
        };
        assert_eq!(request.source_url, "https://v/DASH_720.mp4");
        assert_eq!(
            request.audio_url.as_deref(),
            Some("https://v/DASH_AUDIO_128.mp4")
        );
        assert_eq!(request.dimension, Dimension::new(1280, 720));
        assert_eq!(request.post_link, LINK);
    }

    #[tokio::test]
    async fn test_callback_token_is_single_use() {
        let h = harness();
        let prompt = prompt(
            h.dispatcher
                .handle_fetched(CTX, FetchResult::Media(video_with_audio()), LINK)
                .await
                .unwrap(),
        );
        let request = prompt.options[0].request.clone();

        h.dispatcher.handle_callback(CTX, request.clone()).await.unwrap();
        let err = h.dispatcher.handle_callback(CTX, request).await.unwrap_err();

        assert!(matches!(err, GrabError::CacheExpired));
        assert_eq!(h.uploader.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_token_is_expired() {
        let h = harness();
        let err = h
            .dispatcher
            .handle_callback(
                CTX,
                CallbackRequest {
                    token: SelectionToken::generate().to_string(),
                    link_key: Some("0".into()),
                    mode: CallbackMode::AsMedia,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GrabError::CacheExpired));
        assert!(h.uploader.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_link_key_is_inconsistent() {
        let h = harness();
        let prompt = prompt(
            h.dispatcher
                .handle_fetched(CTX, FetchResult::Media(video_with_audio()), LINK)
                .await
                .unwrap(),
        );
        let mut request = prompt.options[0].request.clone();
        request.link_key = Some("9".to_string());

        let err = h.dispatcher.handle_callback(CTX, request).await.unwrap_err();

        assert!(matches!(
            err,
            GrabError::InconsistentCacheEntry { key: Some(ref k) } if k == "9"
        ));
        assert!(h.uploader.calls().is_empty());
        // The entry was consumed regardless
        assert!(h.dispatcher.selections.is_empty());
    }

    #[tokio::test]
    async fn test_dangling_audio_key_is_inconsistent() {
        let h = harness();
        let mut links = HashMap::new();
        links.insert(
            "0".to_string(),
            CachedLink {
                link: "https://v/DASH_720.mp4".to_string(),
                dimension: Dimension::new(1280, 720),
            },
        );
        let token = h.dispatcher.selections.put(CachedSelection {
            post_link: LINK.to_string(),
            links,
            title: "A title".to_string(),
            thumbnail: None,
            description: String::new(),
            kind: MediaKind::Video,
            duration: 5,
            audio_key: Some("1".to_string()),
        });

        let request = CallbackRequest {
            token: token.to_string(),
            link_key: Some("0".to_string()),
            mode: CallbackMode::AsMedia,
        };
        let err = h.dispatcher.handle_callback(CTX, request).await.unwrap_err();

        assert!(matches!(
            err,
            GrabError::InconsistentCacheEntry { key: Some(ref k) } if k == "1"
        ));
        assert!(err.is_internal());
        assert!(h.uploader.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_album_has_no_media() {
        let h = harness();
        let album = AlbumPost {
            title: "Nothing left".to_string(),
            items: vec![],
        };

        let outcome = h
            .dispatcher
            .handle_fetched(CTX, FetchResult::Album(album), LINK)
            .await
            .unwrap();

        assert_eq!(outcome, FetchOutcome::NoMedia);
        assert!(h.dispatcher.albums.is_empty());
        assert!(h.uploader.calls().is_empty());
    }

    #[tokio::test]
    async fn test_album_with_ask_prompts_then_dispatches() {
        let h = harness();
        let prompt = prompt(
            h.dispatcher
                .handle_fetched(CTX, FetchResult::Album(album()), LINK)
                .await
                .unwrap(),
        );

        assert_eq!(prompt.kind, PromptKind::AlbumMode);
        assert_eq!(prompt.options.len(), 2);
        assert!(h.uploader.calls().is_empty());

        let files = prompt.options[1].request.clone();
        assert_eq!(files.mode, CallbackMode::AsFile);
        let resolution = h.dispatcher.handle_callback(CTX, files).await.unwrap();

        assert_eq!(resolution, Resolution::Album { as_file: true });
        assert_eq!(
            h.uploader.calls(),
            vec![Call::Album(2, LINK.to_string(), true)]
        );
    }

    #[tokio::test]
    async fn test_album_uses_stored_mode() {
        let h = harness();
        h.prefs.set_mode(CTX.user_id, DownloadMode::Media);

        let outcome = h
            .dispatcher
            .handle_fetched(CTX, FetchResult::Album(album()), LINK)
            .await
            .unwrap();

        assert_eq!(outcome, FetchOutcome::Dispatched);
        assert!(h.dispatcher.albums.is_empty());
        assert_eq!(
            h.uploader.calls(),
            vec![Call::Album(2, LINK.to_string(), false)]
        );
    }

    #[tokio::test]
    async fn test_upload_failure_is_reported_and_entry_consumed() {
        let h = harness_with(RecordingUploader {
            fail: true,
            ..Default::default()
        });
        let prompt = prompt(
            h.dispatcher
                .handle_fetched(CTX, FetchResult::Media(video_with_audio()), LINK)
                .await
                .unwrap(),
        );
        let request = prompt.options[0].request.clone();

        let err = h.dispatcher.handle_callback(CTX, request.clone()).await.unwrap_err();
        assert!(matches!(err, GrabError::Upload(_)));

        let err = h.dispatcher.handle_callback(CTX, request).await.unwrap_err();
        assert!(matches!(err, GrabError::CacheExpired));
    }
}

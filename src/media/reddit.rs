use super::manifest::{fetch_manifest, resolve_stream_urls};
use super::quality::{quality_of, rank_videos};
use super::types::{
    AlbumItem, AlbumPost, AvailableMedia, Dimension, FetchResult, MediaEntry, MediaKind,
    MediaPost,
};
use crate::error::GrabError;
use crate::utils::{is_url, unescape_html};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

const REDDIT_BASE: &str = "https://www.reddit.com";

/// A post lookup result along with the canonical link of the post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPost {
    pub result: FetchResult,
    pub link: String,
}

#[async_trait]
pub trait PostFetcher: Send + Sync {
    /// Human-readable name of the source
    fn name(&self) -> &'static str;

    /// Whether `link` looks like something this source can fetch
    fn supports(&self, link: &str) -> bool;

    async fn fetch(&self, link: &str) -> Result<FetchedPost, GrabError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PostPath {
    path: String,
    is_comment: bool,
}

/// Video posts need a second request for their manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingVideo {
    dash_url: String,
    fallback_url: Option<String>,
    title: String,
    description: String,
    thumbnail: Option<String>,
    duration: u64,
    dimension: Dimension,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Classified {
    Ready(FetchResult),
    Video(PendingVideo),
}

pub struct RedditFetcher {
    client: reqwest::Client,
    base_url: String,
    max_thumbnail_dimension: u32,
}

impl RedditFetcher {
    pub fn new(client: reqwest::Client, max_thumbnail_dimension: u32) -> Self {
        Self {
            client,
            base_url: REDDIT_BASE.to_string(),
            max_thumbnail_dimension,
        }
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn get_listing(&self, path: &str) -> Result<Value, GrabError> {
        let url = format!("{}{}.json?raw_json=1", self.base_url, path);
        debug!("Fetching listing: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GrabError::PostFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GrabError::PostFetch(format!(
                "listing returned HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| GrabError::PostFetch(format!("invalid listing: {e}")))
    }

    async fn resolve_video(&self, pending: PendingVideo) -> Result<MediaPost, GrabError> {
        let media = match fetch_manifest(&self.client, &pending.dash_url).await {
            Ok(media) => media,
            Err(e) if pending.fallback_url.is_some() => {
                warn!("Using fallback video url, manifest unavailable: {}", e);
                AvailableMedia::default()
            }
            Err(e) => return Err(e),
        };
        Ok(build_video_post(pending, media))
    }
}

#[async_trait]
impl PostFetcher for RedditFetcher {
    fn name(&self) -> &'static str {
        "reddit"
    }

    fn supports(&self, link: &str) -> bool {
        parse_post_link(link).is_ok()
    }

    async fn fetch(&self, link: &str) -> Result<FetchedPost, GrabError> {
        let post_path = parse_post_link(link)?;
        let listing = self.get_listing(&post_path.path).await?;

        let result = match classify(&listing, post_path.is_comment, self.max_thumbnail_dimension)? {
            Classified::Ready(result) => result,
            Classified::Video(pending) => FetchResult::Media(self.resolve_video(pending).await?),
        };

        info!("Fetched {} post {}", self.name(), post_path.path);
        Ok(FetchedPost {
            result,
            link: format!("{}{}", REDDIT_BASE, post_path.path),
        })
    }
}

fn parse_post_link(link: &str) -> Result<PostPath, GrabError> {
    let not_a_post = || GrabError::PostFetch(format!("not a post link: {link}"));

    let url = Url::parse(link.trim()).map_err(|_| not_a_post())?;
    let host = url.host_str().ok_or_else(not_a_post)?.to_lowercase();
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    if host == "redd.it" {
        let id = segments.first().ok_or_else(not_a_post)?;
        return Ok(PostPath {
            path: format!("/comments/{id}"),
            is_comment: false,
        });
    }

    if host != "reddit.com" && !host.ends_with(".reddit.com") {
        return Err(not_a_post());
    }

    let comments = segments
        .iter()
        .position(|s| *s == "comments")
        .ok_or_else(not_a_post)?;
    if segments.len() <= comments + 1 {
        return Err(not_a_post());
    }

    // The title slug is dropped: Reddit resolves posts by id alone
    let post = format!("/{}/{}", segments[..=comments].join("/"), segments[comments + 1]);
    Ok(match segments.get(comments + 3) {
        Some(comment_id) => PostPath {
            path: format!("{post}/_/{comment_id}"),
            is_comment: true,
        },
        None => PostPath {
            path: post,
            is_comment: false,
        },
    })
}

fn str_field(value: &Value, key: &str) -> String {
    value[key].as_str().unwrap_or_default().to_string()
}

fn dimension_of(value: &Value) -> Dimension {
    Dimension::new(
        value["width"].as_u64().unwrap_or(0) as u32,
        value["height"].as_u64().unwrap_or(0) as u32,
    )
}

fn image_entry(value: &Value) -> Option<MediaEntry> {
    let link = unescape_html(value["url"].as_str()?);
    let dimension = dimension_of(value);
    Some(MediaEntry {
        link,
        quality: format!("{}x{}", dimension.width, dimension.height),
        dimension,
        audio_only: false,
    })
}

/// Source and resolutions of a preview image, largest first.
fn preview_entries(image: &Value) -> Vec<MediaEntry> {
    let mut entries: Vec<MediaEntry> = std::iter::once(&image["source"])
        .chain(image["resolutions"].as_array().into_iter().flatten())
        .filter_map(image_entry)
        .collect();
    entries.sort_by_key(|e| std::cmp::Reverse(e.dimension.width));
    entries.dedup_by(|a, b| a.link == b.link);
    entries
}

fn select_thumbnail(post: &Value, max_dimension: u32) -> Option<String> {
    let image = &post["preview"]["images"][0];
    let best = preview_entries(image)
        .into_iter()
        .filter(|e| e.dimension.width <= max_dimension && e.dimension.height <= max_dimension)
        .max_by_key(|e| e.dimension.width as u64 * e.dimension.height as u64);
    if let Some(entry) = best {
        return Some(entry.link);
    }

    post["thumbnail"]
        .as_str()
        .filter(|t| is_url(t))
        .map(unescape_html)
}

fn reddit_video(post: &Value) -> Option<&Value> {
    ["secure_media", "media"]
        .iter()
        .map(|key| &post[*key]["reddit_video"])
        .find(|v| v.is_object())
}

fn classify(
    listing: &Value,
    is_comment: bool,
    max_thumbnail: u32,
) -> Result<Classified, GrabError> {
    let post = &listing[0]["data"]["children"][0]["data"];
    if !post.is_object() {
        return Err(GrabError::PostFetch("listing has no post".to_string()));
    }

    if is_comment {
        let comment = &listing[1]["data"]["children"][0]["data"];
        let text = comment["body"]
            .as_str()
            .ok_or_else(|| GrabError::PostFetch("listing has no comment".to_string()))?;
        return Ok(Classified::Ready(FetchResult::Comment {
            text: text.to_string(),
        }));
    }

    let post = match &post["crosspost_parent_list"][0] {
        parent if parent.is_object() => parent,
        _ => post,
    };

    let title = str_field(post, "title");
    let description = str_field(post, "selftext");
    let thumbnail = select_thumbnail(post, max_thumbnail);

    if post["is_gallery"].as_bool() == Some(true) {
        return Ok(Classified::Ready(FetchResult::Album(gallery_album(post, title))));
    }

    if let Some(video) = reddit_video(post) {
        return Ok(Classified::Video(PendingVideo {
            dash_url: unescape_html(video["dash_url"].as_str().unwrap_or_default()),
            fallback_url: video["fallback_url"].as_str().map(unescape_html),
            title,
            description,
            thumbnail,
            duration: video["duration"].as_u64().unwrap_or(0),
            dimension: dimension_of(video),
        }));
    }

    let url = post["url_overridden_by_dest"]
        .as_str()
        .or(post["url"].as_str())
        .map(unescape_html)
        .unwrap_or_default();
    let lower_path = Url::parse(&url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_default();
    let image = &post["preview"]["images"][0];

    let media = |kind, medias| {
        Classified::Ready(FetchResult::Media(MediaPost {
            title: title.clone(),
            description: description.clone(),
            thumbnail: thumbnail.clone(),
            kind,
            duration: 0,
            medias,
        }))
    };

    if let Some(mp4) = image_entry(&image["variants"]["mp4"]["source"]) {
        return Ok(media(MediaKind::Gif, vec![mp4]));
    }
    if lower_path.ends_with(".gifv") {
        let link = format!("{}.mp4", url.trim_end_matches(".gifv"));
        return Ok(media(MediaKind::Gif, vec![plain_entry(link)]));
    }
    if lower_path.ends_with(".gif") {
        return Ok(media(MediaKind::Gif, vec![plain_entry(url)]));
    }

    let is_image_link = [".jpg", ".jpeg", ".png", ".webp"]
        .iter()
        .any(|ext| lower_path.ends_with(ext));
    if post["post_hint"].as_str() == Some("image") || is_image_link {
        let mut medias = preview_entries(image);
        if medias.is_empty() {
            medias.push(plain_entry(url));
        }
        return Ok(media(MediaKind::Photo, medias));
    }

    let text = if post["is_self"].as_bool() == Some(true) {
        description
    } else {
        url
    };
    Ok(Classified::Ready(FetchResult::Text { title, text }))
}

fn plain_entry(link: String) -> MediaEntry {
    MediaEntry {
        link,
        quality: "Original".to_string(),
        dimension: Dimension::default(),
        audio_only: false,
    }
}

fn gallery_album(post: &Value, title: String) -> AlbumPost {
    let metadata = &post["media_metadata"];
    let items = post["gallery_data"]["items"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|item| {
            let id = item["media_id"].as_str()?;
            let meta = &metadata[id];
            let kind = match MediaKind::from_gallery_kind(meta["e"].as_str().unwrap_or_default()) {
                Ok(kind) => kind,
                Err(e) => {
                    warn!("Skipping gallery item {}: {}", id, e);
                    return None;
                }
            };
            let source = &meta["s"];
            let link = match kind {
                MediaKind::Gif => source["mp4"].as_str().or(source["gif"].as_str()),
                _ => source["u"].as_str(),
            }?;
            Some(AlbumItem {
                link: unescape_html(link),
                caption: str_field(item, "caption"),
                kind,
            })
        })
        .collect();

    AlbumPost { title, items }
}

fn build_video_post(pending: PendingVideo, mut media: AvailableMedia) -> MediaPost {
    rank_videos(&mut media.videos);
    // Labels come from the relative names before they are resolved
    let labels: Vec<String> = media
        .videos
        .iter()
        .map(|v| match quality_of(v) {
            Some(q) => q.to_string(),
            None => "NA".to_string(),
        })
        .collect();
    resolve_stream_urls(&mut media, &pending.dash_url);

    let mut medias: Vec<MediaEntry> = media
        .videos
        .into_iter()
        .zip(labels)
        .map(|(video, quality)| MediaEntry {
            link: video.source_url,
            quality,
            dimension: video.dimension.unwrap_or_default(),
            audio_only: false,
        })
        .collect();

    if medias.is_empty() {
        if let Some(fallback) = pending.fallback_url {
            medias.push(MediaEntry {
                link: fallback,
                quality: pending.dimension.height.to_string(),
                dimension: pending.dimension,
                audio_only: false,
            });
        }
    }

    if let Some(audio) = media.audios.into_iter().next() {
        medias.push(MediaEntry {
            link: audio.source_url,
            quality: "Audio".to_string(),
            dimension: Dimension::default(),
            audio_only: true,
        });
    }

    MediaPost {
        title: pending.title,
        description: pending.description,
        thumbnail: pending.thumbnail,
        kind: MediaKind::Video,
        duration: pending.duration,
        medias,
    }
}

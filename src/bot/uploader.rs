use crate::media::{
    mux_video_audio, AlbumPost, MediaKind, MediaUploader, UploadRequest, UploadTarget,
};
use crate::utils::truncate;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use twilight_http::Client as HttpClient;
use twilight_model::{
    channel::message::Embed,
    http::attachment::Attachment,
    id::{marker::ChannelMarker, Id},
};
use twilight_util::builder::embed::{EmbedBuilder, ImageSource};
use url::Url;

const MESSAGE_LIMIT: usize = 2000;
/// Discord accepts at most this many attachments per message.
const ATTACHMENTS_PER_MESSAGE: usize = 10;

/// Uploads resolved media to Discord channels as attachments.
pub struct DiscordUploader {
    http: Arc<HttpClient>,
    client: reqwest::Client,
    max_file_size: u64,
    download_timeout: Duration,
}

impl DiscordUploader {
    pub fn new(
        http: Arc<HttpClient>,
        client: reqwest::Client,
        max_file_size_mb: u64,
        download_timeout: Duration,
    ) -> Self {
        Self {
            http,
            client,
            max_file_size: max_file_size_mb * 1_000_000,
            download_timeout,
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Downloading URL to memory: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to fetch media URL")?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Failed to download media: HTTP {}",
                response.status()
            ));
        }

        Ok(response
            .bytes()
            .await
            .context("Failed to read media data")?
            .to_vec())
    }

    /// Sends one file, or a link to it when it is over the size limit.
    async fn send_file(
        &self,
        target: UploadTarget,
        request: &UploadRequest,
        filename: String,
        data: Vec<u8>,
        as_embed: bool,
    ) -> Result<()> {
        let channel_id = channel_id(target)?;
        let caption = caption(request);

        if data.len() as u64 > self.max_file_size {
            info!(
                "{} is too large ({:.1}MB), sending link instead",
                filename,
                data.len() as f64 / 1_000_000.0
            );
            let content = truncate(
                &format!("{}\n\n📎 {}", caption, request.source_url),
                MESSAGE_LIMIT,
            );
            let message = self.http.create_message(channel_id).content(&content);
            match preview_embed(request) {
                Some(embed) => message.embeds(&[embed]).await?,
                None => message.await?,
            };
            return Ok(());
        }

        let attachment = Attachment::from_bytes(filename.clone(), data, 0);

        if as_embed {
            let image = ImageSource::attachment(&filename)
                .context("Invalid attachment file name")?;
            let embed = EmbedBuilder::new()
                .title(truncate(&request.title, 256))
                .url(request.post_link.clone())
                .image(image)
                .build();
            self.http
                .create_message(channel_id)
                .embeds(&[embed])
                .attachments(&[attachment])
                .await?;
        } else {
            self.http
                .create_message(channel_id)
                .content(&caption)
                .attachments(&[attachment])
                .await?;
        }

        Ok(())
    }

    async fn send_album_batch(
        &self,
        channel_id: Id<ChannelMarker>,
        content: &str,
        files: Vec<(String, Vec<u8>)>,
    ) -> Result<()> {
        let attachments: Vec<Attachment> = files
            .into_iter()
            .enumerate()
            .map(|(i, (name, data))| Attachment::from_bytes(name, data, i as u64))
            .collect();

        let message = self.http.create_message(channel_id).attachments(&attachments);
        if content.is_empty() {
            message.await?;
        } else {
            message.content(content).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MediaUploader for DiscordUploader {
    async fn photo(
        &self,
        target: UploadTarget,
        request: UploadRequest,
        as_file: bool,
    ) -> Result<()> {
        let data = self.download(&request.source_url).await?;
        let filename = file_name_from_url(&request.source_url, "image.jpg");
        self.send_file(target, &request, filename, data, !as_file).await
    }

    async fn gif(&self, target: UploadTarget, request: UploadRequest) -> Result<()> {
        let data = self.download(&request.source_url).await?;
        let filename = file_name_from_url(&request.source_url, "animation.mp4");
        self.send_file(target, &request, filename, data, false).await
    }

    async fn video(&self, target: UploadTarget, request: UploadRequest) -> Result<()> {
        let muxed = match &request.audio_url {
            Some(audio_url) => Some(
                mux_video_audio(&request.source_url, audio_url, self.download_timeout).await,
            ),
            None => None,
        };
        let data = match muxed {
            Some(Ok(data)) => data,
            Some(Err(e)) => {
                warn!("Sending video without audio, mux failed: {:#}", e);
                self.download(&request.source_url).await?
            }
            None => self.download(&request.source_url).await?,
        };
        self.send_file(target, &request, "video.mp4".to_string(), data, false)
            .await
    }

    async fn audio(&self, target: UploadTarget, request: UploadRequest) -> Result<()> {
        let data = self.download(&request.source_url).await?;
        self.send_file(target, &request, "audio.m4a".to_string(), data, false)
            .await
    }

    async fn album(
        &self,
        target: UploadTarget,
        album: AlbumPost,
        post_link: String,
        as_file: bool,
    ) -> Result<()> {
        let channel_id = channel_id(target)?;
        info!(
            "Uploading album of {} items as {}",
            album.items.len(),
            if as_file { "files" } else { "media" }
        );

        let mut files = Vec::new();
        for (index, item) in album.items.iter().enumerate() {
            let fallback = match item.kind {
                MediaKind::Gif => format!("{}.mp4", index + 1),
                _ => format!("{}.jpg", index + 1),
            };
            match self.download(&item.link).await {
                Ok(data) if data.len() as u64 <= self.max_file_size => {
                    files.push((item, file_name_from_url(&item.link, &fallback), data))
                }
                Ok(_) => warn!("Skipping album item over size limit: {}", item.link),
                Err(e) => warn!("Failed to download {}: {:#}", item.link, e),
            }
        }

        if files.is_empty() {
            return Err(anyhow::anyhow!("Failed to download any album item"));
        }

        let header = truncate(&format!("**{}**\n<{}>", album.title, post_link), MESSAGE_LIMIT);

        if as_file {
            self.http.create_message(channel_id).content(&header).await?;
            for (item, name, data) in files {
                let caption = truncate(&item.caption, MESSAGE_LIMIT);
                self.send_album_batch(channel_id, &caption, vec![(name, data)])
                    .await?;
            }
            return Ok(());
        }

        let mut batches = Vec::new();
        let mut current = Vec::new();
        for (_, name, data) in files {
            current.push((name, data));
            if current.len() == ATTACHMENTS_PER_MESSAGE {
                batches.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            batches.push(current);
        }

        for (i, batch) in batches.into_iter().enumerate() {
            let content = if i == 0 { header.as_str() } else { "" };
            self.send_album_batch(channel_id, content, batch).await?;
        }
        Ok(())
    }
}

/// Embed showing the post thumbnail, used when only a link can be sent.
fn preview_embed(request: &UploadRequest) -> Option<Embed> {
    let thumbnail = request.thumbnail.as_deref()?;
    let image = match ImageSource::url(thumbnail) {
        Ok(image) => image,
        Err(e) => {
            debug!("Ignoring unusable thumbnail {}: {}", thumbnail, e);
            return None;
        }
    };
    Some(
        EmbedBuilder::new()
            .title(truncate(&request.title, 256))
            .url(request.post_link.clone())
            .thumbnail(image)
            .build(),
    )
}

fn channel_id(target: UploadTarget) -> Result<Id<ChannelMarker>> {
    Id::new_checked(target.chat_id).context("Invalid channel id")
}

fn caption(request: &UploadRequest) -> String {
    let mut caption = format!("**{}**", request.title.trim());
    if !request.description.trim().is_empty() {
        caption.push('\n');
        caption.push_str(request.description.trim());
    }
    let link = truncate(&format!("\n<{}>", request.post_link), MESSAGE_LIMIT / 2);
    let body = truncate(&caption, MESSAGE_LIMIT.saturating_sub(link.chars().count()));
    body + &link
}

/// Last path segment of `url`, or `fallback` when it has none.
fn file_name_from_url(url: &str, fallback: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back())
                .filter(|name| !name.is_empty() && name.contains('.'))
                .map(|name| name.to_string())
        })
        .unwrap_or_else(|| fallback.to_string())
}

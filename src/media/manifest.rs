//! DASH manifest decoding.
//!
//! Only the parts needed to enumerate downloadable streams are modelled:
//! `MPD > Period > AdaptationSet > Representation > BaseURL`. Everything
//! else in the document is ignored.

use super::types::{AvailableMedia, Dimension, Variant};
use crate::error::GrabError;
use serde::Deserialize;
use std::io::BufRead;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Deserialize)]
struct Mpd {
    #[serde(rename = "Period", default)]
    periods: Vec<Period>,
}

#[derive(Debug, Deserialize)]
struct Period {
    #[serde(rename = "AdaptationSet", default)]
    adaptation_sets: Vec<AdaptationSet>,
}

#[derive(Debug, Deserialize)]
struct AdaptationSet {
    #[serde(rename = "@contentType", default)]
    content_type: String,
    #[serde(rename = "Representation", default)]
    representations: Vec<Representation>,
}

#[derive(Debug, Deserialize)]
struct Representation {
    #[serde(rename = "@id", default)]
    id: String,
    #[serde(rename = "@width", default)]
    width: String,
    #[serde(rename = "@height", default)]
    height: String,
    #[serde(rename = "BaseURL", default)]
    base_url: String,
}

impl Representation {
    fn dimension(&self) -> Dimension {
        Dimension::new(
            self.width.trim().parse().unwrap_or(0),
            self.height.trim().parse().unwrap_or(0),
        )
    }

    fn source_url(&self) -> String {
        self.base_url.trim().to_string()
    }
}

/// Decodes a manifest into its video and audio variants, in document order.
pub fn parse_manifest<R: BufRead>(reader: R) -> Result<AvailableMedia, GrabError> {
    let mpd: Mpd =
        quick_xml::de::from_reader(reader).map_err(|e| GrabError::ManifestParse(e.to_string()))?;

    let mut media = AvailableMedia::default();
    for set in mpd.periods.iter().flat_map(|p| &p.adaptation_sets) {
        match set.content_type.as_str() {
            "video" => media.videos.extend(
                set.representations
                    .iter()
                    .map(|r| Variant::video(r.source_url(), r.dimension())),
            ),
            "audio" => media.audios.extend(
                set.representations
                    .iter()
                    .map(|r| Variant::audio(r.source_url())),
            ),
            // Old manifests leave the content type empty and encode it in the id
            "" => {
                for r in &set.representations {
                    if r.id.starts_with("VIDEO") {
                        media.videos.push(Variant::video(r.source_url(), r.dimension()));
                    } else if r.id.starts_with("AUDIO") {
                        media.audios.push(Variant::audio(r.source_url()));
                    }
                }
            }
            other => debug!("Skipping adaptation set with content type {}", other),
        }
    }

    Ok(media)
}

/// Fetches the manifest at `manifest_url` and parses it. Stream URLs are
/// returned as written in the document; see [`resolve_stream_urls`].
pub async fn fetch_manifest(
    client: &reqwest::Client,
    manifest_url: &str,
) -> Result<AvailableMedia, GrabError> {
    if manifest_url.is_empty() {
        return Err(GrabError::ManifestFetch("empty manifest url".to_string()));
    }

    debug!("Fetching manifest: {}", manifest_url);

    let response = client
        .get(manifest_url)
        .send()
        .await
        .map_err(|e| GrabError::ManifestFetch(e.to_string()))?;

    if response.status() != reqwest::StatusCode::OK {
        return Err(GrabError::ManifestFetch(format!(
            "unexpected status {}",
            response.status()
        )));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| GrabError::ManifestFetch(e.to_string()))?;

    parse_manifest(&body[..])
}

/// Resolves relative stream URLs against the manifest location. Ranking
/// must happen before this, since the resolved host path may carry digits.
pub fn resolve_stream_urls(media: &mut AvailableMedia, manifest_url: &str) {
    let base = match Url::parse(manifest_url) {
        Ok(base) => base,
        Err(e) => {
            warn!("Cannot resolve stream urls against {}: {}", manifest_url, e);
            return;
        }
    };

    for variant in media.videos.iter_mut().chain(media.audios.iter_mut()) {
        if let Ok(joined) = base.join(&variant.source_url) {
            variant.source_url = joined.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::types::VariantKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TYPED_MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" minBufferTime="PT1.500S" type="static">
  <Period duration="PT12.5S">
    <AdaptationSet segmentAlignment="true" contentType="video" maxWidth="1920" maxHeight="1080">
      <Representation id="2" bandwidth="1200000" width="640" height="360" codecs="avc1.4d401f">
        <BaseURL>DASH_360.mp4</BaseURL>
        <SegmentBase indexRange="910-985"><Initialization range="0-909"/></SegmentBase>
      </Representation>
      <Representation id="4" bandwidth="4800000" width="1920" height="1080">
        <BaseURL>DASH_1080.mp4</BaseURL>
      </Representation>
      <Representation id="3" bandwidth="2400000" width="1280" height="720">
        <BaseURL>DASH_720.mp4</BaseURL>
      </Representation>
    </AdaptationSet>
    <AdaptationSet segmentAlignment="true" contentType="audio">
      <Representation id="5" bandwidth="128000" audioSamplingRate="44100">
        <BaseURL>DASH_AUDIO_128.mp4</BaseURL>
      </Representation>
    </AdaptationSet>
  </Period>
</MPD>"#;

    const LEGACY_MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MPD mediaPresentationDuration="PT5S">
  <Period>
    <AdaptationSet>
      <Representation id="VIDEO-1" width="480" height="270"><BaseURL>DASH_270</BaseURL></Representation>
      <Representation id="AUDIO-1"><BaseURL>audio</BaseURL></Representation>
      <Representation id="VIDEO-2" width="wide" height="720"><BaseURL>DASH_720</BaseURL></Representation>
      <Representation id="SUBTITLE-1"><BaseURL>subs.vtt</BaseURL></Representation>
    </AdaptationSet>
  </Period>
</MPD>"#;

    #[test]
    fn test_parse_typed_manifest() {
        let media = parse_manifest(TYPED_MANIFEST.as_bytes()).unwrap();

        assert_eq!(media.videos.len(), 3);
        assert_eq!(media.audios.len(), 1);
        let urls: Vec<&str> = media.videos.iter().map(|v| v.source_url.as_str()).collect();
        assert_eq!(urls, ["DASH_360.mp4", "DASH_1080.mp4", "DASH_720.mp4"]);
        assert_eq!(media.videos[1].dimension, Some(Dimension::new(1920, 1080)));
        assert_eq!(media.audios[0], Variant::audio("DASH_AUDIO_128.mp4"));
        assert!(media.audios.iter().all(|a| a.kind == VariantKind::Audio));
    }

    #[test]
    fn test_parse_legacy_manifest_uses_id_prefix() {
        let media = parse_manifest(LEGACY_MANIFEST.as_bytes()).unwrap();

        assert_eq!(media.videos.len(), 2);
        assert_eq!(media.audios.len(), 1);
        assert_eq!(media.videos[0].source_url, "DASH_270");
        assert_eq!(media.videos[0].dimension, Some(Dimension::new(480, 270)));
        // Bad width falls back to zero without failing the parse
        assert_eq!(media.videos[1].dimension, Some(Dimension::new(0, 720)));
        assert_eq!(media.audios[0].source_url, "audio");
    }

    #[test]
    fn test_parse_manifest_without_adaptation_sets() {
        let media = parse_manifest("<MPD><Period></Period></MPD>".as_bytes()).unwrap();
        assert!(media.videos.is_empty());
        assert!(media.audios.is_empty());

        let media = parse_manifest("<MPD/>".as_bytes()).unwrap();
        assert_eq!(media, AvailableMedia::default());
    }

    #[test]
    fn test_parse_manifest_rejects_broken_xml() {
        let err = parse_manifest("<MPD><Period><AdaptationSet>".as_bytes()).unwrap_err();
        assert!(matches!(err, GrabError::ManifestParse(_)));
    }

    #[test]
    fn test_resolve_relative_urls() {
        let mut media = AvailableMedia {
            videos: vec![Variant::video("DASH_720.mp4", Dimension::new(1280, 720))],
            audios: vec![Variant::audio("https://cdn.example.com/a.mp4")],
        };
        resolve_stream_urls(&mut media, "https://v.redd.it/abc123/DASHPlaylist.mpd?a=1");

        assert_eq!(media.videos[0].source_url, "https://v.redd.it/abc123/DASH_720.mp4");
        assert_eq!(media.audios[0].source_url, "https://cdn.example.com/a.mp4");
    }

    #[tokio::test]
    async fn test_fetch_manifest_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vid/DASHPlaylist.mpd"))
            .respond_with(ResponseTemplate::new(200).set_body_string(TYPED_MANIFEST))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/vid/DASHPlaylist.mpd", server.uri());
        let media = fetch_manifest(&client, &url).await.unwrap();

        assert_eq!(media.videos.len(), 3);
        assert_eq!(media.videos[0].source_url, "DASH_360.mp4");
    }

    #[tokio::test]
    async fn test_fetch_manifest_bad_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let err = fetch_manifest(&client, &format!("{}/x.mpd", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, GrabError::ManifestFetch(_)));
    }

    #[tokio::test]
    async fn test_fetch_manifest_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(TYPED_MANIFEST)
                    .set_delay(std::time::Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(100))
            .build()
            .unwrap();
        let err = fetch_manifest(&client, &format!("{}/x.mpd", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, GrabError::ManifestFetch(_)));
    }

    #[tokio::test]
    async fn test_fetch_manifest_invalid_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<MPD><Period>"))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let err = fetch_manifest(&client, &format!("{}/x.mpd", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, GrabError::ManifestParse(_)));
    }
}

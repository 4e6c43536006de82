use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::{sync::LazyLock, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{MusicSource, SourceType, Track};
use crate::error::{MusicError, MusicResult};

static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(https?://)?(www\.|m\.)?(youtube\.com/(watch\?v=|embed/|v/|shorts/)|youtu\.be/|music\.youtube\.com/)",
    )
    .expect("youtube url regex")
});

/// Cliente para interactuar con YouTube/yt-dlp
pub struct YouTubeClient {
    ytdlp_path: String,
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: String,
    duration: Option<f64>,
    uploader: Option<String>,
    uploader_url: Option<String>,
    channel_url: Option<String>,
    thumbnail: Option<String>,
    description: Option<String>,
    webpage_url: String,
    url: Option<String>,
    formats: Option<Vec<Format>>,
    is_live: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct Format {
    url: String,
    acodec: Option<String>,
    vcodec: Option<String>,
    abr: Option<f64>,
}

impl YouTubeClient {
    pub fn new(ytdlp_path: impl Into<String>) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            rate_limiter: Semaphore::new(3),
        }
    }

    /// Verifica si una URL es válida para YouTube
    pub fn is_youtube_url(url: &str) -> bool {
        YOUTUBE_URL.is_match(url)
    }

    /// Ejecuta yt-dlp y devuelve su stdout
    async fn run_ytdlp(&self, args: &[&str]) -> MusicResult<String> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| MusicError::UpstreamUnavailable(e.to_string()))?;

        let output = Command::new(&self.ytdlp_path)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                warn!("❌ No se pudo ejecutar yt-dlp: {}", e);
                MusicError::UpstreamUnavailable(format!("yt-dlp: {}", e))
            })?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            warn!("❌ yt-dlp falló: {}", error.trim());
            return Err(MusicError::UpstreamUnavailable(
                error.lines().last().unwrap_or("yt-dlp error").to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Convierte la salida JSON de yt-dlp a un Track
    fn parse_info(line: &str) -> MusicResult<Track> {
        let info: YtDlpInfo = serde_json::from_str(line)
            .map_err(|e| MusicError::UpstreamUnavailable(format!("metadata inválida: {}", e)))?;

        let stream_url = Self::select_stream_url(&info).ok_or_else(|| {
            MusicError::UpstreamUnavailable("no audio stream found".to_string())
        })?;

        let mut track = Track::new(info.title, info.webpage_url, stream_url, SourceType::YouTube);

        if let Some(uploader) = info.uploader {
            track = track.with_uploader(uploader);
        }

        if let Some(uploader_url) = info.uploader_url.or(info.channel_url) {
            track = track.with_uploader_url(uploader_url);
        }

        if let Some(thumbnail) = info.thumbnail {
            track = track.with_thumbnail(thumbnail);
        }

        if let Some(description) = info.description {
            track = track.with_description(description);
        }

        // Los directos no tienen duración
        if !info.is_live.unwrap_or(false) {
            if let Some(duration) = info.duration.filter(|d| d.is_finite() && *d > 0.0) {
                track = track.with_duration(Duration::from_secs_f64(duration));
            }
        }

        Ok(track)
    }

    /// Prioriza opus, luego el mejor formato solo-audio, luego la URL elegida por yt-dlp
    fn select_stream_url(info: &YtDlpInfo) -> Option<String> {
        let formats = info.formats.as_deref().unwrap_or_default();

        // yt-dlp lista los formatos de peor a mejor
        if let Some(opus) = formats
            .iter()
            .filter(|f| f.acodec.as_deref() == Some("opus"))
            .max_by(|a, b| by_abr(a, b))
        {
            return Some(opus.url.clone());
        }

        let best_audio = formats
            .iter()
            .filter(|f| f.vcodec.as_deref() == Some("none"))
            .filter(|f| f.acodec.as_deref().is_some_and(|codec| codec != "none"))
            .max_by(|a, b| by_abr(a, b));

        best_audio
            .map(|f| f.url.clone())
            .or_else(|| info.url.clone())
    }
}

fn by_abr(a: &Format, b: &Format) -> std::cmp::Ordering {
    a.abr
        .unwrap_or_default()
        .partial_cmp(&b.abr.unwrap_or_default())
        .unwrap_or(std::cmp::Ordering::Equal)
}

#[async_trait]
impl MusicSource for YouTubeClient {
    async fn search(&self, query: &str, limit: usize) -> MusicResult<Vec<Track>> {
        info!("🔍 Buscando en YouTube: {}", query);

        let search_query = format!("ytsearch{}:{}", limit, query);
        let stdout = self
            .run_ytdlp(&[
                "--no-playlist",
                "--dump-json",
                "--skip-download",
                "--no-warnings",
                "-f",
                "bestaudio/best",
                &search_query,
            ])
            .await?;

        let tracks = stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(Self::parse_info)
            .collect::<MusicResult<Vec<_>>>()?;

        if tracks.is_empty() {
            debug!("📭 Sin resultados para: {}", query);
            return Err(MusicError::NotFound);
        }

        Ok(tracks)
    }

    async fn get_track(&self, url: &str) -> MusicResult<Track> {
        debug!("📊 Obteniendo info de: {}", url);

        let stdout = self
            .run_ytdlp(&[
                "--no-playlist",
                "--dump-json",
                "--no-warnings",
                "-f",
                "bestaudio/best",
                url,
            ])
            .await?;

        let line = stdout
            .lines()
            .find(|line| !line.trim().is_empty())
            .ok_or(MusicError::NotFound)?;

        Self::parse_info(line)
    }

    fn is_valid_url(&self, url: &str) -> bool {
        Self::is_youtube_url(url)
    }

    fn source_name(&self) -> &'static str {
        "YouTube"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_youtube_url_detection() {
        assert!(YouTubeClient::is_youtube_url(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        ));
        assert!(YouTubeClient::is_youtube_url(
            "https://youtu.be/dQw4w9WgXcQ"
        ));
        assert!(YouTubeClient::is_youtube_url(
            "https://music.youtube.com/watch?v=test"
        ));
        assert!(!YouTubeClient::is_youtube_url("https://example.com/video"));
        assert!(!YouTubeClient::is_youtube_url("never gonna give you up"));
    }

    #[test]
    fn test_parse_info_prefers_opus() {
        let json = r#"{
            "title": "Song",
            "duration": 212.0,
            "uploader": "Artist",
            "channel_url": "https://www.youtube.com/channel/x",
            "webpage_url": "https://www.youtube.com/watch?v=abc",
            "url": "https://cdn/best",
            "formats": [
                {"url": "https://cdn/opus-low", "acodec": "opus", "vcodec": "none", "abr": 50.0},
                {"url": "https://cdn/opus-mid", "acodec": "opus", "vcodec": "none", "abr": 70.0},
                {"url": "https://cdn/m4a", "acodec": "mp4a.40.2", "vcodec": "none", "abr": 128.0},
                {"url": "https://cdn/opus", "acodec": "opus", "vcodec": "none", "abr": 160.0}
            ]
        }"#;

        let track = YouTubeClient::parse_info(json).unwrap();
        assert_eq!(track.stream_url(), "https://cdn/opus");
        assert_eq!(track.duration(), Some(Duration::from_secs(212)));
        assert_eq!(track.uploader(), Some("Artist"));
        assert_eq!(track.uploader_url(), Some("https://www.youtube.com/channel/x"));
    }

    #[test]
    fn test_parse_info_live_has_no_duration() {
        let json = r#"{
            "title": "Lofi radio",
            "duration": 0,
            "is_live": true,
            "webpage_url": "https://www.youtube.com/watch?v=live",
            "url": "https://cdn/live.m3u8"
        }"#;

        let track = YouTubeClient::parse_info(json).unwrap();
        assert!(track.is_live());
        assert_eq!(track.stream_url(), "https://cdn/live.m3u8");
    }

    #[test]
    fn test_parse_info_without_stream_is_upstream_error() {
        let json = r#"{"title": "x", "webpage_url": "https://www.youtube.com/watch?v=x"}"#;
        assert!(matches!(
            YouTubeClient::parse_info(json),
            Err(MusicError::UpstreamUnavailable(_))
        ));
        assert!(matches!(
            YouTubeClient::parse_info("not json"),
            Err(MusicError::UpstreamUnavailable(_))
        ));
    }
}

use async_trait::async_trait;
use url::Url;

use super::{MusicSource, SourceType, Track};
use crate::error::{MusicError, MusicResult};

/// Cliente para URLs de audio directas (mp3, ogg, radios...)
pub struct DirectUrlClient {}

impl DirectUrlClient {
    pub fn new() -> Self {
        Self {}
    }

    /// Usa el último segmento del path como título
    fn title_from_url(url: &Url) -> String {
        url.path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(|segment| segment.to_string())
            .unwrap_or_else(|| url.host_str().unwrap_or("stream").to_string())
    }
}

#[async_trait]
impl MusicSource for DirectUrlClient {
    async fn search(&self, _query: &str, _limit: usize) -> MusicResult<Vec<Track>> {
        Err(MusicError::NotFound)
    }

    async fn get_track(&self, url: &str) -> MusicResult<Track> {
        let parsed = Url::parse(url).map_err(|_| MusicError::NotFound)?;

        // Sin metadata: la duración queda desconocida
        Ok(Track::new(
            Self::title_from_url(&parsed),
            url.to_string(),
            url.to_string(),
            SourceType::DirectUrl,
        ))
    }

    fn is_valid_url(&self, url: &str) -> bool {
        Url::parse(url)
            .map(|parsed| matches!(parsed.scheme(), "http" | "https"))
            .unwrap_or(false)
    }

    fn source_name(&self) -> &'static str {
        "direct"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_direct_track_uses_file_name() {
        let client = DirectUrlClient::new();
        assert!(client.is_valid_url("https://cdn.example.com/music/song.mp3"));
        assert!(!client.is_valid_url("song.mp3"));
        assert!(!client.is_valid_url("ftp://example.com/song.mp3"));

        let track = client
            .get_track("https://cdn.example.com/music/song.mp3")
            .await
            .unwrap();
        assert_eq!(track.title(), "song.mp3");
        assert_eq!(track.stream_url(), "https://cdn.example.com/music/song.mp3");
        assert!(track.is_live());
    }
}

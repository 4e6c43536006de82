pub mod direct_url;
pub mod youtube;

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

pub use direct_url::DirectUrlClient;
pub use youtube::YouTubeClient;

use crate::error::{MusicError, MusicResult};

/// Trait común para todas las fuentes de música
#[async_trait]
pub trait MusicSource: Send + Sync {
    /// Busca tracks en la fuente
    async fn search(&self, query: &str, limit: usize) -> MusicResult<Vec<Track>>;

    /// Obtiene información detallada de un track por URL
    async fn get_track(&self, url: &str) -> MusicResult<Track>;

    /// Verifica si la URL es válida para esta fuente
    fn is_valid_url(&self, url: &str) -> bool;

    /// Nombre de la fuente
    fn source_name(&self) -> &'static str;
}

/// Metadata inmutable de un track resuelto
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    title: String,
    uploader: Option<String>,
    uploader_url: Option<String>,
    thumbnail: Option<String>,
    description: Option<String>,
    duration: Option<Duration>,
    url: String,
    stream_url: String,
    source_type: SourceType,
}

impl Track {
    pub fn new(title: String, url: String, stream_url: String, source_type: SourceType) -> Self {
        Self {
            title,
            uploader: None,
            uploader_url: None,
            thumbnail: None,
            description: None,
            duration: None,
            url,
            stream_url,
            source_type,
        }
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn uploader(&self) -> Option<&str> {
        self.uploader.as_deref()
    }
    pub fn uploader_url(&self) -> Option<&str> {
        self.uploader_url.as_deref()
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
    /// `None` para streams en vivo o de duración desconocida
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    pub fn url(&self) -> &str {
        &self.url
    }
    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }
    pub fn source_type(&self) -> SourceType {
        self.source_type
    }
    pub fn is_live(&self) -> bool {
        self.duration.is_none()
    }

    // Setters
    pub fn with_uploader(mut self, uploader: String) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn with_uploader_url(mut self, uploader_url: String) -> Self {
        self.uploader_url = Some(uploader_url);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: String) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.description = Some(description);
        self
    }

    /// Una duración de cero significa stream en vivo
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = (!duration.is_zero()).then_some(duration);
        self
    }
}

/// Tipos de fuentes de música
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceType {
    YouTube,
    DirectUrl,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::YouTube => "YouTube",
            SourceType::DirectUrl => "URL directa",
        }
    }
}

/// Resuelve consultas de usuario (URL o búsqueda) a un [`Track`]
pub struct SourceManager {
    youtube: Box<dyn MusicSource>,
    direct_url: Box<dyn MusicSource>,
}

impl SourceManager {
    pub fn new(ytdlp_path: impl Into<String>) -> Self {
        Self::with_sources(
            Box::new(YouTubeClient::new(ytdlp_path)),
            Box::new(DirectUrlClient::new()),
        )
    }

    pub fn with_sources(youtube: Box<dyn MusicSource>, direct_url: Box<dyn MusicSource>) -> Self {
        Self { youtube, direct_url }
    }

    /// Resuelve una URL o término de búsqueda al primer resultado.
    ///
    /// Bloquea en I/O de red (yt-dlp); siempre se llama desde una tarea
    /// async propia del comando, nunca desde el driver de una sesión.
    pub async fn resolve(&self, query: &str) -> MusicResult<Track> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MusicError::NotFound);
        }

        if self.youtube.is_valid_url(query) {
            debug!("🔗 URL de {} detectada", self.youtube.source_name());
            return self.youtube.get_track(query).await;
        }

        if self.direct_url.is_valid_url(query) {
            debug!("🔗 URL de {} detectada", self.direct_url.source_name());
            return self.direct_url.get_track(query).await;
        }

        info!("🔍 Buscando: {}", query);
        self.youtube
            .search(query, 1)
            .await?
            .into_iter()
            .next()
            .ok_or(MusicError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSource {
        name: &'static str,
        prefix: &'static str,
        results: Vec<&'static str>,
    }

    #[async_trait]
    impl MusicSource for FakeSource {
        async fn search(&self, query: &str, limit: usize) -> MusicResult<Vec<Track>> {
            Ok(self
                .results
                .iter()
                .take(limit)
                .map(|title| {
                    Track::new(
                        format!("{} ({})", title, query),
                        "https://example.com".to_string(),
                        "https://example.com/stream".to_string(),
                        SourceType::YouTube,
                    )
                })
                .collect())
        }

        async fn get_track(&self, url: &str) -> MusicResult<Track> {
            Ok(Track::new(
                self.name.to_string(),
                url.to_string(),
                url.to_string(),
                SourceType::DirectUrl,
            ))
        }

        fn is_valid_url(&self, url: &str) -> bool {
            url.starts_with(self.prefix)
        }

        fn source_name(&self) -> &'static str {
            self.name
        }
    }

    fn manager(results: Vec<&'static str>) -> SourceManager {
        SourceManager::with_sources(
            Box::new(FakeSource {
                name: "yt",
                prefix: "https://www.youtube.com/",
                results,
            }),
            Box::new(FakeSource {
                name: "direct",
                prefix: "https://",
                results: vec![],
            }),
        )
    }

    #[tokio::test]
    async fn test_resolve_dispatches_by_url() {
        let sources = manager(vec!["first"]);

        let yt = sources.resolve("https://www.youtube.com/watch?v=abc").await.unwrap();
        assert_eq!(yt.title(), "yt");

        let direct = sources.resolve("https://cdn.example.com/song.mp3").await.unwrap();
        assert_eq!(direct.title(), "direct");
    }

    #[tokio::test]
    async fn test_resolve_search_takes_top_result() {
        let sources = manager(vec!["first", "second"]);
        let track = sources.resolve("never gonna").await.unwrap();
        assert_eq!(track.title(), "first (never gonna)");
    }

    #[tokio::test]
    async fn test_resolve_without_results_is_not_found() {
        let sources = manager(vec![]);
        assert_eq!(sources.resolve("nothing").await, Err(MusicError::NotFound));
        assert_eq!(sources.resolve("   ").await, Err(MusicError::NotFound));
    }

    #[test]
    fn test_zero_duration_means_live() {
        let track = Track::new(
            "radio".to_string(),
            "u".to_string(),
            "s".to_string(),
            SourceType::DirectUrl,
        )
        .with_duration(Duration::ZERO);
        assert!(track.is_live());
        assert_eq!(track.duration(), None);
    }
}

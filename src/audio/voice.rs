//! Fronteras con la conexión de voz y el pipeline de medios.
//!
//! La sesión sólo conoce estos traits; la implementación real usa songbird
//! y las pruebas usan dobles en memoria.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{HttpRequest, Input},
    tracks::TrackHandle,
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::{
    error::{MusicError, MusicResult},
    sources::Track,
};

/// Cómo terminó una reproducción
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEnd {
    Finished,
    Failed(String),
}

/// Control sobre el track que está sonando
pub trait PlaybackHandle: Send + Sync {
    fn pause(&self) -> MusicResult<()>;
    fn resume(&self) -> MusicResult<()>;
    fn stop(&self) -> MusicResult<()>;
    fn set_volume(&self, volume: f32) -> MusicResult<()>;
}

/// Reproducción en curso: el handle y la señal de fin
pub struct Playback {
    pub handle: Box<dyn PlaybackHandle>,
    pub finished: oneshot::Receiver<PlaybackEnd>,
}

/// Conexión de voz exclusiva de una sesión
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    async fn play(&self, track: &Track, volume: f32) -> MusicResult<Playback>;
    async fn move_to(&self, channel_id: ChannelId) -> MusicResult<()>;
    async fn disconnect(&self) -> MusicResult<()>;
    fn channel_id(&self) -> ChannelId;
}

/// Crea conexiones de voz
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> MusicResult<Arc<dyn VoiceConnection>>;
}

pub struct SongbirdGateway {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdGateway {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> MusicResult<Arc<dyn VoiceConnection>> {
        let call = self.manager.join(guild_id, channel_id).await.map_err(|e| {
            error!("Error al conectar al canal de voz: {:?}", e);
            MusicError::Connection(e.to_string())
        })?;

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);

        Ok(Arc::new(SongbirdConnection {
            guild_id,
            channel_id: Mutex::new(channel_id),
            manager: self.manager.clone(),
            call,
            http: self.http.clone(),
        }))
    }
}

struct SongbirdConnection {
    guild_id: GuildId,
    channel_id: Mutex<ChannelId>,
    manager: Arc<Songbird>,
    call: Arc<tokio::sync::Mutex<Call>>,
    http: reqwest::Client,
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn play(&self, track: &Track, volume: f32) -> MusicResult<Playback> {
        // HttpRequest reanuda el stream con peticiones Range si se corta
        let input: Input = HttpRequest::new(self.http.clone(), track.stream_url().to_string()).into();

        let handle = {
            let mut call = self.call.lock().await;
            call.play_input(input)
        };

        handle.set_volume(volume).map_err(voice_error)?;

        let (tx, rx) = oneshot::channel();
        let notifier = Arc::new(Mutex::new(Some(tx)));

        handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndNotifier {
                    notifier: notifier.clone(),
                    failed: false,
                },
            )
            .map_err(voice_error)?;
        handle
            .add_event(
                Event::Track(TrackEvent::Error),
                TrackEndNotifier {
                    notifier,
                    failed: true,
                },
            )
            .map_err(voice_error)?;

        Ok(Playback {
            handle: Box::new(SongbirdPlayback(handle)),
            finished: rx,
        })
    }

    async fn move_to(&self, channel_id: ChannelId) -> MusicResult<()> {
        self.manager
            .join(self.guild_id, channel_id)
            .await
            .map_err(|e| MusicError::Connection(e.to_string()))?;
        *self.channel_id.lock() = channel_id;
        info!("🔀 Movido al canal {} en guild {}", channel_id, self.guild_id);
        Ok(())
    }

    async fn disconnect(&self) -> MusicResult<()> {
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|e| MusicError::Connection(e.to_string()))?;
        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        Ok(())
    }

    fn channel_id(&self) -> ChannelId {
        *self.channel_id.lock()
    }
}

struct SongbirdPlayback(TrackHandle);

impl PlaybackHandle for SongbirdPlayback {
    fn pause(&self) -> MusicResult<()> {
        self.0.pause().map_err(voice_error)
    }

    fn resume(&self) -> MusicResult<()> {
        self.0.play().map_err(voice_error)
    }

    fn stop(&self) -> MusicResult<()> {
        self.0.stop().map_err(voice_error)
    }

    fn set_volume(&self, volume: f32) -> MusicResult<()> {
        self.0.set_volume(volume).map_err(voice_error)
    }
}

fn voice_error(e: impl std::fmt::Display) -> MusicError {
    MusicError::Voice(e.to_string())
}

/// Reenvía el primer evento de fin o error del track al driver
struct TrackEndNotifier {
    notifier: Arc<Mutex<Option<oneshot::Sender<PlaybackEnd>>>>,
    failed: bool,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let end = if self.failed {
            let reason = match ctx {
                EventContext::Track(tracks) => tracks
                    .first()
                    .map(|(state, _)| format!("{:?}", state.playing))
                    .unwrap_or_else(|| "unknown".to_string()),
                _ => "unknown".to_string(),
            };
            PlaybackEnd::Failed(reason)
        } else {
            PlaybackEnd::Finished
        };

        if let Some(tx) = self.notifier.lock().take() {
            debug!("🏁 Track terminó: {:?}", end);
            let _ = tx.send(end);
        }

        None
    }
}

//! # Bot Module
//!
//! Discord glue for Vibe Bot: slash command registration, interaction
//! dispatch and voice state tracking.
//!
//! The [`VibeBot`] handler owns no playback state of its own. Every command
//! is routed to the guild's [`Session`](crate::audio::session::Session)
//! through the shared [`SessionRegistry`], and session events are forwarded
//! back to the text channel where the bot was last used.

use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Http, Interaction, Ready, VoiceState},
    async_trait,
    builder::CreateMessage,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::{
        registry::SessionRegistry,
        session::{PlayerStatus, SessionEvent},
    },
    config::Config,
    sources::SourceManager,
    ui::embeds,
};

/// Canciones de la cola que se muestran junto a la actual
pub const UP_NEXT: usize = 3;

/// Handler de eventos de Discord para Vibe Bot.
pub struct VibeBot {
    /// Configuración cargada del entorno
    config: Arc<Config>,
    /// Sesiones de reproducción por guild
    pub registry: Arc<SessionRegistry>,
    /// Resolución de búsquedas y URLs a tracks
    pub sources: Arc<SourceManager>,
    /// Canal de texto donde se anuncian los eventos de cada guild
    pub announce_channels: Arc<DashMap<GuildId, ChannelId>>,
    forwarder_started: AtomicBool,
}

impl VibeBot {
    pub fn new(config: Config, registry: Arc<SessionRegistry>, sources: SourceManager) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            sources: Arc::new(sources),
            announce_channels: Arc::new(DashMap::new()),
            forwarder_started: AtomicBool::new(false),
        }
    }

    /// Registra los comandos slash, por guild si hay `GUILD_ID` configurado
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                commands::register_guild_commands(ctx, guild_id).await?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Reenvía los eventos de las sesiones a Discord
    fn spawn_event_forwarder(&self, http: Arc<Http>) {
        if self.forwarder_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut events = self.registry.subscribe();
        let registry = self.registry.clone();
        let channels = self.announce_channels.clone();

        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("📭 Se perdieron {} eventos de sesión", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                let (guild_id, embed) = match event {
                    SessionEvent::NowPlaying { guild_id, song } => {
                        let (up_next, status, looping, volume) = registry
                            .get(guild_id)
                            .map(|s| {
                                (
                                    s.queue().slice(0, UP_NEXT),
                                    s.status(),
                                    s.is_looping(),
                                    s.volume(),
                                )
                            })
                            .unwrap_or((Vec::new(), PlayerStatus::Playing, false, 1.0));
                        (
                            guild_id,
                            embeds::create_now_playing_embed(
                                &song, &up_next, status, looping, volume,
                            ),
                        )
                    }
                    // /play ya respondió con el embed de canción agregada
                    SessionEvent::TrackAdded { .. } => continue,
                    SessionEvent::Stopped { guild_id, reason } => {
                        (guild_id, embeds::create_session_ended_embed(reason))
                    }
                };

                let Some(channel_id) = channels.get(&guild_id).map(|c| *c) else {
                    debug!("Sin canal de anuncios para guild {}", guild_id);
                    continue;
                };

                if let Err(e) = channel_id
                    .send_message(&http, CreateMessage::new().embed(embed))
                    .await
                {
                    warn!("No se pudo anunciar en {}: {:?}", channel_id, e);
                }
            }

            debug!("Reenvío de eventos terminado");
        });
    }
}

#[async_trait]
impl EventHandler for VibeBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("❌ Error al registrar comandos: {:?}", e);
        }

        self.spawn_event_forwarder(ctx.http.clone());
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Si alguien saca al bot del canal de voz la sesión se detiene sin
    /// volver a desconectar.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        if let Some(session) = self.registry.get(guild_id) {
            if !session.is_stopping() {
                info!("🔌 Bot desconectado en guild {}", guild_id);
                session.connection_lost().await;
            }
        }
    }
}

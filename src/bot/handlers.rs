use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    audio::{
        queue::{QueuePage, Song},
        session::{Queued, Session, SkipOutcome},
    },
    bot::{VibeBot, UP_NEXT},
    error::{MusicError, MusicResult},
    ui::embeds,
};

/// Respuesta de un comando ya resuelto
enum Reply {
    Content(String),
    Embed(CreateEmbed),
    Error(String),
}

impl From<MusicError> for Reply {
    fn from(error: MusicError) -> Self {
        Reply::Error(error.user_message())
    }
}

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &VibeBot) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return send_reply(
            ctx,
            &command,
            Reply::Error("❌ Este comando sólo funciona en un servidor".to_string()),
        )
        .await;
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    // Los avisos de la sesión van al último canal donde se usó el bot
    bot.announce_channels.insert(guild_id, command.channel_id);

    // /play resuelve la canción con yt-dlp: respuesta diferida
    if command.data.name == "play" {
        return handle_play(ctx, &command, bot, guild_id).await;
    }

    let reply = match command.data.name.as_str() {
        "join" => handle_join(ctx, &command, bot, guild_id).await,
        "leave" => handle_leave(bot, guild_id).await,
        "pause" => handle_pause(bot, guild_id),
        "resume" => handle_resume(bot, guild_id),
        "skip" => handle_skip(&command, bot, guild_id),
        "skipto" => handle_skipto(&command, bot, guild_id),
        "stop" => handle_stop(bot, guild_id).await,
        "loop" => handle_loop(&command, bot, guild_id),
        "queue" => handle_queue(&command, bot, guild_id),
        "nowplaying" => handle_nowplaying(bot, guild_id),
        "volume" => handle_volume(&command, bot, guild_id),
        "shuffle" => handle_shuffle(bot, guild_id),
        "remove" => handle_remove(&command, bot, guild_id),
        _ => Ok(Reply::Error("❌ Comando no reconocido".to_string())),
    };

    send_reply(ctx, &command, reply.unwrap_or_else(Reply::from)).await
}

async fn send_reply(ctx: &Context, command: &CommandInteraction, reply: Reply) -> Result<()> {
    let message = match reply {
        Reply::Content(content) => CreateInteractionResponseMessage::new().content(content),
        Reply::Embed(embed) => CreateInteractionResponseMessage::new().embed(embed),
        Reply::Error(content) => CreateInteractionResponseMessage::new()
            .embed(error_embed(&content))
            .ephemeral(true),
    };

    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;

    Ok(())
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &VibeBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = string_option(command, "query").unwrap_or_default().to_string();

    let Some(channel_id) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        return send_reply(ctx, command, not_in_voice()).await;
    };

    command.defer(&ctx.http).await?;

    let response = match play(bot, guild_id, channel_id, command.user.id, &query).await {
        Ok(queued) => EditInteractionResponse::new().embed(embeds::create_track_added_embed(&queued)),
        Err(e) => {
            warn!("No se pudo reproducir '{}': {}", query, e);
            EditInteractionResponse::new().embed(error_embed(&e.user_message()))
        }
    };

    command.edit_response(&ctx.http, response).await?;

    Ok(())
}

async fn play(
    bot: &VibeBot,
    guild_id: GuildId,
    channel_id: ChannelId,
    user_id: UserId,
    query: &str,
) -> MusicResult<Queued> {
    let session = joined_session(bot, guild_id, channel_id).await?;
    // Evita llamar a yt-dlp si la canción no va a caber
    if session.queue().is_full() {
        return Err(MusicError::QueueFull(bot.config.max_queue_size));
    }

    let song = Song::new(bot.sources.resolve(query).await?, user_id);

    // La sesión pudo terminar (stop, leave, inactividad) mientras se resolvía
    match session.enqueue(song.clone()) {
        Err(MusicError::SessionEnded) => {
            info!("♻️ Sesión terminada durante /play en guild {}, creando otra", guild_id);
            joined_session(bot, guild_id, channel_id)
                .await?
                .enqueue(song)
        }
        result => result,
    }
}

async fn joined_session(
    bot: &VibeBot,
    guild_id: GuildId,
    channel_id: ChannelId,
) -> MusicResult<Arc<Session>> {
    let session = bot.registry.get_or_create(guild_id);
    if session.voice_channel() != Some(channel_id) {
        session.join(channel_id).await?;
    }
    Ok(session)
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &VibeBot,
    guild_id: GuildId,
) -> MusicResult<Reply> {
    let Some(channel_id) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        return Ok(not_in_voice());
    };

    bot.registry.get_or_create(guild_id).join(channel_id).await?;

    Ok(Reply::Content(format!("🔊 Conectado a <#{}>", channel_id)))
}

async fn handle_leave(bot: &VibeBot, guild_id: GuildId) -> MusicResult<Reply> {
    if !bot.registry.leave(guild_id).await {
        return Err(MusicError::NotConnected);
    }

    Ok(Reply::Content("👋 Desconectado del canal de voz".to_string()))
}

fn handle_pause(bot: &VibeBot, guild_id: GuildId) -> MusicResult<Reply> {
    session(bot, guild_id)?.pause()?;
    Ok(Reply::Content("⏸️ Reproducción pausada".to_string()))
}

fn handle_resume(bot: &VibeBot, guild_id: GuildId) -> MusicResult<Reply> {
    session(bot, guild_id)?.resume()?;
    Ok(Reply::Content("▶️ Reproducción reanudada".to_string()))
}

fn handle_skip(command: &CommandInteraction, bot: &VibeBot, guild_id: GuildId) -> MusicResult<Reply> {
    let session = session(bot, guild_id)?;
    let title = session
        .current()
        .map(|song| song.title().to_string())
        .unwrap_or_default();

    let reply = match session.vote_skip(command.user.id, is_privileged(command))? {
        SkipOutcome::Skipped => Reply::Content(format!("⏭️ Saltada **{}**", title)),
        SkipOutcome::Voted { votes, required } => Reply::Content(format!(
            "🗳️ Voto registrado para saltar **{}** ({}/{})",
            title, votes, required
        )),
        SkipOutcome::AlreadyVoted { votes, required } => Reply::Error(format!(
            "❌ Ya votaste para saltar esta canción ({}/{})",
            votes, required
        )),
    };

    Ok(reply)
}

fn handle_skipto(
    command: &CommandInteraction,
    bot: &VibeBot,
    guild_id: GuildId,
) -> MusicResult<Reply> {
    let session = session(bot, guild_id)?;
    let index = index_option(command, "index");
    let title = session
        .queue()
        .get(index)
        .map(|song| song.title().to_string())
        .unwrap_or_default();

    session.skip_to(index)?;

    Ok(Reply::Content(format!("⏭️ Saltando a **{}**", title)))
}

async fn handle_stop(bot: &VibeBot, guild_id: GuildId) -> MusicResult<Reply> {
    if !bot.registry.leave(guild_id).await {
        return Err(MusicError::NotPlaying);
    }

    Ok(Reply::Content("⏹️ Reproducción detenida y cola limpiada".to_string()))
}

fn handle_loop(command: &CommandInteraction, bot: &VibeBot, guild_id: GuildId) -> MusicResult<Reply> {
    let enabled = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "enabled")
        .and_then(|opt| opt.value.as_bool())
        .unwrap_or(false);

    session(bot, guild_id)?.set_loop(enabled);

    Ok(Reply::Content(
        if enabled {
            "🔂 Repetir canción activado"
        } else {
            "➡️ Repetición desactivada"
        }
        .to_string(),
    ))
}

fn handle_queue(command: &CommandInteraction, bot: &VibeBot, guild_id: GuildId) -> MusicResult<Reply> {
    let page = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "page")
        .and_then(|opt| opt.value.as_i64())
        .unwrap_or(1)
        .max(1) as usize;

    let embed = match bot.registry.get(guild_id) {
        Some(session) => {
            let queue_page = session.queue().page(page, bot.config.queue_page_size);
            embeds::create_queue_embed(&queue_page, session.current().as_ref(), session.is_looping())
        }
        None => embeds::create_queue_embed(
            &QueuePage {
                items: Vec::new(),
                current_page: 1,
                total_pages: 1,
                total_items: 0,
            },
            None,
            false,
        ),
    };

    Ok(Reply::Embed(embed))
}

fn handle_nowplaying(bot: &VibeBot, guild_id: GuildId) -> MusicResult<Reply> {
    let session = session(bot, guild_id)?;
    let current = session.current().ok_or(MusicError::NotPlaying)?;

    Ok(Reply::Embed(embeds::create_now_playing_embed(
        &current,
        &session.queue().slice(0, UP_NEXT),
        session.status(),
        session.is_looping(),
        session.volume(),
    )))
}

fn handle_volume(
    command: &CommandInteraction,
    bot: &VibeBot,
    guild_id: GuildId,
) -> MusicResult<Reply> {
    let session = session(bot, guild_id)?;
    let level = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "level")
        .and_then(|opt| opt.value.as_i64());

    match level {
        Some(level) => {
            session.set_volume(level as f32 / 100.0)?;
            Ok(Reply::Content(format!("🔊 Volumen ajustado a {}%", level)))
        }
        None => Ok(Reply::Content(format!(
            "🔊 Volumen actual: {}%",
            (session.volume() * 100.0).round() as u32
        ))),
    }
}

fn handle_shuffle(bot: &VibeBot, guild_id: GuildId) -> MusicResult<Reply> {
    let session = session(bot, guild_id)?;
    session.queue().shuffle();

    Ok(Reply::Content(format!(
        "🔀 Cola mezclada ({} canciones)",
        session.queue().len()
    )))
}

fn handle_remove(
    command: &CommandInteraction,
    bot: &VibeBot,
    guild_id: GuildId,
) -> MusicResult<Reply> {
    let removed = session(bot, guild_id)?
        .queue()
        .remove(index_option(command, "index"))?;

    Ok(Reply::Content(format!("🗑️ Quitada **{}** de la cola", removed.title())))
}

// Funciones auxiliares

fn session(bot: &VibeBot, guild_id: GuildId) -> MusicResult<Arc<Session>> {
    bot.registry.get(guild_id).ok_or(MusicError::NotConnected)
}

fn error_embed(message: &str) -> CreateEmbed {
    embeds::create_error_embed("No se pudo completar", error_text(message))
}

/// El título del embed ya lleva el ❌
fn error_text(message: &str) -> &str {
    message.trim_start_matches("❌").trim_start()
}

fn not_in_voice() -> Reply {
    Reply::Error("❌ Debes estar en un canal de voz".to_string())
}

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

/// Índice base 0 a partir de la posición base 1 que ve el usuario
fn index_option(command: &CommandInteraction, name: &str) -> usize {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
        .map(to_queue_index)
        .unwrap_or(0)
}

fn to_queue_index(position: i64) -> usize {
    position.max(1) as usize - 1
}

/// Quien puede gestionar el canal o el servidor salta sin votación
fn is_privileged(command: &CommandInteraction) -> bool {
    command
        .member
        .as_ref()
        .and_then(|member| member.permissions)
        .map(|permissions| permissions.manage_channels() || permissions.manage_guild())
        .unwrap_or(false)
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_index_is_one_based_for_users() {
        assert_eq!(to_queue_index(1), 0);
        assert_eq!(to_queue_index(5), 4);
        assert_eq!(to_queue_index(0), 0);
        assert_eq!(to_queue_index(-3), 0);
    }

    #[test]
    fn test_error_text_drops_marker() {
        assert_eq!(
            error_text(&MusicError::SessionEnded.user_message()),
            "La sesión terminó, vuelve a intentarlo"
        );
        assert_eq!(error_text("sin marca"), "sin marca");
    }

    #[test]
    fn test_errors_become_ephemeral_replies() {
        match Reply::from(MusicError::NotPlaying) {
            Reply::Error(message) => assert_eq!(message, "❌ No hay música reproduciéndose"),
            _ => panic!("expected an error reply"),
        }
    }
}

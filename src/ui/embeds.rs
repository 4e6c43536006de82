use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::{
    queue::{QueuePage, Song},
    session::{PlayerStatus, Queued, StopReason},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Vibe Bot";

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(
    song: &Song,
    up_next: &[Song],
    status: PlayerStatus,
    looping: bool,
    volume: f32,
) -> CreateEmbed {
    let track = song.track();
    let title = match status {
        PlayerStatus::Paused => "⏸️ En Pausa",
        _ => "🎵 Reproduciendo Ahora",
    };

    let mut embed = CreateEmbed::default()
        .title(title)
        .description(format!("**[{}]({})**", track.title(), track.url()))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", display_duration(track.duration()), true)
        .field("👤 Solicitado por", format!("<@{}>", song.requested_by()), true)
        .field("🔊 Volumen", format!("{}%", (volume * 100.0).round() as u32), true)
        .field("🔂 Loop", if looping { "Activado" } else { "Desactivado" }, true)
        .field("🔗 Fuente", track.source_type().as_str(), true)
        .field("🕒 Agregada", added_ago(song), true);

    if !up_next.is_empty() {
        let next = up_next
            .iter()
            .enumerate()
            .map(|(i, song)| format!("**{}**. {}", i + 1, song.title()))
            .collect::<Vec<_>>()
            .join("\n");
        embed = embed.field("⏭️ A continuación", next, false);
    }

    if let Some(uploader) = track.uploader() {
        let mut author = CreateEmbedAuthor::new(uploader);
        if let Some(url) = track.uploader_url() {
            author = author.url(url);
        }
        embed = embed.author(author);
    }

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(queued: &Queued) -> CreateEmbed {
    let track = queued.song.track();

    let mut embed = CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!(
            "**[{}]({})** se ha agregado a la cola de reproducción",
            track.title(),
            track.url()
        ))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", display_duration(track.duration()), true)
        .field("📍 Posición", (queued.position + 1).to_string(), true)
        .field("⏳ Sonará en", format_eta(queued.eta), true)
        .field("👤 Solicitado por", format!("<@{}>", queued.song.requested_by()), true);

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente si no hay música sonando",
        ))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(page: &QueuePage, current: Option<&Song>, looping: bool) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if page.total_items == 0 && current.is_none() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    if let Some(current) = current {
        embed = embed.field(
            format!("{} Reproduciendo", if looping { "🔂" } else { "▶️" }),
            format!(
                "**{}** `[{}]`",
                current.title(),
                display_duration(current.duration())
            ),
            false,
        );
    }

    if !page.items.is_empty() {
        let description = page
            .items
            .iter()
            .map(|(position, song)| {
                format!(
                    "**{}**. {} `[{}]` - <@{}> {}",
                    position + 1,
                    song.title(),
                    display_duration(song.duration()),
                    song.requested_by(),
                    added_ago(song)
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        embed = embed.field("Próximas canciones", description, false);
    }

    embed = embed.field(
        "Información",
        format!("**Total:** {} canciones en cola", page.total_items),
        false,
    );

    if page.total_pages > 1 {
        embed = embed.footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • Vibe Bot",
            page.current_page, page.total_pages
        )));
    } else {
        embed = embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    embed.timestamp(Timestamp::now())
}

/// Embed de fin de sesión
pub fn create_session_ended_embed(reason: StopReason) -> CreateEmbed {
    let description = match reason {
        StopReason::Idle => "💤 Me desconecté por inactividad",
        StopReason::Stopped => "⏹️ Reproducción detenida y cola limpiada",
        StopReason::Disconnected => "🔌 Me desconectaron del canal de voz",
    };

    CreateEmbed::default()
        .title("👋 Sesión Terminada")
        .description(description)
        .color(colors::MUSIC_PURPLE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Marca de tiempo relativa de Discord ("hace 3 minutos")
fn added_ago(song: &Song) -> String {
    format!("<t:{}:R>", song.added_at().timestamp())
}

fn display_duration(duration: Option<Duration>) -> String {
    duration
        .map(format_duration)
        .unwrap_or_else(|| "🔴 En vivo".to_string())
}

pub fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        Some(eta) if eta.is_zero() => "Ahora".to_string(),
        Some(eta) => format!("~{}", format_duration(eta)),
        None => "Desconocido".to_string(),
    }
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(45)), "0:45");
        assert_eq!(format_duration(Duration::from_secs(125)), "2:05");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn test_added_ago_uses_discord_relative_timestamp() {
        let song = crate::audio::testing::song("a", 10);
        assert_eq!(
            added_ago(&song),
            format!("<t:{}:R>", song.added_at().timestamp())
        );
        assert!(added_ago(&song).starts_with("<t:") && added_ago(&song).ends_with(":R>"));
    }

    #[test]
    fn test_format_eta() {
        assert_eq!(format_eta(Some(Duration::ZERO)), "Ahora");
        assert_eq!(format_eta(Some(Duration::from_secs(210))), "~3:30");
        assert_eq!(format_eta(None), "Desconocido");
    }
}

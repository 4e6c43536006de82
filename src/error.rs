use thiserror::Error;

/// Errores del núcleo de reproducción.
///
/// Los errores de resolución y de índices se devuelven al usuario como
/// mensaje; los del driver de reproducción se registran y se absorben.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MusicError {
    #[error("no results matched the query")]
    NotFound,
    #[error("media backend unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("index {index} out of range for queue of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("invalid queue index {index} (queue length {len})")]
    InvalidIndex { index: usize, len: usize },
    #[error("song is not in the queue")]
    NotInQueue,
    #[error("queue is full (max {0} songs)")]
    QueueFull(usize),
    #[error("voice playback failed: {0}")]
    Voice(String),
    #[error("voice connection failed: {0}")]
    Connection(String),
    #[error("not connected to a voice channel")]
    NotConnected,
    #[error("nothing is playing")]
    NotPlaying,
    #[error("playback is not paused")]
    NotPaused,
    #[error("volume {0} outside of [0.01, 1.00]")]
    InvalidVolume(f32),
    #[error("session already stopped")]
    SessionEnded,
}

impl MusicError {
    /// Mensaje visible para el usuario en Discord
    pub fn user_message(&self) -> String {
        match self {
            MusicError::NotFound => "❌ No se encontraron resultados".to_string(),
            MusicError::UpstreamUnavailable(reason) => {
                format!("❌ No se pudo obtener la canción: `{}`", reason)
            }
            MusicError::IndexOutOfRange { index, len } | MusicError::InvalidIndex { index, len } => {
                format!(
                    "❌ Posición {} inválida, la cola tiene {} canciones",
                    index + 1,
                    len
                )
            }
            MusicError::NotInQueue => "❌ La canción ya no está en la cola".to_string(),
            MusicError::QueueFull(max) => {
                format!("❌ La cola está llena (máximo {} canciones)", max)
            }
            MusicError::Voice(reason) => format!("❌ Error de reproducción: `{}`", reason),
            MusicError::Connection(reason) => {
                format!("❌ No se pudo conectar al canal de voz: `{}`", reason)
            }
            MusicError::NotConnected => "❌ No estoy conectado a un canal de voz".to_string(),
            MusicError::NotPlaying => "❌ No hay música reproduciéndose".to_string(),
            MusicError::NotPaused => "❌ La reproducción no está pausada".to_string(),
            MusicError::InvalidVolume(_) => "❌ El volumen debe estar entre 1 y 100".to_string(),
            MusicError::SessionEnded => "❌ La sesión terminó, vuelve a intentarlo".to_string(),
        }
    }
}

pub type MusicResult<T> = std::result::Result<T, MusicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_messages_are_one_based() {
        let err = MusicError::InvalidIndex { index: 4, len: 3 };
        assert!(err.user_message().contains("Posición 5"));
        assert!(err.user_message().contains("3 canciones"));
    }
}

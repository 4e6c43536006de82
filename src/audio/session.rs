//! Sesión de reproducción por guild.
//!
//! Cada [`Session`] tiene su cola, la canción actual, el estado de loop,
//! volumen y votos para saltar, y una tarea de fondo (el driver) que saca
//! canciones de la cola y las reproduce una tras otra:
//!
//! ```text
//! Idle --dequeue--> Playing --fin/skip/error--> Idle
//! Idle --timeout de inactividad--> Stopping
//! Playing <--pause/resume--> Paused
//! cualquiera --stop/desconexión--> Stopping
//! ```
//!
//! El driver es el único que escribe `current`. Los comandos sólo cambian
//! banderas o detienen el handle de reproducción; el driver vuelve a leer
//! el estado después de cada punto de suspensión.

use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    queue::{estimate_wait, Song, SongId, SongQueue},
    registry::SessionRegistry,
    voice::{Playback, PlaybackEnd, PlaybackHandle, VoiceConnection, VoiceGateway},
};
use crate::{
    config::Config,
    error::{MusicError, MusicResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    Idle,
    Playing,
    Paused,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Cola vacía durante todo el timeout de inactividad
    Idle,
    /// `stop` o `leave` explícito
    Stopped,
    /// El bot fue sacado del canal de voz
    Disconnected,
}

/// Eventos para la capa de presentación. Nadie depende de que se entreguen.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    NowPlaying {
        guild_id: GuildId,
        song: Song,
    },
    TrackAdded {
        guild_id: GuildId,
        song: Song,
        position: usize,
        eta: Option<Duration>,
    },
    Stopped {
        guild_id: GuildId,
        reason: StopReason,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipOutcome {
    Skipped,
    Voted { votes: usize, required: usize },
    AlreadyVoted { votes: usize, required: usize },
}

/// Resultado de encolar una canción
#[derive(Debug, Clone)]
pub struct Queued {
    pub song: Song,
    /// Posición base 0 en la cola
    pub position: usize,
    /// `None` si alguna canción anterior es un directo
    pub eta: Option<Duration>,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub idle_timeout: Duration,
    pub skip_vote_threshold: usize,
    pub default_volume: f32,
    pub max_queue_size: usize,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            idle_timeout: config.idle_timeout(),
            skip_vote_threshold: config.skip_vote_threshold,
            default_volume: config.default_volume,
            max_queue_size: config.max_queue_size,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

struct SessionState {
    status: PlayerStatus,
    current: Option<Song>,
    loop_enabled: bool,
    volume: f32,
    skip_votes: HashSet<UserId>,
    // Un skip explícito avanza aunque el loop esté activo
    skip_requested: bool,
    playback: Option<Box<dyn PlaybackHandle>>,
    stop_reason: Option<StopReason>,
}

pub struct Session {
    guild_id: GuildId,
    queue: SongQueue,
    state: Mutex<SessionState>,
    voice: Mutex<Option<Arc<dyn VoiceConnection>>>,
    connect_lock: tokio::sync::Mutex<()>,
    gateway: Arc<dyn VoiceGateway>,
    settings: SessionSettings,
    events: broadcast::Sender<SessionEvent>,
    registry: Weak<SessionRegistry>,
    cancel: CancellationToken,
    torn_down: AtomicBool,
    finished: watch::Sender<bool>,
}

impl Session {
    pub(super) fn new(
        guild_id: GuildId,
        gateway: Arc<dyn VoiceGateway>,
        settings: SessionSettings,
        events: broadcast::Sender<SessionEvent>,
        registry: Weak<SessionRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            guild_id,
            queue: SongQueue::new(settings.max_queue_size),
            state: Mutex::new(SessionState {
                status: PlayerStatus::Idle,
                current: None,
                loop_enabled: false,
                volume: settings.default_volume,
                skip_votes: HashSet::new(),
                skip_requested: false,
                playback: None,
                stop_reason: None,
            }),
            voice: Mutex::new(None),
            connect_lock: tokio::sync::Mutex::new(()),
            gateway,
            settings,
            events,
            registry,
            cancel: CancellationToken::new(),
            torn_down: AtomicBool::new(false),
            finished: watch::Sender::new(false),
        })
    }

    /// Lanza el driver de la sesión. Se llama una sola vez, desde el registro.
    pub(super) fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move {
            info!("▶️ Driver iniciado para guild {}", session.guild_id);
            session.drive().await;
            session.teardown().await;
        })
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn queue(&self) -> &SongQueue {
        &self.queue
    }

    pub fn status(&self) -> PlayerStatus {
        self.state.lock().status
    }

    pub fn current(&self) -> Option<Song> {
        self.state.lock().current.clone()
    }

    pub fn is_looping(&self) -> bool {
        self.state.lock().loop_enabled
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    pub fn skip_votes(&self) -> usize {
        self.state.lock().skip_votes.len()
    }

    pub fn skip_vote_threshold(&self) -> usize {
        self.settings.skip_vote_threshold
    }

    pub fn is_stopping(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn voice_channel(&self) -> Option<ChannelId> {
        self.voice.lock().as_ref().map(|voice| voice.channel_id())
    }

    pub fn is_connected(&self) -> bool {
        self.voice.lock().is_some()
    }

    /// Conecta al canal o se mueve a él si ya hay conexión.
    ///
    /// Si falla, la sesión queda con la conexión que tenía antes.
    pub async fn join(&self, channel_id: ChannelId) -> MusicResult<()> {
        let _guard = self.connect_lock.lock().await;
        if self.is_stopping() {
            return Err(MusicError::Connection("session is stopping".to_string()));
        }

        let existing = self.voice.lock().clone();
        match existing {
            Some(voice) if voice.channel_id() == channel_id => Ok(()),
            Some(voice) => voice.move_to(channel_id).await,
            None => {
                let voice = self.gateway.connect(self.guild_id, channel_id).await?;
                *self.voice.lock() = Some(voice);

                // El teardown pudo correr mientras conectábamos
                if self.is_stopping() {
                    let orphan = self.voice.lock().take();
                    if let Some(orphan) = orphan {
                        let _ = orphan.disconnect().await;
                    }
                    return Err(MusicError::Connection("session is stopping".to_string()));
                }
                Ok(())
            }
        }
    }

    /// Agrega una canción al final de la cola y avisa a la presentación
    ///
    /// Falla con `SessionEnded` si la sesión ya se está deteniendo.
    pub fn enqueue(&self, song: Song) -> MusicResult<Queued> {
        if self.is_stopping() {
            return Err(MusicError::SessionEnded);
        }
        let position = self.queue.enqueue(song.clone())?;

        // El teardown cancela antes de vaciar la cola: si ya canceló,
        // puede que la haya vaciado antes de este push
        if self.is_stopping() {
            if let Some(index) = self.queue.position(song.id()) {
                let _ = self.queue.remove(index);
            }
            return Err(MusicError::SessionEnded);
        }

        // El driver pudo sacarla ya de la cola: entonces suena ahora mismo
        let eta = match self.eta(song.id()) {
            Ok(eta) => eta,
            Err(MusicError::NotInQueue) => Some(Duration::ZERO),
            Err(e) => return Err(e),
        };

        info!("➕ {} agregada en posición {} (guild {})", song.title(), position + 1, self.guild_id);
        let _ = self.events.send(SessionEvent::TrackAdded {
            guild_id: self.guild_id,
            song: song.clone(),
            position,
            eta,
        });

        Ok(Queued { song, position, eta })
    }

    /// Tiempo estimado hasta que suene la canción `id`
    pub fn eta(&self, id: SongId) -> MusicResult<Option<Duration>> {
        let current = self.current();
        let queue = self.queue.snapshot();
        estimate_wait(current.as_ref(), &queue, id)
    }

    pub fn pause(&self) -> MusicResult<()> {
        let mut state = self.state.lock();
        match state.status {
            PlayerStatus::Playing => {
                if let Some(handle) = &state.playback {
                    handle.pause()?;
                }
                state.status = PlayerStatus::Paused;
                info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
                Ok(())
            }
            PlayerStatus::Paused => Ok(()),
            PlayerStatus::Idle | PlayerStatus::Stopping => Err(MusicError::NotPlaying),
        }
    }

    pub fn resume(&self) -> MusicResult<()> {
        let mut state = self.state.lock();
        match state.status {
            PlayerStatus::Paused => {
                if let Some(handle) = &state.playback {
                    handle.resume()?;
                }
                state.status = PlayerStatus::Playing;
                info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
                Ok(())
            }
            PlayerStatus::Playing => Err(MusicError::NotPaused),
            PlayerStatus::Idle | PlayerStatus::Stopping => Err(MusicError::NotPlaying),
        }
    }

    /// Salta la canción actual sin condiciones
    pub fn skip(&self) -> MusicResult<()> {
        let mut state = self.state.lock();
        if state.current.is_none() {
            return Err(MusicError::NotPlaying);
        }
        self.request_skip(&mut state);
        Ok(())
    }

    /// Voto para saltar. Quien pidió la canción o un usuario con
    /// privilegios salta directamente.
    pub fn vote_skip(&self, user_id: UserId, privileged: bool) -> MusicResult<SkipOutcome> {
        let mut state = self.state.lock();
        let requester = state
            .current
            .as_ref()
            .map(|song| song.requested_by())
            .ok_or(MusicError::NotPlaying)?;
        let required = self.settings.skip_vote_threshold;

        // El skip ya está en camino: no se cuentan más votos
        if state.skip_requested {
            return Ok(SkipOutcome::Skipped);
        }

        if privileged || requester == user_id {
            self.request_skip(&mut state);
            return Ok(SkipOutcome::Skipped);
        }

        if !state.skip_votes.insert(user_id) {
            return Ok(SkipOutcome::AlreadyVoted {
                votes: state.skip_votes.len(),
                required,
            });
        }

        let votes = state.skip_votes.len();
        debug!("🗳️ Voto para saltar {}/{} en guild {}", votes, required, self.guild_id);
        if votes >= required {
            self.request_skip(&mut state);
            Ok(SkipOutcome::Skipped)
        } else {
            Ok(SkipOutcome::Voted { votes, required })
        }
    }

    /// Lleva la canción en `index` al frente y salta la actual
    pub fn skip_to(&self, index: usize) -> MusicResult<()> {
        self.queue.promote(index)?;
        match self.skip() {
            // Sin nada sonando el driver la toma igualmente como siguiente
            Ok(()) | Err(MusicError::NotPlaying) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn set_loop(&self, enabled: bool) {
        let mut state = self.state.lock();
        state.loop_enabled = enabled;
        if !enabled {
            state.skip_votes.clear();
        }
        info!(
            "{} Loop {} en guild {}",
            if enabled { "🔂" } else { "➡️" },
            if enabled { "activado" } else { "desactivado" },
            self.guild_id
        );
    }

    pub fn set_volume(&self, volume: f32) -> MusicResult<()> {
        if !(0.01..=1.0).contains(&volume) {
            return Err(MusicError::InvalidVolume(volume));
        }
        let mut state = self.state.lock();
        state.volume = volume;
        if let Some(handle) = &state.playback {
            handle.set_volume(volume)?;
        }
        info!("🔊 Volumen ajustado a {}%", (volume * 100.0).round() as u32);
        Ok(())
    }

    /// Detiene la sesión: vacía la cola, desconecta y la saca del registro.
    /// Espera a que termine el teardown; llamarlo varias veces es seguro.
    pub async fn stop(&self) {
        self.queue.clear();
        self.request_stop(StopReason::Stopped);
        self.wait_stopped().await;
    }

    /// El bot fue desconectado del canal desde fuera: no hay que volver a
    /// desconectar, sólo detener la sesión.
    pub async fn connection_lost(&self) {
        let dropped = self.voice.lock().take();
        if dropped.is_some() {
            warn!("🔌 Conexión de voz perdida en guild {}", self.guild_id);
        }
        self.request_stop(StopReason::Disconnected);
        self.wait_stopped().await;
    }

    pub async fn wait_stopped(&self) {
        let mut finished = self.finished.subscribe();
        let _ = finished.wait_for(|done| *done).await;
    }

    fn request_stop(&self, reason: StopReason) {
        self.state.lock().stop_reason.get_or_insert(reason);
        self.cancel.cancel();
    }

    fn request_skip(&self, state: &mut SessionState) {
        state.skip_requested = true;
        if let Some(handle) = &state.playback {
            if let Err(e) = handle.stop() {
                warn!("No se pudo detener el track actual: {}", e);
            }
        }
        info!("⏭️ Saltando canción en guild {}", self.guild_id);
    }

    /// Bucle principal: una canción a la vez hasta que la sesión se detiene
    async fn drive(&self) {
        loop {
            if self.is_stopping() {
                return;
            }

            let Some(song) = self.next_song().await else {
                return;
            };

            let voice = self.voice.lock().clone();
            let Some(voice) = voice else {
                warn!("🔇 Sin conexión de voz, descartando {}", song.title());
                self.state.lock().skip_requested = true;
                continue;
            };

            let volume = self.volume();
            let started = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                started = voice.play(song.track(), volume) => started,
            };

            let Playback { handle, finished } = match started {
                Ok(playback) => playback,
                Err(e) => {
                    warn!("❌ No se pudo reproducir {}: {}", song.title(), e);
                    self.state.lock().skip_requested = true;
                    continue;
                }
            };

            self.attach(handle);
            info!("🎵 Reproduciendo: {} en guild {}", song.title(), self.guild_id);
            let _ = self.events.send(SessionEvent::NowPlaying {
                guild_id: self.guild_id,
                song: song.clone(),
            });

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                end = finished => match end {
                    Ok(PlaybackEnd::Finished) | Err(_) => {
                        debug!("🏁 Terminó {} en guild {}", song.title(), self.guild_id);
                    }
                    Ok(PlaybackEnd::Failed(reason)) => {
                        warn!("❌ Error de reproducción en {}: {}", song.title(), reason);
                        self.state.lock().skip_requested = true;
                    }
                },
            }
        }
    }

    /// Pasa a Idle y obtiene la siguiente canción: la misma si hay loop,
    /// si no la primera de la cola. `None` cuando la sesión debe terminar.
    async fn next_song(&self) -> Option<Song> {
        let replay = {
            let mut state = self.state.lock();
            let replay = state.loop_enabled && !state.skip_requested;
            let previous = state.current.take();
            state.playback = None;
            state.skip_requested = false;
            state.skip_votes.clear();
            state.status = PlayerStatus::Idle;

            match previous.filter(|_| replay) {
                Some(song) => {
                    debug!("🔂 Repitiendo: {}", song.title());
                    state.current = Some(song.clone());
                    state.status = PlayerStatus::Playing;
                    Some(song)
                }
                None => None,
            }
        };
        if replay.is_some() {
            return replay;
        }

        let song = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            next = tokio::time::timeout(self.settings.idle_timeout, self.queue.dequeue()) => match next {
                Ok(song) => song,
                Err(_) => {
                    info!("⏰ Sin actividad por {:?} en guild {}", self.settings.idle_timeout, self.guild_id);
                    self.request_stop(StopReason::Idle);
                    return None;
                }
            },
        };

        let mut state = self.state.lock();
        state.current = Some(song.clone());
        state.status = PlayerStatus::Playing;
        Some(song)
    }

    /// Guarda el handle del track recién iniciado aplicando los comandos
    /// que llegaron mientras arrancaba.
    fn attach(&self, handle: Box<dyn PlaybackHandle>) {
        let mut state = self.state.lock();
        let applied = if state.skip_requested {
            handle.stop()
        } else if state.status == PlayerStatus::Paused {
            handle.pause()
        } else {
            Ok(())
        };
        if let Err(e) = applied.and_then(|_| handle.set_volume(state.volume)) {
            warn!("No se pudo aplicar el estado al track: {}", e);
        }
        state.playback = Some(handle);
    }

    /// Libera todo una única vez, sin importar cuántas veces se pida
    async fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();

        let (playback, reason) = {
            let mut state = self.state.lock();
            state.status = PlayerStatus::Stopping;
            state.current = None;
            state.skip_votes.clear();
            (
                state.playback.take(),
                *state.stop_reason.get_or_insert(StopReason::Stopped),
            )
        };

        if let Some(handle) = playback {
            let _ = handle.stop();
        }
        self.queue.clear();

        // Tomar la conexión garantiza una sola desconexión
        let voice = self.voice.lock().take();
        if let Some(voice) = voice {
            if let Err(e) = voice.disconnect().await {
                warn!("Error al desconectar en guild {}: {}", self.guild_id, e);
            }
        }

        if let Some(registry) = self.registry.upgrade() {
            registry.remove_if_same(self.guild_id, self);
        }

        info!("⏹️ Sesión terminada en guild {} ({:?})", self.guild_id, reason);
        let _ = self.events.send(SessionEvent::Stopped {
            guild_id: self.guild_id,
            reason,
        });
        self.finished.send_replace(true);
    }
}
